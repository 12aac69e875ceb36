//! Warehouse applications: requests to move, receive, write off, consume or return stock,
//! resolved by reviewers.
//!
//! Approval is the only path that mutates the stock ledger, and it does so in the same store
//! transaction as the status change.

pub mod domain;
pub mod ledger;
pub mod policy;
pub mod repository;
pub mod router;
pub mod service;
pub mod transfer;

#[cfg(test)]
mod tests;

pub use domain::{
    Application, ApplicationAction, ApplicationId, ApplicationRequest, ApplicationStatus,
    ApplicationType, ApplicationWithActions, ApplicationsList, HydratedApplication, Identity,
    ItemId, ItemInfo, Payload, PayloadLine, Roles, UserId, WarehouseId, WarehouseInfo,
    WarehouseStock,
};
pub use ledger::{InsufficientStock, Shortfall, StockLedger};
pub use repository::{ApplicationPage, ApplicationRepository, CreateOutcome, ListQuery};
pub use router::{application_router, IDEMPOTENCY_HEADER};
pub use service::{ApplicationWorkflow, ErrorKind, RuleViolation, Submission, WorkflowError};
pub use transfer::{Legs, TransferPlan};
