//! Application approval workflow and atomic stock ledger for a network of warehouses.

pub mod config;
pub mod directory;
pub mod error;
pub mod store;
pub mod telemetry;
pub mod workflows;
