use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    Application, ApplicationAction, ApplicationId, ApplicationRequest, ApplicationStatus,
    ApplicationWithActions, ApplicationsList, HydratedApplication, Identity, ItemId, Payload,
    PayloadLine, UserId, WarehouseId, WarehouseStock,
};
use super::ledger::{InsufficientStock, StockLedger};
use super::policy;
use super::repository::{ApplicationRepository, ListQuery};
use super::transfer::TransferPlan;
use crate::config::WorkflowConfig;
use crate::directory::Directory;
use crate::store::{Store, StoreError};

/// Result of [`ApplicationWorkflow::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub application: HydratedApplication,
    /// The idempotency token was already stored with this exact submission.
    pub replayed: bool,
}

/// The application state machine. Every status change and ledger mutation goes through here.
pub struct ApplicationWorkflow<D> {
    store: Arc<Store>,
    repository: ApplicationRepository,
    ledger: StockLedger,
    directory: Arc<D>,
    config: WorkflowConfig,
}

impl<D> ApplicationWorkflow<D>
where
    D: Directory + 'static,
{
    pub fn new(store: Arc<Store>, directory: Arc<D>, config: WorkflowConfig) -> Self {
        let repository = ApplicationRepository::new(&store);
        let ledger = StockLedger::new(&store);
        Self {
            store,
            repository,
            ledger,
            directory,
            config,
        }
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    /// Read-only view of the stock ledger.
    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    /// Stores a new pending application under `token`.
    ///
    /// Retrying with the same token and the same request returns the stored record with
    /// `replayed` set. Reusing a token for a different request fails with
    /// [`WorkflowError::TokenReused`].
    pub fn create(
        &self,
        token: ApplicationId,
        request: ApplicationRequest,
        actor: &UserId,
    ) -> Result<Submission, WorkflowError> {
        let creator = self
            .directory
            .user(actor)
            .ok_or_else(|| RuleViolation::UnknownActor(actor.clone()))?;
        self.validate_request(&request, &token)?;

        let serial_number = self.store.next_serial()?;
        let application =
            Application::pending(token.clone(), serial_number, request, creator.id, Utc::now());

        let outcome = match self.repository.create(application) {
            Ok(outcome) => outcome,
            Err(StoreError::TokenReused) => {
                warn!(application_id = %token, actor = %actor, "idempotency token reused");
                return Err(WorkflowError::TokenReused(token));
            }
            Err(other) => return Err(other.into()),
        };

        let replayed = outcome.is_replay();
        let application = outcome.into_application();
        info!(
            application_id = %application.id,
            serial_number = application.serial_number,
            actor = %actor,
            kind = application.kind.label(),
            replayed,
            "application submitted"
        );

        Ok(Submission {
            application: self.hydrate(application),
            replayed,
        })
    }

    /// Resolves a pending application as successful and applies its transfer to the ledger.
    ///
    /// The status compare-and-swap and both ledger legs commit in one store transaction. A
    /// shortfall on the deduction rolls the status back to pending.
    pub fn approve(
        &self,
        id: &ApplicationId,
        reviewer: &Identity,
    ) -> Result<HydratedApplication, WorkflowError> {
        if !policy::can_review(reviewer) {
            return Err(WorkflowError::Forbidden("only reviewers may approve applications"));
        }
        self.load_pending(id, ApplicationAction::Approve)?;

        let now = Utc::now();
        let approved = self
            .store
            .transaction(|tx| {
                let approved = tx.applications().transition_status(
                    id,
                    ApplicationStatus::Pending,
                    ApplicationStatus::Success,
                    &reviewer.id,
                    now,
                )?;
                TransferPlan::for_application(&approved).apply(tx)?;
                Ok(approved)
            })
            .map_err(|err| self.resolution_failure(id, &reviewer.id, err))?;

        let plan = TransferPlan::for_application(&approved);
        info!(
            application_id = %id,
            actor = %reviewer.id,
            status = %approved.status,
            deducted_from = plan.deduct_from.map(WarehouseId::as_str),
            deposited_to = plan.deposit_to.map(WarehouseId::as_str),
            "application approved"
        );
        Ok(self.hydrate(approved))
    }

    pub fn reject(
        &self,
        id: &ApplicationId,
        reviewer: &Identity,
    ) -> Result<HydratedApplication, WorkflowError> {
        if !policy::can_review(reviewer) {
            return Err(WorkflowError::Forbidden("only reviewers may reject applications"));
        }
        self.load_pending(id, ApplicationAction::Reject)?;

        let rejected = self
            .repository
            .transition_status(
                id,
                ApplicationStatus::Pending,
                ApplicationStatus::Rejected,
                &reviewer.id,
            )
            .map_err(|err| self.resolution_failure(id, &reviewer.id, err))?;

        info!(
            application_id = %id,
            actor = %reviewer.id,
            status = %rejected.status,
            "application rejected"
        );
        Ok(self.hydrate(rejected))
    }

    /// Withdraws a pending application. Only its creator may do this.
    pub fn delete(
        &self,
        id: &ApplicationId,
        actor: &Identity,
    ) -> Result<HydratedApplication, WorkflowError> {
        let current = self.load(id)?;
        if !policy::can_delete(actor, &current) {
            return Err(RuleViolation::NotCreator(ApplicationAction::Delete).into());
        }
        if !current.status.is_pending() {
            return Err(RuleViolation::NotPending(ApplicationAction::Delete).into());
        }

        let deleted = self
            .repository
            .transition_status(
                id,
                ApplicationStatus::Pending,
                ApplicationStatus::Deleted,
                &actor.id,
            )
            .map_err(|err| self.resolution_failure(id, &actor.id, err))?;

        info!(
            application_id = %id,
            actor = %actor.id,
            status = %deleted.status,
            "application deleted"
        );
        Ok(self.hydrate(deleted))
    }

    /// Replaces the editable fields of a pending application. Only its creator may do this.
    pub fn update(
        &self,
        id: &ApplicationId,
        request: ApplicationRequest,
        actor: &Identity,
    ) -> Result<HydratedApplication, WorkflowError> {
        let current = self.load(id)?;
        if !policy::can_edit(actor, &current) {
            return Err(RuleViolation::NotCreator(ApplicationAction::Edit).into());
        }
        if !current.status.is_pending() {
            return Err(RuleViolation::NotPending(ApplicationAction::Edit).into());
        }
        self.validate_request(&request, id)?;

        let mut edited = current;
        edited.apply_edit(request, Utc::now());
        let updated = self
            .store
            .transaction(|tx| tx.applications().replace_pending(&edited))
            .map_err(|err| self.resolution_failure(id, &actor.id, err))?;

        info!(application_id = %id, actor = %actor.id, "application edited");
        Ok(self.hydrate(updated))
    }

    /// Application plus the actions `viewer` may currently take on it.
    pub fn get(
        &self,
        id: &ApplicationId,
        viewer: &Identity,
    ) -> Result<ApplicationWithActions, WorkflowError> {
        let application = self.load(id)?;
        let actions = policy::available_actions(viewer, &application);
        Ok(ApplicationWithActions {
            application: self.hydrate(application),
            actions,
        })
    }

    /// Newest-first page of applications.
    pub fn list(&self, query: &ListQuery) -> Result<ApplicationsList, WorkflowError> {
        if query.limit == 0 || query.limit > self.config.max_page_size {
            return Err(RuleViolation::InvalidPageSize {
                requested: query.limit,
                max: self.config.max_page_size,
            }
            .into());
        }

        let page = self.repository.list_by_filter(query)?;
        Ok(ApplicationsList {
            items: page
                .items
                .into_iter()
                .map(|application| self.hydrate(application))
                .collect(),
            cursor: page.next_cursor,
        })
    }

    /// Positive stock rows of a warehouse known to the directory.
    pub fn stock(&self, warehouse: &WarehouseId) -> Result<WarehouseStock, WorkflowError> {
        let info = self
            .directory
            .warehouse(warehouse)
            .ok_or_else(|| WorkflowError::WarehouseNotFound(warehouse.clone()))?;
        let stock = self.ledger.warehouse_stock(warehouse)?;
        Ok(WarehouseStock {
            warehouse: info,
            items: self.payload_lines(&stock),
        })
    }

    fn load(&self, id: &ApplicationId) -> Result<Application, WorkflowError> {
        self.repository.get_by_id(id).map_err(|err| match err {
            StoreError::NotFound => WorkflowError::NotFound(id.clone()),
            other => WorkflowError::Storage(other),
        })
    }

    fn load_pending(
        &self,
        id: &ApplicationId,
        action: ApplicationAction,
    ) -> Result<Application, WorkflowError> {
        let application = self.load(id)?;
        if !application.status.is_pending() {
            return Err(RuleViolation::NotPending(action).into());
        }
        Ok(application)
    }

    /// Checks every reference and quantity in `request`. `own_id` is the id the request will be
    /// stored under.
    fn validate_request(
        &self,
        request: &ApplicationRequest,
        own_id: &ApplicationId,
    ) -> Result<(), WorkflowError> {
        if let Some(destination) = &request.sent_to_warehouse_id {
            if !self.directory.warehouse_exists(destination) {
                return Err(RuleViolation::UnknownDestination(destination.clone()).into());
            }
        }
        if let Some(source) = &request.sent_from_warehouse_id {
            if !self.directory.warehouse_exists(source) {
                return Err(RuleViolation::UnknownSource(source.clone()).into());
            }
        }

        if request.payload.is_empty() {
            return Err(RuleViolation::EmptyPayload.into());
        }
        if let Some((item, _)) = request.payload.iter().find(|(_, count)| **count == 0) {
            return Err(RuleViolation::ZeroQuantity(item.clone()).into());
        }

        if let Some(linked) = &request.linked_to_application_id {
            if linked == own_id {
                return Err(RuleViolation::SelfLink.into());
            }
            if !self.repository.exists(linked)? {
                return Err(RuleViolation::UnknownLinkedApplication(linked.clone()).into());
            }
        }
        Ok(())
    }

    /// Maps a failed status transition to the caller-facing error.
    fn resolution_failure(
        &self,
        id: &ApplicationId,
        actor: &UserId,
        err: StoreError,
    ) -> WorkflowError {
        match err {
            StoreError::NotFound => WorkflowError::NotFound(id.clone()),
            StoreError::StatusMismatch { found, .. } => {
                warn!(application_id = %id, actor = %actor, status = %found, "lost status race");
                WorkflowError::Conflict(id.clone())
            }
            StoreError::InsufficientStock(shortfall) => {
                warn!(application_id = %id, actor = %actor, %shortfall, "approval refused");
                RuleViolation::InsufficientStock(shortfall).into()
            }
            other => WorkflowError::Storage(other),
        }
    }

    fn hydrate(&self, application: Application) -> HydratedApplication {
        let items = self.payload_lines(&application.payload);
        HydratedApplication { application, items }
    }

    fn payload_lines(&self, payload: &Payload) -> Vec<PayloadLine> {
        let ids: Vec<&ItemId> = payload.keys().collect();
        let info = self.directory.display_info(&ids);
        payload
            .iter()
            .map(|(item_id, count)| PayloadLine {
                item_id: item_id.clone(),
                count: *count,
                item: info.get(item_id).cloned(),
            })
            .collect()
    }
}

/// A business rule refused the request. Surfaced as a bad request.
#[derive(Debug, thiserror::Error)]
pub enum RuleViolation {
    #[error("cannot create an application on behalf of this user")]
    UnknownActor(UserId),
    #[error("destination warehouse does not exist")]
    UnknownDestination(WarehouseId),
    #[error("source warehouse does not exist")]
    UnknownSource(WarehouseId),
    #[error("linked application {0} does not exist")]
    UnknownLinkedApplication(ApplicationId),
    #[error("an application cannot be linked to itself")]
    SelfLink,
    #[error("payload must contain at least one item")]
    EmptyPayload,
    #[error("count of item {0} must be greater than zero")]
    ZeroQuantity(ItemId),
    #[error("only pending applications may be {}", .0.past_tense())]
    NotPending(ApplicationAction),
    #[error("only the creator may {}", .0.verb())]
    NotCreator(ApplicationAction),
    #[error("cannot deduct more than available: {0}")]
    InsufficientStock(InsufficientStock),
    #[error("limit must be between 1 and {max}, got {requested}")]
    InvalidPageSize { requested: usize, max: usize },
}

/// Coarse classification used by transports to pick a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    BadRequest,
    Forbidden,
    Conflict,
    Internal,
}

/// Error raised by the application workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("application {0} not found")]
    NotFound(ApplicationId),
    #[error("warehouse {0} not found")]
    WarehouseNotFound(WarehouseId),
    #[error(transparent)]
    BadRequest(#[from] RuleViolation),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("application {0} was resolved concurrently; reload and retry")]
    Conflict(ApplicationId),
    #[error("idempotency token {0} was already used for a different application")]
    TokenReused(ApplicationId),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::NotFound(_) | WorkflowError::WarehouseNotFound(_) => ErrorKind::NotFound,
            WorkflowError::BadRequest(_) => ErrorKind::BadRequest,
            WorkflowError::Forbidden(_) => ErrorKind::Forbidden,
            WorkflowError::Conflict(_) | WorkflowError::TokenReused(_) => ErrorKind::Conflict,
            WorkflowError::Storage(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_pending(&self) -> bool {
        matches!(self, WorkflowError::BadRequest(RuleViolation::NotPending(_)))
    }
}
