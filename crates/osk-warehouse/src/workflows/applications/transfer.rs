//! Which ledger legs an approved application applies.
//!
//! | source | destination | type            | deduct from source | deposit to destination |
//! |--------|-------------|-----------------|--------------------|------------------------|
//! | -      | -           | any             | no                 | no                     |
//! | set    | -           | any             | yes                | no                     |
//! | -      | set         | any             | no                 | yes                    |
//! | set    | set         | send            | yes                | no                     |
//! | set    | set         | receive         | no                 | yes                    |
//! | set    | set         | defect/use/revert | no               | no                     |
//!
//! Rows that apply no leg are record-keeping applications and are allowed.

use super::domain::{Application, ApplicationType, Payload, WarehouseId};
use crate::store::{StoreTransaction, TxResult};

/// Ledger legs selected for one `(source present, destination present, type)` combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Legs {
    pub deduct: bool,
    pub deposit: bool,
}

impl Legs {
    const NONE: Legs = Legs {
        deduct: false,
        deposit: false,
    };
    const DEDUCT: Legs = Legs {
        deduct: true,
        deposit: false,
    };
    const DEPOSIT: Legs = Legs {
        deduct: false,
        deposit: true,
    };

    pub const fn select(has_source: bool, has_destination: bool, kind: ApplicationType) -> Legs {
        match (has_source, has_destination, kind) {
            (false, false, _) => Legs::NONE,
            (true, false, _) => Legs::DEDUCT,
            (false, true, _) => Legs::DEPOSIT,
            (true, true, ApplicationType::Send) => Legs::DEDUCT,
            (true, true, ApplicationType::Receive) => Legs::DEPOSIT,
            (
                true,
                true,
                ApplicationType::Defect | ApplicationType::Use | ApplicationType::Revert,
            ) => Legs::NONE,
        }
    }
}

/// Concrete ledger mutations for one application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferPlan<'a> {
    pub deduct_from: Option<&'a WarehouseId>,
    pub deposit_to: Option<&'a WarehouseId>,
    pub payload: &'a Payload,
}

impl<'a> TransferPlan<'a> {
    pub fn for_application(application: &'a Application) -> Self {
        let source = application.sent_from_warehouse_id.as_ref();
        let destination = application.sent_to_warehouse_id.as_ref();
        let legs = Legs::select(source.is_some(), destination.is_some(), application.kind);

        Self {
            deduct_from: source.filter(|_| legs.deduct),
            deposit_to: destination.filter(|_| legs.deposit),
            payload: &application.payload,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.deduct_from.is_none() && self.deposit_to.is_none()
    }

    /// Applies both legs inside `tx`. The deduction runs first so a shortfall aborts before any
    /// deposit is written.
    pub fn apply(&self, tx: &StoreTransaction<'_>) -> TxResult<()> {
        let ledger = tx.ledger();
        if let Some(source) = self.deduct_from {
            ledger.deduct(source, self.payload)?;
        }
        if let Some(destination) = self.deposit_to {
            ledger.deposit(destination, self.payload)?;
        }
        Ok(())
    }
}
