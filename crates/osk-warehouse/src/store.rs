//! Durable transactional storage for applications and stock.
//!
//! A single [`Store`] owns the sled database and its trees. Process bootstrap opens it and hands
//! it to the workflow; nothing else holds a global handle. Writes that must land together go
//! through [`Store::transaction`], which sled executes as one serializable unit across all trees.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Transactional, Tree};

use crate::workflows::applications::domain::{ApplicationStatus, ItemId, WarehouseId};
use crate::workflows::applications::ledger::{InsufficientStock, LedgerTransaction};
use crate::workflows::applications::repository::ApplicationTransaction;

const APPLICATIONS_TREE: &str = "applications";
const CREATED_INDEX_TREE: &str = "applications_by_created";
const STOCK_TREE: &str = "stock";

/// Result type used inside a store transaction closure.
pub type TxResult<T> = Result<T, ConflictableTransactionError<StoreError>>;

/// Where the sled database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    /// Use a scratch database that is removed on drop; `data_dir` is ignored.
    pub temporary: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("status is {found}, expected {expected}")]
    StatusMismatch {
        expected: ApplicationStatus,
        found: ApplicationStatus,
    },
    #[error("idempotency token already used for a different application")]
    TokenReused,
    #[error(transparent)]
    InsufficientStock(#[from] InsufficientStock),
    #[error("stock of item {item} in warehouse {warehouse} would overflow")]
    QuantityOverflow { warehouse: WarehouseId, item: ItemId },
    #[error("storage engine failure: {0}")]
    Engine(#[from] sled::Error),
    #[error("corrupt record: {0}")]
    Codec(#[from] serde_json::Error),
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(value: TransactionError<StoreError>) -> Self {
        match value {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => StoreError::Engine(err),
        }
    }
}

/// Shared handle to the sled database. Cloning is cheap; all clones see the same data.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    pub(crate) applications: Tree,
    pub(crate) created_index: Tree,
    pub(crate) stock: Tree,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("applications", &self.applications.len())
            .field("stock_rows", &self.stock.len())
            .finish()
    }
}

impl Store {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        if config.temporary {
            return Self::temporary();
        }
        let db = sled::Config::new().path(&config.data_dir).open()?;
        Self::from_db(db)
    }

    /// Scratch database removed on drop.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let applications = db.open_tree(APPLICATIONS_TREE)?;
        let created_index = db.open_tree(CREATED_INDEX_TREE)?;
        let stock = db.open_tree(STOCK_TREE)?;
        Ok(Self {
            db,
            applications,
            created_index,
            stock,
        })
    }

    /// Monotonic counter backing application serial numbers.
    pub fn next_serial(&self) -> Result<u64, StoreError> {
        Ok(self.db.generate_id()?)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    /// Runs `f` atomically across every tree.
    ///
    /// sled may invoke `f` more than once when it detects a conflicting concurrent transaction,
    /// so `f` must not have side effects outside the transaction. Returning an abort from `f`
    /// discards every write it made.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: Fn(&StoreTransaction<'_>) -> TxResult<T>,
    {
        let result = (&self.applications, &self.created_index, &self.stock).transaction(
            |(applications, created_index, stock)| {
                let tx = StoreTransaction {
                    applications,
                    created_index,
                    stock,
                };
                f(&tx)
            },
        );
        result.map_err(StoreError::from)
    }
}

/// View over the trees inside one running transaction.
pub struct StoreTransaction<'a> {
    applications: &'a TransactionalTree,
    created_index: &'a TransactionalTree,
    stock: &'a TransactionalTree,
}

impl<'a> StoreTransaction<'a> {
    pub fn applications(&self) -> ApplicationTransaction<'a> {
        ApplicationTransaction::new(self.applications, self.created_index)
    }

    pub fn ledger(&self) -> LedgerTransaction<'a> {
        LedgerTransaction::new(self.stock)
    }
}

/// Aborts the surrounding transaction with `err`.
pub(crate) fn abort<T>(err: StoreError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(serde_json::to_vec(value)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Lifts a plain store error into an aborting transaction error.
pub(crate) fn in_tx<T>(result: Result<T, StoreError>) -> TxResult<T> {
    result.map_err(ConflictableTransactionError::Abort)
}
