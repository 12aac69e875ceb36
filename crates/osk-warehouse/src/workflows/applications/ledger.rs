use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sled::transaction::TransactionalTree;
use sled::Tree;

use super::domain::{ItemId, Payload, WarehouseId};
use crate::store::{abort, decode, encode, in_tx, Store, StoreError, TxResult};

/// Persisted `(warehouse, item) -> count` row. A missing row means zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StockRow {
    warehouse_id: WarehouseId,
    item_id: ItemId,
    count: u64,
}

/// One payload line that the warehouse cannot cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    pub item_id: ItemId,
    pub requested: u64,
    pub available: u64,
}

/// A deduction was refused because at least one line exceeds the stock on hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsufficientStock {
    pub warehouse_id: WarehouseId,
    pub shortfalls: Vec<Shortfall>,
}

impl fmt::Display for InsufficientStock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "insufficient stock in warehouse {}", self.warehouse_id)?;
        for (index, line) in self.shortfalls.iter().enumerate() {
            let separator = if index == 0 { ": " } else { ", " };
            write!(
                f,
                "{separator}{} (requested {}, available {})",
                line.item_id, line.requested, line.available
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for InsufficientStock {}

fn warehouse_prefix(warehouse: &WarehouseId) -> Vec<u8> {
    let raw = warehouse.as_str().as_bytes();
    let mut key = Vec::with_capacity(4 + raw.len());
    key.extend_from_slice(&(raw.len() as u32).to_be_bytes());
    key.extend_from_slice(raw);
    key
}

fn row_key(warehouse: &WarehouseId, item: &ItemId) -> Vec<u8> {
    let mut key = warehouse_prefix(warehouse);
    key.extend_from_slice(item.as_str().as_bytes());
    key
}

/// Read side of the stock ledger. Mutations only happen through [`LedgerTransaction`].
#[derive(Clone)]
pub struct StockLedger {
    tree: Tree,
}

impl StockLedger {
    pub fn new(store: &Store) -> Self {
        Self {
            tree: store.stock.clone(),
        }
    }

    pub fn balance(&self, warehouse: &WarehouseId, item: &ItemId) -> Result<u64, StoreError> {
        match self.tree.get(row_key(warehouse, item))? {
            Some(bytes) => Ok(decode::<StockRow>(&bytes)?.count),
            None => Ok(0),
        }
    }

    /// Every item with a positive count in `warehouse`.
    pub fn warehouse_stock(
        &self,
        warehouse: &WarehouseId,
    ) -> Result<BTreeMap<ItemId, u64>, StoreError> {
        let mut stock = BTreeMap::new();
        for entry in self.tree.scan_prefix(warehouse_prefix(warehouse)) {
            let (_, bytes) = entry?;
            let row: StockRow = decode(&bytes)?;
            if row.count > 0 {
                stock.insert(row.item_id, row.count);
            }
        }
        Ok(stock)
    }
}

/// Ledger mutations bound to a running store transaction.
pub struct LedgerTransaction<'a> {
    tree: &'a TransactionalTree,
}

impl<'a> LedgerTransaction<'a> {
    pub(crate) fn new(tree: &'a TransactionalTree) -> Self {
        Self { tree }
    }

    fn count(&self, key: &[u8]) -> TxResult<u64> {
        match self.tree.get(key)? {
            Some(bytes) => Ok(in_tx(decode::<StockRow>(&bytes))?.count),
            None => Ok(0),
        }
    }

    fn write(
        &self,
        key: Vec<u8>,
        warehouse: &WarehouseId,
        item: &ItemId,
        count: u64,
    ) -> TxResult<()> {
        let row = StockRow {
            warehouse_id: warehouse.clone(),
            item_id: item.clone(),
            count,
        };
        self.tree.insert(key, in_tx(encode(&row))?)?;
        Ok(())
    }

    /// Subtracts every line from `warehouse`, or nothing at all.
    ///
    /// All rows are read and checked before the first write. If any line exceeds the stock on
    /// hand the transaction aborts with [`StoreError::InsufficientStock`] listing every short
    /// line.
    pub fn deduct(&self, warehouse: &WarehouseId, items: &Payload) -> TxResult<()> {
        let mut updates = Vec::with_capacity(items.len());
        let mut shortfalls = Vec::new();

        for (item, requested) in items {
            let key = row_key(warehouse, item);
            let available = self.count(&key)?;
            match available.checked_sub(*requested) {
                Some(remaining) => updates.push((key, item, remaining)),
                None => shortfalls.push(Shortfall {
                    item_id: item.clone(),
                    requested: *requested,
                    available,
                }),
            }
        }

        if !shortfalls.is_empty() {
            return abort(StoreError::InsufficientStock(InsufficientStock {
                warehouse_id: warehouse.clone(),
                shortfalls,
            }));
        }

        for (key, item, remaining) in updates {
            self.write(key, warehouse, item, remaining)?;
        }
        Ok(())
    }

    /// Adds every line to `warehouse`. Missing rows count as zero and are created.
    pub fn deposit(&self, warehouse: &WarehouseId, items: &Payload) -> TxResult<()> {
        for (item, added) in items {
            let key = row_key(warehouse, item);
            let current = self.count(&key)?;
            let Some(total) = current.checked_add(*added) else {
                return abort(StoreError::QuantityOverflow {
                    warehouse: warehouse.clone(),
                    item: item.clone(),
                });
            };
            self.write(key, warehouse, item, total)?;
        }
        Ok(())
    }
}
