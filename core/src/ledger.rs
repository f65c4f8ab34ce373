//! Local Order Ledger
//!
//! Index of the trader's previously submitted orders, kept in an injected
//! key/value store:
//!
//! ```text
//! "ORDERS"          -> JSON list of order ids (the index)
//! "ORDER" || id     -> JSON order body
//! ```
//!
//! A body is always written before its id enters the index, and the index is
//! updated after the body is deleted, so the index never names a body that
//! was not written. Index entries whose body is missing are skipped on read.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tessera_order::{Order, OrderId, Token};
use thiserror::Error;
use tracing::{debug, warn};

use crate::storage::KvStore;

const INDEX_KEY: &[u8] = b"ORDERS";
const ORDER_PREFIX: &[u8] = b"ORDER";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("store read failed: {0}")]
    StoreReadFailed(String),

    #[error("store write failed: {0}")]
    StoreWriteFailed(String),

    #[error("corrupt ledger entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("locked balance for token {0} overflows")]
    BalanceOverflow(Token),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

fn order_key(id: &OrderId) -> Vec<u8> {
    let mut key = Vec::with_capacity(ORDER_PREFIX.len() + id.0.len());
    key.extend_from_slice(ORDER_PREFIX);
    key.extend_from_slice(&id.0);
    key
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Guarded data is `()`, so a poisoned lock carries no broken state
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct OrderLedger<S: KvStore> {
    store: S,
    index_lock: Mutex<()>,
    order_locks: DashMap<OrderId, Arc<Mutex<()>>>,
}

impl<S: KvStore> OrderLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            index_lock: Mutex::new(()),
            order_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record a submitted order. Re-appending an indexed id rewrites its body.
    pub fn append(&self, order: &Order) -> Result<()> {
        self.with_order_lock(&order.id, || {
            let body = serde_json::to_vec(order)
                .map_err(|e| LedgerError::StoreWriteFailed(format!("encode order: {e}")))?;
            self.store
                .put(&order_key(&order.id), &body)
                .map_err(|e| LedgerError::StoreWriteFailed(format!("{e:#}")))?;

            let _index_guard = lock(&self.index_lock);
            let mut index = self.read_index()?;
            if !index.contains(&order.id) {
                index.push(order.id);
                self.write_index(&index)?;
            }
            Ok(())
        })?;

        debug!(order = %order.id, "order recorded in ledger");
        Ok(())
    }

    /// Forget an order. Unknown ids are a no-op.
    pub fn remove(&self, id: &OrderId) -> Result<()> {
        let removed = self.with_order_lock(id, || {
            self.store
                .delete(&order_key(id))
                .map_err(|e| LedgerError::StoreWriteFailed(format!("{e:#}")))?;

            let _index_guard = lock(&self.index_lock);
            let mut index = self.read_index()?;
            let before = index.len();
            index.retain(|indexed| indexed != id);
            let removed = index.len() != before;
            if removed {
                self.write_index(&index)?;
            }
            Ok(removed)
        })?;

        if removed {
            debug!(order = %id, "order removed from ledger");
        }
        Ok(())
    }

    pub fn get(&self, id: &OrderId) -> Result<Option<Order>> {
        let key = order_key(id);
        let Some(body) = self
            .store
            .get(&key)
            .map_err(|e| LedgerError::StoreReadFailed(format!("{e:#}")))?
        else {
            return Ok(None);
        };

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| LedgerError::CorruptEntry {
                key: format!("ORDER{id}"),
                reason: e.to_string(),
            })
    }

    /// Every indexed order, in submission order
    pub fn orders(&self) -> Result<Vec<Order>> {
        let index = {
            let _index_guard = lock(&self.index_lock);
            self.read_index()?
        };

        let mut orders = Vec::with_capacity(index.len());
        for id in &index {
            match self.get(id)? {
                Some(order) => orders.push(order),
                None => warn!(order = %id, "indexed order has no body, skipping"),
            }
        }
        Ok(orders)
    }

    /// Indexed orders whose locked token is `token`
    pub fn orders_for_token(&self, token: Token) -> Result<Vec<Order>> {
        Ok(self
            .orders()?
            .into_iter()
            .filter(|order| order.locked_token() == token)
            .collect())
    }

    /// Sum of `volume` over the orders locking `token`
    pub fn locked_balance(&self, token: Token) -> Result<u128> {
        self.orders_for_token(token)?
            .iter()
            .try_fold(0u128, |total, order| {
                order
                    .volume
                    .value()
                    .and_then(|volume| total.checked_add(volume))
                    .ok_or(LedgerError::BalanceOverflow(token))
            })
    }

    pub fn has_open_orders(&self, token: Token) -> Result<bool> {
        Ok(!self.orders_for_token(token)?.is_empty())
    }

    /// Run `f` holding the per-id lock. The lock entry is released on every
    /// exit path, including errors.
    fn with_order_lock<T>(&self, id: &OrderId, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let order_lock = self.order_locks.entry(*id).or_default().clone();
        let result = {
            let _order_guard = lock(&order_lock);
            f()
        };

        drop(order_lock);
        self.order_locks
            .remove_if(id, |_, held| Arc::strong_count(held) == 1);
        result
    }

    fn read_index(&self) -> Result<Vec<OrderId>> {
        match self
            .store
            .get(INDEX_KEY)
            .map_err(|e| LedgerError::StoreReadFailed(format!("{e:#}")))?
        {
            Some(raw) => serde_json::from_slice(&raw).map_err(|e| LedgerError::CorruptEntry {
                key: "ORDERS".into(),
                reason: e.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }

    fn write_index(&self, index: &[OrderId]) -> Result<()> {
        let raw = serde_json::to_vec(index)
            .map_err(|e| LedgerError::StoreWriteFailed(format!("encode index: {e}")))?;
        self.store
            .put(INDEX_KEY, &raw)
            .map_err(|e| LedgerError::StoreWriteFailed(format!("{e:#}")))
    }
}
