//! Trader workflow
//!
//! Ties the pieces together for one trader:
//!
//! 1. check the order's locked token has enough unlocked balance
//! 2. snapshot the pod directory and map the order onto every pod
//! 3. build the payload and hand it to the ingress
//! 4. record the order in the ledger once the ingress accepts it
//!
//! Steps 1 to 4 run under a per-token reservation, so concurrent orders on
//! the same locked token are checked against each other's volume. Ledger
//! calls made from async methods run on the blocking pool.

use std::sync::Arc;

use dashmap::DashMap;
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tessera_order::{Order, OrderId, Token};
use tessera_threshold::PodId;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::directory::{DirectoryError, PodDirectory};
use crate::ingress::{IngressError, OrderIngress};
use crate::ledger::{LedgerError, OrderLedger};
use crate::mapper::{MappingError, MappingReport, PodMapper};
use crate::storage::KvStore;
use crate::submission::{self, SubmissionError, SubmissionPayload};

#[derive(Debug, Error)]
pub enum TraderError {
    #[error(
        "insufficient balance for token {token}: available {available}, locked {locked}, required {required}"
    )]
    InsufficientBalance {
        token: Token,
        available: u128,
        locked: u128,
        required: u128,
    },

    #[error("order volume overflows")]
    VolumeOverflow,

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Ingress(#[from] IngressError),

    #[error("mapping worker stopped: {0}")]
    Worker(String),
}

/// A payload ready for the ingress, with the per-pod outcome behind it
#[derive(Debug, Clone)]
pub struct PreparedOrder {
    pub order: Order,
    pub payload: SubmissionPayload,
    pub report: MappingReport,
}

/// Result of a successful submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedOrder {
    pub order_id: OrderId,
    pub pods: Vec<PodId>,
    pub failed_pods: Vec<MappingError>,
    pub cancelled_pods: Vec<PodId>,
}

pub struct Trader<S: KvStore, D: PodDirectory, I: OrderIngress> {
    ledger: Arc<OrderLedger<S>>,
    directory: D,
    mapper: Arc<PodMapper>,
    ingress: I,
    reservations: DashMap<Token, Arc<Mutex<()>>>,
}

impl<S: KvStore + 'static, D: PodDirectory, I: OrderIngress> Trader<S, D, I> {
    pub fn new(ledger: OrderLedger<S>, directory: D, mapper: PodMapper, ingress: I) -> Self {
        Self {
            ledger: Arc::new(ledger),
            directory,
            mapper: Arc::new(mapper),
            ingress,
            reservations: DashMap::new(),
        }
    }

    pub fn ledger(&self) -> &OrderLedger<S> {
        &self.ledger
    }

    pub fn ingress(&self) -> &I {
        &self.ingress
    }

    /// Fail unless `available` covers the ledger's locked amount plus `order`.
    ///
    /// Reads the store on the calling thread.
    pub fn check_balance(&self, order: &Order, available: u128) -> Result<(), TraderError> {
        ensure_balance(&*self.ledger, order, available)
    }

    /// Map the order onto the current pods and build its payload.
    ///
    /// Mapping runs on a blocking thread; the caller's RNG only supplies the
    /// seed for it.
    pub async fn prepare<R: RngCore + CryptoRng>(
        &self,
        order: &Order,
        signature: &str,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<PreparedOrder, TraderError> {
        let pods = self.directory.pods()?;

        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);

        let mapper = Arc::clone(&self.mapper);
        let cancel = cancel.clone();
        let order = *order;
        let report = tokio::task::spawn_blocking(move || {
            let mut rng = ChaCha20Rng::from_seed(seed);
            mapper.build_mapping(&order, &pods, &mut rng, &cancel)
        })
        .await
        .map_err(|e| TraderError::Worker(e.to_string()))??;

        for failure in &report.failures {
            warn!(order = %order.id, error = %failure, "pod left out of submission");
        }

        let payload = submission::build(&order, signature, &report.mapping)?;
        Ok(PreparedOrder {
            order,
            payload,
            report,
        })
    }

    /// Check balance, map, submit and record an order
    pub async fn open_order<R: RngCore + CryptoRng>(
        &self,
        order: &Order,
        signature: &str,
        available: u128,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<OpenedOrder, TraderError> {
        let token = order.locked_token();
        let reservation = self.reservations.entry(token).or_default().clone();
        let result = {
            let _reserved = reservation.lock().await;
            self.open_reserved(order, signature, available, rng, cancel)
                .await
        };

        drop(reservation);
        self.reservations
            .remove_if(&token, |_, held| Arc::strong_count(held) == 1);
        let prepared = result?;

        info!(
            order = %order.id,
            pods = prepared.report.mapping.len(),
            "order opened"
        );
        Ok(OpenedOrder {
            order_id: order.id,
            pods: prepared.report.mapping.pod_ids().copied().collect(),
            failed_pods: prepared.report.failures,
            cancelled_pods: prepared.report.cancelled,
        })
    }

    async fn open_reserved<R: RngCore + CryptoRng>(
        &self,
        order: &Order,
        signature: &str,
        available: u128,
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<PreparedOrder, TraderError> {
        let checked = *order;
        self.with_ledger(move |ledger| ensure_balance(ledger, &checked, available))
            .await?;

        let prepared = self.prepare(order, signature, rng, cancel).await?;
        self.ingress.submit(&prepared.payload).await?;

        let recorded = *order;
        self.with_ledger(move |ledger| Ok(ledger.append(&recorded)?))
            .await?;
        Ok(prepared)
    }

    /// Cancel at the ingress, then drop the order from the ledger
    pub async fn cancel_order(&self, order_id: &OrderId, signature: &str) -> Result<(), TraderError> {
        self.ingress.cancel(order_id, signature).await?;

        let id = *order_id;
        self.with_ledger(move |ledger| Ok(ledger.remove(&id)?))
            .await?;
        info!(order = %order_id, "order cancelled");
        Ok(())
    }

    /// Withdrawals of `token` are only allowed with no open order locking it
    pub fn can_withdraw(&self, token: Token) -> Result<bool, TraderError> {
        Ok(!self.ledger.has_open_orders(token)?)
    }

    async fn with_ledger<T, F>(&self, f: F) -> Result<T, TraderError>
    where
        T: Send + 'static,
        F: FnOnce(&OrderLedger<S>) -> Result<T, TraderError> + Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || f(&*ledger))
            .await
            .map_err(|e| TraderError::Worker(e.to_string()))?
    }
}

fn ensure_balance<S: KvStore>(
    ledger: &OrderLedger<S>,
    order: &Order,
    available: u128,
) -> Result<(), TraderError> {
    let token = order.locked_token();
    let locked = ledger.locked_balance(token)?;
    let required = order.volume.value().ok_or(TraderError::VolumeOverflow)?;

    let enough = locked
        .checked_add(required)
        .is_some_and(|total| total <= available);
    if !enough {
        return Err(TraderError::InsufficientBalance {
            token,
            available,
            locked,
            required,
        });
    }
    Ok(())
}
