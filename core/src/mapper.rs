//! Pod Mapper
//!
//! Fragments an order once per pod and seals fragment `i` to member `i`.
//!
//! ```text
//!            ┌──────────────┐
//!   order ──▶│ seed per pod │ (drawn in pod order from the caller RNG)
//!            └──────┬───────┘
//!        ┌──────────┼──────────┐
//!        ▼          ▼          ▼       rayon pool, one task per pod
//!   ┌─────────┐┌─────────┐┌─────────┐
//!   │ pod A   ││ pod B   ││ pod C   │  fragment(n, k) + encrypt × n
//!   └────┬────┘└────┬────┘└────┬────┘
//!        └──────────┼──────────┘
//!                   ▼
//!            MappingReport { mapping, failures, cancelled }
//! ```
//!
//! A pod either contributes all `n` fragments or nothing.

use std::collections::HashSet;

use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use tessera_order::{EncryptedFragment, Order, OrderError, encrypt_fragment, fragment};
use tessera_threshold::{Pod, PodId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MappingError {
    #[error("pod {0} has no members")]
    PodTooSmall(PodId),

    #[error("mapping pod {pod} failed: {cause}")]
    PodMappingFailed {
        pod: PodId,
        #[source]
        cause: OrderError,
    },

    #[error("pod {0} listed more than once")]
    DuplicatePod(PodId),

    #[error("mapping cancelled")]
    Cancelled,

    #[error("worker pool: {0}")]
    WorkerPool(String),
}

impl MappingError {
    /// Pod the error belongs to, if any
    pub fn pod(&self) -> Option<PodId> {
        match self {
            MappingError::PodTooSmall(pod)
            | MappingError::PodMappingFailed { pod, .. }
            | MappingError::DuplicatePod(pod) => Some(*pod),
            MappingError::Cancelled | MappingError::WorkerPool(_) => None,
        }
    }
}

/// Mapper configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapperOptions {
    /// Return the first pod failure instead of a partial mapping
    pub all_or_nothing: bool,
    /// Worker threads; 0 uses rayon's default (one per core)
    pub worker_threads: usize,
}

/// Encrypted fragments of one pod, in index order 1..=n
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodFragments {
    pub pod: PodId,
    pub fragments: Vec<EncryptedFragment>,
}

/// Pod id to encrypted fragments, in the pod order given to the mapper
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentMapping {
    entries: Vec<PodFragments>,
}

impl FragmentMapping {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, pod: &PodId) -> Option<&[EncryptedFragment]> {
        self.entries
            .iter()
            .find(|entry| entry.pod == *pod)
            .map(|entry| entry.fragments.as_slice())
    }

    pub fn pod_ids(&self) -> impl Iterator<Item = &PodId> {
        self.entries.iter().map(|entry| &entry.pod)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PodFragments> {
        self.entries.iter()
    }

    fn push(&mut self, entry: PodFragments) {
        self.entries.push(entry);
    }
}

/// Outcome of one mapping call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingReport {
    /// Pods that produced every fragment
    pub mapping: FragmentMapping,
    /// Pods that failed, in input order
    pub failures: Vec<MappingError>,
    /// Pods skipped because the call was cancelled before they started
    pub cancelled: Vec<PodId>,
}

enum PodOutcome {
    Mapped(PodFragments),
    Failed(MappingError),
    Cancelled(PodId),
}

pub struct PodMapper {
    options: MapperOptions,
    pool: rayon::ThreadPool,
}

impl PodMapper {
    pub fn new(options: MapperOptions) -> Result<Self, MappingError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.worker_threads)
            .thread_name(|i| format!("pod-mapper-{i}"))
            .build()
            .map_err(|e| MappingError::WorkerPool(e.to_string()))?;

        Ok(Self { options, pool })
    }

    pub fn options(&self) -> MapperOptions {
        self.options
    }

    /// Fragment and encrypt `order` for every pod.
    ///
    /// Each pod gets a 32-byte seed drawn from `rng` in input order before any
    /// work is dispatched, so the result is a function of the RNG state alone
    /// regardless of scheduling. `cancel` is checked as each pod starts.
    pub fn build_mapping<R: RngCore + CryptoRng>(
        &self,
        order: &Order,
        pods: &[Pod],
        rng: &mut R,
        cancel: &CancellationToken,
    ) -> Result<MappingReport, MappingError> {
        self.map_pods(order, pods, rng, cancel, |_| {})
    }

    /// `on_start` runs on the worker for each pod that passes the cancellation check
    fn map_pods<R, F>(
        &self,
        order: &Order,
        pods: &[Pod],
        rng: &mut R,
        cancel: &CancellationToken,
        on_start: F,
    ) -> Result<MappingReport, MappingError>
    where
        R: RngCore + CryptoRng,
        F: Fn(&Pod) + Sync,
    {
        let mut seen = HashSet::with_capacity(pods.len());
        for pod in pods {
            if !seen.insert(pod.id) {
                return Err(MappingError::DuplicatePod(pod.id));
            }
        }

        let seeds: Vec<[u8; 32]> = pods
            .iter()
            .map(|_| {
                let mut seed = [0u8; 32];
                rng.fill_bytes(&mut seed);
                seed
            })
            .collect();

        let outcomes: Vec<PodOutcome> = self.pool.install(|| {
            pods.par_iter()
                .zip(seeds.par_iter())
                .map(|(pod, seed)| {
                    if cancel.is_cancelled() {
                        return PodOutcome::Cancelled(pod.id);
                    }
                    on_start(pod);
                    match map_pod(order, pod, *seed) {
                        Ok(entry) => PodOutcome::Mapped(entry),
                        Err(e) => PodOutcome::Failed(e),
                    }
                })
                .collect()
        });

        let mut report = MappingReport::default();
        for outcome in outcomes {
            match outcome {
                PodOutcome::Mapped(entry) => report.mapping.push(entry),
                PodOutcome::Failed(e) => {
                    warn!(order = %order.id, error = %e, "pod mapping failed");
                    if self.options.all_or_nothing {
                        return Err(e);
                    }
                    report.failures.push(e);
                }
                PodOutcome::Cancelled(pod) => report.cancelled.push(pod),
            }
        }

        if !report.cancelled.is_empty() {
            info!(
                order = %order.id,
                cancelled = report.cancelled.len(),
                "mapping cancelled before all pods started"
            );
            if self.options.all_or_nothing {
                return Err(MappingError::Cancelled);
            }
        }

        debug!(
            order = %order.id,
            mapped = report.mapping.len(),
            failed = report.failures.len(),
            "order mapped to pods"
        );
        Ok(report)
    }
}

fn map_pod(order: &Order, pod: &Pod, seed: [u8; 32]) -> Result<PodFragments, MappingError> {
    let n = pod.size();
    if n == 0 {
        return Err(MappingError::PodTooSmall(pod.id));
    }
    let k = pod.threshold();

    let failed = |cause: OrderError| MappingError::PodMappingFailed { pod: pod.id, cause };

    let mut rng = ChaCha20Rng::from_seed(seed);
    let fragments = fragment(order, n, k, &mut rng).map_err(failed)?;

    let encrypted = fragments
        .iter()
        .zip(&pod.members)
        .map(|(fragment, member)| encrypt_fragment(fragment, &member.public_key, &mut rng))
        .collect::<Result<Vec<_>, _>>()
        .map_err(failed)?;

    debug!(pod = %pod.id, n, k, "pod fragments sealed");
    Ok(PodFragments {
        pod: pod.id,
        fragments: encrypted,
    })
}
