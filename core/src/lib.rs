//! Tessera Core
//!
//! Trader-side distribution of confidential orders:
//!
//! - [`mapper`] fragments an order for every pod and seals each fragment
//! - [`submission`] turns the mapping into the ingress payload
//! - [`ledger`] tracks submitted orders for balance locking
//! - [`trader`] runs the whole flow against a directory and an ingress

pub mod directory;
pub mod ingress;
pub mod ledger;
pub mod mapper;
pub mod storage;
pub mod submission;
pub mod trader;

pub use directory::{DirectoryError, FilePodDirectory, PodDirectory, StaticPodDirectory};
pub use ingress::{IngressClient, IngressError, OrderIngress};
pub use ledger::{LedgerError, OrderLedger};
pub use mapper::{FragmentMapping, MapperOptions, MappingError, MappingReport, PodMapper};
pub use storage::{KvStore, MemoryStore};
#[cfg(feature = "rocksdb")]
pub use storage::RocksDbStore;
pub use submission::{SubmissionError, SubmissionPayload, WireFragment};
pub use trader::{OpenedOrder, PreparedOrder, Trader, TraderError};
