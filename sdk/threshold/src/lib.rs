//! Tessera Threshold
//!
//! Cryptographic building blocks for confidential order submission.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Order Fragment Flow                           │
//! │                                                                  │
//! │  1. Trader                  2. Per pod              3. Pod nodes │
//! │  ┌──────────┐              ┌──────────────┐        ┌──────────┐ │
//! │  │ Split to │──k-of-n────▶ │ Seal share i │──────▶ │ Open own │ │
//! │  │ shares   │  shares      │ to member i  │ submit │ share    │ │
//! │  └──────────┘              └──────────────┘        └──────────┘ │
//! │                                                                  │
//! │  • No single node learns an order field                          │
//! │  • Any k members of a pod can jointly reconstruct the order      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod encoding;
pub mod field;
pub mod pod;
pub mod sealed;
pub mod shares;

pub use field::{ELEMENT_BYTES, FieldElement, decode_element, encode_element, from_u64, to_u64};
pub use pod::{LocalPodMember, Pod, PodId, PodMember, reconstruction_threshold};
pub use sealed::{SEALED_OVERHEAD, SealError, open, seal};
pub use shares::{
    FieldShare, ShareIndex, ThresholdError, lagrange_coefficient, reconstruct, reconstruct_u64,
    split,
};
