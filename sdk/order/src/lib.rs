//! Tessera Order
//!
//! Order model plus the trader-side split of an order into threshold
//! fragments and the sealing of each fragment to its pod member.

pub mod encrypt;
pub mod error;
pub mod fragment;
pub mod order;

pub use encrypt::{
    EncryptedCoExp, EncryptedFragment, FragmentId, decrypt_fragment, encrypt_fragment,
};
pub use error::{OrderError, Result};
pub use fragment::{
    CoExpShare, ConfidentialField, ConfidentialShares, OrderFragment, combine_fragments, fragment,
};
pub use order::{
    CoExp, CoExpRequest, MAX_EXPONENT, Order, OrderId, OrderParams, OrderRequest, OrderType,
    Parity, Token, TokenPair,
};
