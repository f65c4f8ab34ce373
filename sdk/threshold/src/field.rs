//! Prime field used for order secret sharing.
//!
//! Shares live in the BN254 scalar field. Its modulus (about 2^254) is far
//! above `u64::MAX`, so every confidential order value embeds without
//! wrap-around and converts back only when it still fits.

use ark_ff::{BigInt, PrimeField};

/// An element of the sharing field
pub type FieldElement = ark_bn254::Fr;

/// Canonical byte length of an encoded field element
pub const ELEMENT_BYTES: usize = 32;

/// Embed a `u64` into the field
pub fn from_u64(value: u64) -> FieldElement {
    FieldElement::from(value)
}

/// Convert back to `u64`, or `None` if the element does not fit
pub fn to_u64(element: &FieldElement) -> Option<u64> {
    let limbs = element.into_bigint().0;
    if limbs[1..].iter().all(|limb| *limb == 0) {
        Some(limbs[0])
    } else {
        None
    }
}

/// Little-endian canonical encoding
pub fn encode_element(element: &FieldElement) -> [u8; ELEMENT_BYTES] {
    let limbs = element.into_bigint().0;
    let mut out = [0u8; ELEMENT_BYTES];
    for (chunk, limb) in out.chunks_exact_mut(8).zip(limbs.iter()) {
        chunk.copy_from_slice(&limb.to_le_bytes());
    }
    out
}

/// Decode a canonical encoding. Values at or above the modulus are rejected.
pub fn decode_element(bytes: &[u8]) -> Option<FieldElement> {
    if bytes.len() != ELEMENT_BYTES {
        return None;
    }
    let mut limbs = [0u64; 4];
    for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut word = [0u8; 8];
        word.copy_from_slice(chunk);
        *limb = u64::from_le_bytes(word);
    }
    FieldElement::from_bigint(BigInt::new(limbs))
}
