//! Shamir Secret Sharing over the BN254 scalar field
//!
//! Splits a field element into `n` shares such that any `k` reconstruct it
//! and `k - 1` reveal nothing.

use std::collections::HashSet;

use ark_ff::{Field, UniformRand};
use ark_std::{One, Zero};
use rand::{CryptoRng, RngCore};
use thiserror::Error;

use crate::field::{FieldElement, to_u64};

/// A share index (1-indexed, never zero)
pub type ShareIndex = u32;

/// One share of one secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldShare {
    /// Evaluation point (1 to N)
    pub index: ShareIndex,
    /// Polynomial value at `index`
    pub value: FieldElement,
}

impl FieldShare {
    pub fn new(index: ShareIndex, value: FieldElement) -> Self {
        Self { index, value }
    }
}

/// Secret sharing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("insufficient shares: got {got}, need {need}")]
    InsufficientShares { got: usize, need: usize },

    #[error("invalid threshold: k={k}, n={n}")]
    InvalidThreshold { k: u32, n: u32 },

    #[error("duplicate share index: {0}")]
    DuplicateIndex(ShareIndex),

    #[error("invalid share index: {0} (must be non-zero)")]
    InvalidIndex(ShareIndex),

    #[error("invalid share encoding")]
    InvalidShare,

    #[error("reconstructed value does not fit in 64 bits")]
    ValueOutOfRange,
}

/// Split `secret` into `n` shares, any `k` of which reconstruct it.
///
/// The polynomial `f(x) = secret + a_1 x + ... + a_{k-1} x^{k-1}` has
/// coefficients drawn from `rng` and is evaluated at `x = 1..=n`.
pub fn split<R: RngCore + CryptoRng>(
    secret: FieldElement,
    n: u32,
    k: u32,
    rng: &mut R,
) -> Result<Vec<FieldShare>, ThresholdError> {
    if n == 0 || k == 0 || k > n {
        return Err(ThresholdError::InvalidThreshold { k, n });
    }

    let mut coefficients = Vec::with_capacity(k as usize);
    coefficients.push(secret);
    for _ in 1..k {
        coefficients.push(FieldElement::rand(rng));
    }

    let shares = (1..=n)
        .map(|index| {
            let x = FieldElement::from(u64::from(index));
            FieldShare::new(index, evaluate_polynomial(&coefficients, x))
        })
        .collect();

    Ok(shares)
}

/// Reconstruct the secret from at least `k` shares with distinct indices.
///
/// Only the first `k` shares are interpolated; any `k` points determine a
/// polynomial of degree `k - 1`.
pub fn reconstruct(shares: &[FieldShare], k: u32) -> Result<FieldElement, ThresholdError> {
    if k == 0 {
        return Err(ThresholdError::InvalidThreshold {
            k,
            n: shares.len() as u32,
        });
    }

    let mut seen = HashSet::with_capacity(shares.len());
    for share in shares {
        if share.index == 0 {
            return Err(ThresholdError::InvalidIndex(share.index));
        }
        if !seen.insert(share.index) {
            return Err(ThresholdError::DuplicateIndex(share.index));
        }
    }

    let need = k as usize;
    if shares.len() < need {
        return Err(ThresholdError::InsufficientShares {
            got: shares.len(),
            need,
        });
    }

    let subset = &shares[..need];
    let x_coords: Vec<FieldElement> = subset
        .iter()
        .map(|s| FieldElement::from(u64::from(s.index)))
        .collect();

    let mut secret = FieldElement::zero();
    for (i, share) in subset.iter().enumerate() {
        secret += share.value * lagrange_coefficient(&x_coords, i)?;
    }
    Ok(secret)
}

/// Reconstruct a secret that was embedded from a `u64`
pub fn reconstruct_u64(shares: &[FieldShare], k: u32) -> Result<u64, ThresholdError> {
    let secret = reconstruct(shares, k)?;
    to_u64(&secret).ok_or(ThresholdError::ValueOutOfRange)
}

/// Lagrange coefficient λ_i(0) = Π_{j≠i} x_j / (x_j - x_i)
pub fn lagrange_coefficient(
    x_coords: &[FieldElement],
    i: usize,
) -> Result<FieldElement, ThresholdError> {
    let mut numerator = FieldElement::one();
    let mut denominator = FieldElement::one();

    for (j, x_j) in x_coords.iter().enumerate() {
        if i != j {
            numerator *= x_j;
            denominator *= *x_j - x_coords[i];
        }
    }

    // Zero only when two evaluation points coincide
    let inverse = denominator.inverse().ok_or(ThresholdError::InvalidShare)?;
    Ok(numerator * inverse)
}

/// Horner evaluation, coefficients in ascending degree
fn evaluate_polynomial(coefficients: &[FieldElement], x: FieldElement) -> FieldElement {
    coefficients
        .iter()
        .rev()
        .fold(FieldElement::zero(), |acc, coeff| acc * x + coeff)
}
