//! Order fragmentation.
//!
//! Every confidential field of an order is split independently: each field
//! gets its own polynomial drawn from a child RNG seeded fresh from the
//! caller's RNG, so shares of one field carry no randomness of another.

use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use tessera_threshold::{FieldShare, ShareIndex, from_u64, reconstruct_u64, split};

use crate::error::{OrderError, Result};
use crate::order::{CoExp, Order, OrderId, OrderParams, OrderType, Parity, TokenPair};

/// The secret-shared fields of an order, in sharing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfidentialField {
    Tokens,
    PriceCo,
    PriceExp,
    VolumeCo,
    VolumeExp,
    MinimumVolumeCo,
    MinimumVolumeExp,
    Nonce,
}

impl ConfidentialField {
    pub const ALL: [ConfidentialField; 8] = [
        ConfidentialField::Tokens,
        ConfidentialField::PriceCo,
        ConfidentialField::PriceExp,
        ConfidentialField::VolumeCo,
        ConfidentialField::VolumeExp,
        ConfidentialField::MinimumVolumeCo,
        ConfidentialField::MinimumVolumeExp,
        ConfidentialField::Nonce,
    ];

    /// Stable label, used as associated data when sealing
    pub fn label(self) -> &'static str {
        match self {
            ConfidentialField::Tokens => "tokens",
            ConfidentialField::PriceCo => "price.co",
            ConfidentialField::PriceExp => "price.exp",
            ConfidentialField::VolumeCo => "volume.co",
            ConfidentialField::VolumeExp => "volume.exp",
            ConfidentialField::MinimumVolumeCo => "minimumVolume.co",
            ConfidentialField::MinimumVolumeExp => "minimumVolume.exp",
            ConfidentialField::Nonce => "nonce",
        }
    }

    fn value_of(self, order: &Order) -> u64 {
        match self {
            ConfidentialField::Tokens => order.tokens.encode(),
            ConfidentialField::PriceCo => order.price.co,
            ConfidentialField::PriceExp => order.price.exp,
            ConfidentialField::VolumeCo => order.volume.co,
            ConfidentialField::VolumeExp => order.volume.exp,
            ConfidentialField::MinimumVolumeCo => order.minimum_volume.co,
            ConfidentialField::MinimumVolumeExp => order.minimum_volume.exp,
            ConfidentialField::Nonce => order.nonce,
        }
    }
}

/// Shares of a coefficient/exponent pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoExpShare {
    pub co: FieldShare,
    pub exp: FieldShare,
}

/// One share per confidential field, all at the same index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidentialShares {
    pub tokens: FieldShare,
    pub price: CoExpShare,
    pub volume: CoExpShare,
    pub minimum_volume: CoExpShare,
    pub nonce: FieldShare,
}

impl ConfidentialShares {
    pub fn get(&self, field: ConfidentialField) -> &FieldShare {
        match field {
            ConfidentialField::Tokens => &self.tokens,
            ConfidentialField::PriceCo => &self.price.co,
            ConfidentialField::PriceExp => &self.price.exp,
            ConfidentialField::VolumeCo => &self.volume.co,
            ConfidentialField::VolumeExp => &self.volume.exp,
            ConfidentialField::MinimumVolumeCo => &self.minimum_volume.co,
            ConfidentialField::MinimumVolumeExp => &self.minimum_volume.exp,
            ConfidentialField::Nonce => &self.nonce,
        }
    }

    /// Build from a per-field constructor
    pub fn try_from_fn<F>(mut share_for: F) -> Result<Self>
    where
        F: FnMut(ConfidentialField) -> Result<FieldShare>,
    {
        Ok(Self {
            tokens: share_for(ConfidentialField::Tokens)?,
            price: CoExpShare {
                co: share_for(ConfidentialField::PriceCo)?,
                exp: share_for(ConfidentialField::PriceExp)?,
            },
            volume: CoExpShare {
                co: share_for(ConfidentialField::VolumeCo)?,
                exp: share_for(ConfidentialField::VolumeExp)?,
            },
            minimum_volume: CoExpShare {
                co: share_for(ConfidentialField::MinimumVolumeCo)?,
                exp: share_for(ConfidentialField::MinimumVolumeExp)?,
            },
            nonce: share_for(ConfidentialField::Nonce)?,
        })
    }
}

/// The part of an order destined for one pod member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFragment {
    /// Recipient index (1 to N)
    pub index: ShareIndex,
    pub order_id: OrderId,
    pub parity: Parity,
    pub order_type: OrderType,
    pub settlement: u64,
    pub expiry: u64,
    pub shares: ConfidentialShares,
}

/// Split `order` into `n` fragments, any `k` of which reassemble it.
///
/// Fragments are returned in index order `1..=n`. The output is a pure
/// function of the order and the RNG state.
pub fn fragment<R: RngCore + CryptoRng>(
    order: &Order,
    n: u32,
    k: u32,
    rng: &mut R,
) -> Result<Vec<OrderFragment>> {
    order.validate()?;

    let mut per_field: Vec<Vec<FieldShare>> = Vec::with_capacity(ConfidentialField::ALL.len());
    for field in ConfidentialField::ALL {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        let mut field_rng = ChaCha20Rng::from_seed(seed);
        per_field.push(split(from_u64(field.value_of(order)), n, k, &mut field_rng)?);
    }

    (0..n as usize)
        .map(|i| {
            let shares = ConfidentialShares::try_from_fn(|field| Ok(per_field[field as usize][i]))?;
            Ok(OrderFragment {
                index: shares.tokens.index,
                order_id: order.id,
                parity: order.parity,
                order_type: order.order_type,
                settlement: order.settlement,
                expiry: order.expiry,
                shares,
            })
        })
        .collect()
}

/// Reassemble an order from at least `k` fragments.
///
/// Fragments must agree on their cleartext metadata, and the rebuilt order
/// must hash to the id they carry.
pub fn combine_fragments(fragments: &[OrderFragment], k: u32) -> Result<Order> {
    let first = fragments
        .first()
        .ok_or_else(|| OrderError::Reassembly("no fragments".into()))?;

    for fragment in &fragments[1..] {
        if fragment.order_id != first.order_id
            || fragment.parity != first.parity
            || fragment.order_type != first.order_type
            || fragment.settlement != first.settlement
            || fragment.expiry != first.expiry
        {
            return Err(OrderError::Reassembly(format!(
                "fragment {} does not belong to order {}",
                fragment.index, first.order_id
            )));
        }
    }

    let value = |field: ConfidentialField| -> Result<u64> {
        let shares: Vec<FieldShare> = fragments.iter().map(|f| *f.shares.get(field)).collect();
        Ok(reconstruct_u64(&shares, k)?)
    };

    let order = Order::new(OrderParams {
        parity: first.parity,
        order_type: first.order_type,
        settlement: first.settlement,
        expiry: first.expiry,
        tokens: TokenPair::decode(value(ConfidentialField::Tokens)?),
        price: CoExp::new(
            value(ConfidentialField::PriceCo)?,
            value(ConfidentialField::PriceExp)?,
        ),
        volume: CoExp::new(
            value(ConfidentialField::VolumeCo)?,
            value(ConfidentialField::VolumeExp)?,
        ),
        minimum_volume: CoExp::new(
            value(ConfidentialField::MinimumVolumeCo)?,
            value(ConfidentialField::MinimumVolumeExp)?,
        ),
        nonce: value(ConfidentialField::Nonce)?,
    });

    if order.id != first.order_id {
        return Err(OrderError::Reassembly(format!(
            "reassembled order hashes to {}, expected {}",
            order.id, first.order_id
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_threshold::{ThresholdError, reconstruct};

    fn order() -> Order {
        Order::new(OrderParams {
            parity: Parity::Buy,
            order_type: OrderType::Limit,
            settlement: 1,
            expiry: 1_700_000_000,
            tokens: TokenPair::new(1, 256),
            // Same coefficient in price and volume on purpose
            price: CoExp::new(100, 2),
            volume: CoExp::new(100, 0),
            minimum_volume: CoExp::new(10, 0),
            nonce: 0xdead_beef,
        })
    }

    #[test]
    fn test_fragment_count_and_indices() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        for n in 1..=12u32 {
            for k in 1..=n {
                let fragments = fragment(&order(), n, k, &mut rng).unwrap();
                assert_eq!(fragments.len(), n as usize);
                for (i, f) in fragments.iter().enumerate() {
                    assert_eq!(f.index, i as u32 + 1);
                    for field in ConfidentialField::ALL {
                        assert_eq!(f.shares.get(field).index, f.index);
                    }
                    assert_eq!(f.order_id, order().id);
                }
            }
        }
    }

    #[test]
    fn test_any_k_fragments_reassemble() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let fragments = fragment(&order(), 7, 6, &mut rng).unwrap();

        for skip in 0..7 {
            let subset: Vec<OrderFragment> = fragments
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, f)| *f)
                .collect();
            assert_eq!(combine_fragments(&subset, 6).unwrap(), order());
        }
    }

    #[test]
    fn test_too_few_fragments_fail() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let fragments = fragment(&order(), 4, 4, &mut rng).unwrap();
        assert!(matches!(
            combine_fragments(&fragments[..3], 4),
            Err(OrderError::Threshold(ThresholdError::InsufficientShares { got: 3, need: 4 }))
        ));
    }

    #[test]
    fn test_fields_use_independent_polynomials() {
        // price.co and volume.co are both 100; a shared polynomial would give
        // identical shares at every index
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let fragments = fragment(&order(), 5, 3, &mut rng).unwrap();
        for f in &fragments {
            assert_ne!(f.shares.price.co.value, f.shares.volume.co.value);
        }

        // Mixing shares of two fields reconstructs neither value
        let mixed = [
            fragments[0].shares.price.co,
            fragments[1].shares.volume.co,
            fragments[2].shares.price.co,
        ];
        let guess = reconstruct(&mixed, 3).unwrap();
        assert_ne!(guess, from_u64(100));
        assert_ne!(guess, from_u64(0));
    }

    #[test]
    fn test_same_seed_same_fragments() {
        let a = fragment(&order(), 4, 3, &mut ChaCha20Rng::seed_from_u64(9)).unwrap();
        let b = fragment(&order(), 4, 3, &mut ChaCha20Rng::seed_from_u64(9)).unwrap();
        let c = fragment(&order(), 4, 3, &mut ChaCha20Rng::seed_from_u64(10)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_malformed_order_rejected() {
        let mut bad = order();
        bad.nonce += 1;
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        assert!(matches!(
            fragment(&bad, 4, 4, &mut rng),
            Err(OrderError::MalformedOrder(_))
        ));
    }

    #[test]
    fn test_invalid_threshold_propagates() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        assert_eq!(
            fragment(&order(), 1, 2, &mut rng),
            Err(OrderError::Threshold(ThresholdError::InvalidThreshold {
                k: 2,
                n: 1
            }))
        );
    }

    #[test]
    fn test_mixed_orders_do_not_combine() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let mut other = order().params();
        other.nonce = 1;
        let other = Order::new(other);

        let mut fragments = fragment(&order(), 3, 2, &mut rng).unwrap();
        fragments[1] = fragment(&other, 3, 2, &mut rng).unwrap()[1];
        assert!(matches!(
            combine_fragments(&fragments[..2], 2),
            Err(OrderError::Reassembly(_))
        ));
    }
}
