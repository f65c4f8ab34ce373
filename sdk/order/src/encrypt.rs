//! Fragment encryption
//!
//! Each confidential share of a fragment is sealed separately to the
//! recipient's key. The associated data of every box is the fragment id
//! followed by the field label, so a box cannot be moved to another field or
//! another fragment without failing to open.

use std::fmt;

use rand::{CryptoRng, RngCore};
use tessera_threshold::encoding::to_base64;
use tessera_threshold::{
    FieldShare, LocalPodMember, ShareIndex, ThresholdError, decode_element, encode_element, seal,
};

use crate::error::Result;
use crate::fragment::{ConfidentialField, ConfidentialShares, OrderFragment};
use crate::order::{OrderId, OrderType, Parity};

/// Identifier of one fragment addressed to one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(pub [u8; 32]);

impl FragmentId {
    /// Hash of the order id, share index and recipient key.
    ///
    /// Share values are left out so the id reveals nothing about them.
    pub fn derive(order_id: &OrderId, index: ShareIndex, recipient_public_key: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("tessera-fragment-id-v1");
        hasher.update(&order_id.0);
        hasher.update(&index.to_le_bytes());
        hasher.update(recipient_public_key);
        FragmentId(*hasher.finalize().as_bytes())
    }

    pub fn to_base64(&self) -> String {
        to_base64(&self.0)
    }
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

/// Sealed coefficient/exponent pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedCoExp {
    pub co: Vec<u8>,
    pub exp: Vec<u8>,
}

/// A fragment ready for transport: routing metadata in the clear,
/// every share sealed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedFragment {
    pub id: FragmentId,
    pub index: ShareIndex,
    pub order_id: OrderId,
    pub parity: Parity,
    pub order_type: OrderType,
    pub settlement: u64,
    pub expiry: u64,
    pub tokens: Vec<u8>,
    pub price: EncryptedCoExp,
    pub volume: EncryptedCoExp,
    pub minimum_volume: EncryptedCoExp,
    pub nonce: Vec<u8>,
}

impl EncryptedFragment {
    fn sealed(&self, field: ConfidentialField) -> &[u8] {
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
}

fn field_aad(id: &FragmentId, field: ConfidentialField) -> Vec<u8> {
    let label = field.label().as_bytes();
    let mut aad = Vec::with_capacity(id.0.len() + label.len());
    aad.extend_from_slice(&id.0);
    aad.extend_from_slice(label);
    aad
}

/// Seal every confidential share of `fragment` to `recipient_public_key`
pub fn encrypt_fragment<R: RngCore + CryptoRng>(
    fragment: &OrderFragment,
    recipient_public_key: &[u8],
    rng: &mut R,
) -> Result<EncryptedFragment> {
    let id = FragmentId::derive(&fragment.order_id, fragment.index, recipient_public_key);

    let mut seal_field = |field: ConfidentialField| -> Result<Vec<u8>> {
        let share = fragment.shares.get(field);
        let plaintext = encode_element(&share.value);
        Ok(seal(
            &plaintext,
            recipient_public_key,
            &field_aad(&id, field),
            &mut *rng,
        )?)
    };

    Ok(EncryptedFragment {
        id,
        index: fragment.index,
        order_id: fragment.order_id,
        parity: fragment.parity,
        order_type: fragment.order_type,
        settlement: fragment.settlement,
        expiry: fragment.expiry,
        tokens: seal_field(ConfidentialField::Tokens)?,
        price: EncryptedCoExp {
            co: seal_field(ConfidentialField::PriceCo)?,
            exp: seal_field(ConfidentialField::PriceExp)?,
        },
        volume: EncryptedCoExp {
            co: seal_field(ConfidentialField::VolumeCo)?,
            exp: seal_field(ConfidentialField::VolumeExp)?,
        },
        minimum_volume: EncryptedCoExp {
            co: seal_field(ConfidentialField::MinimumVolumeCo)?,
            exp: seal_field(ConfidentialField::MinimumVolumeExp)?,
        },
        nonce: seal_field(ConfidentialField::Nonce)?,
    })
}

/// Open a fragment addressed to `member`
pub fn decrypt_fragment(
    encrypted: &EncryptedFragment,
    member: &LocalPodMember,
) -> Result<OrderFragment> {
    let shares = ConfidentialShares::try_from_fn(|field| {
        let plaintext = member.open(encrypted.sealed(field), &field_aad(&encrypted.id, field))?;
        let value = decode_element(&plaintext).ok_or(ThresholdError::InvalidShare)?;
        Ok(FieldShare::new(encrypted.index, value))
    })?;

    Ok(OrderFragment {
        index: encrypted.index,
        order_id: encrypted.order_id,
        parity: encrypted.parity,
        order_type: encrypted.order_type,
        settlement: encrypted.settlement,
        expiry: encrypted.expiry,
        shares,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrderError;
    use crate::fragment::fragment;
    use crate::order::{CoExp, Order, OrderParams, TokenPair};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use tessera_threshold::{SEALED_OVERHEAD, SealError};

    fn order() -> Order {
        Order::new(OrderParams {
            parity: Parity::Sell,
            order_type: OrderType::Midpoint,
            settlement: 2,
            expiry: 1_700_000_000,
            tokens: TokenPair::new(1, 256),
            price: CoExp::new(0, 0),
            volume: CoExp::new(100, 0),
            minimum_volume: CoExp::new(100, 0),
            nonce: 11,
        })
    }

    #[test]
    fn test_encrypt_decrypt_fragment() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let member = LocalPodMember::generate(&mut rng);
        let fragments = fragment(&order(), 3, 2, &mut rng).unwrap();

        let encrypted =
            encrypt_fragment(&fragments[1], member.public_key.as_bytes(), &mut rng).unwrap();
        assert_eq!(encrypted.index, 2);
        assert_eq!(encrypted.order_id, order().id);
        assert_eq!(encrypted.tokens.len(), 32 + SEALED_OVERHEAD);

        assert_eq!(decrypt_fragment(&encrypted, &member).unwrap(), fragments[1]);
    }

    #[test]
    fn test_ciphertext_hides_share_bytes() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let member = LocalPodMember::generate(&mut rng);
        let fragments = fragment(&order(), 3, 1, &mut rng).unwrap();

        let encrypted =
            encrypt_fragment(&fragments[0], member.public_key.as_bytes(), &mut rng).unwrap();
        // With k = 1 every share equals the secret, so the plaintext is known
        let plaintext = encode_element(&fragments[0].shares.volume.co.value);
        assert!(
            !encrypted
                .volume
                .co
                .windows(plaintext.len())
                .any(|w| w == plaintext)
        );
        // Equal plaintexts still seal differently
        assert_ne!(encrypted.volume.co, encrypted.minimum_volume.co);
    }

    #[test]
    fn test_only_recipient_can_decrypt() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let member = LocalPodMember::generate(&mut rng);
        let outsider = LocalPodMember::generate(&mut rng);
        let fragments = fragment(&order(), 4, 4, &mut rng).unwrap();

        let encrypted =
            encrypt_fragment(&fragments[0], member.public_key.as_bytes(), &mut rng).unwrap();
        assert_eq!(
            decrypt_fragment(&encrypted, &outsider),
            Err(OrderError::Encryption(SealError::DecryptionFailed))
        );
    }

    #[test]
    fn test_swapped_fields_fail_to_open() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let member = LocalPodMember::generate(&mut rng);
        let fragments = fragment(&order(), 4, 4, &mut rng).unwrap();

        let mut encrypted =
            encrypt_fragment(&fragments[0], member.public_key.as_bytes(), &mut rng).unwrap();
        std::mem::swap(&mut encrypted.volume.co, &mut encrypted.minimum_volume.co);
        assert!(decrypt_fragment(&encrypted, &member).is_err());
    }

    #[test]
    fn test_bad_public_key_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let fragments = fragment(&order(), 4, 4, &mut rng).unwrap();

        assert!(matches!(
            encrypt_fragment(&fragments[0], &[1u8; 31], &mut rng),
            Err(OrderError::Encryption(SealError::EncryptionFailed(_)))
        ));
        // The identity point gives an all-zero shared secret
        assert!(matches!(
            encrypt_fragment(&fragments[0], &[0u8; 32], &mut rng),
            Err(OrderError::Encryption(SealError::EncryptionFailed(_)))
        ));
    }

    #[test]
    fn test_fragment_id_binds_recipient() {
        let id = order().id;
        let a = FragmentId::derive(&id, 1, &[1u8; 32]);
        assert_eq!(a, FragmentId::derive(&id, 1, &[1u8; 32]));
        assert_ne!(a, FragmentId::derive(&id, 2, &[1u8; 32]));
        assert_ne!(a, FragmentId::derive(&id, 1, &[2u8; 32]));
    }
}
