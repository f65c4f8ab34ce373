//! Sealed boxes: anonymous public-key encryption to one recipient.
//!
//! ```text
//! Flow:
//! 1. Sender generates ephemeral keypair (epk, esk)
//! 2. Shared secret = ECDH(esk, recipient_pk), must be contributory
//! 3. Key = BLAKE3-derive("tessera-sealed-box-v1", shared || epk || recipient_pk)
//! 4. Output = epk (32) || nonce (12) || ChaCha20-Poly1305(key, nonce, aad, plaintext)
//! ```

use chacha20poly1305::{
    ChaCha20Poly1305,
    aead::{Aead, KeyInit, Payload},
};
use rand::{CryptoRng, RngCore};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

/// Length of an X25519 public key
pub const PUBLIC_KEY_BYTES: usize = 32;

const NONCE_BYTES: usize = 12;
const TAG_BYTES: usize = 16;

/// Bytes a sealed box adds on top of its plaintext
pub const SEALED_OVERHEAD: usize = PUBLIC_KEY_BYTES + NONCE_BYTES + TAG_BYTES;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SealError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed")]
    DecryptionFailed,
}

/// Encrypt `plaintext` so that only the holder of `recipient_pk`'s secret can read it.
///
/// `aad` is authenticated but not encrypted; the recipient must supply the
/// same bytes to open the box.
pub fn seal<R: RngCore + CryptoRng>(
    plaintext: &[u8],
    recipient_pk: &[u8],
    aad: &[u8],
    rng: &mut R,
) -> Result<Vec<u8>, SealError> {
    let recipient_bytes: [u8; PUBLIC_KEY_BYTES] = recipient_pk.try_into().map_err(|_| {
        SealError::EncryptionFailed(format!(
            "public key must be {PUBLIC_KEY_BYTES} bytes, got {}",
            recipient_pk.len()
        ))
    })?;
    let recipient = PublicKey::from(recipient_bytes);

    let ephemeral_secret = EphemeralSecret::random_from_rng(&mut *rng);
    let ephemeral_pk = PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(&recipient);
    if !shared_secret.was_contributory() {
        return Err(SealError::EncryptionFailed(
            "public key is a low-order point".into(),
        ));
    }

    let key = derive_box_key(
        shared_secret.as_bytes(),
        ephemeral_pk.as_bytes(),
        &recipient_bytes,
    );

    let mut nonce = [0u8; NONCE_BYTES];
    rng.fill_bytes(&mut nonce);

    let cipher = ChaCha20Poly1305::new(&key.into());
    let ciphertext = cipher
        .encrypt(
            &nonce.into(),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| SealError::EncryptionFailed("aead encryption failed".into()))?;

    let mut sealed = Vec::with_capacity(SEALED_OVERHEAD + plaintext.len());
    sealed.extend_from_slice(ephemeral_pk.as_bytes());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a box produced by [`seal`] with the recipient's secret key
pub fn open(sealed: &[u8], recipient_sk: &StaticSecret, aad: &[u8]) -> Result<Vec<u8>, SealError> {
    if sealed.len() < SEALED_OVERHEAD {
        return Err(SealError::DecryptionFailed);
    }

    let (epk_bytes, rest) = sealed.split_at(PUBLIC_KEY_BYTES);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_BYTES);

    let mut epk = [0u8; PUBLIC_KEY_BYTES];
    epk.copy_from_slice(epk_bytes);
    let mut nonce = [0u8; NONCE_BYTES];
    nonce.copy_from_slice(nonce_bytes);

    let shared_secret = recipient_sk.diffie_hellman(&PublicKey::from(epk));
    let recipient_pk = PublicKey::from(recipient_sk);
    let key = derive_box_key(shared_secret.as_bytes(), &epk, recipient_pk.as_bytes());

    let cipher = ChaCha20Poly1305::new(&key.into());
    cipher
        .decrypt(
            &nonce.into(),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| SealError::DecryptionFailed)
}

fn derive_box_key(shared_secret: &[u8], ephemeral_pk: &[u8], recipient_pk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key("tessera-sealed-box-v1");
    hasher.update(shared_secret);
    hasher.update(ephemeral_pk);
    hasher.update(recipient_pk);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn keypair(seed: u64) -> (StaticSecret, PublicKey) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let sk = StaticSecret::random_from_rng(&mut rng);
        let pk = PublicKey::from(&sk);
        (sk, pk)
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let (sk, pk) = keypair(2);

        let sealed = seal(b"price share", pk.as_bytes(), b"aad", &mut rng).unwrap();
        assert_eq!(sealed.len(), SEALED_OVERHEAD + 11);
        assert_eq!(open(&sealed, &sk, b"aad").unwrap(), b"price share");
    }

    #[test]
    fn test_ciphertext_does_not_contain_plaintext() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let (_, pk) = keypair(4);
        let plaintext = [0x5au8; 32];

        let sealed = seal(&plaintext, pk.as_bytes(), b"", &mut rng).unwrap();
        assert!(
            !sealed
                .windows(plaintext.len())
                .any(|window| window == plaintext)
        );
    }

    #[test]
    fn test_wrong_key_cannot_open() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let (_, pk) = keypair(6);
        let (other_sk, _) = keypair(7);

        let sealed = seal(b"secret", pk.as_bytes(), b"", &mut rng).unwrap();
        assert_eq!(open(&sealed, &other_sk, b""), Err(SealError::DecryptionFailed));
    }

    #[test]
    fn test_aad_mismatch_fails() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let (sk, pk) = keypair(9);

        let sealed = seal(b"secret", pk.as_bytes(), b"fragment-1/price", &mut rng).unwrap();
        assert!(open(&sealed, &sk, b"fragment-1/volume").is_err());
    }

    #[test]
    fn test_tampered_box_fails() {
        let mut rng = ChaCha20Rng::seed_from_u64(10);
        let (sk, pk) = keypair(11);

        let mut sealed = seal(b"secret", pk.as_bytes(), b"", &mut rng).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(open(&sealed, &sk, b"").is_err());
        assert!(open(&sealed[..SEALED_OVERHEAD - 1], &sk, b"").is_err());
    }

    #[test]
    fn test_malformed_keys_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(12);

        // Wrong length
        assert!(matches!(
            seal(b"x", &[1u8; 31], b"", &mut rng),
            Err(SealError::EncryptionFailed(_))
        ));
        // The identity point yields an all-zero shared secret
        assert!(matches!(
            seal(b"x", &[0u8; 32], b"", &mut rng),
            Err(SealError::EncryptionFailed(_))
        ));
    }
}
