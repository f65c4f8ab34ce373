//! Pod Management
//!
//! A pod is a fixed group of worker nodes that jointly hold the shares of an
//! order. Pod membership is supplied by the caller as a snapshot.

use std::fmt;
use std::str::FromStr;

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use x25519_dalek::{PublicKey, StaticSecret};

use crate::encoding::{base64_bytes, from_base64, to_base64};
use crate::sealed::{SealError, open};

/// Reconstruction threshold for a pod of `n` members: `ceil(2(n+1)/3)`.
///
/// The formula mirrors the value the matching network expects. For `n = 1`
/// it yields 2, which exceeds the pod size and is rejected by the sharer.
pub fn reconstruction_threshold(n: u32) -> u32 {
    let threshold = (2 * (u64::from(n) + 1)).div_ceil(3);
    u32::try_from(threshold).unwrap_or(u32::MAX)
}

fn saturating_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Fixed-size content hash identifying a pod, rendered as base64
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PodId(pub [u8; 32]);

impl PodId {
    /// Hash of the ordered member public keys
    pub fn from_members(members: &[PodMember]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("tessera-pod-id-v1");
        hasher.update(&(members.len() as u64).to_le_bytes());
        for member in members {
            hasher.update(&(member.public_key.len() as u64).to_le_bytes());
            hasher.update(&member.public_key);
        }
        PodId(*hasher.finalize().as_bytes())
    }

    pub fn to_base64(&self) -> String {
        to_base64(&self.0)
    }
}

impl fmt::Display for PodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for PodId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = from_base64(s).map_err(|e| format!("invalid pod id: {e}"))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("pod id must be 32 bytes, got {}", bytes.len()))?;
        Ok(PodId(arr))
    }
}

impl Serialize for PodId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PodId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A pod member as published by the pod directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMember {
    /// Member's X25519 public key, as supplied (validated on encryption)
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
    /// Network address of the node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl PodMember {
    pub fn new(public_key: impl Into<Vec<u8>>) -> Self {
        Self {
            public_key: public_key.into(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// A group of recipients for one share set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub id: PodId,
    /// Members in share-index order (member `i` receives share `i + 1`)
    pub members: Vec<PodMember>,
}

impl Pod {
    /// Create a pod whose id is derived from its membership
    pub fn new(members: Vec<PodMember>) -> Self {
        let id = PodId::from_members(&members);
        Self { id, members }
    }

    /// Create a pod with a directory-assigned id
    pub fn with_id(id: PodId, members: Vec<PodMember>) -> Self {
        Self { id, members }
    }

    /// Member count, saturating at `u32::MAX`
    pub fn size(&self) -> u32 {
        saturating_count(self.members.len())
    }

    pub fn threshold(&self) -> u32 {
        reconstruction_threshold(self.size())
    }

    pub fn public_keys(&self) -> Vec<&[u8]> {
        self.members.iter().map(|m| m.public_key.as_slice()).collect()
    }
}

/// Pod member holding its secret key (recipient side)
pub struct LocalPodMember {
    secret_key: StaticSecret,
    pub public_key: PublicKey,
}

impl Clone for LocalPodMember {
    fn clone(&self) -> Self {
        // StaticSecret is not Clone; rebuild from bytes
        Self::from_secret(self.secret_bytes())
    }
}

impl LocalPodMember {
    /// Generate a new random member key
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let secret_key = StaticSecret::random_from_rng(&mut *rng);
        let public_key = PublicKey::from(&secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create from an existing secret key
    pub fn from_secret(secret_bytes: [u8; 32]) -> Self {
        let secret_key = StaticSecret::from(secret_bytes);
        let public_key = PublicKey::from(&secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Secret key bytes (for key files)
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret_key.to_bytes()
    }

    /// Public member entry for the directory
    pub fn to_member(&self) -> PodMember {
        PodMember::new(self.public_key.as_bytes().to_vec())
    }

    /// Open a sealed box addressed to this member
    pub fn open(&self, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, SealError> {
        open(sealed, &self.secret_key, aad)
    }
}
