//! Submission payloads
//!
//! Wire shape posted to the ingress:
//!
//! ```json
//! {
//!   "signature": "<order signature>",
//!   "orderFragmentMappings": [
//!     { "<pod id>": [ { "id": "...", "index": 1, "orderId": "...", ... } ] }
//!   ]
//! }
//! ```
//!
//! Routing fields travel in the clear; every confidential field is a base64
//! sealed box, and coefficient/exponent pairs are `[co, exp]`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tessera_order::{EncryptedCoExp, EncryptedFragment, Order, OrderId, OrderType, Parity};
use tessera_threshold::PodId;
use tessera_threshold::encoding::base64_bytes;
use thiserror::Error;

use crate::mapper::FragmentMapping;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("no pod produced fragments for order {0}")]
    EmptyMapping(OrderId),

    #[error("pod {pod} carries a fragment of order {found}, expected {expected}")]
    ForeignFragment {
        pod: PodId,
        expected: OrderId,
        found: OrderId,
    },

    #[error("payload encoding failed: {0}")]
    Encoding(String),
}

/// Sealed `[co, exp]` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedCoExp(
    #[serde(with = "base64_bytes")] pub Vec<u8>,
    #[serde(with = "base64_bytes")] pub Vec<u8>,
);

impl From<&EncryptedCoExp> for SealedCoExp {
    fn from(sealed: &EncryptedCoExp) -> Self {
        SealedCoExp(sealed.co.clone(), sealed.exp.clone())
    }
}

/// One encrypted fragment as sent to the ingress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireFragment {
    pub id: String,
    pub index: u32,
    pub order_id: OrderId,
    pub order_parity: Parity,
    pub order_settlement: u64,
    pub order_type: OrderType,
    pub order_expiry: u64,
    #[serde(with = "base64_bytes")]
    pub tokens: Vec<u8>,
    pub price: SealedCoExp,
    pub volume: SealedCoExp,
    pub minimum_volume: SealedCoExp,
    #[serde(with = "base64_bytes")]
    pub nonce: Vec<u8>,
    pub order_signature: String,
}

impl WireFragment {
    fn new(fragment: &EncryptedFragment, signature: &str) -> Self {
        Self {
            id: fragment.id.to_base64(),
            index: fragment.index,
            order_id: fragment.order_id,
            order_parity: fragment.parity,
            order_settlement: fragment.settlement,
            order_type: fragment.order_type,
            order_expiry: fragment.expiry,
            tokens: fragment.tokens.clone(),
            price: (&fragment.price).into(),
            volume: (&fragment.volume).into(),
            minimum_volume: (&fragment.minimum_volume).into(),
            nonce: fragment.nonce.clone(),
            order_signature: signature.to_owned(),
        }
    }
}

/// Body of `POST /orders`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub signature: String,
    /// Pod id (base64) to that pod's fragments in index order
    pub order_fragment_mappings: Vec<BTreeMap<String, Vec<WireFragment>>>,
}

impl SubmissionPayload {
    pub fn to_json(&self) -> Result<String, SubmissionError> {
        serde_json::to_string(self).map_err(|e| SubmissionError::Encoding(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String, SubmissionError> {
        serde_json::to_string_pretty(self).map_err(|e| SubmissionError::Encoding(e.to_string()))
    }

    /// Number of fragments across all pods
    pub fn fragment_count(&self) -> usize {
        self.order_fragment_mappings
            .iter()
            .flat_map(|mapping| mapping.values())
            .map(Vec::len)
            .sum()
    }
}

/// Attach the order signature to a completed mapping
pub fn build(
    order: &Order,
    signature: &str,
    mapping: &FragmentMapping,
) -> Result<SubmissionPayload, SubmissionError> {
    if mapping.is_empty() {
        return Err(SubmissionError::EmptyMapping(order.id));
    }

    let mut pods = BTreeMap::new();
    for entry in mapping.iter() {
        if let Some(foreign) = entry.fragments.iter().find(|f| f.order_id != order.id) {
            return Err(SubmissionError::ForeignFragment {
                pod: entry.pod,
                expected: order.id,
                found: foreign.order_id,
            });
        }

        let fragments = entry
            .fragments
            .iter()
            .map(|fragment| WireFragment::new(fragment, signature))
            .collect();
        pods.insert(entry.pod.to_base64(), fragments);
    }

    Ok(SubmissionPayload {
        signature: signature.to_owned(),
        order_fragment_mappings: vec![pods],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::{MapperOptions, PodMapper};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;
    use serde_json::Value;
    use tessera_order::{CoExp, OrderParams, TokenPair};
    use tessera_threshold::encoding::{from_base64, to_base64};
    use tessera_threshold::{LocalPodMember, Pod};
    use tokio_util::sync::CancellationToken;

    fn order(nonce: u64) -> Order {
        Order::new(OrderParams {
            parity: Parity::Sell,
            order_type: OrderType::MidpointFillOrKill,
            settlement: 3,
            expiry: 1_700_000_000,
            tokens: TokenPair::new(1, 256),
            price: CoExp::new(0, 0),
            volume: CoExp::new(100, 0),
            minimum_volume: CoExp::new(100, 0),
            nonce,
        })
    }

    fn mapping(order: &Order, seed: u64) -> (Pod, FragmentMapping) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let pod = Pod::new(
            (0..4)
                .map(|_| LocalPodMember::generate(&mut rng).to_member())
                .collect(),
        );
        let report = PodMapper::new(MapperOptions::default())
            .unwrap()
            .build_mapping(order, &[pod.clone()], &mut rng, &CancellationToken::new())
            .unwrap();
        (pod, report.mapping)
    }

    #[test]
    fn test_payload_wire_shape() {
        let order = order(1);
        let (pod, mapping) = mapping(&order, 1);

        let payload = build(&order, "0xsig", &mapping).unwrap();
        assert_eq!(payload.fragment_count(), 4);

        let json: Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["signature"], "0xsig");

        let mappings = json["orderFragmentMappings"].as_array().unwrap();
        assert_eq!(mappings.len(), 1);
        let pods = mappings[0].as_object().unwrap();
        assert_eq!(pods.len(), 1);

        let fragments = pods[&pod.id.to_base64()].as_array().unwrap();
        assert_eq!(fragments.len(), 4);

        let first = &fragments[0];
        assert_eq!(first["index"], 1);
        assert_eq!(first["orderId"], order.id.to_base64());
        assert_eq!(first["orderParity"], "sell");
        assert_eq!(first["orderType"], "midpointFillOrKill");
        assert_eq!(first["orderSettlement"], 3);
        assert_eq!(first["orderExpiry"], 1_700_000_000u64);
        assert_eq!(first["orderSignature"], "0xsig");

        let volume = first["volume"].as_array().unwrap();
        assert_eq!(volume.len(), 2);
        for sealed in [&first["tokens"], &first["nonce"], &volume[0], &volume[1]] {
            assert!(from_base64(sealed.as_str().unwrap()).is_ok());
        }
    }

    #[test]
    fn test_payload_roundtrips_through_json() {
        let order = order(2);
        let (_, mapping) = mapping(&order, 2);
        let payload = build(&order, "sig", &mapping).unwrap();

        let back: SubmissionPayload =
            serde_json::from_str(&payload.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_empty_mapping_rejected() {
        let order = order(3);
        assert_eq!(
            build(&order, "sig", &FragmentMapping::default()),
            Err(SubmissionError::EmptyMapping(order.id))
        );
    }

    #[test]
    fn test_foreign_fragment_rejected() {
        let ours = order(4);
        let theirs = order(5);
        let (pod, mapping) = mapping(&theirs, 4);

        assert_eq!(
            build(&ours, "sig", &mapping),
            Err(SubmissionError::ForeignFragment {
                pod: pod.id,
                expected: ours.id,
                found: theirs.id,
            })
        );
    }

    #[test]
    fn test_sealed_pair_is_json_array() {
        let pair = SealedCoExp(vec![1, 2], vec![3]);
        assert_eq!(
            serde_json::to_value(&pair).unwrap(),
            serde_json::json!([to_base64(&[1, 2]), to_base64(&[3])])
        );
    }
}
