//! Order data model.
//!
//! An [`Order`] is immutable once built: its [`OrderId`] is a content hash
//! over every other field, so any change produces a different order.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tessera_threshold::encoding::{from_base64, to_base64};

use crate::error::{OrderError, Result};

/// Largest accepted exponent; keeps every `co × 10^exp` within `u128`
pub const MAX_EXPONENT: u64 = 18;

/// Token identifier as registered with the settlement layer
pub type Token = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    Buy,
    Sell,
}

impl Parity {
    pub fn as_u8(self) -> u8 {
        match self {
            Parity::Buy => 0,
            Parity::Sell => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Parity::Buy),
            1 => Some(Parity::Sell),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    Midpoint,
    Limit,
    MidpointFillOrKill,
    LimitFillOrKill,
}

impl OrderType {
    pub fn as_u8(self) -> u8 {
        match self {
            OrderType::Midpoint => 0,
            OrderType::Limit => 1,
            OrderType::MidpointFillOrKill => 2,
            OrderType::LimitFillOrKill => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(OrderType::Midpoint),
            1 => Some(OrderType::Limit),
            2 => Some(OrderType::MidpointFillOrKill),
            3 => Some(OrderType::LimitFillOrKill),
            _ => None,
        }
    }
}

/// The traded pair. Encoded as `priority << 32 | non_priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub priority: Token,
    pub non_priority: Token,
}

impl TokenPair {
    pub fn new(priority: Token, non_priority: Token) -> Self {
        Self {
            priority,
            non_priority,
        }
    }

    pub fn encode(&self) -> u64 {
        (u64::from(self.priority) << 32) | u64::from(self.non_priority)
    }

    pub fn decode(encoded: u64) -> Self {
        Self {
            priority: (encoded >> 32) as Token,
            non_priority: encoded as Token,
        }
    }

    pub fn contains(&self, token: Token) -> bool {
        self.priority == token || self.non_priority == token
    }
}

/// Coefficient/exponent pair with value `co × 10^exp`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoExp {
    #[serde(with = "decimal_string")]
    pub co: u64,
    #[serde(with = "decimal_string")]
    pub exp: u64,
}

impl CoExp {
    pub fn new(co: u64, exp: u64) -> Self {
        Self { co, exp }
    }

    /// `co × 10^exp`, or `None` on overflow
    pub fn value(&self) -> Option<u128> {
        let exp = u32::try_from(self.exp).ok()?;
        10u128
            .checked_pow(exp)
            .and_then(|scale| u128::from(self.co).checked_mul(scale))
    }
}

/// 32-byte content hash of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub [u8; 32]);

impl OrderId {
    pub fn to_base64(&self) -> String {
        to_base64(&self.0)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for OrderId {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes =
            from_base64(s).map_err(|e| OrderError::MalformedOrder(format!("order id: {e}")))?;
        let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            OrderError::MalformedOrder(format!("order id must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(OrderId(arr))
    }
}

impl Serialize for OrderId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Every order field except the derived id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderParams {
    pub parity: Parity,
    pub order_type: OrderType,
    pub settlement: u64,
    /// Unix seconds
    pub expiry: u64,
    pub tokens: TokenPair,
    pub price: CoExp,
    pub volume: CoExp,
    pub minimum_volume: CoExp,
    pub nonce: u64,
}

/// A trader's order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub parity: Parity,
    pub order_type: OrderType,
    pub settlement: u64,
    pub expiry: u64,
    pub tokens: TokenPair,
    pub price: CoExp,
    pub volume: CoExp,
    pub minimum_volume: CoExp,
    pub nonce: u64,
}

impl Order {
    /// Build an order and derive its id
    pub fn new(params: OrderParams) -> Self {
        let id = compute_id(&params);
        Self {
            id,
            parity: params.parity,
            order_type: params.order_type,
            settlement: params.settlement,
            expiry: params.expiry,
            tokens: params.tokens,
            price: params.price,
            volume: params.volume,
            minimum_volume: params.minimum_volume,
            nonce: params.nonce,
        }
    }

    pub fn params(&self) -> OrderParams {
        OrderParams {
            parity: self.parity,
            order_type: self.order_type,
            settlement: self.settlement,
            expiry: self.expiry,
            tokens: self.tokens,
            price: self.price,
            volume: self.volume,
            minimum_volume: self.minimum_volume,
            nonce: self.nonce,
        }
    }

    /// Hash of the current contents; equals `id` for a well-formed order
    pub fn compute_id(&self) -> OrderId {
        compute_id(&self.params())
    }

    /// Token whose balance this order holds: the priority token for buys,
    /// the non-priority token for sells
    pub fn locked_token(&self) -> Token {
        match self.parity {
            Parity::Buy => self.tokens.priority,
            Parity::Sell => self.tokens.non_priority,
        }
    }

    /// Check the encoding invariants required before fragmentation
    pub fn validate(&self) -> Result<()> {
        if self.id != self.compute_id() {
            return Err(OrderError::MalformedOrder(
                "order id does not match contents".into(),
            ));
        }
        if self.tokens.priority == self.tokens.non_priority {
            return Err(OrderError::MalformedOrder(format!(
                "token pair repeats token {}",
                self.tokens.priority
            )));
        }
        if self.expiry == 0 {
            return Err(OrderError::MalformedOrder("expiry is not set".into()));
        }
        if self.volume.co == 0 {
            return Err(OrderError::MalformedOrder("volume is zero".into()));
        }

        let mut values = [0u128; 3];
        for (slot, (name, coexp)) in values.iter_mut().zip([
            ("price", &self.price),
            ("volume", &self.volume),
            ("minimum volume", &self.minimum_volume),
        ]) {
            if coexp.exp > MAX_EXPONENT {
                return Err(OrderError::MalformedOrder(format!(
                    "{name} exponent {} exceeds {MAX_EXPONENT}",
                    coexp.exp
                )));
            }
            *slot = coexp
                .value()
                .ok_or_else(|| OrderError::MalformedOrder(format!("{name} overflows")))?;
        }

        let [_, volume, minimum_volume] = values;
        if minimum_volume > volume {
            return Err(OrderError::MalformedOrder(
                "minimum volume exceeds volume".into(),
            ));
        }
        Ok(())
    }
}

fn compute_id(params: &OrderParams) -> OrderId {
    let mut hasher = blake3::Hasher::new_derive_key("tessera-order-id-v1");
    hasher.update(&[params.parity.as_u8(), params.order_type.as_u8()]);
    hasher.update(&params.settlement.to_le_bytes());
    hasher.update(&params.expiry.to_le_bytes());
    hasher.update(&params.tokens.encode().to_le_bytes());
    for coexp in [&params.price, &params.volume, &params.minimum_volume] {
        hasher.update(&coexp.co.to_le_bytes());
        hasher.update(&coexp.exp.to_le_bytes());
    }
    hasher.update(&params.nonce.to_le_bytes());
    OrderId(*hasher.finalize().as_bytes())
}

/// Coefficient/exponent as received from a trader, both parts decimal strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoExpRequest {
    #[serde(default)]
    pub co: Option<String>,
    #[serde(default)]
    pub exp: Option<String>,
}

impl CoExpRequest {
    pub fn new(co: impl Into<String>, exp: impl Into<String>) -> Self {
        Self {
            co: Some(co.into()),
            exp: Some(exp.into()),
        }
    }

    fn parse(&self, field: &str) -> Result<CoExp> {
        let part = |value: &Option<String>, part: &str| -> Result<u64> {
            let raw = value.as_deref().ok_or_else(|| {
                OrderError::MalformedOrder(format!("{field} is missing its {part}"))
            })?;
            raw.trim().parse::<u64>().map_err(|e| {
                OrderError::MalformedOrder(format!("{field} {part} {raw:?}: {e}"))
            })
        };
        Ok(CoExp::new(
            part(&self.co, "coefficient")?,
            part(&self.exp, "exponent")?,
        ))
    }
}

/// Loosely typed order intake: every field optional until validated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default)]
    pub parity: Option<Parity>,
    #[serde(default)]
    pub order_type: Option<OrderType>,
    #[serde(default)]
    pub settlement: Option<u64>,
    #[serde(default)]
    pub expiry: Option<u64>,
    #[serde(default)]
    pub tokens: Option<TokenPair>,
    #[serde(default)]
    pub price: Option<CoExpRequest>,
    #[serde(default)]
    pub volume: Option<CoExpRequest>,
    #[serde(default)]
    pub minimum_volume: Option<CoExpRequest>,
    /// Drawn from the supplied RNG when absent
    #[serde(default)]
    pub nonce: Option<u64>,
}

impl OrderRequest {
    /// Build and validate the order
    pub fn into_order<R: RngCore>(self, rng: &mut R) -> Result<Order> {
        fn required<T>(value: Option<T>, field: &str) -> Result<T> {
            value.ok_or_else(|| OrderError::MalformedOrder(format!("{field} is missing")))
        }

        let params = OrderParams {
            parity: required(self.parity, "parity")?,
            order_type: required(self.order_type, "order type")?,
            settlement: required(self.settlement, "settlement")?,
            expiry: required(self.expiry, "expiry")?,
            tokens: required(self.tokens, "tokens")?,
            price: required(self.price, "price")?.parse("price")?,
            volume: required(self.volume, "volume")?.parse("volume")?,
            minimum_volume: required(self.minimum_volume, "minimum volume")?
                .parse("minimum volume")?,
            nonce: self.nonce.unwrap_or_else(|| rng.next_u64()),
        };

        let order = Order::new(params);
        order.validate()?;
        Ok(order)
    }
}

/// `u64` carried as a decimal string on the wire
mod decimal_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn params() -> OrderParams {
        OrderParams {
            parity: Parity::Buy,
            order_type: OrderType::Limit,
            settlement: 1,
            expiry: 1_700_000_000,
            tokens: TokenPair::new(1, 256),
            price: CoExp::new(350, 2),
            volume: CoExp::new(100, 0),
            minimum_volume: CoExp::new(10, 0),
            nonce: 42,
        }
    }

    #[test]
    fn test_order_id_is_content_hash() {
        let order = Order::new(params());
        assert_eq!(order.id, order.compute_id());
        assert!(order.validate().is_ok());

        let mut other = params();
        other.nonce = 43;
        assert_ne!(Order::new(other).id, order.id);
    }

    #[test]
    fn test_tampered_order_is_malformed() {
        let mut order = Order::new(params());
        order.volume = CoExp::new(1_000, 0);
        assert!(matches!(
            order.validate(),
            Err(OrderError::MalformedOrder(_))
        ));
    }

    #[test]
    fn test_validation_rules() {
        let cases: Vec<(&str, Box<dyn Fn(&mut OrderParams)>)> = vec![
            ("same tokens", Box::new(|p: &mut OrderParams| p.tokens = TokenPair::new(5, 5))),
            ("no expiry", Box::new(|p: &mut OrderParams| p.expiry = 0)),
            ("zero volume", Box::new(|p: &mut OrderParams| p.volume = CoExp::new(0, 0))),
            ("big exponent", Box::new(|p: &mut OrderParams| p.price = CoExp::new(1, 19))),
            (
                "min above volume",
                Box::new(|p: &mut OrderParams| p.minimum_volume = CoExp::new(2, 2)),
            ),
        ];
        for (name, mutate) in cases {
            let mut p = params();
            mutate(&mut p);
            assert!(
                matches!(Order::new(p).validate(), Err(OrderError::MalformedOrder(_))),
                "{name}"
            );
        }
    }

    #[test]
    fn test_coexp_value() {
        assert_eq!(CoExp::new(100, 0).value(), Some(100));
        assert_eq!(CoExp::new(35, 3).value(), Some(35_000));
        assert_eq!(
            CoExp::new(u64::MAX, MAX_EXPONENT).value(),
            Some(u128::from(u64::MAX) * 10u128.pow(18))
        );
        assert_eq!(CoExp::new(1, 39).value(), None);
    }

    #[test]
    fn test_token_pair_encoding() {
        let pair = TokenPair::new(1, 65_536);
        assert_eq!(pair.encode(), (1u64 << 32) | 65_536);
        assert_eq!(TokenPair::decode(pair.encode()), pair);
    }

    #[test]
    fn test_locked_token_follows_parity() {
        let buy = Order::new(params());
        assert_eq!(buy.locked_token(), 1);

        let mut p = params();
        p.parity = Parity::Sell;
        assert_eq!(Order::new(p).locked_token(), 256);
    }

    #[test]
    fn test_request_with_string_coexp() {
        let json = r#"{
            "parity": "sell",
            "orderType": "midpoint",
            "settlement": 2,
            "expiry": 1700000000,
            "tokens": { "priority": 1, "nonPriority": 256 },
            "price": { "co": "200", "exp": "1" },
            "volume": { "co": "100", "exp": "0" },
            "minimumVolume": { "co": "1", "exp": "0" }
        }"#;
        let request: OrderRequest = serde_json::from_str(json).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let order = request.into_order(&mut rng).unwrap();

        assert_eq!(order.parity, Parity::Sell);
        assert_eq!(order.volume, CoExp::new(100, 0));
        assert_eq!(order.id, order.compute_id());
    }

    #[test]
    fn test_request_missing_exponent_is_malformed() {
        let mut request = OrderRequest {
            parity: Some(Parity::Buy),
            order_type: Some(OrderType::Limit),
            settlement: Some(1),
            expiry: Some(1_700_000_000),
            tokens: Some(TokenPair::new(1, 2)),
            price: Some(CoExpRequest::new("1", "0")),
            volume: Some(CoExpRequest {
                co: Some("100".into()),
                exp: None,
            }),
            minimum_volume: Some(CoExpRequest::new("1", "0")),
            nonce: Some(7),
        };
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let err = request.clone().into_order(&mut rng).unwrap_err();
        assert_eq!(
            err,
            OrderError::MalformedOrder("volume is missing its exponent".into())
        );

        request.volume = None;
        assert!(matches!(
            request.into_order(&mut rng),
            Err(OrderError::MalformedOrder(_))
        ));
    }

    #[test]
    fn test_order_json_roundtrip_keeps_id() {
        let order = Order::new(params());
        let json = serde_json::to_string(&order).unwrap();
        assert!(json.contains(r#""volume":{"co":"100","exp":"0"}"#));
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(back, order);
        assert!(back.validate().is_ok());
    }
}
