use serde::{Deserialize, Deserializer, Serialize};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// The aggregate is one unit of consistency: an Order always travels together
// with its Delivery, its Payment and its (possibly empty) list of Items.
//
// JSON contract shared by the HTTP body and the event payload:
// - `delivery` and `payment` are mandatory objects
// - missing scalar fields fall back to zero values
// - a missing `items` key means no items
// - an explicit null is read like a missing field
//
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Order {
    #[serde(default, deserialize_with = "null_as_default")]
    pub order_uid: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entry: String,
    pub delivery: Delivery,
    pub payment: Payment,
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Item>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub locale: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub internal_signature: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub delivery_service: String,
    #[serde(default, rename = "shardkey", deserialize_with = "null_as_default")]
    pub shard_key: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sm_id: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub date_created: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub oof_shard: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Delivery {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone: String,
    #[serde(deserialize_with = "null_as_default")]
    pub zip: String,
    #[serde(deserialize_with = "null_as_default")]
    pub city: String,
    #[serde(deserialize_with = "null_as_default")]
    pub address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(deserialize_with = "null_as_default")]
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Payment {
    #[serde(deserialize_with = "null_as_default")]
    pub transaction: String,
    #[serde(deserialize_with = "null_as_default")]
    pub request_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub currency: String,
    #[serde(deserialize_with = "null_as_default")]
    pub provider: String,
    #[serde(deserialize_with = "null_as_default")]
    pub amount: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub payment_dt: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub bank: String,
    #[serde(deserialize_with = "null_as_default")]
    pub delivery_cost: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub goods_total: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub custom_fee: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Item {
    #[serde(deserialize_with = "null_as_default")]
    pub chrt_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub track_number: String,
    #[serde(deserialize_with = "null_as_default")]
    pub price: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub rid: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub sale: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub size: String,
    #[serde(deserialize_with = "null_as_default")]
    pub total_price: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub nm_id: i64,
    #[serde(deserialize_with = "null_as_default")]
    pub brand: String,
    #[serde(deserialize_with = "null_as_default")]
    pub status: i64,
}

/// Treat JSON `null` like an absent field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Decoding & Validation
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed order payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Order payload has an empty order_uid")]
    MissingOrderUid,
}

impl Order {
    /// Decode and validate a JSON payload. Both ingress paths go through here.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let order: Order = serde_json::from_slice(payload)?;
        order.validate()?;
        Ok(order)
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.order_uid.trim().is_empty() {
            return Err(DecodeError::MissingOrderUid);
        }
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a fully populated order; shared by tests across the crate.
    pub(crate) fn sample_order(order_uid: &str) -> Order {
        Order {
            order_uid: order_uid.to_string(),
            track_number: "WBILMTESTTRACK".to_string(),
            entry: "WBIL".to_string(),
            delivery: Delivery {
                name: "Test Testov".to_string(),
                phone: "+9720000000".to_string(),
                zip: "2639809".to_string(),
                city: "Kiryat Mozkin".to_string(),
                address: "Ploshad Mira 15".to_string(),
                region: "Kraiot".to_string(),
                email: "test@gmail.com".to_string(),
            },
            payment: Payment {
                transaction: order_uid.to_string(),
                request_id: String::new(),
                currency: "USD".to_string(),
                provider: "wbpay".to_string(),
                amount: 1817,
                payment_dt: 1637907727,
                bank: "alpha".to_string(),
                delivery_cost: 1500,
                goods_total: 317,
                custom_fee: 0,
            },
            items: vec![
                Item {
                    chrt_id: 9934930,
                    track_number: "WBILMTESTTRACK".to_string(),
                    price: 453,
                    rid: "ab4219087a764ae0btest".to_string(),
                    name: "Mascaras".to_string(),
                    sale: 30,
                    size: "0".to_string(),
                    total_price: 317,
                    nm_id: 2389212,
                    brand: "Vivienne Sabo".to_string(),
                    status: 202,
                },
                Item {
                    chrt_id: 9934931,
                    track_number: "WBILMTESTTRACK".to_string(),
                    price: 120,
                    rid: "ab4219087a764ae0btest2".to_string(),
                    name: "Brush".to_string(),
                    sale: 0,
                    size: "1".to_string(),
                    total_price: 120,
                    nm_id: 2389213,
                    brand: "Vivienne Sabo".to_string(),
                    status: 202,
                },
            ],
            locale: "en".to_string(),
            internal_signature: String::new(),
            delivery_service: "meest".to_string(),
            shard_key: "9".to_string(),
            sm_id: 99,
            date_created: "2021-11-26T06:22:19Z".to_string(),
            oof_shard: "1".to_string(),
        }
    }

    #[test]
    fn test_decode_full_payload() {
        let order = sample_order("b563feb7b2b84b6test");
        let json = serde_json::to_vec(&order).unwrap();

        let decoded = Order::decode(&json).unwrap();
        assert_eq!(decoded, order);
        assert_eq!(decoded.items[1].name, "Brush");
    }

    #[test]
    fn test_wire_names_match_contract() {
        let json = serde_json::to_value(sample_order("a1")).unwrap();
        assert_eq!(json["shardkey"], "9");
        assert!(json.get("shard_key").is_none());
        assert_eq!(json["payment"]["payment_dt"], 1637907727);
        assert_eq!(json["items"][0]["chrt_id"], 9934930);
    }

    #[test]
    fn test_decode_minimal_payload_defaults_scalars() {
        let payload = br#"{"order_uid":"a1","delivery":{},"payment":{}}"#;
        let order = Order::decode(payload).unwrap();

        assert_eq!(order.order_uid, "a1");
        assert!(order.items.is_empty());
        assert_eq!(order.sm_id, 0);
        assert_eq!(order.delivery, Delivery::default());
    }

    #[test]
    fn test_decode_reads_null_as_zero_value() {
        let payload = br#"{
            "order_uid": "a1",
            "track_number": null,
            "sm_id": null,
            "items": null,
            "delivery": {"city": null},
            "payment": {"amount": null, "currency": "USD"}
        }"#;
        let order = Order::decode(payload).unwrap();

        assert_eq!(order.track_number, "");
        assert_eq!(order.sm_id, 0);
        assert!(order.items.is_empty());
        assert_eq!(order.delivery.city, "");
        assert_eq!(order.payment.amount, 0);
        assert_eq!(order.payment.currency, "USD");

        let null_items = br#"{"order_uid":"a2","delivery":{},"payment":{},"items":[{"price":null,"name":"Brush"}]}"#;
        let order = Order::decode(null_items).unwrap();
        assert_eq!(order.items[0].price, 0);
        assert_eq!(order.items[0].name, "Brush");
    }

    #[test]
    fn test_decode_rejects_null_companions() {
        let payload = br#"{"order_uid":"a1","delivery":null,"payment":{}}"#;
        assert!(matches!(Order::decode(payload), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_missing_companions() {
        let no_delivery = br#"{"order_uid":"a1","payment":{},"items":[]}"#;
        assert!(matches!(Order::decode(no_delivery), Err(DecodeError::Malformed(_))));

        let no_payment = br#"{"order_uid":"a1","delivery":{},"items":[]}"#;
        assert!(matches!(Order::decode(no_payment), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_rejects_empty_uid() {
        let payload = br#"{"order_uid":"  ","delivery":{},"payment":{}}"#;
        assert!(matches!(Order::decode(payload), Err(DecodeError::MissingOrderUid)));

        let missing = br#"{"delivery":{},"payment":{}}"#;
        assert!(matches!(Order::decode(missing), Err(DecodeError::MissingOrderUid)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(Order::decode(b"not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(
            Order::decode(br#"{"order_uid":"a1","delivery":{},"payment":{},"sm_id":"x"}"#),
            Err(DecodeError::Malformed(_))
        ));
    }
}
