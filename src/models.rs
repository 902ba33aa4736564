//! Typed shaping of raw orderbook rows into published records.
//!
//! Rows arrive as flat JSON objects, one per SQL row. Reward streams publish
//! their identifying columns at the top level and everything else under a
//! nested `data` object. Large integer amounts are carried as decimal strings
//! so no precision is lost on the way to the warehouse.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::ledger::ContentRef;
use crate::types::SyncStream;

/// One raw row as returned by the data source.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
#[error("Row {index} of {stream} does not match the expected shape: {source}")]
pub struct ShapeError {
    pub stream: SyncStream,
    pub index: usize,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(serde_json::Number),
    Text(String),
}

fn is_decimal(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut parts = digits.splitn(2, '.');
    let int = parts.next().unwrap_or("");
    let frac = parts.next();
    !int.is_empty()
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}

/// Accept a JSON number or a numeric string, keep it as decimal text.
fn decimal_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match NumberOrText::deserialize(d)? {
        NumberOrText::Number(n) => Ok(n.to_string()),
        NumberOrText::Text(s) if is_decimal(&s) => Ok(s),
        NumberOrText::Text(s) => Err(de::Error::custom(format!("not a decimal: {s:?}"))),
    }
}

fn opt_decimal_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "decimal_string")] String);
    Ok(Option::<Wrap>::deserialize(d)?.map(|Wrap(s)| s))
}

fn opt_float<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    match Option::<NumberOrText>::deserialize(d)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| de::Error::custom("number out of range")),
        Some(NumberOrText::Text(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("not a number: {s:?}"))),
    }
}

/// Block numbers come out of Postgres as bigint; accept text as well.
fn block_number<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match NumberOrText::deserialize(d)? {
        NumberOrText::Number(n) => n
            .as_u64()
            .ok_or_else(|| de::Error::custom(format!("invalid block number {n}"))),
        NumberOrText::Text(s) => s
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid block number {s:?}"))),
    }
}

fn opt_block_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    struct Wrap(#[serde(deserialize_with = "block_number")] u64);
    Ok(Option::<Wrap>::deserialize(d)?.map(|Wrap(n)| n))
}

/// Identifying columns at the top level, the rest under `data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Nested<K, D> {
    #[serde(flatten)]
    pub key: K,
    pub data: D,
}

#[derive(Deserialize)]
struct Flat<K, D> {
    #[serde(flatten)]
    key: K,
    #[serde(flatten)]
    data: D,
}

impl<K, D> From<Flat<K, D>> for Nested<K, D> {
    fn from(flat: Flat<K, D>) -> Self {
        Self {
            key: flat.key,
            data: flat.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRewardKey {
    #[serde(deserialize_with = "block_number")]
    pub block_number: u64,
    pub order_uid: String,
    pub tx_hash: String,
    pub solver: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRewardData {
    #[serde(deserialize_with = "decimal_string")]
    pub surplus_fee: String,
    #[serde(default, deserialize_with = "opt_float")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub quote_solver: Option<String>,
    #[serde(deserialize_with = "decimal_string")]
    pub protocol_fee: String,
    #[serde(default)]
    pub protocol_fee_token: Option<String>,
    #[serde(default, deserialize_with = "opt_float")]
    pub protocol_fee_native_price: Option<f64>,
    #[serde(default, deserialize_with = "opt_decimal_string")]
    pub quote_sell_amount: Option<String>,
    #[serde(default, deserialize_with = "opt_decimal_string")]
    pub quote_buy_amount: Option<String>,
    #[serde(default, deserialize_with = "opt_float")]
    pub quote_gas_cost: Option<f64>,
    #[serde(default, deserialize_with = "opt_float")]
    pub quote_sell_token_price: Option<f64>,
}

pub type OrderReward = Nested<OrderRewardKey, OrderRewardData>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRewardKey {
    /// Unset while the auction has not settled on chain.
    #[serde(default, deserialize_with = "opt_block_number")]
    pub block_number: Option<u64>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    pub solver: String,
    #[serde(deserialize_with = "block_number")]
    pub block_deadline: u64,
}

/// All amounts in wei.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRewardData {
    #[serde(deserialize_with = "decimal_string")]
    pub uncapped_payment_eth: String,
    #[serde(deserialize_with = "decimal_string")]
    pub capped_payment: String,
    #[serde(deserialize_with = "decimal_string")]
    pub execution_cost: String,
    #[serde(deserialize_with = "decimal_string")]
    pub surplus: String,
    #[serde(deserialize_with = "decimal_string")]
    pub fee: String,
    #[serde(deserialize_with = "decimal_string")]
    pub protocol_fee: String,
    #[serde(deserialize_with = "decimal_string")]
    pub winning_score: String,
    #[serde(deserialize_with = "decimal_string")]
    pub reference_score: String,
    #[serde(default)]
    pub participating_solvers: Vec<String>,
}

pub type BatchReward = Nested<BatchRewardKey, BatchRewardData>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenImbalance {
    #[serde(deserialize_with = "block_number")]
    pub block_number: u64,
    pub tx_hash: String,
    pub token: String,
    #[serde(deserialize_with = "decimal_string")]
    pub amount: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceFeedEntry {
    #[serde(deserialize_with = "block_number")]
    pub block_number: u64,
    pub token: String,
    pub source: String,
    #[serde(deserialize_with = "decimal_string")]
    pub price: String,
}

fn shape<F>(stream: SyncStream, rows: Vec<Row>, convert: F) -> Result<Vec<Value>, ShapeError>
where
    F: Fn(Value) -> Result<Value, serde_json::Error>,
{
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            convert(Value::Object(row)).map_err(|source| ShapeError {
                stream,
                index,
                source,
            })
        })
        .collect()
}

fn reshape<R, P>(value: Value) -> Result<Value, serde_json::Error>
where
    R: de::DeserializeOwned + Into<P>,
    P: Serialize,
{
    let raw: R = serde_json::from_value(value)?;
    serde_json::to_value(raw.into())
}

/// Convert raw rows of a record stream into their published JSON shape.
///
/// App-data rows are not records; use [`content_refs`] for them.
pub fn shape_rows(stream: SyncStream, rows: Vec<Row>) -> Result<Vec<Value>, ShapeError> {
    match stream {
        SyncStream::OrderRewards => shape(
            stream,
            rows,
            reshape::<Flat<OrderRewardKey, OrderRewardData>, OrderReward>,
        ),
        SyncStream::BatchRewards => shape(
            stream,
            rows,
            reshape::<Flat<BatchRewardKey, BatchRewardData>, BatchReward>,
        ),
        SyncStream::TokenImbalance => {
            shape(stream, rows, reshape::<TokenImbalance, TokenImbalance>)
        }
        SyncStream::PriceFeed => {
            shape(stream, rows, reshape::<PriceFeedEntry, PriceFeedEntry>)
        }
        SyncStream::AppData => shape(stream, rows, reshape::<ContentRefRow, ContentRef>),
    }
}

#[derive(Deserialize)]
struct ContentRefRow {
    app_hash: String,
    #[serde(deserialize_with = "block_number")]
    first_seen_block: u64,
}

impl From<ContentRefRow> for ContentRef {
    fn from(row: ContentRefRow) -> Self {
        ContentRef {
            app_hash: row.app_hash,
            first_seen_block: row.first_seen_block,
        }
    }
}

/// App hashes referenced by orders in the fetched rows.
pub fn content_refs(rows: Vec<Row>) -> Result<Vec<ContentRef>, ShapeError> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            serde_json::from_value::<ContentRefRow>(Value::Object(row))
                .map(ContentRef::from)
                .map_err(|source| ShapeError {
                    stream: SyncStream::AppData,
                    index,
                    source,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_order_reward_nests_data() {
        let raw = row(json!({
            "block_number": 16000000,
            "order_uid": "0x01",
            "tx_hash": "0x02",
            "solver": "0x03",
            "surplus_fee": "1000000000000000000000",
            "amount": 40.5,
            "quote_solver": "0x04",
            "protocol_fee": 0,
            "protocol_fee_token": null,
            "protocol_fee_native_price": "0.0",
            "quote_sell_amount": "123456789012345678901234567890",
            "quote_buy_amount": null,
            "quote_gas_cost": 1.5,
            "quote_sell_token_price": null
        }));
        let out = shape_rows(SyncStream::OrderRewards, vec![raw]).unwrap();
        assert_eq!(
            out[0],
            json!({
                "block_number": 16000000,
                "order_uid": "0x01",
                "tx_hash": "0x02",
                "solver": "0x03",
                "data": {
                    "surplus_fee": "1000000000000000000000",
                    "amount": 40.5,
                    "quote_solver": "0x04",
                    "protocol_fee": "0",
                    "protocol_fee_token": null,
                    "protocol_fee_native_price": 0.0,
                    "quote_sell_amount": "123456789012345678901234567890",
                    "quote_buy_amount": null,
                    "quote_gas_cost": 1.5,
                    "quote_sell_token_price": null
                }
            })
        );
    }

    #[test]
    fn test_batch_reward_unsettled_block() {
        let raw = row(json!({
            "block_number": null,
            "tx_hash": null,
            "solver": "0xaa",
            "block_deadline": "17000100",
            "uncapped_payment_eth": "-5",
            "capped_payment": "10",
            "execution_cost": "11",
            "surplus": "12",
            "fee": "13",
            "protocol_fee": "14",
            "winning_score": "15",
            "reference_score": "16",
            "participating_solvers": ["0xaa", "0xbb"]
        }));
        let out = shape_rows(SyncStream::BatchRewards, vec![raw]).unwrap();
        assert_eq!(out[0]["block_number"], Value::Null);
        assert_eq!(out[0]["block_deadline"], json!(17000100));
        assert_eq!(out[0]["data"]["uncapped_payment_eth"], json!("-5"));
        assert_eq!(out[0]["data"]["participating_solvers"], json!(["0xaa", "0xbb"]));
        assert!(out[0].get("solver").is_some());
        assert!(out[0]["data"].get("solver").is_none());
    }

    #[test]
    fn test_token_imbalance_amount_as_string() {
        let raw = row(json!({
            "block_number": 15200000,
            "tx_hash": "0x1",
            "token": "0x2",
            "amount": -42
        }));
        let out = shape_rows(SyncStream::TokenImbalance, vec![raw]).unwrap();
        assert_eq!(
            out[0],
            json!({"block_number": 15200000, "tx_hash": "0x1", "token": "0x2", "amount": "-42"})
        );
    }

    #[test]
    fn test_malformed_row_is_error() {
        let good = row(json!({"block_number": 1, "tx_hash": "a", "token": "b", "amount": "1"}));
        let bad = row(json!({"block_number": 1, "tx_hash": "a", "amount": "1"}));
        let err = shape_rows(SyncStream::TokenImbalance, vec![good, bad]).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.stream, SyncStream::TokenImbalance);
    }

    #[test]
    fn test_non_decimal_amount_rejected() {
        let bad = row(json!({"block_number": 1, "tx_hash": "a", "token": "b", "amount": "1e5"}));
        assert!(shape_rows(SyncStream::TokenImbalance, vec![bad]).is_err());
    }

    #[test]
    fn test_content_refs() {
        let rows = vec![
            row(json!({"app_hash": "0xab", "first_seen_block": 12153300})),
            row(json!({"app_hash": "0xcd", "first_seen_block": "12153301"})),
        ];
        let refs = content_refs(rows).unwrap();
        assert_eq!(refs[1].first_seen_block, 12153301);
        assert!(content_refs(vec![row(json!({"app_hash": "0x1"}))]).is_err());
    }

    #[test]
    fn test_is_decimal() {
        assert!(is_decimal("0"));
        assert!(is_decimal("-12.50"));
        assert!(!is_decimal(""));
        assert!(!is_decimal("1."));
        assert!(!is_decimal("abc"));
    }
}
