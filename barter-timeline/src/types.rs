/// Core data types for trading operation events
///
/// These types match the JSON operation frames pushed by a timeline feed
/// (see [`crate::feed`]) and the normalised records stored in the index.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::fmt;

/// Sentinel `operationId` that wipes the whole timeline.
pub const CLEAR_OPERATION_ID: &str = "@CLEAR";

/// Operation kind as reported by the trading-data provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    #[serde(alias = "OPERATION_TYPE_BUY")]
    Buy,
    #[serde(alias = "OPERATION_TYPE_SELL")]
    Sell,
    #[serde(alias = "OPERATION_TYPE_LOCATE_FEE")]
    LocateFee,
    #[default]
    #[serde(other)]
    Other,
}

impl OperationType {
    /// Convert to display string
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Buy => "Buy",
            OperationType::Sell => "Sell",
            OperationType::LocateFee => "Locate fee",
            OperationType::Other => "Other",
        }
    }

    /// Buys, sells and locate fees carry price/quantity worth summing.
    pub fn is_trade(&self) -> bool {
        matches!(
            self,
            OperationType::Buy | OperationType::Sell | OperationType::LocateFee
        )
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Instrument reference attached to an operation
///
/// Identity is broker-qualified: two instruments with the same symbol on
/// different exchanges are not necessarily the same thing, which is why
/// equality is delegated to [`crate::filter::InstrumentEquality`].
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Instrument {
    /// Ticker symbol (e.g., "AAPL", "SBER")
    pub symbol: SmolStr,
    /// Exchange or broker the instrument is listed with
    #[serde(default, alias = "broker")]
    pub exchange: Option<SmolStr>,
    /// Human readable name
    #[serde(default)]
    pub full_name: Option<String>,
    /// Instrument class (e.g., "stock", "future", "bond")
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    /// Contract multiplier, 1 when absent
    #[serde(default)]
    pub lot: Option<f64>,
}

impl Instrument {
    /// Bare instrument known only by its symbol
    pub fn from_symbol(symbol: impl Into<SmolStr>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: None,
            full_name: None,
            kind: None,
            lot: None,
        }
    }

    /// Set the exchange
    pub fn with_exchange(mut self, exchange: impl Into<SmolStr>) -> Self {
        self.exchange = Some(exchange.into());
        self
    }

    /// Set the contract multiplier
    pub fn with_lot(mut self, lot: f64) -> Self {
        self.lot = Some(lot);
        self
    }

    pub fn lot(&self) -> f64 {
        self.lot.unwrap_or(1.0)
    }

    /// Full name, falling back to the symbol
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.symbol)
    }
}

/// Calendar day bucket key, rendered as `YYYY-MM-DD`
///
/// Ordering is calendar ordering, so sorting descending yields the most recent
/// day first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DateKey(NaiveDate);

impl DateKey {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// Build from a calendar date, `None` if the date does not exist
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// Operation frame exactly as it arrives from the feed
///
/// Every field is optional on the wire; [`crate::normalizer::EventNormalizer`]
/// decides what is usable. Numbers and timestamps are read leniently so one
/// bad field never costs the whole operation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawOperation {
    pub operation_id: Option<String>,
    pub parent_id: Option<String>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub parent_created_at: Option<DateTime<Utc>>,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub instrument: Option<Instrument>,
    pub symbol: Option<SmolStr>,
    #[serde(deserialize_with = "lenient_number")]
    pub price: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub quantity: f64,
    #[serde(deserialize_with = "lenient_number")]
    pub commission: f64,
}

/// Finite number or numeric string, anything else is zero
pub fn coerce_number(value: &Value) -> f64 {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    number.filter(|n| n.is_finite()).unwrap_or(0.0)
}

/// RFC 3339 string or epoch milliseconds, anything else is `None`
pub fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => text.trim().parse::<DateTime<Utc>>().ok(),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|millis| millis.is_finite())
                    .map(|millis| millis as i64)
            })
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| coerce_number(&value))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(|value| coerce_timestamp(&value))
}

impl RawOperation {
    /// The `@CLEAR` control frame
    pub fn clear() -> Self {
        Self {
            operation_id: Some(CLEAR_OPERATION_ID.to_string()),
            ..Default::default()
        }
    }

    pub fn is_clear(&self) -> bool {
        self.operation_id.as_deref() == Some(CLEAR_OPERATION_ID)
    }
}

/// Validated operation stored in the timeline
#[derive(Debug, Clone, PartialEq)]
pub struct OperationEvent {
    pub operation_id: SmolStr,
    pub parent_id: SmolStr,
    pub created_at: DateTime<Utc>,
    pub parent_created_at: Option<DateTime<Utc>>,
    /// Day bucket, fixed at normalisation time
    pub date: DateKey,
    pub kind: OperationType,
    pub instrument: Option<Instrument>,
    pub symbol: SmolStr,
    pub price: f64,
    pub quantity: f64,
    pub commission: f64,
}

impl OperationEvent {
    /// Instrument symbol if an instrument is attached, raw symbol otherwise
    pub fn effective_symbol(&self) -> &str {
        self.instrument
            .as_ref()
            .map(|instrument| instrument.symbol.as_str())
            .unwrap_or(&self.symbol)
    }
}
