//! Widget settings as stored in the timeline document.
//!
//! Range checks happen here, so the rest of the crate only ever sees a
//! validated [`Depth`].

use crate::error::SettingsError;
use serde::{Deserialize, Serialize};

pub const MIN_DEPTH: i64 = 1;
pub const MAX_DEPTH: i64 = 100;
pub const DEFAULT_DEPTH: Depth = Depth(100);

/// Maximum number of order groups rendered across the whole timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Depth(u8);

impl Depth {
    pub fn new(value: i64) -> Result<Self, SettingsError> {
        if (MIN_DEPTH..=MAX_DEPTH).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(SettingsError::DepthOutOfRange(value))
        }
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl Default for Depth {
    fn default() -> Self {
        DEFAULT_DEPTH
    }
}

impl TryFrom<i64> for Depth {
    type Error = SettingsError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Depth> for i64 {
    fn from(depth: Depth) -> Self {
        i64::from(depth.0)
    }
}

/// Timeline widget settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimelineSettings {
    /// Trader that sources the operation feed
    pub timeline_trader_id: Option<String>,
    pub depth: Depth,
    /// Colour buys/sells/fees differently
    pub highlight_trades: bool,
    /// Show every instrument, ignoring the selected one
    pub disable_instrument_filtering: bool,
    pub show_commissions: bool,
}

impl TimelineSettings {
    /// Load from `TIMELINE_*` environment variables
    ///
    /// - `TIMELINE_TRADER_ID`
    /// - `TIMELINE_DEPTH` (default 100)
    /// - `TIMELINE_HIGHLIGHT_TRADES`, `TIMELINE_DISABLE_FILTERING`,
    ///   `TIMELINE_SHOW_COMMISSIONS` (`1`/`true`/`yes`/`on`)
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let depth = match lookup("TIMELINE_DEPTH") {
            Some(raw) => {
                let value = raw
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| SettingsError::InvalidValue {
                        key: "TIMELINE_DEPTH",
                        value: raw.clone(),
                    })?;
                Depth::new(value)?
            }
            None => DEFAULT_DEPTH,
        };

        Ok(Self {
            timeline_trader_id: lookup("TIMELINE_TRADER_ID").filter(|id| !id.trim().is_empty()),
            depth,
            highlight_trades: flag(&lookup, "TIMELINE_HIGHLIGHT_TRADES")?,
            disable_instrument_filtering: flag(&lookup, "TIMELINE_DISABLE_FILTERING")?,
            show_commissions: flag(&lookup, "TIMELINE_SHOW_COMMISSIONS")?,
        })
    }
}

fn flag<F>(lookup: &F, key: &'static str) -> Result<bool, SettingsError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::InvalidValue { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_depth_range() {
        struct TestCase {
            input: i64,
            expected: Result<usize, SettingsError>,
        }

        let tests = vec![
            TestCase {
                // TC0: lower bound
                input: 1,
                expected: Ok(1),
            },
            TestCase {
                // TC1: upper bound
                input: 100,
                expected: Ok(100),
            },
            TestCase {
                // TC2: zero
                input: 0,
                expected: Err(SettingsError::DepthOutOfRange(0)),
            },
            TestCase {
                // TC3: above range
                input: 101,
                expected: Err(SettingsError::DepthOutOfRange(101)),
            },
            TestCase {
                // TC4: negative
                input: -5,
                expected: Err(SettingsError::DepthOutOfRange(-5)),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = Depth::new(test.input).map(Depth::get);
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_document_round_trip_uses_camel_case() {
        let settings: TimelineSettings = serde_json::from_str(
            r#"{"timelineTraderId": "t-1", "depth": 25, "disableInstrumentFiltering": true}"#,
        )
        .unwrap();

        assert_eq!(settings.timeline_trader_id.as_deref(), Some("t-1"));
        assert_eq!(settings.depth.get(), 25);
        assert!(settings.disable_instrument_filtering);
        assert!(!settings.show_commissions);

        let missing_depth: TimelineSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(missing_depth.depth, DEFAULT_DEPTH);

        assert!(serde_json::from_str::<TimelineSettings>(r#"{"depth": 500}"#).is_err());
    }

    #[test]
    fn test_from_lookup() {
        let settings = TimelineSettings::from_lookup(lookup(&[
            ("TIMELINE_TRADER_ID", "alor"),
            ("TIMELINE_DEPTH", "10"),
            ("TIMELINE_SHOW_COMMISSIONS", "yes"),
        ]))
        .unwrap();

        assert_eq!(settings.timeline_trader_id.as_deref(), Some("alor"));
        assert_eq!(settings.depth.get(), 10);
        assert!(settings.show_commissions);
        assert!(!settings.highlight_trades);

        assert_eq!(
            TimelineSettings::from_lookup(lookup(&[("TIMELINE_DEPTH", "ten")])),
            Err(SettingsError::InvalidValue {
                key: "TIMELINE_DEPTH",
                value: "ten".to_string()
            })
        );
        assert_eq!(
            TimelineSettings::from_lookup(lookup(&[("TIMELINE_DEPTH", "0")])),
            Err(SettingsError::DepthOutOfRange(0))
        );
        assert!(
            TimelineSettings::from_lookup(lookup(&[("TIMELINE_TRADER_ID", "  ")]))
                .unwrap()
                .timeline_trader_id
                .is_none()
        );
    }
}
