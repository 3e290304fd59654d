use thiserror::Error;

/// Settings rejected at the configuration boundary.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SettingsError {
    #[error("depth must be within 1..=100, got {0}")]
    DepthOutOfRange(i64),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// All errors generated in `barter-timeline`.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum TimelineError {
    #[error("timeline trader is missing")]
    MissingTrader,

    #[error("invalid settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("SocketError: {0}")]
    Socket(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for TimelineError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeline_error_display() {
        struct TestCase {
            input: TimelineError,
            expected: &'static str,
        }

        let tests = vec![
            TestCase {
                // TC0: no trader configured
                input: TimelineError::MissingTrader,
                expected: "timeline trader is missing",
            },
            TestCase {
                // TC1: depth out of range
                input: TimelineError::from(SettingsError::DepthOutOfRange(0)),
                expected: "invalid settings: depth must be within 1..=100, got 0",
            },
            TestCase {
                // TC2: socket error from the feed
                input: TimelineError::from(tokio_tungstenite::tungstenite::Error::ConnectionClosed),
                expected: "SocketError: Connection closed normally",
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = test.input.to_string();
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }
}
