/// Barter Timeline - Operation Timeline Library
///
/// Aggregates a live stream of trading operations (fills, fees) into a
/// bounded, date-grouped timeline:
/// - operations are normalised and bucketed by day and parent order
/// - groups are filtered by the selected instrument and ordered newest first
/// - a depth budget caps how many groups are rendered across all days
///
/// The library includes:
/// - Core data types for operation frames
/// - WebSocket feed client with reconnection
/// - Single-flight recompute scheduling for UI consumers
pub mod error;
pub mod feed;
pub mod filter;
pub mod flatten;
pub mod index;
pub mod normalizer;
pub mod scheduler;
pub mod settings;
pub mod summary;
pub mod timeline;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{SettingsError, TimelineError};
pub use feed::{FeedConfig, FeedStatus, TimelineFeed};
pub use filter::{InstrumentEquality, SymbolEquality, ViewFilter};
pub use flatten::{RenderNode, RenderSequence, flatten};
pub use index::{BucketIndex, OrderGroup};
pub use normalizer::{EventNormalizer, Ingested, Rejection};
pub use scheduler::RefreshScheduler;
pub use settings::{Depth, TimelineSettings};
pub use summary::{GroupSummary, Highlight};
pub use timeline::{SharedEquality, Timeline};
pub use types::{DateKey, Instrument, OperationEvent, OperationType, RawOperation};
