//! Validation and classification of raw feed frames.
//!
//! Every frame ends up in exactly one of three buckets: a usable
//! [`OperationEvent`], the `@CLEAR` control signal, or a silent rejection.
//! Nothing here returns an error; the feed is treated as an unreliable stream
//! and bad frames are dropped rather than surfaced.

use crate::types::{DateKey, OperationEvent, RawOperation};
use chrono::{DateTime, FixedOffset, Local, Utc};
use smol_str::SmolStr;

/// Outcome of normalising one raw frame
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Event(OperationEvent),
    Clear,
    Rejected(Rejection),
}

/// Why a frame was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingOperationId,
    MissingCreatedAt,
}

/// Turns [`RawOperation`] frames into [`Ingested`] outcomes
///
/// Day buckets are computed in local time unless a fixed offset is supplied.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventNormalizer {
    offset: Option<FixedOffset>,
}

impl EventNormalizer {
    /// Bucket days in the machine's local time zone
    pub fn local() -> Self {
        Self { offset: None }
    }

    /// Bucket days at a fixed UTC offset
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset: Some(offset),
        }
    }

    /// Calendar day `time` falls on in this normaliser's time zone
    pub fn date_key(&self, time: &DateTime<Utc>) -> DateKey {
        let date = match self.offset {
            Some(offset) => time.with_timezone(&offset).date_naive(),
            None => time.with_timezone(&Local).date_naive(),
        };
        DateKey::new(date)
    }

    pub fn ingest(&self, raw: RawOperation) -> Ingested {
        if raw.is_clear() {
            return Ingested::Clear;
        }

        let Some(operation_id) = raw.operation_id.map(SmolStr::from) else {
            return Ingested::Rejected(Rejection::MissingOperationId);
        };
        let Some(created_at) = raw.created_at else {
            return Ingested::Rejected(Rejection::MissingCreatedAt);
        };

        // Parentless operations form a group of their own
        let parent_id = raw
            .parent_id
            .map(SmolStr::from)
            .unwrap_or_else(|| operation_id.clone());

        Ingested::Event(OperationEvent {
            date: self.date_key(&created_at),
            operation_id,
            parent_id,
            created_at,
            parent_created_at: raw.parent_created_at,
            kind: raw.kind,
            instrument: raw.instrument,
            symbol: raw.symbol.unwrap_or_default(),
            price: raw.price,
            quantity: raw.quantity,
            commission: raw.commission,
        })
    }
}
