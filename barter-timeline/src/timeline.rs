//! The timeline aggregate: normaliser, index, settings and selection.

use crate::error::TimelineError;
use crate::filter::{InstrumentEquality, ViewFilter};
use crate::flatten::{RenderSequence, flatten};
use crate::index::BucketIndex;
use crate::normalizer::{EventNormalizer, Ingested};
use crate::settings::TimelineSettings;
use crate::types::{Instrument, RawOperation};
use std::sync::Arc;
use tracing::debug;

/// Shared equality collaborator
pub type SharedEquality = Arc<dyn InstrumentEquality + Send + Sync>;

/// Live operation timeline
///
/// Mutated one frame at a time by [`Timeline::ingest`]; read through
/// [`Timeline::render`], which always rebuilds the full sequence.
pub struct Timeline {
    normalizer: EventNormalizer,
    index: BucketIndex,
    settings: TimelineSettings,
    selected: Option<Instrument>,
    equality: SharedEquality,
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("normalizer", &self.normalizer)
            .field("index", &self.index)
            .field("settings", &self.settings)
            .field("selected", &self.selected)
            .finish_non_exhaustive()
    }
}

impl Timeline {
    /// Activate with the given settings
    ///
    /// Fails with [`TimelineError::MissingTrader`] when no trader sources the
    /// operation feed.
    pub fn activate(
        settings: TimelineSettings,
        equality: SharedEquality,
    ) -> Result<Self, TimelineError> {
        let has_trader = settings
            .timeline_trader_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        if !has_trader {
            return Err(TimelineError::MissingTrader);
        }

        Ok(Self {
            normalizer: EventNormalizer::local(),
            index: BucketIndex::new(),
            settings,
            selected: None,
            equality,
        })
    }

    /// Replace the normaliser, e.g. to bucket days at a fixed offset
    pub fn with_normalizer(mut self, normalizer: EventNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Apply one raw frame, returning whether the index changed
    pub fn ingest(&mut self, raw: RawOperation) -> bool {
        match self.normalizer.ingest(raw) {
            Ingested::Event(event) => self.index.insert(event),
            Ingested::Clear => {
                debug!(groups = self.index.group_count(), "timeline cleared");
                self.index.clear();
                true
            }
            Ingested::Rejected(reason) => {
                debug!(?reason, "operation dropped");
                false
            }
        }
    }

    pub fn select_instrument(&mut self, instrument: Option<Instrument>) {
        self.selected = instrument;
    }

    pub fn selected_instrument(&self) -> Option<&Instrument> {
        self.selected.as_ref()
    }

    pub fn settings(&self) -> &TimelineSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut TimelineSettings {
        &mut self.settings
    }

    pub fn index(&self) -> &BucketIndex {
        &self.index
    }

    /// Nothing to show for the current selection
    pub fn is_empty(&self) -> bool {
        match &self.selected {
            Some(selected)
                if !self.settings.disable_instrument_filtering && !selected.symbol.is_empty() =>
            {
                !self.index.has_data_for(&selected.symbol)
            }
            _ => !self.index.has_any_data(),
        }
    }

    /// Flatten the index under the current selection and settings
    pub fn render(&self) -> RenderSequence {
        let filter = ViewFilter::new(
            self.selected.as_ref(),
            self.settings.disable_instrument_filtering,
            self.equality.as_ref(),
        );
        flatten(&self.index, &filter, self.settings.depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::SymbolEquality;
    use crate::flatten::RenderNode;
    use crate::settings::Depth;
    use crate::types::{DateKey, OperationType};
    use chrono::FixedOffset;

    fn settings() -> TimelineSettings {
        TimelineSettings {
            timeline_trader_id: Some("alor".to_string()),
            ..Default::default()
        }
    }

    fn timeline(settings: TimelineSettings) -> Timeline {
        Timeline::activate(settings, Arc::new(SymbolEquality))
            .unwrap()
            .with_normalizer(EventNormalizer::with_offset(FixedOffset::east_opt(0).unwrap()))
    }

    fn raw(operation_id: &str, parent_id: &str, created_at: &str, kind: OperationType, symbol: &str) -> RawOperation {
        RawOperation {
            operation_id: Some(operation_id.to_string()),
            parent_id: Some(parent_id.to_string()),
            created_at: Some(created_at.parse().unwrap()),
            kind,
            instrument: Some(Instrument::from_symbol(symbol)),
            price: 1.0,
            quantity: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_activate_requires_trader() {
        struct TestCase {
            trader: Option<&'static str>,
            expected: Result<(), TimelineError>,
        }

        let tests = vec![
            TestCase {
                // TC0: trader configured
                trader: Some("alor"),
                expected: Ok(()),
            },
            TestCase {
                // TC1: no trader
                trader: None,
                expected: Err(TimelineError::MissingTrader),
            },
            TestCase {
                // TC2: blank trader
                trader: Some(" "),
                expected: Err(TimelineError::MissingTrader),
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let settings = TimelineSettings {
                timeline_trader_id: test.trader.map(str::to_string),
                ..Default::default()
            };
            let actual = Timeline::activate(settings, Arc::new(SymbolEquality)).map(|_| ());
            assert_eq!(actual, test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_scenario_a_same_parent_one_group() {
        let mut timeline = timeline(settings());
        assert!(timeline.ingest(raw("a", "P1", "2024-05-01T10:00:00Z", OperationType::Buy, "X")));
        assert!(timeline.ingest(raw("b", "P1", "2024-05-01T10:05:00Z", OperationType::Buy, "X")));
        assert!(!timeline.ingest(raw("b", "P1", "2024-05-01T10:05:00Z", OperationType::Buy, "X")));

        let sequence = timeline.render();

        assert_eq!(
            sequence.nodes()[0],
            RenderNode::DateHeadline(DateKey::from_ymd(2024, 5, 1).unwrap())
        );
        assert_eq!(sequence.group_count(), 1);
        assert_eq!(sequence.groups().next().unwrap().len(), 2);
    }

    #[test]
    fn test_selection_and_settings_drive_render() {
        let mut timeline = timeline(settings());
        timeline.ingest(raw("s", "SELL-Y", "2024-05-02T12:00:00Z", OperationType::Sell, "Y"));
        timeline.ingest(raw("b", "BUY-X", "2024-05-01T12:00:00Z", OperationType::Buy, "X"));

        timeline.select_instrument(Some(Instrument::from_symbol("Y")));
        assert_eq!(timeline.render().group_count(), 1);

        timeline.settings_mut().disable_instrument_filtering = true;
        assert_eq!(timeline.render().group_count(), 2);

        timeline.settings_mut().depth = Depth::new(1).unwrap();
        assert_eq!(timeline.render().group_count(), 1);
    }

    #[test]
    fn test_is_empty_follows_selection() {
        let mut timeline = timeline(settings());
        assert!(timeline.is_empty());

        timeline.ingest(raw("a", "P1", "2024-05-01T10:00:00Z", OperationType::Buy, "X"));
        assert!(!timeline.is_empty());

        timeline.select_instrument(Some(Instrument::from_symbol("Y")));
        assert!(timeline.is_empty());

        timeline.settings_mut().disable_instrument_filtering = true;
        assert!(!timeline.is_empty());

        timeline.settings_mut().disable_instrument_filtering = false;
        timeline.select_instrument(Some(Instrument::from_symbol("X")));
        assert!(!timeline.is_empty());
    }

    #[test]
    fn test_clear_and_rejections() {
        let mut timeline = timeline(settings());
        timeline.ingest(raw("a", "P1", "2024-05-01T10:00:00Z", OperationType::Buy, "X"));

        let mut missing_time = raw("b", "P2", "2024-05-01T10:00:00Z", OperationType::Buy, "X");
        missing_time.created_at = None;
        assert!(!timeline.ingest(missing_time));
        assert!(!timeline.ingest(RawOperation::default()));

        assert!(timeline.ingest(RawOperation::clear()));
        assert!(timeline.is_empty());
        assert!(timeline.render().is_empty());
    }
}
