//! Two-level bucket index: day → parent order → operations.
//!
//! Alongside the buckets the index keeps an "empty indicator": for every
//! effective symbol, the set of days holding at least one of its groups. That
//! answers "is there anything to show for the selected instrument" without
//! scanning the buckets.
//!
//! All mutation is map lookups; ordering is computed at read time by
//! [`crate::filter`] and [`crate::flatten`].

use crate::types::{DateKey, OperationEvent};
use chrono::{DateTime, Utc};
use fnv::{FnvHashMap, FnvHashSet};
use smol_str::SmolStr;
use std::sync::Arc;
use tracing::trace;

/// Operations of one parent order on one day, in arrival order
///
/// Never empty: a group only comes into existence with its first operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderGroup {
    parent_id: SmolStr,
    events: Vec<Arc<OperationEvent>>,
}

impl OrderGroup {
    fn new(event: OperationEvent) -> Self {
        Self {
            parent_id: event.parent_id.clone(),
            events: vec![Arc::new(event)],
        }
    }

    /// Append unless an operation with the same id is already present
    fn push_unique(&mut self, event: OperationEvent) -> bool {
        if self
            .events
            .iter()
            .any(|existing| existing.operation_id == event.operation_id)
        {
            return false;
        }
        self.events.push(Arc::new(event));
        true
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn events(&self) -> &[Arc<OperationEvent>] {
        &self.events
    }

    pub fn first(&self) -> &OperationEvent {
        &self.events[0]
    }

    pub fn last(&self) -> &OperationEvent {
        &self.events[self.events.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Order time if the provider sent one, otherwise the latest fill time
    pub fn effective_time(&self) -> DateTime<Utc> {
        self.first()
            .parent_created_at
            .unwrap_or(self.last().created_at)
    }
}

/// Bucketed operation store plus per-symbol day indicator
#[derive(Debug, Clone, Default)]
pub struct BucketIndex {
    buckets: FnvHashMap<DateKey, FnvHashMap<SmolStr, OrderGroup>>,
    indicator: FnvHashMap<SmolStr, FnvHashSet<DateKey>>,
}

impl BucketIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an operation, returning `false` if it was a duplicate
    ///
    /// The event's day bucket is fixed by [`OperationEvent::date`]; a group is
    /// never moved to another day.
    pub fn insert(&mut self, event: OperationEvent) -> bool {
        let date = event.date;
        let symbol = SmolStr::from(event.effective_symbol());

        let groups = self.buckets.entry(date).or_default();
        let stored = match groups.get_mut(&event.parent_id) {
            Some(group) => group.push_unique(event),
            None => {
                groups.insert(event.parent_id.clone(), OrderGroup::new(event));
                true
            }
        };

        if stored {
            self.indicator.entry(symbol).or_default().insert(date);
        } else {
            trace!(%date, "duplicate operation dropped");
        }

        stored
    }

    /// Drop every bucket and indicator entry
    pub fn clear(&mut self) {
        self.buckets.clear();
        self.indicator.clear();
    }

    /// Day keys, most recent first
    pub fn buckets_descending(&self) -> Vec<DateKey> {
        let mut dates: Vec<DateKey> = self.buckets.keys().copied().collect();
        dates.sort_unstable_by(|a, b| b.cmp(a));
        dates
    }

    /// Groups stored under `date`, in no particular order
    pub fn groups_of(&self, date: &DateKey) -> impl Iterator<Item = &OrderGroup> + '_ {
        self.buckets
            .get(date)
            .into_iter()
            .flat_map(|groups| groups.values())
    }

    pub fn has_any_data(&self) -> bool {
        !self.buckets.is_empty()
    }

    /// Whether any day holds a group for `symbol`
    pub fn has_data_for(&self, symbol: &str) -> bool {
        self.indicator.contains_key(symbol)
    }

    /// Whether `date` holds a group for `symbol`
    pub fn has_data_for_date(&self, symbol: &str, date: &DateKey) -> bool {
        self.indicator
            .get(symbol)
            .is_some_and(|dates| dates.contains(date))
    }

    /// Total number of order groups across all days
    pub fn group_count(&self) -> usize {
        self.buckets.values().map(|groups| groups.len()).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Instrument, OperationType};
    use chrono::NaiveDateTime;

    /// Event on `created_at` (UTC, `YYYY-MM-DDTHH:MM`) bucketed by its UTC day
    pub(crate) fn event(
        operation_id: &str,
        parent_id: &str,
        created_at: &str,
        kind: OperationType,
        symbol: &str,
    ) -> OperationEvent {
        let created_at = NaiveDateTime::parse_from_str(created_at, "%Y-%m-%dT%H:%M")
            .unwrap()
            .and_utc();
        OperationEvent {
            operation_id: operation_id.into(),
            parent_id: parent_id.into(),
            created_at,
            parent_created_at: None,
            date: DateKey::new(created_at.date_naive()),
            kind,
            instrument: Some(Instrument::from_symbol(symbol)),
            symbol: symbol.into(),
            price: 100.0,
            quantity: 1.0,
            commission: 0.0,
        }
    }

    #[test]
    fn test_same_parent_same_day_groups_together() {
        let mut index = BucketIndex::new();
        assert!(index.insert(event("a", "P1", "2024-05-01T10:00", OperationType::Buy, "X")));
        assert!(index.insert(event("b", "P1", "2024-05-01T10:05", OperationType::Buy, "X")));

        let dates = index.buckets_descending();
        assert_eq!(dates, vec![DateKey::from_ymd(2024, 5, 1).unwrap()]);

        let groups: Vec<_> = index.groups_of(&dates[0]).collect();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].parent_id(), "P1");
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[0].first().operation_id, "a");
        assert_eq!(groups[0].last().operation_id, "b");
    }

    #[test]
    fn test_duplicate_operation_is_idempotent() {
        let mut index = BucketIndex::new();
        let first = event("a", "P1", "2024-05-01T10:00", OperationType::Buy, "X");

        assert!(index.insert(first.clone()));
        assert!(!index.insert(first));

        let date = DateKey::from_ymd(2024, 5, 1).unwrap();
        assert_eq!(index.groups_of(&date).next().unwrap().len(), 1);
        assert_eq!(index.group_count(), 1);
    }

    #[test]
    fn test_parent_split_across_days_stays_in_own_bucket() {
        let mut index = BucketIndex::new();
        index.insert(event("a", "P1", "2024-05-01T23:59", OperationType::Buy, "X"));
        index.insert(event("b", "P1", "2024-05-02T00:01", OperationType::Buy, "X"));

        assert_eq!(index.group_count(), 2);
        assert_eq!(
            index.buckets_descending(),
            vec![
                DateKey::from_ymd(2024, 5, 2).unwrap(),
                DateKey::from_ymd(2024, 5, 1).unwrap()
            ]
        );
    }

    #[test]
    fn test_empty_indicator_tracks_effective_symbol() {
        let mut index = BucketIndex::new();
        let may_1 = DateKey::from_ymd(2024, 5, 1).unwrap();
        let may_2 = DateKey::from_ymd(2024, 5, 2).unwrap();

        let mut fee = event("f", "F1", "2024-05-02T09:00", OperationType::Other, "RAW");
        fee.instrument = None;
        index.insert(fee);
        index.insert(event("a", "P1", "2024-05-01T10:00", OperationType::Buy, "X"));

        assert!(index.has_data_for("RAW"));
        assert!(index.has_data_for("X"));
        assert!(!index.has_data_for("Y"));
        assert!(index.has_data_for_date("X", &may_1));
        assert!(!index.has_data_for_date("X", &may_2));
        assert!(index.has_data_for_date("RAW", &may_2));
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut index = BucketIndex::new();
        index.insert(event("a", "P1", "2024-05-01T10:00", OperationType::Buy, "X"));
        assert!(index.has_any_data());

        index.clear();

        assert!(!index.has_any_data());
        assert!(!index.has_data_for("X"));
        assert!(index.buckets_descending().is_empty());
        assert_eq!(index.group_count(), 0);
    }
}
