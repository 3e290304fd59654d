//! Instrument filtering and intra-day ordering of order groups.

use crate::index::OrderGroup;
use crate::types::Instrument;

/// Instrument identity as defined by the trading-data provider
///
/// Brokers qualify instruments differently, so the timeline never decides on
/// its own whether two instruments are the same.
pub trait InstrumentEquality {
    fn instruments_are_equal(&self, a: &Instrument, b: &Instrument) -> bool;
}

impl<F> InstrumentEquality for F
where
    F: Fn(&Instrument, &Instrument) -> bool,
{
    fn instruments_are_equal(&self, a: &Instrument, b: &Instrument) -> bool {
        self(a, b)
    }
}

/// Same symbol, and same exchange when both sides name one
#[derive(Debug, Clone, Copy, Default)]
pub struct SymbolEquality;

impl InstrumentEquality for SymbolEquality {
    fn instruments_are_equal(&self, a: &Instrument, b: &Instrument) -> bool {
        if a.symbol != b.symbol {
            return false;
        }
        match (&a.exchange, &b.exchange) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Which groups are visible for the current selection
#[derive(Clone, Copy)]
pub struct ViewFilter<'a> {
    pub selected: Option<&'a Instrument>,
    pub filtering_disabled: bool,
    pub equality: &'a dyn InstrumentEquality,
}

impl<'a> ViewFilter<'a> {
    pub fn new(
        selected: Option<&'a Instrument>,
        filtering_disabled: bool,
        equality: &'a dyn InstrumentEquality,
    ) -> Self {
        Self {
            selected,
            filtering_disabled,
            equality,
        }
    }

    /// Selected instrument, if filtering applies at all
    fn active_selection(&self) -> Option<&'a Instrument> {
        if self.filtering_disabled {
            return None;
        }
        self.selected
            .filter(|instrument| !instrument.symbol.is_empty())
    }

    /// Group passes if its first operation belongs to the selected instrument
    pub fn passes(&self, group: &OrderGroup) -> bool {
        let Some(selected) = self.active_selection() else {
            return true;
        };

        let first = group.first();
        match &first.instrument {
            Some(instrument) => self.equality.instruments_are_equal(instrument, selected),
            None => first.symbol == selected.symbol,
        }
    }

    /// Passing groups, most recent effective time first
    ///
    /// The sort is stable, so groups with equal times keep their input order.
    pub fn visible_groups<'g, I>(&self, groups: I) -> Vec<&'g OrderGroup>
    where
        I: IntoIterator<Item = &'g OrderGroup>,
    {
        let mut visible: Vec<&'g OrderGroup> =
            groups.into_iter().filter(|group| self.passes(group)).collect();
        visible.sort_by(|a, b| b.effective_time().cmp(&a.effective_time()));
        visible
    }
}
