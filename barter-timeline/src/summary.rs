//! Per-group figures shown on a timeline card.

use crate::index::OrderGroup;
use crate::types::{Instrument, OperationType};
use chrono::{DateTime, Utc};

/// Card colouring, only applied when trade highlighting is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Highlight {
    Positive,
    Negative,
    Earth,
}

impl Highlight {
    fn for_side(side: OperationType) -> Option<Self> {
        match side {
            OperationType::Buy => Some(Highlight::Positive),
            OperationType::Sell => Some(Highlight::Negative),
            OperationType::LocateFee => Some(Highlight::Earth),
            OperationType::Other => None,
        }
    }
}

/// Aggregated view of one [`OrderGroup`]
///
/// Quantity, price and amount only count trade-like operations. Commission
/// counts every operation in the group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSummary {
    /// Kind of the first operation
    pub side: OperationType,
    /// Instrument of the first operation
    pub instrument: Option<Instrument>,
    pub total_quantity: f64,
    /// `total_quantity` times the instrument lot
    pub traded_units: f64,
    pub average_price: Option<f64>,
    /// Signed turnover, negative when the group contains a buy
    pub amount: Option<f64>,
    /// Amount is income (group opened with a sell)
    pub amount_positive: bool,
    pub commission: Option<f64>,
    pub highlight: Option<Highlight>,
    /// Character shown when no instrument icon is available
    pub logo_fallback: Option<char>,
    pub effective_time: DateTime<Utc>,
}

impl GroupSummary {
    pub fn new(group: &OrderGroup, highlight_trades: bool) -> Self {
        let first = group.first();
        let instrument = first.instrument.clone();
        let lot = instrument.as_ref().map_or(1.0, Instrument::lot);

        let mut total_quantity = 0.0;
        let mut turnover = 0.0;
        let mut has_buy = false;
        let mut commission = 0.0;

        for event in group.events() {
            commission += event.commission;
            if !event.kind.is_trade() {
                continue;
            }
            has_buy |= event.kind == OperationType::Buy;
            total_quantity += event.quantity;
            turnover += event.price * event.quantity;
        }

        let average_price = (total_quantity != 0.0).then(|| turnover / total_quantity);
        let amount = instrument.as_ref().map(|instrument| {
            let signed = if has_buy { -turnover } else { turnover };
            signed * instrument.lot()
        });

        let logo_fallback = if first.kind.is_trade() {
            first.effective_symbol().chars().next()
        } else {
            None
        };

        Self {
            side: first.kind,
            total_quantity,
            traded_units: total_quantity * lot,
            average_price,
            amount,
            amount_positive: first.kind == OperationType::Sell,
            commission: instrument.as_ref().map(|_| commission.abs()),
            highlight: highlight_trades
                .then(|| Highlight::for_side(first.kind))
                .flatten(),
            logo_fallback,
            effective_time: group.effective_time(),
            instrument,
        }
    }

    /// Card headline, e.g. `Bought 10 Apple Inc.`
    pub fn title(&self) -> Option<String> {
        let instrument = self.instrument.as_ref()?;
        let verb = match self.side {
            OperationType::Buy => "Bought",
            OperationType::Sell => "Sold",
            OperationType::LocateFee => "Locate fee for",
            OperationType::Other => return None,
        };
        Some(format!(
            "{verb} {} {}",
            format_decimal(self.traded_units, 4),
            instrument.display_name()
        ))
    }

    /// Card subtitle, e.g. `10 lots at 101.5`
    pub fn description(&self) -> Option<String> {
        if !self.side.is_trade() {
            return None;
        }
        let price = self
            .average_price
            .map_or_else(|| "-".to_string(), |price| format_decimal(price, 4));
        Some(format!(
            "{} lots at {price}",
            format_decimal(self.total_quantity, 4)
        ))
    }
}

/// Fixed-point rendering without trailing zeros
pub fn format_decimal(value: f64, max_fraction_digits: usize) -> String {
    let formatted = format!("{value:.max_fraction_digits$}");
    if !formatted.contains('.') {
        return formatted;
    }
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" => "0".to_string(),
        other => other.to_string(),
    }
}
