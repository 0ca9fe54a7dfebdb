//! Decide whether a new observed value is a real change
//!
//! Values are compared by exact string equality, except for the `price`
//! strategy where both sides are parsed as numbers first so that
//! `"$1,200.00"` and `"1200"` compare equal. When either side fails to parse,
//! price values fall back to string equality.

use serde::{Deserialize, Serialize};

use crate::extract::parse_price;
use crate::monitor::{Monitor, Strategy};

/// Upper bound on a change summary, in characters
pub const MAX_SUMMARY_CHARS: usize = 280;

/// Characters kept from each side of a non-price summary
const SIDE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    PriceIncrease,
    PriceDecrease,
    ValueChange,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::PriceIncrease => "price_increase",
            ChangeKind::PriceDecrease => "price_decrease",
            ChangeKind::ValueChange => "value_change",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub old: String,
    pub new: String,
    pub kind: ChangeKind,
    /// Short human-readable `old → new`, at most [`MAX_SUMMARY_CHARS`]
    pub summary: String,
}

/// Outcome of comparing one observation against the stored value
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    /// First observation for the monitor; becomes the baseline silently
    Baseline(String),
    Unchanged,
    Changed(Change),
}

impl Detection {
    pub fn is_changed(&self) -> bool {
        matches!(self, Detection::Changed(_))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector;

impl ChangeDetector {
    pub fn detect(&self, monitor: &Monitor, observed: &str) -> Detection {
        let Some(previous) = monitor.state.current_value.as_deref() else {
            return Detection::Baseline(observed.to_string());
        };

        match monitor.strategy {
            Strategy::Price => price_change(previous, observed),
            _ if previous == observed => Detection::Unchanged,
            _ => Detection::Changed(Change {
                old: previous.to_string(),
                new: observed.to_string(),
                kind: ChangeKind::ValueChange,
                summary: summarize(previous, observed),
            }),
        }
    }
}

fn price_change(previous: &str, observed: &str) -> Detection {
    match (parse_price(previous), parse_price(observed)) {
        (Some(old), Some(new)) if old == new => Detection::Unchanged,
        (Some(old), Some(new)) => {
            let kind = if new > old {
                ChangeKind::PriceIncrease
            } else {
                ChangeKind::PriceDecrease
            };

            let mut summary = format!("{previous} → {observed}");
            if old != 0.0 {
                summary.push_str(&format!(" ({:+.2}%)", (new - old) / old * 100.0));
            }

            Detection::Changed(Change {
                old: previous.to_string(),
                new: observed.to_string(),
                kind,
                summary: elide(&summary, MAX_SUMMARY_CHARS),
            })
        }
        _ if previous == observed => Detection::Unchanged,
        _ => Detection::Changed(Change {
            old: previous.to_string(),
            new: observed.to_string(),
            kind: ChangeKind::ValueChange,
            summary: summarize(previous, observed),
        }),
    }
}

fn summarize(old: &str, new: &str) -> String {
    let summary = format!("{} → {}", elide(old, SIDE_CHARS), elide(new, SIDE_CHARS));
    elide(&summary, MAX_SUMMARY_CHARS)
}

fn elide(value: &str, max: usize) -> String {
    match value.char_indices().nth(max.saturating_sub(1)) {
        Some((idx, _)) if value[idx..].chars().count() > 1 => format!("{}…", &value[..idx]),
        _ => value.to_string(),
    }
}
