//! Price detection and numeric normalisation
//!
//! Candidates are searched in tiers; the first tier with a plausible match
//! wins, and within a tier the earliest match in the text wins:
//!
//! 1. currency symbol + number (`$1,200.00`) or number + code (`1200 USD`)
//! 2. labelled number (`Price: 1200`)
//! 3. number with grouping or decimals (`1,200` / `19.99`)
//! 4. any number
//!
//! Only `.` is treated as a decimal separator; `,` is always grouping.

use std::sync::LazyLock;

use regex::Regex;

use crate::monitor::ItemType;

static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[$€£¥₹]\s*\d[\d,]*(?:\.\d+)?|\d[\d,]*(?:\.\d+)?\s*(?:USD|EUR|GBP|JPY|INR|BTC|ETH)\b",
    )
    .expect("currency pattern compiles")
});

static LABELLED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:current price|price|value|cost)\s*:\s*[$€£¥₹]?\s*(\d[\d,]*(?:\.\d+)?)")
        .expect("labelled pattern compiles")
});

static FORMATTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,3}(?:,\d{3})+(?:\.\d+)?\b|\b\d+\.\d+\b").expect("formatted pattern compiles")
});

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("number pattern compiles"));

/// Find the preferred price in `text`, returned as it appears on the page
pub fn find_price(text: &str, item_type: Option<ItemType>) -> Option<String> {
    let plausible = |candidate: &str| {
        parse_price(candidate).is_some_and(|value| is_plausible(value, item_type))
    };

    let tiers: [&dyn Fn(&str) -> Vec<String>; 4] = [
        &|t| matches(&CURRENCY, t),
        &|t| {
            LABELLED
                .captures_iter(t)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .collect()
        },
        &|t| matches(&FORMATTED, t),
        &|t| matches(&NUMBER, t),
    ];

    tiers
        .iter()
        .find_map(|tier| tier(text).into_iter().find(|c| plausible(c)))
}

fn matches(re: &Regex, text: &str) -> Vec<String> {
    re.find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Numeric value of the first number in `text`, ignoring currency and grouping
///
/// `"$1,200.00"`, `"1200"` and `"1,200 USD"` all parse to `1200.0`.
pub fn parse_price(text: &str) -> Option<f64> {
    let number = NUMBER.find(text)?;
    number.as_str().replace(',', "").parse::<f64>().ok()
}

fn is_plausible(value: f64, item_type: Option<ItemType>) -> bool {
    match item_type {
        Some(ItemType::Crypto) => value > 1.0,
        Some(ItemType::Stock) => (0.01..=10_000.0).contains(&value),
        Some(ItemType::Product) => (0.01..=100_000.0).contains(&value),
        _ => true,
    }
}
