//! Turn a fetched page into the single string value a monitor compares
//!
//! Every strategy is a pure function of `(body, request)`: the same page and
//! monitor configuration always yield the same value. Failure to locate the
//! requested content is an [`ExtractError`], never an empty string.

mod price;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;

use crate::config::ExtractorConfig;
use crate::monitor::{ItemType, Monitor, Strategy};

pub use price::{find_price, parse_price};

/// Never part of visible text
const HIDDEN_TAGS: &[&str] = &["head", "script", "style", "noscript", "template", "svg"];

/// Page chrome skipped by the content strategy
const CHROME_TAGS: &[&str] = &["nav", "header", "footer", "aside"];

/// Attributes that commonly carry a machine-readable value
const VALUE_ATTRIBUTES: &[&str] = &["data-price", "data-value", "content", "value"];

/// Preferred main-content regions, most specific first
static MAIN_REGIONS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [
        "article",
        "main",
        "[role=main]",
        "#content",
        ".content",
        ".main-content",
        ".post-content",
        ".entry-content",
        ".article-content",
    ]
    .iter()
    .filter_map(|s| Selector::parse(s).ok())
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no element matches selector '{0}'")]
    SelectorNotFound(String),

    #[error("invalid CSS selector '{0}'")]
    InvalidSelector(String),

    #[error("no price found on page")]
    NoPriceFound,

    #[error("item '{0}' not found on page")]
    ItemNotFound(String),

    #[error("malformed content: {0}")]
    MalformedContent(String),
}

impl ExtractError {
    /// Actionable text for an interactive caller
    pub fn user_hint(&self) -> String {
        match self {
            ExtractError::SelectorNotFound(selector) => format!(
                "Selector '{selector}' matched nothing; the page layout may have changed, inspect the page and update the selector"
            ),
            ExtractError::InvalidSelector(selector) => {
                format!("'{selector}' is not a valid CSS selector")
            }
            ExtractError::NoPriceFound => {
                "No price found: try the selector strategy pointed at the price element".to_string()
            }
            ExtractError::ItemNotFound(item) => format!(
                "'{item}' does not appear on the page; check the spelling or use a shorter item name"
            ),
            ExtractError::MalformedContent(_) => {
                "The page had no readable content; it may require JavaScript or a login".to_string()
            }
        }
    }
}

/// The parts of a monitor's configuration extraction depends on
#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    pub strategy: Strategy,
    pub selector: Option<&'a str>,
    pub item_name: Option<&'a str>,
    pub item_type: Option<ItemType>,
}

impl<'a> From<&'a Monitor> for ExtractRequest<'a> {
    fn from(monitor: &'a Monitor) -> Self {
        Self {
            strategy: monitor.strategy,
            selector: monitor.selector.as_deref(),
            item_name: monitor.item_name.as_deref(),
            item_type: monitor.item_type,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// Extract the observed value of `body` for `request`
    pub fn extract(&self, body: &str, request: &ExtractRequest<'_>) -> Result<String, ExtractError> {
        let document = Html::parse_document(body);

        let value = match request.strategy {
            Strategy::Content => self.content(&document)?,
            Strategy::Selector => {
                let selector = required(request.selector, "selector strategy without a selector")?;
                self.selected(&document, selector)?
            }
            Strategy::Price => self.price(&document, request.selector, request.item_type)?,
            Strategy::ItemSearch => {
                let item = required(request.item_name, "item search without an item name")?;
                self.item_search(&document, item, request.item_type)?
            }
        };

        Ok(truncate_chars(&value, self.config.max_value_chars))
    }

    fn content(&self, document: &Html) -> Result<String, ExtractError> {
        let region = MAIN_REGIONS
            .iter()
            .find_map(|selector| document.select(selector).next())
            .unwrap_or_else(|| document.root_element());

        let text = visible_text(region, &[HIDDEN_TAGS, CHROME_TAGS].concat());
        if text.is_empty() {
            return Err(ExtractError::MalformedContent(
                "page has no visible text".to_string(),
            ));
        }

        Ok(text)
    }

    fn selected(&self, document: &Html, selector: &str) -> Result<String, ExtractError> {
        let element = select_first(document, selector)?;

        let text = visible_text(element, HIDDEN_TAGS);
        if !text.is_empty() {
            return Ok(text);
        }

        attribute_value(element).ok_or_else(|| {
            ExtractError::MalformedContent(format!("'{selector}' matched an empty element"))
        })
    }

    fn price(
        &self,
        document: &Html,
        selector: Option<&str>,
        item_type: Option<ItemType>,
    ) -> Result<String, ExtractError> {
        match selector {
            Some(selector) => {
                let element = select_first(document, selector)?;
                let text = visible_text(element, HIDDEN_TAGS);

                find_price(&text, item_type)
                    .or_else(|| attribute_value(element).and_then(|v| find_price(&v, item_type)))
                    .ok_or(ExtractError::NoPriceFound)
            }
            None => {
                let text = visible_text(document.root_element(), HIDDEN_TAGS);
                find_price(&text, item_type).ok_or(ExtractError::NoPriceFound)
            }
        }
    }

    fn item_search(
        &self,
        document: &Html,
        item: &str,
        item_type: Option<ItemType>,
    ) -> Result<String, ExtractError> {
        let item = item.trim();
        let pattern = item
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(r"\s+");
        let re = Regex::new(&format!("(?i){pattern}"))
            .map_err(|e| ExtractError::MalformedContent(e.to_string()))?;

        let text = visible_text(document.root_element(), HIDDEN_TAGS);
        let found = re
            .find(&text)
            .ok_or_else(|| ExtractError::ItemNotFound(item.to_string()))?;

        let context = truncate_chars(text[found.end()..].trim_start(), self.config.item_context_chars);
        let context = context.trim_end();

        Ok(match find_price(context, item_type) {
            Some(price) => format!("{item}: {price}"),
            None if context.is_empty() => format!("{item}: found"),
            None => format!("{item}: {context}"),
        })
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, ExtractError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ExtractError::MalformedContent(what.to_string()))
}

fn select_first<'a>(document: &'a Html, selector: &str) -> Result<ElementRef<'a>, ExtractError> {
    let parsed = Selector::parse(selector)
        .map_err(|_| ExtractError::InvalidSelector(selector.to_string()))?;

    document
        .select(&parsed)
        .next()
        .ok_or_else(|| ExtractError::SelectorNotFound(selector.to_string()))
}

fn attribute_value(element: ElementRef<'_>) -> Option<String> {
    VALUE_ATTRIBUTES
        .iter()
        .filter_map(|name| element.value().attr(name))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Whitespace-normalised text below `root`, skipping subtrees rooted at `skipped` tags
///
/// Only tags strictly inside `root` are skipped, so selecting a `<nav>` still
/// yields its text.
fn visible_text(root: ElementRef<'_>, skipped: &[&str]) -> String {
    let mut words = Vec::new();

    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node
            .ancestors()
            .take_while(|ancestor| ancestor.id() != root.id())
            .filter_map(|ancestor| ancestor.value().as_element())
            .any(|element| skipped.contains(&element.name()));
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }

    words.join(" ")
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}
