//! Discovery filters

use serde_json::{ json, Value };

/// Filter passed to the broker's service listing.
///
/// The broker interprets the filter; this side only serializes it.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchStrategy {
    Title(String),
    Owner(String),
    /// Services carrying any of the keywords
    Keyword(Vec<String>),
    /// Any filter the broker understands
    Custom(Value),
}

impl SearchStrategy {
    pub fn to_json(&self) -> Value {
        match self {
            SearchStrategy::Title(title) => json!({ "searchStrategy": "title", "value": title }),
            SearchStrategy::Owner(owner) => json!({ "searchStrategy": "owner", "value": owner }),
            SearchStrategy::Keyword(keywords) =>
                json!({ "searchStrategy": "keyword", "value": keywords }),
            SearchStrategy::Custom(value) => value.clone(),
        }
    }
}
