//! The bounded retrieval summary passed from the retrieval engine to the
//! answer generator. Strictly smaller views only: the full item/chunk corpus
//! is never forwarded downstream.

use serde::{Deserialize, Serialize};

use super::classification::Classification;

/// Hard cap on projected items forwarded to the generator.
pub const MAX_RELATED_ITEMS: usize = 50;
/// Hard cap on category/level breakdown entries.
pub const MAX_BREAKDOWN_ENTRIES: usize = 10;
/// Hard cap on blueprint snippets.
pub const MAX_SNIPPETS: usize = 5;

/// A short fragment of text extracted from a drawing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlueprintSnippet {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantityTotal {
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostTotal {
    pub value: f64,
    pub currency: String,
}

/// Aggregate sums over the filtered items. Each side is present only when the
/// corresponding sum is strictly positive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Totals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<QuantityTotal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<CostTotal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevelTotal {
    pub level: String,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakdowns {
    pub by_category: Vec<CategoryTotal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_level: Option<Vec<LevelTotal>>,
}

/// Field-projected view of one matched takeoff item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedItem {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_total: Option<f64>,
}

/// Everything the answer generator is allowed to know about the question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub question: String,
    pub classification: Classification,
    /// One human-readable sentence summarizing what was found. Never empty,
    /// even on zero matches.
    pub scope_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totals: Option<Totals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdowns: Option<Breakdowns>,
    pub related_items: Vec<RelatedItem>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blueprint_snippets: Vec<BlueprintSnippet>,
    /// Size of the loaded pre-filter snapshot. Lets the answer fallback tell
    /// "this plan has no extracted data" apart from "nothing matched".
    pub takeoff_item_count: usize,
}

impl RetrievalResult {
    pub fn empty(question: &str, classification: Classification) -> Self {
        Self {
            question: question.to_string(),
            classification,
            scope_description: String::new(),
            totals: None,
            breakdowns: None,
            related_items: Vec::new(),
            blueprint_snippets: Vec::new(),
            takeoff_item_count: 0,
        }
    }
}
