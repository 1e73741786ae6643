//! Takeoff item normalization.
//!
//! Persisted takeoff blobs arrive in inconsistent shapes: a JSON array, a
//! JSON-encoded string, or an envelope object, with synonymous field names
//! varying across extraction runs. This module decodes all of them into a
//! uniform [`TakeoffItem`] snapshot. Fields that cannot be resolved become
//! `None` rather than failing the whole item.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;
use uuid::Uuid;

/// Category applied when no source field carries one.
pub const UNCATEGORIZED: &str = "Uncategorized";

// Candidate source fields per logical attribute, in priority order. Kept as
// named constants so tests can enumerate them.
pub const ID_FIELDS: &[&str] = &["id", "item_id", "uuid"];
pub const CATEGORY_FIELDS: &[&str] =
    &["category", "trade", "trade_category", "csi_division", "division"];
pub const SUBCATEGORY_FIELDS: &[&str] = &["subcategory", "sub_category", "item_type", "type"];
pub const NAME_FIELDS: &[&str] = &["name", "item", "item_name", "material", "label"];
pub const DESCRIPTION_FIELDS: &[&str] = &["description", "desc", "details", "notes"];
pub const QUANTITY_FIELDS: &[&str] = &["quantity", "qty", "amount", "count"];
pub const UNIT_FIELDS: &[&str] = &["unit", "uom", "unit_of_measure", "units"];
pub const UNIT_COST_FIELDS: &[&str] = &["unit_cost", "unit_price", "rate", "cost_per_unit"];
pub const TOTAL_COST_FIELDS: &[&str] =
    &["total_cost", "total", "cost", "extended_cost", "total_price"];
pub const LOCATION_FIELDS: &[&str] = &["location", "area", "room", "floor", "level", "sheet"];
pub const PAGE_NUMBER_FIELDS: &[&str] = &["page_number", "page", "source_page"];
pub const PAGE_REFERENCE_FIELDS: &[&str] =
    &["page_reference", "page_ref", "sheet_reference", "source"];

/// One normalized structured line item. A read-only snapshot; the engine never
/// mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeoffItem {
    pub id: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_reference: Option<String>,
}

/// The three raw shapes a persisted takeoff blob can take.
#[derive(Debug)]
pub enum RawTakeoffPayload {
    /// A bare JSON array of item objects.
    Items(Vec<Value>),
    /// A JSON document encoded as a string.
    Encoded(String),
    /// An object wrapping the items under `items` or `takeoffs`.
    Envelope(Map<String, Value>),
}

impl RawTakeoffPayload {
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(items) => Self::Items(items),
            Value::String(s) => Self::Encoded(s),
            Value::Object(map) => Self::Envelope(map),
            _ => Self::Items(Vec::new()),
        }
    }

    /// Flatten to raw item values. An encoded string gets one parse-and-retry;
    /// anything unparseable decodes to no items.
    pub fn into_raw_items(self) -> Vec<Value> {
        match self {
            Self::Items(items) => items,
            Self::Encoded(s) => match serde_json::from_str::<Value>(&s) {
                Ok(Value::String(_)) => Vec::new(),
                Ok(inner) => Self::classify(inner).into_raw_items(),
                Err(e) => {
                    tracing::warn!(error = %e, "takeoff blob is a non-JSON string, treating as empty");
                    Vec::new()
                }
            },
            Self::Envelope(map) => map
                .get("items")
                .or_else(|| map.get("takeoffs"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

/// Decode a raw takeoff blob into normalized items, skipping entries that are
/// not objects.
pub fn normalize_items(raw: Value) -> Vec<TakeoffItem> {
    RawTakeoffPayload::classify(raw)
        .into_raw_items()
        .iter()
        .filter_map(normalize_item)
        .collect()
}

fn normalize_item(value: &Value) -> Option<TakeoffItem> {
    let obj = value.as_object()?;

    let id = first_string(obj, ID_FIELDS).unwrap_or_else(|| Uuid::new_v4().to_string());
    let category = first_string(obj, CATEGORY_FIELDS).unwrap_or_else(|| UNCATEGORIZED.to_string());
    let name = first_string(obj, NAME_FIELDS)
        .or_else(|| first_string(obj, DESCRIPTION_FIELDS))
        .unwrap_or_else(|| "Unlabeled item".to_string());

    Some(TakeoffItem {
        id,
        category,
        subcategory: first_string(obj, SUBCATEGORY_FIELDS),
        name,
        description: first_string(obj, DESCRIPTION_FIELDS),
        quantity: first_number(obj, QUANTITY_FIELDS),
        unit: first_string(obj, UNIT_FIELDS),
        unit_cost: first_number(obj, UNIT_COST_FIELDS),
        total_cost: first_number(obj, TOTAL_COST_FIELDS),
        location: first_string(obj, LOCATION_FIELDS),
        page_number: first_integer(obj, PAGE_NUMBER_FIELDS),
        page_reference: first_string(obj, PAGE_REFERENCE_FIELDS),
    })
}

fn first_string(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| {
        obj.get(*field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn first_number(obj: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields.iter().find_map(|field| number_from_value(obj.get(*field)?))
}

fn first_integer(obj: &Map<String, Value>, fields: &[&str]) -> Option<i64> {
    first_number(obj, fields).map(|n| n as i64)
}

/// Accept a literal JSON number, or pull the leading number out of free text
/// like `"150.5 LF"` or `"$1,250.50 installed"`.
fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => extract_leading_number(s),
        _ => None,
    }
}

fn leading_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*\$?\s*(-?\d+(?:,\d{3})*(?:\.\d+)?)")
            .expect("leading-number regex is valid")
    })
}

fn extract_leading_number(s: &str) -> Option<f64> {
    let caps = leading_number_re().captures(s)?;
    caps[1].replace(',', "").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_bare_array() {
        let raw = json!([{"name": "Shingles", "quantity": 12}]);
        let items = normalize_items(raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Shingles");
        assert_eq!(items[0].quantity, Some(12.0));
    }

    #[test]
    fn decodes_json_encoded_string() {
        let raw = json!("[{\"item\": \"Rebar #4\", \"qty\": \"150.5 LF\"}]");
        let items = normalize_items(raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "Rebar #4");
        assert_eq!(items[0].quantity, Some(150.5));
    }

    #[test]
    fn decodes_envelope_object() {
        let raw = json!({"version": 2, "takeoffs": [{"material": "CMU Block"}]});
        let items = normalize_items(raw);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "CMU Block");
    }

    #[test]
    fn unparseable_string_decodes_to_empty() {
        assert!(normalize_items(json!("not json at all")).is_empty());
        assert!(normalize_items(json!(42)).is_empty());
    }

    #[test]
    fn non_object_entries_are_skipped() {
        let raw = json!([{"name": "Joists"}, "stray", 7, null]);
        assert_eq!(normalize_items(raw).len(), 1);
    }

    #[test]
    fn category_defaults_and_id_is_generated() {
        let items = normalize_items(json!([{"name": "Vapor Barrier"}]));
        assert_eq!(items[0].category, UNCATEGORIZED);
        assert!(!items[0].id.is_empty());
    }

    #[test]
    fn field_coalescing_respects_priority_order() {
        let raw = json!([{
            "trade": "Roofing",
            "item_name": "Architectural Shingles",
            "description": "30-year architectural shingles",
            "total": "$1,250.50",
            "source_page": 7,
        }]);
        let item = &normalize_items(raw)[0];
        assert_eq!(item.category, "Roofing");
        assert_eq!(item.name, "Architectural Shingles");
        assert_eq!(item.total_cost, Some(1250.50));
        assert_eq!(item.page_number, Some(7));
    }

    #[test]
    fn numeric_extraction_handles_text_and_numbers() {
        let raw = json!([{
            "name": "Conduit",
            "quantity": "240 LF of EMT",
            "unit_cost": 3.25,
            "cost": "no bid",
        }]);
        let item = &normalize_items(raw)[0];
        assert_eq!(item.quantity, Some(240.0));
        assert_eq!(item.unit_cost, Some(3.25));
        assert_eq!(item.total_cost, None);
    }

    #[test]
    fn page_number_extracted_from_string() {
        let raw = json!([{"name": "Detail", "page": "12"}]);
        assert_eq!(normalize_items(raw)[0].page_number, Some(12));
    }
}
