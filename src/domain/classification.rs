//! Structured question intent produced by the classifier.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of question intents. Anything the classifier emits outside this
/// set collapses to [`QuestionType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    TakeoffQuantity,
    TakeoffCost,
    PageContent,
    BlueprintContext,
    Combined,
    TakeoffModify,
    TakeoffAnalyze,
    #[serde(other)]
    Other,
}

impl QuestionType {
    /// Parse a wire value, collapsing anything unrecognized to `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "TAKEOFF_QUANTITY" => Self::TakeoffQuantity,
            "TAKEOFF_COST" => Self::TakeoffCost,
            "PAGE_CONTENT" => Self::PageContent,
            "BLUEPRINT_CONTEXT" => Self::BlueprintContext,
            "COMBINED" => Self::Combined,
            "TAKEOFF_MODIFY" => Self::TakeoffModify,
            "TAKEOFF_ANALYZE" => Self::TakeoffAnalyze,
            _ => Self::Other,
        }
    }

    /// True for intents answered from structured takeoff data.
    pub fn is_takeoff(&self) -> bool {
        matches!(
            self,
            Self::TakeoffQuantity | Self::TakeoffCost | Self::Combined
        )
    }
}

impl std::fmt::Display for QuestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TakeoffQuantity => "TAKEOFF_QUANTITY",
            Self::TakeoffCost => "TAKEOFF_COST",
            Self::PageContent => "PAGE_CONTENT",
            Self::BlueprintContext => "BLUEPRINT_CONTEXT",
            Self::Combined => "COMBINED",
            Self::TakeoffModify => "TAKEOFF_MODIFY",
            Self::TakeoffAnalyze => "TAKEOFF_ANALYZE",
            Self::Other => "OTHER",
        };
        write!(f, "{s}")
    }
}

/// What a modify/analyze question wants done to the takeoff. The engine only
/// signals this intent; mutation itself lives elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModificationIntent {
    Add,
    Remove,
    Update,
    AnalyzeMissing,
}

impl ModificationIntent {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            "update" => Some(Self::Update),
            "analyze_missing" => Some(Self::AnalyzeMissing),
            _ => None,
        }
    }
}

/// Structured intent derived from a free-text question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub question_type: QuestionType,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pages: Option<Vec<i64>>,
    #[serde(default)]
    pub strict_takeoff_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modification_intent: Option<ModificationIntent>,
}

impl Classification {
    /// Safe default used whenever classification fails: a general question
    /// with no specificity, which degrades precision but never blocks.
    pub fn fallback() -> Self {
        Self {
            question_type: QuestionType::Other,
            targets: Vec::new(),
            levels: None,
            pages: None,
            strict_takeoff_only: false,
            modification_intent: None,
        }
    }

    /// Leniently decode a classifier oracle reply. Every field is coerced
    /// independently so one malformed field never discards the rest.
    pub fn from_oracle_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::fallback();
        };

        let question_type = obj
            .get("question_type")
            .and_then(Value::as_str)
            .map(QuestionType::parse)
            .unwrap_or(QuestionType::Other);

        let targets = string_array(obj.get("targets")).unwrap_or_default();
        let levels = string_array(obj.get("levels")).filter(|v| !v.is_empty());
        let pages = page_array(obj.get("pages")).filter(|v| !v.is_empty());

        let strict_takeoff_only = obj
            .get("strict_takeoff_only")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let modification_intent = if matches!(
            question_type,
            QuestionType::TakeoffModify | QuestionType::TakeoffAnalyze
        ) {
            obj.get("modification_intent")
                .and_then(Value::as_str)
                .and_then(ModificationIntent::parse)
        } else {
            None
        };

        Self {
            question_type,
            targets,
            levels,
            pages,
            strict_takeoff_only,
            modification_intent,
        }
    }
}

fn string_array(value: Option<&Value>) -> Option<Vec<String>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

fn page_array(value: Option<&Value>) -> Option<Vec<i64>> {
    let items = value?.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|v| match v {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_collapses_unknown_types_to_other() {
        assert_eq!(QuestionType::parse("TAKEOFF_COST"), QuestionType::TakeoffCost);
        assert_eq!(QuestionType::parse("takeoff_quantity"), QuestionType::TakeoffQuantity);
        assert_eq!(QuestionType::parse("SOMETHING_ELSE"), QuestionType::Other);
        assert_eq!(QuestionType::parse(""), QuestionType::Other);
    }

    #[test]
    fn serde_round_trip_uses_wire_names() {
        let json = serde_json::to_string(&QuestionType::BlueprintContext).unwrap();
        assert_eq!(json, "\"BLUEPRINT_CONTEXT\"");
        let parsed: QuestionType = serde_json::from_str("\"UNKNOWN_VALUE\"").unwrap();
        assert_eq!(parsed, QuestionType::Other);
    }

    #[test]
    fn oracle_value_with_bad_fields_is_coerced_per_field() {
        let value = json!({
            "question_type": "TAKEOFF_QUANTITY",
            "targets": "not-an-array",
            "levels": [1, 2],
            "pages": ["3", 4, null, "x"],
            "strict_takeoff_only": "yes",
        });
        let c = Classification::from_oracle_value(&value);
        assert_eq!(c.question_type, QuestionType::TakeoffQuantity);
        assert!(c.targets.is_empty());
        assert!(c.levels.is_none());
        assert_eq!(c.pages, Some(vec![3, 4]));
        assert!(!c.strict_takeoff_only);
    }

    #[test]
    fn non_object_oracle_value_falls_back() {
        let c = Classification::from_oracle_value(&json!("garbage"));
        assert_eq!(c.question_type, QuestionType::Other);
        assert!(c.targets.is_empty());
        assert!(!c.strict_takeoff_only);
    }

    #[test]
    fn modification_intent_requires_modify_type() {
        let value = json!({
            "question_type": "TAKEOFF_COST",
            "modification_intent": "add",
        });
        assert!(Classification::from_oracle_value(&value).modification_intent.is_none());

        let value = json!({
            "question_type": "TAKEOFF_MODIFY",
            "modification_intent": "add",
        });
        assert_eq!(
            Classification::from_oracle_value(&value).modification_intent,
            Some(ModificationIntent::Add)
        );
    }
}
