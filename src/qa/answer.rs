//! Answer generation, strictly bounded by the retrieval result.
//!
//! The oracle is handed a compact JSON payload and a grounding system prompt.
//! When its reply is missing or too short to be usable, the answer is
//! synthesized deterministically from the payload instead, so the caller
//! always gets a data-grounded, non-empty string. Oracle transport failures
//! propagate: a broken generation call should be visible, answering is the
//! entire point of this subsystem.

use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::domain::chat::MAX_HISTORY_TURNS;
use crate::domain::retrieval::RelatedItem;
use crate::domain::{ChatTurn, QuestionType, RetrievalResult};
use crate::error::{EngineError, EngineResult};
use crate::services::oracle::ChatMessage;
use crate::services::TextOracle;

/// Payload caps. The generator forwards an even smaller view than the
/// retrieval result holds.
const PAYLOAD_BREAKDOWN_CAP: usize = 5;
const PAYLOAD_ITEM_CAP: usize = 10;
const PAYLOAD_SNIPPET_CAP: usize = 5;
const SNIPPET_PREVIEW_CHARS: usize = 300;

/// Oracle replies shorter than this are treated as unusable.
const MIN_USABLE_ANSWER_CHARS: usize = 20;

/// Bullet caps in the deterministic fallback.
const FALLBACK_LINE_CAP: usize = 5;
const FALLBACK_FULL_LIST_CAP: usize = 10;

/// Fixed guidance when the plan has no extracted data at all.
pub const NO_DATA_MESSAGE: &str = "No takeoff or blueprint data exists for this plan yet. \
The plan may still need text extraction and takeoff processing; run that first, then ask again.";

/// Fixed guidance when data exists but nothing matched this question.
pub const NO_MATCH_MESSAGE: &str = "Nothing in the takeoff or blueprint text matched this \
question. Try rephrasing with the material, trade, or page number you are interested in.";

const TAKEOFF_SYSTEM_PROMPT: &str = "\
You answer questions about a construction takeoff. The user message ends with a JSON payload \
of retrieved takeoff data.
Rules:
- Use ONLY quantities, costs, units, and item names present in the payload. Never invent, \
estimate, or extrapolate a number.
- Do not reference or quote raw blueprint text.
- If the payload does not contain what was asked, say so plainly.
- Answer in a few short sentences; use bullet lines for item lists.";

const BLUEPRINT_SYSTEM_PROMPT: &str = "\
You answer questions about construction drawings. The user message ends with a JSON payload \
of retrieved project data and blueprint text snippets.
Rules:
- Summarize and explain only what the payload contains. Do not dump snippet text verbatim \
and do not exaggerate what the drawings show.
- Never introduce a number or fact that is not in the payload.
- If nothing relevant was retrieved, say so plainly.
- Keep the answer short and direct.";

pub struct AnswerGenerator {
    oracle: Arc<dyn TextOracle>,
    max_tokens: u32,
}

impl AnswerGenerator {
    pub fn new(oracle: Arc<dyn TextOracle>, max_tokens: u32) -> Self {
        Self { oracle, max_tokens }
    }

    /// Produce the user-facing answer. Never returns an empty string.
    pub async fn generate(
        &self,
        result: &RetrievalResult,
        history: &[ChatTurn],
    ) -> EngineResult<String> {
        let system_prompt = match result.classification.question_type {
            QuestionType::TakeoffQuantity | QuestionType::TakeoffCost => TAKEOFF_SYSTEM_PROMPT,
            _ => BLUEPRINT_SYSTEM_PROMPT,
        };

        let mut messages: Vec<ChatMessage> = history
            .iter()
            .rev()
            .take(MAX_HISTORY_TURNS)
            .rev()
            .map(|turn| ChatMessage {
                role: turn.role.as_str(),
                content: turn.content.clone(),
            })
            .collect();
        messages.push(ChatMessage::user(format!(
            "Question: {}\n\nRetrieved project data (answer strictly from this):\n{}",
            result.question,
            build_payload(result),
        )));

        let reply = self
            .oracle
            .complete_chat(system_prompt, &messages, self.max_tokens)
            .await
            .map_err(EngineError::Generation)?;

        let reply = reply.trim();
        if reply.chars().count() >= MIN_USABLE_ANSWER_CHARS {
            Ok(reply.to_string())
        } else {
            debug!(
                reply_len = reply.len(),
                "oracle reply unusable, synthesizing answer from retrieval result"
            );
            Ok(fallback_answer(result))
        }
    }
}

/// The compact JSON view of a retrieval result handed to the oracle.
fn build_payload(result: &RetrievalResult) -> String {
    let mut payload = json!({
        "scope_description": result.scope_description,
    });
    let obj = payload.as_object_mut().expect("payload is an object");

    if let Some(totals) = &result.totals {
        obj.insert("totals".to_string(), json!(totals));
    }

    if let Some(breakdowns) = &result.breakdowns {
        let by_category: Vec<_> = breakdowns
            .by_category
            .iter()
            .take(PAYLOAD_BREAKDOWN_CAP)
            .collect();
        obj.insert("by_category".to_string(), json!(by_category));
        if let Some(by_level) = &breakdowns.by_level {
            let by_level: Vec<_> = by_level.iter().take(PAYLOAD_BREAKDOWN_CAP).collect();
            obj.insert("by_level".to_string(), json!(by_level));
        }
    }

    if !result.related_items.is_empty() {
        let items: Vec<_> = result
            .related_items
            .iter()
            .take(PAYLOAD_ITEM_CAP)
            .collect();
        obj.insert("related_items".to_string(), json!(items));
        let remaining = result.related_items.len().saturating_sub(PAYLOAD_ITEM_CAP);
        if remaining > 0 {
            obj.insert(
                "related_items_note".to_string(),
                json!(format!("...and {remaining} more matching items")),
            );
        }
    }

    if !result.blueprint_snippets.is_empty() {
        let snippets: Vec<_> = result
            .blueprint_snippets
            .iter()
            .take(PAYLOAD_SNIPPET_CAP)
            .map(|s| {
                json!({
                    "text": truncate_chars(&s.text, SNIPPET_PREVIEW_CHARS),
                    "page_number": s.page_number,
                    "sheet_name": s.sheet_name,
                })
            })
            .collect();
        obj.insert("blueprint_snippets".to_string(), json!(snippets));
    }

    payload.to_string()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Deterministic answer synthesized directly from the retrieval result.
/// Guaranteed non-empty for any well-formed result.
pub fn fallback_answer(result: &RetrievalResult) -> String {
    let question_type = result.classification.question_type;
    let cost_total = result.totals.as_ref().and_then(|t| t.cost.as_ref());
    let quantity_total = result.totals.as_ref().and_then(|t| t.quantity.as_ref());

    if question_type == QuestionType::TakeoffCost {
        if let Some(cost) = cost_total {
            let mut lines = vec![format!(
                "Total estimated cost: ${:.2} {}.",
                cost.value, cost.currency
            )];
            let priced: Vec<&RelatedItem> = result
                .related_items
                .iter()
                .filter(|i| i.cost_total.is_some_and(|c| c > 0.0))
                .collect();
            for item in priced.iter().take(FALLBACK_LINE_CAP) {
                lines.push(cost_line(item));
            }
            if priced.len() > FALLBACK_LINE_CAP {
                lines.push(format!("...and {} more.", priced.len() - FALLBACK_LINE_CAP));
            }
            return lines.join("\n");
        }
    }

    if question_type == QuestionType::TakeoffQuantity {
        if let Some(quantity) = quantity_total {
            let mut lines = vec![format!(
                "Total quantity: {}{} across {} item{}.",
                format_number(quantity.value),
                quantity
                    .unit
                    .as_deref()
                    .map(|u| format!(" {u}"))
                    .unwrap_or_default(),
                result.related_items.len(),
                plural_s(result.related_items.len()),
            )];
            if let Some(breakdowns) = &result.breakdowns {
                for row in breakdowns.by_category.iter().take(FALLBACK_LINE_CAP) {
                    lines.push(format!(
                        "- {}: {}{}",
                        row.category,
                        format_number(row.quantity),
                        row.unit
                            .as_deref()
                            .map(|u| format!(" {u}"))
                            .unwrap_or_default(),
                    ));
                }
            }
            return lines.join("\n");
        }
    }

    if !result.related_items.is_empty() {
        let count = result.related_items.len();
        let mut lines = vec![format!(
            "Found {count} matching item{}. {}",
            plural_s(count),
            result.scope_description,
        )];
        if count <= FALLBACK_FULL_LIST_CAP {
            for item in &result.related_items {
                lines.push(item_line(item));
            }
        }
        return lines.join("\n");
    }

    if !result.blueprint_snippets.is_empty() {
        let count = result.blueprint_snippets.len();
        // Skip the count sentence when the scope description already says it.
        if result.scope_description.to_lowercase().contains("blueprint") {
            return result.scope_description.clone();
        }
        return format!(
            "Found {count} relevant blueprint snippet{}. {}",
            plural_s(count),
            result.scope_description,
        );
    }

    if result.takeoff_item_count == 0 {
        NO_DATA_MESSAGE.to_string()
    } else {
        NO_MATCH_MESSAGE.to_string()
    }
}

fn cost_line(item: &RelatedItem) -> String {
    let cost = item.cost_total.unwrap_or(0.0);
    match (item.quantity, item.unit.as_deref()) {
        (Some(quantity), Some(unit)) => format!(
            "- {}: {} {} (${:.2})",
            item.name,
            format_number(quantity),
            unit,
            cost
        ),
        (Some(quantity), None) => {
            format!("- {}: {} (${:.2})", item.name, format_number(quantity), cost)
        }
        _ => format!("- {}: ${:.2}", item.name, cost),
    }
}

fn item_line(item: &RelatedItem) -> String {
    let mut line = format!("- {} ({})", item.name, item.category);
    if let Some(quantity) = item.quantity {
        line.push_str(&format!(": {}", format_number(quantity)));
        if let Some(unit) = item.unit.as_deref() {
            line.push_str(&format!(" {unit}"));
        }
    }
    line
}

fn format_number(value: f64) -> String {
    if value.fract().abs() < 1e-9 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}

fn plural_s(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::retrieval::{
        Breakdowns, CategoryTotal, CostTotal, QuantityTotal, Totals,
    };
    use crate::domain::{BlueprintSnippet, Classification, RetrievalResult};

    fn result_with_type(question_type: QuestionType) -> RetrievalResult {
        let mut classification = Classification::fallback();
        classification.question_type = question_type;
        RetrievalResult::empty("test question", classification)
    }

    fn related(name: &str, quantity: Option<f64>, unit: Option<&str>, cost: Option<f64>) -> RelatedItem {
        RelatedItem {
            id: "x".to_string(),
            name: name.to_string(),
            category: "Roofing".to_string(),
            level: None,
            page_number: None,
            quantity,
            unit: unit.map(String::from),
            cost_total: cost,
        }
    }

    #[test]
    fn cost_fallback_reports_total_and_lines() {
        let mut result = result_with_type(QuestionType::TakeoffCost);
        result.totals = Some(Totals {
            quantity: None,
            cost: Some(CostTotal {
                value: 600.0,
                currency: "USD".to_string(),
            }),
        });
        result.related_items = vec![related("Shingles", Some(120.0), Some("SF"), Some(600.0))];

        let answer = fallback_answer(&result);
        assert!(answer.contains("$600.00"));
        assert!(answer.contains("Shingles"));
        assert!(answer.contains("120 SF"));
    }

    #[test]
    fn quantity_fallback_includes_breakdown() {
        let mut result = result_with_type(QuestionType::TakeoffQuantity);
        result.totals = Some(Totals {
            quantity: Some(QuantityTotal {
                value: 170.5,
                unit: Some("SF".to_string()),
            }),
            cost: None,
        });
        result.breakdowns = Some(Breakdowns {
            by_category: vec![CategoryTotal {
                category: "Roofing".to_string(),
                quantity: 170.5,
                unit: Some("SF".to_string()),
                cost: None,
            }],
            by_level: None,
        });

        let answer = fallback_answer(&result);
        assert!(answer.contains("170.50 SF"));
        assert!(answer.contains("- Roofing"));
    }

    #[test]
    fn general_fallback_lists_small_item_sets_in_full() {
        let mut result = result_with_type(QuestionType::Combined);
        result.scope_description = "Found 2 matching takeoff items across 1 category.".to_string();
        result.related_items = vec![
            related("Shingles", Some(120.0), Some("SF"), None),
            related("Underlayment", None, None, None),
        ];

        let answer = fallback_answer(&result);
        assert!(answer.contains("Found 2 matching items"));
        assert!(answer.contains("- Shingles (Roofing): 120 SF"));
        assert!(answer.contains("- Underlayment (Roofing)"));
    }

    #[test]
    fn snippet_fallback_avoids_duplicating_blueprint_sentence() {
        let mut result = result_with_type(QuestionType::BlueprintContext);
        result.scope_description =
            "Found 2 blueprint snippets relevant to the question.".to_string();
        result.blueprint_snippets = vec![
            BlueprintSnippet {
                text: "General notes".to_string(),
                page_number: Some(1),
                sheet_name: None,
            },
            BlueprintSnippet {
                text: "Wall section".to_string(),
                page_number: Some(2),
                sheet_name: None,
            },
        ];

        let answer = fallback_answer(&result);
        assert_eq!(answer, result.scope_description);
    }

    #[test]
    fn no_data_and_no_match_messages_are_distinct() {
        let mut empty_plan = result_with_type(QuestionType::TakeoffQuantity);
        empty_plan.scope_description = "No matching items found in takeoff.".to_string();
        assert_eq!(fallback_answer(&empty_plan), NO_DATA_MESSAGE);

        let mut no_match = empty_plan.clone();
        no_match.takeoff_item_count = 12;
        assert_eq!(fallback_answer(&no_match), NO_MATCH_MESSAGE);
    }

    #[test]
    fn fallback_is_never_empty() {
        for question_type in [
            QuestionType::TakeoffQuantity,
            QuestionType::TakeoffCost,
            QuestionType::PageContent,
            QuestionType::BlueprintContext,
            QuestionType::Combined,
            QuestionType::TakeoffModify,
            QuestionType::TakeoffAnalyze,
            QuestionType::Other,
        ] {
            let result = result_with_type(question_type);
            assert!(!fallback_answer(&result).trim().is_empty());
        }
    }

    #[test]
    fn payload_truncates_snippets_and_notes_overflow() {
        let mut result = result_with_type(QuestionType::Combined);
        result.related_items = (0..30)
            .map(|i| related(&format!("Item {i}"), Some(1.0), None, None))
            .collect();
        result.blueprint_snippets = vec![BlueprintSnippet {
            text: "x".repeat(400),
            page_number: None,
            sheet_name: None,
        }];

        let payload = build_payload(&result);
        assert!(payload.contains("...and 20 more matching items"));
        assert!(!payload.contains(&"x".repeat(340)));
    }
}
