//! Question classification.
//!
//! Maps one free-text question to a [`Classification`] via the oracle's JSON
//! response mode. Classification failure is non-fatal: a wrong or missing
//! classification reduces retrieval precision, it never blocks the pipeline.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::Classification;
use crate::error::ClassificationError;
use crate::services::TextOracle;

const CLASSIFY_SYSTEM_PROMPT: &str = "\
You classify questions about construction projects. Respond with ONLY a JSON object:
{
  \"question_type\": one of \"TAKEOFF_QUANTITY\", \"TAKEOFF_COST\", \"PAGE_CONTENT\", \"BLUEPRINT_CONTEXT\", \"COMBINED\", \"TAKEOFF_MODIFY\", \"TAKEOFF_ANALYZE\", \"OTHER\",
  \"targets\": array of material/trade/item keywords from the question (may be empty),
  \"levels\": array of floor or level mentions, omit when none,
  \"pages\": array of page numbers, omit when none,
  \"strict_takeoff_only\": true only when the question must be answered from takeoff line items alone,
  \"modification_intent\": one of \"add\", \"remove\", \"update\", \"analyze_missing\", only for TAKEOFF_MODIFY or TAKEOFF_ANALYZE
}

Intent guide:
- TAKEOFF_QUANTITY: how much or how many of a material or item
- TAKEOFF_COST: price or cost of items or the whole takeoff
- PAGE_CONTENT: what a specific drawing page shows
- BLUEPRINT_CONTEXT: general questions about drawing content
- COMBINED: needs takeoff numbers and drawing context together
- TAKEOFF_MODIFY: asks to add, remove, or change takeoff items
- TAKEOFF_ANALYZE: asks what might be missing from the takeoff
- OTHER: anything else";

pub struct QuestionClassifier {
    oracle: Arc<dyn TextOracle>,
    max_tokens: u32,
}

impl QuestionClassifier {
    pub fn new(oracle: Arc<dyn TextOracle>, max_tokens: u32) -> Self {
        Self { oracle, max_tokens }
    }

    /// Classify a question. Never fails: any oracle or parse error degrades to
    /// the default low-specificity classification at this single boundary.
    pub async fn classify(&self, question: &str) -> Classification {
        match self.classify_inner(question).await {
            Ok(classification) => {
                debug!(
                    question_type = %classification.question_type,
                    targets = ?classification.targets,
                    "question classified"
                );
                classification
            }
            Err(e) => {
                warn!(error = %e, "classification failed, treating question as general");
                Classification::fallback()
            }
        }
    }

    async fn classify_inner(&self, question: &str) -> Result<Classification, ClassificationError> {
        let raw = self
            .oracle
            .complete_json(CLASSIFY_SYSTEM_PROMPT, question, self.max_tokens)
            .await?;
        let value: Value = serde_json::from_str(&raw)?;
        Ok(Classification::from_oracle_value(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuestionType;
    use crate::error::OracleError;
    use crate::services::oracle::ChatMessage;
    use async_trait::async_trait;

    /// Oracle stub returning a canned reply or a transport-style failure.
    struct StubOracle {
        reply: Option<String>,
    }

    #[async_trait]
    impl TextOracle for StubOracle {
        async fn complete_json(
            &self,
            _system_prompt: &str,
            _user_text: &str,
            _max_tokens: u32,
        ) -> Result<String, OracleError> {
            match &self.reply {
                Some(reply) => Ok(reply.clone()),
                None => Err(OracleError::Api {
                    status: 500,
                    message: "unavailable".to_string(),
                }),
            }
        }

        async fn complete_chat(
            &self,
            _system_prompt: &str,
            _messages: &[ChatMessage],
            _max_tokens: u32,
        ) -> Result<String, OracleError> {
            unreachable!("classifier never uses chat completion")
        }
    }

    fn classifier(reply: Option<&str>) -> QuestionClassifier {
        QuestionClassifier::new(
            Arc::new(StubOracle {
                reply: reply.map(String::from),
            }),
            300,
        )
    }

    #[tokio::test]
    async fn well_formed_reply_is_parsed() {
        let c = classifier(Some(
            r#"{"question_type": "TAKEOFF_QUANTITY", "targets": ["roofing"], "strict_takeoff_only": true}"#,
        ));
        let got = c.classify("how much roofing?").await;
        assert_eq!(got.question_type, QuestionType::TakeoffQuantity);
        assert_eq!(got.targets, vec!["roofing"]);
        assert!(got.strict_takeoff_only);
    }

    #[tokio::test]
    async fn oracle_failure_degrades_to_default() {
        let got = classifier(None).classify("how much drywall?").await;
        assert_eq!(got.question_type, QuestionType::Other);
        assert!(got.targets.is_empty());
        assert!(!got.strict_takeoff_only);
    }

    #[tokio::test]
    async fn garbage_reply_degrades_to_default() {
        let got = classifier(Some("definitely not json"))
            .classify("how much drywall?")
            .await;
        assert_eq!(got.question_type, QuestionType::Other);
    }

    #[tokio::test]
    async fn unknown_question_type_collapses_to_other() {
        let c = classifier(Some(r#"{"question_type": "WILDCARD", "targets": []}"#));
        let got = c.classify("hm").await;
        assert_eq!(got.question_type, QuestionType::Other);
    }
}
