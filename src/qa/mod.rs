//! The grounded question-answering pipeline.
//!
//! A request-scoped, sequential chain: classify, retrieve, answer. Nothing
//! here mutates shared state, so concurrent questions against the same plan
//! need no coordination.

pub mod answer;
pub mod classifier;
pub mod fuzzy;
pub mod retrieval;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::QaOptions;
use crate::domain::ChatTurn;
use crate::error::{EngineError, EngineResult};
use crate::services::cache::{self, RedisCache};
use crate::services::{SnippetStore, TakeoffStore, TextOracle};

use answer::AnswerGenerator;
use classifier::QuestionClassifier;
use retrieval::RetrievalEngine;

/// Which plan and which user's takeoff a question is asked against.
#[derive(Debug, Clone, Copy)]
pub struct PlanScope {
    pub plan_id: Uuid,
    pub user_id: Uuid,
}

const ANSWER_CACHE_TTL: Duration = Duration::from_secs(3600);

pub struct QaPipeline {
    classifier: QuestionClassifier,
    retrieval: RetrievalEngine,
    generator: AnswerGenerator,
    cache: Option<RedisCache>,
}

impl QaPipeline {
    pub fn new(
        oracle: Arc<dyn TextOracle>,
        takeoff_store: Arc<dyn TakeoffStore>,
        snippet_store: Arc<dyn SnippetStore>,
        options: QaOptions,
    ) -> Self {
        Self {
            classifier: QuestionClassifier::new(oracle.clone(), options.classify_max_tokens),
            retrieval: RetrievalEngine::new(takeoff_store, snippet_store, options.retrieval),
            generator: AnswerGenerator::new(oracle, options.answer_max_tokens),
            cache: None,
        }
    }

    /// Attach a finished-answer cache.
    pub fn with_cache(mut self, cache: RedisCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Answer one question about a plan, grounded in its takeoff and
    /// blueprint text. `history` is the recent conversation, oldest first.
    pub async fn answer_question(
        &self,
        scope: PlanScope,
        question: &str,
        history: &[ChatTurn],
    ) -> EngineResult<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(EngineError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }

        // Conversation history changes what a good answer looks like, so only
        // history-free questions go through the cache.
        let cache_key = cache::keys::answer(scope.plan_id, &question_hash(question));
        if history.is_empty() {
            if let Some(cache) = &self.cache {
                if let Some(cached) = cache.get::<String>(&cache_key).await {
                    debug!(plan_id = %scope.plan_id, "returning cached answer");
                    return Ok(cached);
                }
            }
        }

        let classification = self.classifier.classify(question).await;
        let result = self.retrieval.retrieve(&scope, question, classification).await;
        debug!(
            plan_id = %scope.plan_id,
            related_items = result.related_items.len(),
            snippets = result.blueprint_snippets.len(),
            "retrieval complete"
        );

        let answer = self.generator.generate(&result, history).await?;

        if history.is_empty() {
            if let Some(cache) = &self.cache {
                if let Err(e) = cache.set_with_ttl(&cache_key, &answer, ANSWER_CACHE_TTL).await {
                    warn!(error = %e, "failed to cache answer");
                }
            }
        }

        Ok(answer)
    }
}

/// Non-cryptographic hash of the question for cache-key deduplication.
fn question_hash(question: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    question.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}
