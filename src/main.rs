//! One-shot CLI: answer a single question about a plan.
//!
//! Usage: `planquery "<question>"` with `PLAN_ID` and `USER_ID` set in the
//! environment alongside the database, Redis, and oracle configuration.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use planquery::services::{LlmClient, PgSnippetStore, PgTakeoffStore, RedisCache};
use planquery::{config, db, logging, PlanScope, QaPipeline};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let settings = config::Settings::from_env()?;
    logging::init_logging(&settings.env);

    let question: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if question.trim().is_empty() {
        bail!("usage: planquery \"<question>\" (with PLAN_ID and USER_ID set)");
    }

    let plan_id: Uuid = std::env::var("PLAN_ID")
        .context("PLAN_ID must be set")?
        .parse()
        .context("PLAN_ID must be a UUID")?;
    let user_id: Uuid = std::env::var("USER_ID")
        .context("USER_ID must be set")?
        .parse()
        .context("USER_ID must be a UUID")?;

    tracing::info!(env = ?settings.env, plan_id = %plan_id, "Starting planquery");

    let pool = db::connect(&settings.database_url, settings.database_max_connections).await?;
    if !db::health_check(&pool).await {
        tracing::warn!("Database health check failed - queries may not succeed");
    }

    let oracle = LlmClient::new(
        &settings.llm_api_url,
        &settings.llm_api_key,
        &settings.qa.model_name,
        settings.llm_timeout_seconds,
    )?;

    let mut pipeline = QaPipeline::new(
        Arc::new(oracle),
        Arc::new(PgTakeoffStore::new(pool.clone())),
        Arc::new(PgSnippetStore::new(pool)),
        settings.qa.clone(),
    );

    // The cache is an optimization; run without it when Redis is unreachable.
    match RedisCache::new(&settings.redis_url, settings.redis_cache_ttl_seconds).await {
        Ok(cache) => pipeline = pipeline.with_cache(cache),
        Err(e) => tracing::warn!(error = %e, "Redis unavailable, continuing without answer cache"),
    }

    let answer = pipeline
        .answer_question(PlanScope { plan_id, user_id }, &question, &[])
        .await?;

    println!("{answer}");

    Ok(())
}
