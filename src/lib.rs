//! Grounded question-answering engine for construction takeoffs.
//!
//! Answers free-text questions about a construction plan using two sources:
//! the structured takeoff extracted from the plan and short text snippets
//! from its drawings. The pipeline classifies the question, deterministically
//! retrieves the matching slice of project data with fuzzy keyword matching,
//! and phrases an answer that is contractually bounded by the retrieved data,
//! falling back to deterministic text synthesis when the generative step
//! underperforms.

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod logging;
pub mod qa;
pub mod services;

pub use config::{QaOptions, Settings};
pub use error::{EngineError, EngineResult};
pub use qa::{PlanScope, QaPipeline};
