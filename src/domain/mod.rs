//! Domain types for the grounded Q&A pipeline.

pub mod chat;
pub mod classification;
pub mod retrieval;
pub mod takeoff;

// Re-export commonly used types
pub use chat::{ChatRole, ChatTurn};
pub use classification::{Classification, ModificationIntent, QuestionType};
pub use retrieval::{BlueprintSnippet, RetrievalResult};
pub use takeoff::TakeoffItem;
