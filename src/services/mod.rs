//! Collaborators behind the pipeline: the text-generation oracle, the takeoff
//! and snippet stores, and the Redis answer cache.

pub mod cache;
pub mod oracle;
pub mod stores;

pub use cache::RedisCache;
pub use oracle::{LlmClient, TextOracle};
pub use stores::{PgSnippetStore, PgTakeoffStore, SnippetStore, TakeoffStore};
