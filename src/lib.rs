//! craftrag - Hybrid retrieval for mod conversion knowledge
//!
//! Answers questions about porting Minecraft Java Edition mods to Bedrock by
//! expanding the query with domain, synonym and session vocabulary, running a
//! hybrid lexical + vector search over a document store, re-ranking the hits
//! with feature and session signals, and composing an answer from the top
//! sources.

pub mod agent;
pub mod cli;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod expansion;
pub mod rerank;
pub mod search;
pub mod session;
mod text;

pub use agent::{AdvancedRagAgent, AgentState, RagQuery, RagResponse};
pub use error::{CraftRagError, Result};
