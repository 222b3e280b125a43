//! Retrieval-and-answer pipeline: similarity search, prompt construction,
//! response parsing, and trace capture.

pub mod parser;
pub mod prompt;
mod service;

use serde::{Deserialize, Serialize};

pub use parser::{Source, extract_answer_and_sources};
pub use prompt::{HistoryTurn, Role, build_prompt};
pub use service::{AnswerApi, AnswerError, AnswerOutcome, AnswerService, NO_CONTEXT_ANSWER};

/// One retrieved chunk as the prompt builder and trace records see it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDoc {
    /// Chunk text used as answer context.
    pub content: String,
    /// Remaining payload fields: filename, page number, hash, score.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}
