//! Prompt assembly for grounded question answering.
//!
//! The system instruction fixes the model's behavior; the user message
//! carries the retrieved context, the conversation so far, and the current
//! question. Both halves are deterministic functions of their inputs so a
//! recorded trace can reproduce the exact prompt.

use crate::retrieval::RetrievedDoc;
use serde::{Deserialize, Serialize};

/// Who spoke a prior conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user asking questions.
    User,
    /// The assistant's earlier answers.
    Assistant,
}

/// One prior turn of the conversation, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryTurn {
    /// Speaker of the turn.
    pub role: Role,
    /// Verbatim text of the turn.
    pub content: String,
}

/// Behavioral contract sent as the system message on every request.
pub const SYSTEM_INSTRUCTION: &str = "\
You are an assistant that answers questions about internal policy documents.

Follow these rules:
1. Answer strictly from the provided document excerpts. If the excerpts do \
not contain the information needed, say that you could not find it. Never \
invent policy details.
2. If the question is ambiguous or could refer to more than one policy, ask \
one short clarifying question instead of answering. A clarifying question \
must not include a citation block.
3. Cite every claim. Only cite documents whose excerpts you actually used; \
never cite a document that was not provided.
4. Write in plain, professional language. Do not mention that you are an AI, \
a language model, or that you were given excerpts.
5. End your response with exactly one blank line followed by a single line \
of JSON of the form {\"sources\": [{\"file\": \"<file name>\", \"page\": \
<page number>}]}. When rule 2 applies, omit the JSON line entirely.";

/// Render the retrieved context, conversation history, and question into the
/// user message, returning `(system_instruction, user_message)`.
pub fn build_prompt(
    question: &str,
    docs: &[RetrievedDoc],
    history: &[HistoryTurn],
) -> (String, String) {
    let mut user_message = String::new();

    for doc in docs {
        let filename = doc
            .metadata
            .get("filename")
            .and_then(|value| value.as_str())
            .unwrap_or("unknown");
        let page = doc
            .metadata
            .get("page_number")
            .and_then(|value| value.as_u64())
            .map(|page| page.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        user_message.push_str(&format!("Document: {filename}, Page: {page}\n"));
        user_message.push_str(&format!("Content: {}\n\n", doc.content));
    }

    if !history.is_empty() {
        user_message.push_str("Conversation so far:\n");
        for turn in history {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            user_message.push_str(&format!("{speaker}: {}\n", turn.content));
        }
        user_message.push('\n');
    }

    user_message.push_str(&format!("Question: {question}"));

    (SYSTEM_INSTRUCTION.to_string(), user_message)
}
