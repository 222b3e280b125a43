//! Query trace capture and persistence.
//!
//! Every answered question can be recorded as one append-only JSON line so
//! the retrieval pipeline can be evaluated offline. Tracing is best-effort:
//! a write failure is logged and never fails the caller's answer path.

use crate::retrieval::RetrievedDoc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use tiktoken_rs::{CoreBPE, cl100k_base};
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// Container for everything needed to evaluate an answer later.
///
/// Records are append-only; nothing rewrites a trace after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryTrace {
    /// End-user question.
    pub question: String,
    /// Retriever output, verbatim.
    pub retrieved_docs: Vec<RetrievedDoc>,
    /// Full prompt text sent to the model (system plus user message).
    pub prompt: String,
    /// Raw chat-model response before parsing.
    pub raw_llm_response: String,
    /// Answer returned to the caller after source extraction.
    pub final_answer: String,
    /// Approximate token count of the prompt.
    pub num_tokens: usize,
    /// RFC3339 creation timestamp.
    pub ts: String,
}

impl QueryTrace {
    /// Current timestamp for trace creation.
    pub fn now_rfc3339() -> String {
        OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    }
}

static PROMPT_ENCODING: OnceLock<Option<CoreBPE>> = OnceLock::new();

/// Approximate token count for trace records.
///
/// Uses the `cl100k_base` encoding when it can be loaded and falls back to
/// whitespace counting otherwise; traces only need a rough size signal.
pub fn approximate_token_count(text: &str) -> usize {
    let encoding = PROMPT_ENCODING.get_or_init(|| match cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(error) => {
            tracing::warn!(error = %error, "Tokenizer unavailable; using whitespace counts");
            None
        }
    });

    match encoding {
        Some(bpe) => bpe.encode_ordinary(text).len(),
        None => text.split_whitespace().count(),
    }
}

/// Append-only recorder writing one JSON line per answered query.
pub struct TraceRecorder {
    path: PathBuf,
    enabled: bool,
    // Appends are serialized so concurrent requests cannot interleave lines.
    write_lock: Mutex<()>,
}

impl TraceRecorder {
    /// Build a recorder for the given path; `enabled = false` turns every
    /// call into a no-op.
    pub fn new(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            path: path.into(),
            enabled,
            write_lock: Mutex::new(()),
        }
    }

    /// Whether traces are persisted at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append one trace record, creating parent directories as needed.
    ///
    /// Errors are logged and swallowed; tracing never fails the answer path.
    pub async fn record(&self, trace: &QueryTrace) {
        if !self.enabled {
            return;
        }

        let _guard = self.write_lock.lock().await;
        if let Err(error) = self.append(trace) {
            tracing::warn!(path = %self.path.display(), error = %error, "Failed to persist query trace");
        }
    }

    fn append(&self, trace: &QueryTrace) -> std::io::Result<()> {
        use std::io::Write;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut line = serde_json::to_string(trace).map_err(std::io::Error::other)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())
    }
}
