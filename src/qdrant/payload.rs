//! Helpers for constructing chunk payloads and deterministic point IDs.

use crate::ingestion::Chunk;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use uuid::Uuid;

/// Deterministic chunk identity: `{source_hash}-{sequence_index}`.
///
/// Re-running ingestion on unchanged bytes reproduces the same IDs, which is
/// what makes re-indexing idempotent.
pub fn chunk_id(source_hash: &str, sequence_index: usize) -> String {
    format!("{source_hash}-{sequence_index}")
}

/// Map a chunk ID string onto a Qdrant-compatible point identifier.
///
/// Qdrant only accepts UUIDs or unsigned integers as point IDs, so the
/// chunk ID is hashed through UUIDv5. The mapping is pure: identical chunk
/// IDs always yield identical point IDs, preserving upsert idempotency.
pub fn point_id_for_chunk(chunk_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, chunk_id.as_bytes()).to_string()
}

/// Build the payload object stored alongside each indexed chunk.
pub(crate) fn build_chunk_payload(chunk: &Chunk, timestamp_rfc3339: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("text".into(), Value::String(chunk.text.clone()));
    payload.insert("filename".into(), Value::String(chunk.filename.clone()));
    payload.insert(
        "page_number".into(),
        match chunk.page_number {
            Some(page) => Value::from(page),
            None => Value::Null,
        },
    );
    payload.insert(
        "source_hash".into(),
        Value::String(chunk.source_hash.clone()),
    );
    payload.insert("sequence_index".into(), Value::from(chunk.sequence_index));
    payload.insert(
        "chunk_id".into(),
        Value::String(chunk_id(&chunk.source_hash, chunk.sequence_index)),
    );
    payload.insert(
        "indexed_at".into(),
        Value::String(timestamp_rfc3339.to_string()),
    );
    Value::Object(payload)
}

/// Current timestamp formatted for payload storage.
pub(crate) fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}
