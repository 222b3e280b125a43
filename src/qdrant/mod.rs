//! Qdrant vector store integration.

pub mod client;
pub mod payload;
pub mod types;

pub use client::QdrantService;
pub use payload::{chunk_id, point_id_for_chunk};
pub use types::{PointUpsert, QdrantError, ScoredPoint};
