//! Ingestion pipeline: hashing, dedup, partitioning, chunking, and
//! idempotent vector-store population.

pub mod chunker;
pub mod hash;
pub mod partition;
mod pipeline;

pub use chunker::{ChunkSpan, ChunkingError, chunk_elements};
pub use hash::hash_file;
pub use partition::{
    Element, ElementKind, PartitionError, PartitionPolicy, PartitionProvider, PdfPartitioner,
    partition_document,
};
pub use pipeline::{Chunk, DocumentOutcome, IngestError, IngestService, IngestSummary};
