//! Ingestion service coordinating hashing, dedup, partitioning, chunking,
//! embedding, and Qdrant writes.

use crate::{
    config::get_config,
    embedding::{EmbeddingClient, EmbeddingClientError},
    ingestion::{
        chunker::{ChunkingError, chunk_elements},
        hash::hash_file,
        partition::{PartitionError, PartitionPolicy, PartitionProvider, partition_document},
    },
    qdrant::{
        PointUpsert, QdrantError, QdrantService, chunk_id,
        payload::{build_chunk_payload, current_timestamp_rfc3339},
        point_id_for_chunk,
    },
};
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

/// Vectors are written to Qdrant in batches of this size to bound peak
/// request size and memory.
pub(crate) const INDEX_BATCH_SIZE: usize = 100;

/// Errors emitted by the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Source document could not be read or hashed.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
    /// Partitioning failed for the document.
    #[error("Failed to partition document: {0}")]
    Partition(#[from] PartitionError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Qdrant interaction failed during ingestion.
    #[error("Qdrant request failed: {0}")]
    Qdrant(#[from] QdrantError),
}

/// Unit of retrievable text produced by the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Chunk text content.
    pub text: String,
    /// Base name of the owning source document.
    pub filename: String,
    /// Starting page of the chunk's section; partitioning may not resolve
    /// a page for merged sections.
    pub page_number: Option<u32>,
    /// Content hash of the owning source document.
    pub source_hash: String,
    /// Position within the document's chunk list.
    pub sequence_index: usize,
}

/// Result of ingesting one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Document was chunked and written; carries the chunk count.
    Indexed(usize),
    /// Document's content hash was already present in the store.
    AlreadyIndexed,
    /// Partitioning produced no chunks; the document was skipped.
    NoChunks,
}

/// Counters summarizing a directory ingestion run.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestSummary {
    /// Documents chunked and written this run.
    pub documents_indexed: usize,
    /// Documents skipped because their hash was already present.
    pub documents_skipped: usize,
    /// Documents that failed partitioning or indexing.
    pub documents_failed: usize,
    /// Total chunks written this run.
    pub chunks_written: usize,
}

/// Coordinates the full ingestion pipeline for a document set.
///
/// The service owns long-lived handles to the embedding client, the Qdrant
/// transport, and the partition provider. Ingestion is sequential over
/// documents: partitioning is CPU-bound and dominates wall time, and there
/// is no shared mutable state between documents beyond the append-only
/// vector store.
pub struct IngestService {
    embedding_client: Box<dyn EmbeddingClient>,
    qdrant_service: QdrantService,
    partition_provider: Box<dyn PartitionProvider>,
    partition_policy: PartitionPolicy,
    collection_name: String,
}

impl IngestService {
    /// Build a new ingestion service, ensuring the target collection exists.
    pub async fn new(
        embedding_client: Box<dyn EmbeddingClient>,
        partition_provider: Box<dyn PartitionProvider>,
    ) -> Result<Self, IngestError> {
        let config = get_config();
        let qdrant_service = QdrantService::new()?;
        let vector_size = config.embedding_dimension as u64;
        qdrant_service
            .create_collection_if_not_exists(&config.qdrant_collection_name, vector_size)
            .await?;
        qdrant_service
            .ensure_payload_indexes(&config.qdrant_collection_name)
            .await?;
        tracing::debug!(collection = %config.qdrant_collection_name, "Collection ready");

        Ok(Self {
            embedding_client,
            qdrant_service,
            partition_provider,
            partition_policy: PartitionPolicy {
                strategy: config.partition_strategy,
                cache_dir: config.partition_cache_dir.clone().into(),
                cache_enabled: config.partition_cache_enabled,
            },
            collection_name: config.qdrant_collection_name.clone(),
        })
    }

    /// Ingest every `*.pdf` under `dir`, in sorted order.
    ///
    /// Per-document failures are logged and the batch continues.
    pub async fn ingest_directory(&self, dir: &Path) -> IngestSummary {
        let mut pdf_files: Vec<_> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry
                        .path()
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            })
            .map(|entry| entry.into_path())
            .collect();
        pdf_files.sort();

        if pdf_files.is_empty() {
            tracing::warn!(dir = %dir.display(), "No PDF files found");
            return IngestSummary::default();
        }

        tracing::info!(dir = %dir.display(), count = pdf_files.len(), "Found PDF files");

        let mut summary = IngestSummary::default();
        for path in &pdf_files {
            match self.ingest_document(path).await {
                Ok(DocumentOutcome::Indexed(chunks)) => {
                    summary.documents_indexed += 1;
                    summary.chunks_written += chunks;
                }
                Ok(DocumentOutcome::AlreadyIndexed) | Ok(DocumentOutcome::NoChunks) => {
                    summary.documents_skipped += 1;
                }
                Err(error) => {
                    tracing::error!(document = %path.display(), error = %error, "Ingestion failed");
                    summary.documents_failed += 1;
                }
            }
        }

        tracing::info!(
            indexed = summary.documents_indexed,
            skipped = summary.documents_skipped,
            failed = summary.documents_failed,
            chunks = summary.chunks_written,
            "Ingestion run complete"
        );
        summary
    }

    /// Ingest one document: hash, dedup-check, partition, chunk, index.
    pub async fn ingest_document(&self, path: &Path) -> Result<DocumentOutcome, IngestError> {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("document.pdf")
            .to_string();
        let source_hash = hash_file(path)?;

        if self.already_indexed(&source_hash).await {
            tracing::info!(document = %filename, "Skipping document - already indexed");
            return Ok(DocumentOutcome::AlreadyIndexed);
        }

        let elements = partition_document(
            path,
            &source_hash,
            self.partition_provider.as_ref(),
            &self.partition_policy,
        )?;

        let config = get_config();
        let spans = chunk_elements(&elements, &config.chunking)?;
        if spans.is_empty() {
            // Skip-and-log rather than raise: an empty document should not
            // abort the rest of the batch.
            tracing::warn!(document = %filename, "No chunks produced; skipping document");
            return Ok(DocumentOutcome::NoChunks);
        }

        let chunks: Vec<Chunk> = spans
            .into_iter()
            .enumerate()
            .map(|(sequence_index, span)| Chunk {
                text: span.text,
                filename: filename.clone(),
                page_number: span.page_number,
                source_hash: source_hash.clone(),
                sequence_index,
            })
            .collect();

        let written = self.index_chunks(&chunks).await?;
        tracing::info!(document = %filename, chunks = written, "Document indexed");
        Ok(DocumentOutcome::Indexed(written))
    }

    /// Query the store for any record carrying this content hash.
    ///
    /// Fails closed: a transient store error reports "not indexed yet" so
    /// the document is re-processed rather than silently dropped. The
    /// deterministic chunk IDs make the re-processing harmless.
    pub async fn already_indexed(&self, source_hash: &str) -> bool {
        match self
            .qdrant_service
            .contains_source_hash(&self.collection_name, source_hash)
            .await
        {
            Ok(present) => present,
            Err(error) => {
                tracing::warn!(error = %error, "Dedup probe failed; assuming not indexed");
                false
            }
        }
    }

    /// Embed and upsert chunks in fixed-size batches, returning the count
    /// written.
    ///
    /// Each point carries a deterministic ID derived from
    /// `{source_hash}-{sequence_index}`, so a retry after a partial batch
    /// failure replaces rather than duplicates.
    pub async fn index_chunks(&self, chunks: &[Chunk]) -> Result<usize, IngestError> {
        let now = current_timestamp_rfc3339();
        let mut written = 0;

        for batch in chunks.chunks(INDEX_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let embeddings = self.embedding_client.generate_embeddings(texts).await?;
            debug_assert_eq!(batch.len(), embeddings.len());

            let points: Vec<PointUpsert> = batch
                .iter()
                .zip(embeddings)
                .map(|(chunk, vector)| PointUpsert {
                    point_id: point_id_for_chunk(&chunk_id(
                        &chunk.source_hash,
                        chunk.sequence_index,
                    )),
                    payload: build_chunk_payload(chunk, &now),
                    vector,
                })
                .collect();

            written += self
                .qdrant_service
                .upsert_points(&self.collection_name, points)
                .await?;
        }

        Ok(written)
    }
}
