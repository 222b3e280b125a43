#![deny(missing_docs)]

//! Core library for the policy document QA service.

/// HTTP routing and REST handlers.
pub mod api;
/// Chat-model client abstraction and adapters.
pub mod chat;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF ingestion pipeline: hashing, partitioning, chunking, indexing.
pub mod ingestion;
/// Structured logging and tracing setup.
pub mod logging;
/// Qdrant vector store integration.
pub mod qdrant;
/// Retrieval-and-answer pipeline.
pub mod retrieval;
/// Query trace capture and persistence.
pub mod trace;
