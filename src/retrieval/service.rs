//! The answer pipeline: embed the question, search the vector store, prompt
//! the chat model, and parse the response into an answer with citations.

use crate::chat::{ChatClient, ChatClientError};
use crate::embedding::{EmbeddingClient, EmbeddingClientError};
use crate::qdrant::{QdrantError, QdrantService, ScoredPoint};
use crate::retrieval::parser::{Source, extract_answer_and_sources};
use crate::retrieval::prompt::{HistoryTurn, build_prompt};
use crate::retrieval::RetrievedDoc;
use crate::trace::{QueryTrace, TraceRecorder, approximate_token_count};
use async_trait::async_trait;
use thiserror::Error;

/// Answer returned when the vector store has nothing relevant to offer.
pub const NO_CONTEXT_ANSWER: &str = "I couldn't find the relevant information.";

/// Errors surfaced by the answer pipeline.
#[derive(Debug, Error)]
pub enum AnswerError {
    /// Question embedding failed.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Vector search failed.
    #[error("vector search failed: {0}")]
    Qdrant(#[from] QdrantError),
    /// Chat completion failed.
    #[error("chat completion failed: {0}")]
    Chat(#[from] ChatClientError),
}

/// Everything the pipeline produces for one question.
#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    /// Final answer text shown to the caller.
    pub answer: String,
    /// Citations extracted from the model response.
    pub sources: Vec<Source>,
    /// Full trace of the exchange, recorded and returned for debugging.
    pub trace: QueryTrace,
}

/// Seam between the HTTP layer and the answer pipeline.
#[async_trait]
pub trait AnswerApi: Send + Sync {
    /// Answer a question given the conversation so far.
    async fn answer(
        &self,
        question: &str,
        history: &[HistoryTurn],
    ) -> Result<AnswerOutcome, AnswerError>;
}

/// Production pipeline wiring embeddings, Qdrant, and the chat model.
pub struct AnswerService {
    embedding_client: Box<dyn EmbeddingClient>,
    qdrant_service: QdrantService,
    chat_client: Box<dyn ChatClient>,
    recorder: TraceRecorder,
    collection_name: String,
    top_k: usize,
}

impl AnswerService {
    /// Assemble the pipeline from the loaded configuration.
    pub fn from_config() -> Result<Self, QdrantError> {
        let config = crate::config::get_config();
        Ok(Self::new(
            Box::new(crate::embedding::OpenAiEmbeddingClient::from_config()),
            QdrantService::new()?,
            Box::new(crate::chat::OpenAiChatClient::from_config()),
            TraceRecorder::new(config.trace_path.clone(), config.tracing_enabled),
            config.qdrant_collection_name.clone(),
            config.retrieval_top_k,
        ))
    }

    /// Assemble the pipeline from its parts.
    pub fn new(
        embedding_client: Box<dyn EmbeddingClient>,
        qdrant_service: QdrantService,
        chat_client: Box<dyn ChatClient>,
        recorder: TraceRecorder,
        collection_name: String,
        top_k: usize,
    ) -> Self {
        Self {
            embedding_client,
            qdrant_service,
            chat_client,
            recorder,
            collection_name,
            top_k,
        }
    }
}

#[async_trait]
impl AnswerApi for AnswerService {
    async fn answer(
        &self,
        question: &str,
        history: &[HistoryTurn],
    ) -> Result<AnswerOutcome, AnswerError> {
        let vectors = self
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let query_vector = vectors.into_iter().next().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("provider returned no vectors".to_string())
        })?;

        let hits = self
            .qdrant_service
            .search_points(&self.collection_name, query_vector, self.top_k)
            .await?;
        tracing::debug!(question, hits = hits.len(), "Similarity search complete");

        let docs: Vec<RetrievedDoc> = hits.into_iter().map(retrieved_doc_from_point).collect();

        // No context means no model call; answering from nothing would only
        // invite fabricated policy.
        if docs.is_empty() {
            let trace = QueryTrace {
                question: question.to_string(),
                retrieved_docs: Vec::new(),
                prompt: String::new(),
                raw_llm_response: String::new(),
                final_answer: NO_CONTEXT_ANSWER.to_string(),
                num_tokens: 0,
                ts: QueryTrace::now_rfc3339(),
            };
            self.recorder.record(&trace).await;
            return Ok(AnswerOutcome {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Vec::new(),
                trace,
            });
        }

        let (system, user) = build_prompt(question, &docs, history);
        let raw_response = self.chat_client.invoke(&system, &user).await?;
        let (answer, sources) = extract_answer_and_sources(&raw_response);

        let prompt = format!("{system}\n\n{user}");
        let trace = QueryTrace {
            question: question.to_string(),
            retrieved_docs: docs,
            num_tokens: approximate_token_count(&prompt),
            prompt,
            raw_llm_response: raw_response,
            final_answer: answer.clone(),
            ts: QueryTrace::now_rfc3339(),
        };
        self.recorder.record(&trace).await;

        Ok(AnswerOutcome {
            answer,
            sources,
            trace,
        })
    }
}

/// Convert a scored Qdrant point into a retrieved document: the `text` field
/// becomes the content and every other payload field is kept as metadata.
fn retrieved_doc_from_point(point: ScoredPoint) -> RetrievedDoc {
    let mut metadata = point.payload.unwrap_or_default();
    let content = match metadata.remove("text") {
        Some(serde_json::Value::String(text)) => text,
        Some(other) => other.to_string(),
        None => String::new(),
    };
    metadata.insert("score".to_string(), serde_json::json!(point.score));
    RetrievedDoc { content, metadata }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use reqwest::Client;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StaticEmbedder;

    #[async_trait]
    impl EmbeddingClient for StaticEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
    }

    struct ScriptedChat {
        response: String,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChatClient for ScriptedChat {
        async fn invoke(&self, _system: &str, _user: &str) -> Result<String, ChatClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.clone())
        }
    }

    fn qdrant_for(server: &MockServer) -> QdrantService {
        QdrantService {
            client: Client::builder()
                .user_agent("policyqa-test")
                .build()
                .expect("client"),
            base_url: server.base_url(),
            api_key: None,
        }
    }

    fn service_with(
        server: &MockServer,
        chat_response: &str,
        calls: Arc<AtomicUsize>,
        trace_path: &std::path::Path,
    ) -> AnswerService {
        AnswerService::new(
            Box::new(StaticEmbedder),
            qdrant_for(server),
            Box::new(ScriptedChat {
                response: chat_response.to_string(),
                calls,
            }),
            TraceRecorder::new(trace_path, true),
            "documents".to_string(),
            4,
        )
    }

    fn mock_search(server: &MockServer, result: serde_json::Value) {
        server.mock(|when, then| {
            when.method(POST).path("/collections/documents/points/query");
            then.status(200)
                .json_body(json!({ "status": "ok", "time": 0.0, "result": result }));
        });
    }

    #[tokio::test]
    async fn empty_retrieval_skips_the_chat_model() {
        let server = MockServer::start_async().await;
        mock_search(&server, json!([]));

        let dir = tempfile::tempdir().expect("temp dir");
        let trace_path = dir.path().join("traces.jsonl");
        let calls = Arc::new(AtomicUsize::new(0));
        let service = service_with(&server, "unused", calls.clone(), &trace_path);

        let outcome = service
            .answer("How long is sabbatical leave?", &[])
            .await
            .expect("answer");

        assert_eq!(outcome.answer, NO_CONTEXT_ANSWER);
        assert!(outcome.sources.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // Even the sentinel answer leaves a trace line behind.
        let contents = std::fs::read_to_string(&trace_path).expect("trace file");
        assert_eq!(contents.lines().count(), 1);
    }

    #[tokio::test]
    async fn answers_are_parsed_and_traced() {
        let server = MockServer::start_async().await;
        mock_search(
            &server,
            json!([
                {
                    "id": "5f0c9d2e-0000-0000-0000-000000000001",
                    "score": 0.9,
                    "payload": {
                        "text": "Adoption leave lasts 52 weeks.",
                        "filename": "Leave-Policy.pdf",
                        "page_number": 37
                    }
                }
            ]),
        );

        let dir = tempfile::tempdir().expect("temp dir");
        let trace_path = dir.path().join("traces.jsonl");
        let calls = Arc::new(AtomicUsize::new(0));
        let raw = "Adoption leave lasts 52 weeks.\n\n{\"sources\":[{\"file\":\"Leave-Policy.pdf\",\"page\":37}]}";
        let service = service_with(&server, raw, calls.clone(), &trace_path);

        let outcome = service
            .answer("How long is adoption leave?", &[])
            .await
            .expect("answer");

        assert_eq!(outcome.answer, "Adoption leave lasts 52 weeks.");
        assert_eq!(outcome.sources.len(), 1);
        assert_eq!(outcome.sources[0].file, "Leave-Policy.pdf");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcome.trace.num_tokens > 0);
        assert_eq!(outcome.trace.retrieved_docs.len(), 1);
        assert_eq!(
            outcome.trace.retrieved_docs[0].content,
            "Adoption leave lasts 52 weeks."
        );

        let contents = std::fs::read_to_string(&trace_path).expect("trace file");
        let recorded: QueryTrace =
            serde_json::from_str(contents.lines().next().expect("line")).expect("trace json");
        assert_eq!(recorded.final_answer, "Adoption leave lasts 52 weeks.");
        assert_eq!(recorded.raw_llm_response, raw);
    }

    #[tokio::test]
    async fn payload_text_moves_into_content_and_score_into_metadata() {
        let mut payload = serde_json::Map::new();
        payload.insert("text".into(), json!("The chunk text."));
        payload.insert("filename".into(), json!("A.pdf"));
        let doc = retrieved_doc_from_point(ScoredPoint {
            id: "1".into(),
            score: 0.5,
            payload: Some(payload),
        });

        assert_eq!(doc.content, "The chunk text.");
        assert!(doc.metadata.get("text").is_none());
        assert_eq!(doc.metadata["filename"], json!("A.pdf"));
        assert!((doc.metadata["score"].as_f64().expect("score") - 0.5).abs() < 1e-6);
    }
}
