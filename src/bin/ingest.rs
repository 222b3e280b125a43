//! Batch ingestion CLI: walk a directory of policy PDFs and index every
//! document that is not already in the vector store.

use clap::Parser;
use policyqa::embedding::OpenAiEmbeddingClient;
use policyqa::ingestion::{IngestService, PdfPartitioner};
use policyqa::{config, logging};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ingest", about = "Index policy PDFs into the vector store")]
struct Args {
    /// Directory scanned recursively for *.pdf files.
    #[arg(default_value = "data/pdfs")]
    dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    config::init_config();
    logging::init_tracing();
    let args = Args::parse();

    if !args.dir.is_dir() {
        tracing::error!(dir = %args.dir.display(), "Not a directory");
        return ExitCode::FAILURE;
    }

    let service = match IngestService::new(
        Box::new(OpenAiEmbeddingClient::from_config()),
        Box::new(PdfPartitioner),
    )
    .await
    {
        Ok(service) => service,
        Err(error) => {
            tracing::error!(error = %error, "Failed to prepare ingestion");
            return ExitCode::FAILURE;
        }
    };

    let summary = service.ingest_directory(&args.dir).await;
    println!(
        "Indexed {} document(s) ({} chunks), skipped {}, failed {}",
        summary.documents_indexed,
        summary.chunks_written,
        summary.documents_skipped,
        summary.documents_failed
    );

    if summary.documents_failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
