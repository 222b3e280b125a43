//! Document partitioning: structured elements, the provider seam, and the
//! on-disk partition cache.
//!
//! Partitioning decomposes a raw PDF into ordered layout elements (titles and
//! narrative text with page positions) ahead of chunking. The work is
//! CPU-bound and dominates ingestion wall time, so results are cached as one
//! JSON artifact per source document. Cache keys include a content-hash
//! prefix: editing a same-named file re-partitions instead of returning
//! stale elements.

use crate::config::PartitionStrategy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while partitioning a document or touching its cache.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Source document could not be read.
    #[error("Failed to read document: {0}")]
    Io(#[from] std::io::Error),
    /// Partitioning provider could not produce elements for the document.
    #[error("Partitioning failed: {0}")]
    Provider(String),
    /// Cache artifact could not be serialized or deserialized.
    #[error("Partition cache artifact is invalid: {0}")]
    Cache(#[from] serde_json::Error),
}

/// Classification of a layout element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    /// Section heading; chunking breaks sections on these.
    Title,
    /// Body text.
    NarrativeText,
}

/// One layout element produced by partitioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    /// Text content of the element.
    pub text: String,
    /// Layout classification.
    pub kind: ElementKind,
    /// One-based page the element starts on, when resolvable.
    pub page_number: Option<u32>,
}

/// Interface implemented by partitioning providers.
///
/// The default provider is a text-extraction heuristic; a higher-fidelity
/// layout-analysis service can be swapped in behind this trait.
pub trait PartitionProvider: Send + Sync {
    /// Decompose the document at `path` into ordered elements.
    fn partition(
        &self,
        path: &Path,
        strategy: PartitionStrategy,
    ) -> Result<Vec<Element>, PartitionError>;
}

/// Policy controlling partitioning and its cache.
#[derive(Debug, Clone)]
pub struct PartitionPolicy {
    /// Strategy identifier passed through to the provider.
    pub strategy: PartitionStrategy,
    /// Root directory for cache artifacts.
    pub cache_dir: PathBuf,
    /// Whether partition results are persisted and reused.
    pub cache_enabled: bool,
}

/// On-disk cache artifact: the serialized element set plus its provenance.
#[derive(Debug, Serialize, Deserialize)]
struct CachedElements {
    source_hash: String,
    strategy: String,
    elements: Vec<Element>,
}

/// Partition a document, consulting the cache first.
///
/// With caching enabled, an existing artifact for this document (keyed by
/// stem and content hash) is deserialized and returned without invoking the
/// provider. Otherwise the provider runs and, when caching is enabled, the
/// result is serialized before returning. Provider failure is fatal for this
/// document only; callers continue with the rest of the batch.
pub fn partition_document(
    path: &Path,
    content_hash: &str,
    provider: &dyn PartitionProvider,
    policy: &PartitionPolicy,
) -> Result<Vec<Element>, PartitionError> {
    let cache_file = cache_path(path, content_hash, policy);

    if policy.cache_enabled && cache_file.exists() {
        let raw = fs::read_to_string(&cache_file)?;
        let cached: CachedElements = serde_json::from_str(&raw)?;
        tracing::debug!(
            document = %path.display(),
            cache = %cache_file.display(),
            elements = cached.elements.len(),
            "Loaded cached partition elements"
        );
        return Ok(cached.elements);
    }

    tracing::info!(
        document = %path.display(),
        strategy = policy.strategy.as_str(),
        "Partitioning document"
    );
    let elements = provider.partition(path, policy.strategy)?;

    if policy.cache_enabled {
        let artifact = CachedElements {
            source_hash: content_hash.to_string(),
            strategy: policy.strategy.as_str().to_string(),
            elements,
        };
        if let Some(parent) = cache_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&cache_file, serde_json::to_string(&artifact)?)?;
        tracing::debug!(cache = %cache_file.display(), "Persisted partition elements");
        return Ok(artifact.elements);
    }

    Ok(elements)
}

/// Cache artifact location for a document: `{stem}-{hash[..12]}.json` under
/// a per-strategy subdirectory.
fn cache_path(path: &Path, content_hash: &str, policy: &PartitionPolicy) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document");
    let prefix = &content_hash[..content_hash.len().min(12)];
    policy
        .cache_dir
        .join(policy.strategy.as_str())
        .join(format!("{stem}-{prefix}.json"))
}

/// Default partitioning provider backed by `pdf-extract`.
///
/// Extracted text is split into pages on form feeds. Pages are then split
/// into blank-line-separated blocks; short unpunctuated leading lines are
/// classified as titles. `hi_res` reflows wrapped lines within a block into
/// one narrative element, `fast` keeps the raw line structure.
pub struct PdfPartitioner;

// Below this much extracted text the PDF is almost certainly scanned and
// needs OCR, which this provider does not do.
const MIN_EXTRACTED_CHARS: usize = 50;

impl PartitionProvider for PdfPartitioner {
    fn partition(
        &self,
        path: &Path,
        strategy: PartitionStrategy,
    ) -> Result<Vec<Element>, PartitionError> {
        let bytes = fs::read(path)?;
        let raw_text = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|error| PartitionError::Provider(error.to_string()))?;

        if raw_text.trim().len() < MIN_EXTRACTED_CHARS {
            return Err(PartitionError::Provider(
                "document contains too little extractable text; it may be scanned".to_string(),
            ));
        }

        Ok(elements_from_text(&raw_text, strategy))
    }
}

fn elements_from_text(raw_text: &str, strategy: PartitionStrategy) -> Vec<Element> {
    let mut elements = Vec::new();

    for (page_index, page_text) in raw_text.split('\u{0c}').enumerate() {
        let page_number = Some(page_index as u32 + 1);

        for block in page_text.split("\n\n") {
            let lines: Vec<&str> = block
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect();
            if lines.is_empty() {
                continue;
            }

            let mut body_lines = &lines[..];
            if looks_like_title(lines[0]) {
                elements.push(Element {
                    text: lines[0].to_string(),
                    kind: ElementKind::Title,
                    page_number,
                });
                body_lines = &lines[1..];
            }

            if body_lines.is_empty() {
                continue;
            }

            match strategy {
                PartitionStrategy::HiRes => {
                    elements.push(Element {
                        text: body_lines.join(" "),
                        kind: ElementKind::NarrativeText,
                        page_number,
                    });
                }
                PartitionStrategy::Fast => {
                    for line in body_lines {
                        elements.push(Element {
                            text: (*line).to_string(),
                            kind: ElementKind::NarrativeText,
                            page_number,
                        });
                    }
                }
            }
        }
    }

    elements
}

/// Heuristic title detection: short lines without terminal punctuation whose
/// first alphabetic character is uppercase (or that are numbered headings).
fn looks_like_title(line: &str) -> bool {
    if line.len() > 80 {
        return false;
    }
    if line.ends_with('.') || line.ends_with(',') || line.ends_with(';') {
        return false;
    }
    let mut chars = line.chars().filter(|c| c.is_alphabetic());
    match chars.next() {
        Some(first) if first.is_uppercase() => {
            let words = line.split_whitespace().count();
            words <= 12
        }
        Some(_) => false,
        // Purely numeric lines are page artifacts, not headings.
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProvider(Vec<Element>);

    impl PartitionProvider for StaticProvider {
        fn partition(
            &self,
            _path: &Path,
            _strategy: PartitionStrategy,
        ) -> Result<Vec<Element>, PartitionError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    impl PartitionProvider for FailingProvider {
        fn partition(
            &self,
            _path: &Path,
            _strategy: PartitionStrategy,
        ) -> Result<Vec<Element>, PartitionError> {
            Err(PartitionError::Provider("layout model crashed".into()))
        }
    }

    fn title(text: &str, page: u32) -> Element {
        Element {
            text: text.into(),
            kind: ElementKind::Title,
            page_number: Some(page),
        }
    }

    fn narrative(text: &str, page: u32) -> Element {
        Element {
            text: text.into(),
            kind: ElementKind::NarrativeText,
            page_number: Some(page),
        }
    }

    #[test]
    fn partition_caches_and_reuses_elements() {
        let dir = tempfile::tempdir().expect("temp dir");
        let policy = PartitionPolicy {
            strategy: PartitionStrategy::HiRes,
            cache_dir: dir.path().to_path_buf(),
            cache_enabled: true,
        };
        let doc = Path::new("Leave-Policy.pdf");
        let elements = vec![title("Adoption Leave", 1), narrative("Body text.", 1)];

        let first =
            partition_document(doc, "abcdef012345", &StaticProvider(elements.clone()), &policy)
                .expect("first partition");
        assert_eq!(first.len(), 2);

        // Second run must come from the cache, not the provider.
        let second = partition_document(doc, "abcdef012345", &FailingProvider, &policy)
            .expect("cached partition");
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].text, "Adoption Leave");
    }

    #[test]
    fn changed_content_hash_misses_the_cache() {
        let dir = tempfile::tempdir().expect("temp dir");
        let policy = PartitionPolicy {
            strategy: PartitionStrategy::HiRes,
            cache_dir: dir.path().to_path_buf(),
            cache_enabled: true,
        };
        let doc = Path::new("Leave-Policy.pdf");

        partition_document(
            doc,
            "aaaaaaaaaaaa",
            &StaticProvider(vec![narrative("old", 1)]),
            &policy,
        )
        .expect("seed cache");

        // Same file name, different bytes: must re-partition.
        let error = partition_document(doc, "bbbbbbbbbbbb", &FailingProvider, &policy).unwrap_err();
        assert!(matches!(error, PartitionError::Provider(_)));
    }

    #[test]
    fn disabled_cache_always_invokes_provider() {
        let dir = tempfile::tempdir().expect("temp dir");
        let policy = PartitionPolicy {
            strategy: PartitionStrategy::HiRes,
            cache_dir: dir.path().to_path_buf(),
            cache_enabled: false,
        };
        let doc = Path::new("Leave-Policy.pdf");

        partition_document(
            doc,
            "abcdef012345",
            &StaticProvider(vec![narrative("body", 1)]),
            &policy,
        )
        .expect("partition");

        assert!(
            fs::read_dir(dir.path()).expect("read dir").next().is_none(),
            "no artifact should be written"
        );
    }

    #[test]
    fn elements_from_text_splits_pages_on_form_feed() {
        let text = "Intro\n\nFirst page body text here.\u{0c}Second Page Heading\n\nMore body text.";
        let elements = elements_from_text(text, PartitionStrategy::HiRes);

        let pages: Vec<Option<u32>> = elements.iter().map(|e| e.page_number).collect();
        assert!(pages.contains(&Some(1)));
        assert!(pages.contains(&Some(2)));
    }

    #[test]
    fn hi_res_reflows_wrapped_lines() {
        let text = "Section One\n\nThis paragraph was wrapped\nacross two lines by the layout.";
        let elements = elements_from_text(text, PartitionStrategy::HiRes);

        assert_eq!(elements[0].kind, ElementKind::Title);
        assert_eq!(elements[1].kind, ElementKind::NarrativeText);
        assert_eq!(
            elements[1].text,
            "This paragraph was wrapped across two lines by the layout."
        );
    }

    #[test]
    fn title_heuristic_rejects_sentences_and_page_numbers() {
        assert!(looks_like_title("Adoption Leave"));
        assert!(looks_like_title("3. Shared Parental Leave"));
        assert!(!looks_like_title("This is a full sentence about leave."));
        assert!(!looks_like_title("37"));
        assert!(!looks_like_title("lowercase heading"));
    }
}
