//! Extraction of the natural-language answer and structured citations from
//! a raw chat-model response.
//!
//! The model is instructed to end its response with one blank line followed
//! by a single-line JSON object carrying a `sources` array. Model compliance
//! is best-effort, so the parser is total: malformed or missing JSON
//! degrades to "no sources" and the whole response becomes the answer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A citation extracted from a model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Document name the claim is traced to.
    pub file: String,
    /// Page number, when the model reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Optional supporting excerpt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Split a raw response into the answer text and its source list.
///
/// The last blank-line-separated block is parsed as JSON; if it is an
/// object with a `sources` array, the array's valid entries become the
/// sources and the preceding text (trimmed) becomes the answer. Anything
/// else (a clarifying question, malformed JSON, no trailing block) yields
/// the full trimmed response with an empty source list. Never fails.
pub fn extract_answer_and_sources(raw_response: &str) -> (String, Vec<Source>) {
    let trimmed = raw_response.trim();

    if let Some((head, block)) = split_trailing_block(trimmed)
        && let Some(sources) = parse_sources_block(block)
    {
        return (head.trim().to_string(), sources);
    }

    // A response that is nothing but the JSON object has no blank line to
    // split on; treat the whole text as the trailing block.
    if let Some(sources) = parse_sources_block(trimmed) {
        return (String::new(), sources);
    }

    (trimmed.to_string(), Vec::new())
}

/// Split off the last block separated by a blank line, returning
/// `(everything_before, block)`.
fn split_trailing_block(text: &str) -> Option<(&str, &str)> {
    let mut boundary = None;
    let mut offset = 0;

    for line in text.split_inclusive('\n') {
        if line.trim().is_empty() {
            boundary = Some((offset, offset + line.len()));
        }
        offset += line.len();
    }

    let (head_end, block_start) = boundary?;
    let block = text[block_start..].trim();
    if block.is_empty() {
        return None;
    }
    Some((&text[..head_end], block))
}

/// Parse a candidate block as `{"sources": [...]}`; returns `None` when the
/// block is not a JSON mapping with a `sources` array.
fn parse_sources_block(block: &str) -> Option<Vec<Source>> {
    if !block.starts_with('{') {
        return None;
    }

    let value: Value = serde_json::from_str(block).ok()?;
    let entries = value.as_object()?.get("sources")?.as_array()?;

    // Invalid entries are tolerated by omission rather than rejecting the
    // whole block.
    Some(entries.iter().filter_map(parse_source_entry).collect())
}

fn parse_source_entry(entry: &Value) -> Option<Source> {
    let map = entry.as_object()?;
    let file = map.get("file")?.as_str()?.to_string();
    let page = map
        .get("page")
        .and_then(Value::as_u64)
        .and_then(|page| u32::try_from(page).ok());
    let text = map
        .get("text")
        .and_then(Value::as_str)
        .map(ToString::to_string);
    Some(Source { file, page, text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_answer_with_sources() {
        let raw = "Answer text.\n\n{\"sources\":[{\"file\":\"A.pdf\",\"page\":3}]}";
        let (answer, sources) = extract_answer_and_sources(raw);

        assert_eq!(answer, "Answer text.");
        assert_eq!(
            sources,
            vec![Source {
                file: "A.pdf".into(),
                page: Some(3),
                text: None,
            }]
        );
    }

    #[test]
    fn clarifying_question_degrades_to_no_sources() {
        let raw = "Which leave policy do you mean: maternity, adoption, or shared parental?";
        let (answer, sources) = extract_answer_and_sources(raw);

        assert_eq!(answer, raw);
        assert!(sources.is_empty());
    }

    #[test]
    fn malformed_trailing_json_degrades_to_no_sources() {
        let raw = "Answer text.\n\n{\"sources\": [{\"file\": \"A.pdf\",";
        let (answer, sources) = extract_answer_and_sources(raw);

        assert_eq!(answer, raw.trim());
        assert!(sources.is_empty());
    }

    #[test]
    fn trailing_block_without_sources_key_is_not_a_citation_block() {
        let raw = "Answer text.\n\n{\"note\":\"not a citation\"}";
        let (answer, sources) = extract_answer_and_sources(raw);

        assert_eq!(answer, raw.trim());
        assert!(sources.is_empty());
    }

    #[test]
    fn invalid_entries_are_dropped_not_fatal() {
        let raw = concat!(
            "Answer text.\n\n",
            "{\"sources\":[{\"file\":\"A.pdf\",\"page\":3},\"bogus\",{\"page\":9},{\"file\":\"B.pdf\"}]}"
        );
        let (answer, sources) = extract_answer_and_sources(raw);

        assert_eq!(answer, "Answer text.");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].file, "A.pdf");
        assert_eq!(sources[1].file, "B.pdf");
        assert_eq!(sources[1].page, None);
    }

    #[test]
    fn json_only_response_yields_empty_answer() {
        let raw = "{\"sources\":[{\"file\":\"A.pdf\"}]}";
        let (answer, sources) = extract_answer_and_sources(raw);

        assert_eq!(answer, "");
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn multi_paragraph_answers_keep_all_paragraphs() {
        let raw = "First paragraph.\n\nSecond paragraph.\n\n{\"sources\":[{\"file\":\"A.pdf\",\"page\":1}]}";
        let (answer, sources) = extract_answer_and_sources(raw);

        assert_eq!(answer, "First paragraph.\n\nSecond paragraph.");
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn source_excerpts_are_preserved() {
        let raw = "Answer.\n\n{\"sources\":[{\"file\":\"A.pdf\",\"page\":2,\"text\":\"the excerpt\"}]}";
        let (_, sources) = extract_answer_and_sources(raw);
        assert_eq!(sources[0].text.as_deref(), Some("the excerpt"));
    }

    #[test]
    fn empty_input_is_handled() {
        let (answer, sources) = extract_answer_and_sources("   \n  ");
        assert_eq!(answer, "");
        assert!(sources.is_empty());
    }
}
