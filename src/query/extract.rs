//! Citation rewriting and response assembly.
//!
//! The in-page pass leaves placeholder tokens where hyperlinks stood: a
//! private-use sentinel pair wrapping the anchor's document index. This
//! module turns those tokens into footnote references numbered by first
//! appearance in the text, deduplicated by URL, and renders the final
//! response document.

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::query::page::{RawExtract, RawStep};

// ============================================================================
// Placeholder Tokens
// ============================================================================

/// Opens an anchor placeholder in extracted text.
pub const ANCHOR_OPEN: char = '\u{E000}';

/// Closes an anchor placeholder in extracted text.
pub const ANCHOR_CLOSE: char = '\u{E001}';

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("\u{E000}(\\d+)\u{E001}").unwrap_or_else(|_| unreachable!()));

// ============================================================================
// Response Types
// ============================================================================

/// One cited source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Footnote index, starting at 1 in first-appearance order.
    pub index: usize,
    /// Source URL.
    pub url: String,
    /// Source title.
    pub title: String,
}

/// A completed query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// The submitted query.
    pub query: String,
    /// Answer text with `[^n]` footnote references.
    pub answer: String,
    /// Rendered markdown document, when one was assembled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    /// Cited sources in footnote order.
    pub sources: Vec<Source>,
    /// Reasoning steps, when the surface disclosed any.
    pub steps: Vec<RawStep>,
    /// When the response was assembled.
    pub timestamp: DateTime<Utc>,
    /// Page URL at extraction time, when known.
    pub url: Option<String>,
}

// ============================================================================
// Footnote Rewriting
// ============================================================================

/// Rewrites anchor placeholders to `[^n]` footnote references and returns
/// the source list.
///
/// Indexes are assigned by first appearance in the text. A URL cited more
/// than once keeps its first index. Placeholders whose anchor position is
/// out of range are dropped.
#[must_use]
pub fn rewrite_footnotes(raw: &RawExtract) -> (String, Vec<Source>) {
    let mut indexes: FxHashMap<&str, usize> = FxHashMap::default();
    let mut sources: Vec<Source> = Vec::new();

    let text = PLACEHOLDER.replace_all(&raw.text, |caps: &regex::Captures<'_>| {
        let position: usize = match caps[1].parse() {
            Ok(i) => i,
            Err(_) => return String::new(),
        };
        let Some(anchor) = raw.anchors.get(position) else {
            trace!(position, "placeholder position out of range, dropping");
            return String::new();
        };
        let index = *indexes.entry(anchor.url.as_str()).or_insert_with(|| {
            sources.push(Source {
                index: sources.len() + 1,
                url: anchor.url.clone(),
                title: anchor.title.clone(),
            });
            sources.len()
        });
        format!("[^{index}]")
    });

    (text.into_owned(), sources)
}

// ============================================================================
// Markdown Rendering
// ============================================================================

/// Renders the response document.
///
/// Sections: a query heading, `### Thoughts` when steps exist, `### Answer`,
/// and `### Sources` with footnote definitions when anything was cited.
#[must_use]
pub fn render_markdown(
    query: &str,
    answer: &str,
    sources: &[Source],
    steps: &[RawStep],
) -> String {
    let mut doc = String::new();
    doc.push_str("## ");
    doc.push_str(query);
    doc.push_str("\n\n");

    if !steps.is_empty() {
        doc.push_str("### Thoughts\n\n");
        for step in steps {
            doc.push_str("**");
            doc.push_str(&step.header);
            doc.push_str("**\n\n");
            if !step.text.is_empty() {
                doc.push_str(&step.text);
                doc.push_str("\n\n");
            }
        }
    }

    doc.push_str("### Answer\n\n");
    doc.push_str(answer);
    doc.push_str("\n");

    if !sources.is_empty() {
        doc.push_str("\n### Sources\n\n");
        for source in sources {
            doc.push_str(&format!(
                "[^{}]: [{}]({})\n",
                source.index, source.title, source.url
            ));
        }
    }
    doc
}

// ============================================================================
// Assembly
// ============================================================================

/// Assembles a [`QueryResponse`] from a raw extraction.
#[must_use]
pub fn assemble(
    query: &str,
    raw: &RawExtract,
    url: Option<String>,
    timestamp: DateTime<Utc>,
) -> QueryResponse {
    let (rewritten, sources) = rewrite_footnotes(raw);
    let answer = rewritten.trim().to_string();
    let markdown = render_markdown(query, &answer, &sources, &raw.steps);
    QueryResponse {
        query: query.to_string(),
        answer,
        markdown: Some(markdown),
        sources,
        steps: raw.steps.clone(),
        timestamp,
        url,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::query::page::RawAnchor;

    fn anchor(url: &str) -> RawAnchor {
        RawAnchor {
            url: url.to_string(),
            title: format!("Title of {url}"),
        }
    }

    fn placeholder(i: usize) -> String {
        format!("{ANCHOR_OPEN}{i}{ANCHOR_CLOSE}")
    }

    #[test]
    fn test_duplicate_urls_reuse_numbers() {
        // Anchors A, B, A, C must footnote as 1, 2, 1, 3.
        let raw = RawExtract {
            text: format!(
                "x{} y{} z{} w{}",
                placeholder(0),
                placeholder(1),
                placeholder(2),
                placeholder(3)
            ),
            anchors: vec![
                anchor("https://a.example"),
                anchor("https://b.example"),
                anchor("https://a.example"),
                anchor("https://c.example"),
            ],
            steps: vec![],
        };
        let (text, sources) = rewrite_footnotes(&raw);
        assert_eq!(text, "x[^1] y[^2] z[^1] w[^3]");
        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].url, "https://a.example");
        assert_eq!(sources[2].index, 3);
    }

    #[test]
    fn test_numbering_follows_text_order_not_anchor_order() {
        let raw = RawExtract {
            text: format!("{} then {}", placeholder(1), placeholder(0)),
            anchors: vec![anchor("https://first-doc.example"), anchor("https://first-text.example")],
            steps: vec![],
        };
        let (text, sources) = rewrite_footnotes(&raw);
        assert_eq!(text, "[^1] then [^2]");
        assert_eq!(sources[0].url, "https://first-text.example");
    }

    #[test]
    fn test_out_of_range_placeholder_dropped() {
        let raw = RawExtract {
            text: format!("ok{} bad{}", placeholder(0), placeholder(9)),
            anchors: vec![anchor("https://a.example")],
            steps: vec![],
        };
        let (text, sources) = rewrite_footnotes(&raw);
        assert_eq!(text, "ok[^1] bad");
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_no_anchors_leaves_text_untouched() {
        let raw = RawExtract {
            text: String::from("plain answer, nothing cited"),
            anchors: vec![],
            steps: vec![],
        };
        let (text, sources) = rewrite_footnotes(&raw);
        assert_eq!(text, "plain answer, nothing cited");
        assert!(sources.is_empty());
    }

    #[test]
    fn test_markdown_sections() {
        let steps = vec![RawStep {
            header: "Step 1: search".into(),
            text: "Looked things up.".into(),
        }];
        let sources = vec![Source {
            index: 1,
            url: "https://a.example".into(),
            title: "A".into(),
        }];
        let doc = render_markdown("why is the sky blue", "Rayleigh scattering[^1]", &sources, &steps);
        assert!(doc.starts_with("## why is the sky blue"));
        assert!(doc.contains("### Thoughts"));
        assert!(doc.contains("**Step 1: search**"));
        assert!(doc.contains("### Answer"));
        assert!(doc.contains("[^1]: [A](https://a.example)"));
    }

    #[test]
    fn test_markdown_omits_empty_sections() {
        let doc = render_markdown("q", "a", &[], &[]);
        assert!(!doc.contains("### Thoughts"));
        assert!(!doc.contains("### Sources"));
    }

    #[test]
    fn test_assemble_trims_answer() {
        let raw = RawExtract {
            text: String::from("\n\n  the answer  \n"),
            anchors: vec![],
            steps: vec![],
        };
        let response = assemble("q", &raw, Some("https://chat.example.com/c/1".into()), Utc::now());
        assert_eq!(response.answer, "the answer");
        assert_eq!(response.url.as_deref(), Some("https://chat.example.com/c/1"));
    }

    #[test]
    fn test_response_json_field_names() {
        let raw = RawExtract {
            text: format!("cited{}", placeholder(0)),
            anchors: vec![anchor("https://a.example")],
            steps: vec![],
        };
        let response = assemble("q", &raw, Some("https://chat.example.com/c/1".into()), Utc::now());
        let json: serde_json::Value =
            serde_json::to_value(&response).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("sources"));
        assert!(object.contains_key("url"));
        assert!(object.contains_key("markdown"));
        assert!(!object.contains_key("citations"));
        assert!(!object.contains_key("pageUrl"));
        assert_eq!(json["sources"][0]["index"], 1);
    }

    proptest! {
        #[test]
        fn prop_citation_numbers_dense_and_ordered(
            indexes in proptest::collection::vec(0_usize..6, 0..24)
        ) {
            let anchors: Vec<RawAnchor> =
                (0..6).map(|i| anchor(&format!("https://site-{i}.example"))).collect();
            let text: String = indexes.iter().map(|i| placeholder(*i)).collect();
            let raw = RawExtract { text, anchors, steps: vec![] };
            let (rewritten, sources) = rewrite_footnotes(&raw);

            // Indexes are 1..=len in order, with no duplicates by URL.
            for (i, source) in sources.iter().enumerate() {
                prop_assert_eq!(source.index, i + 1);
            }
            let mut urls: Vec<&str> = sources.iter().map(|s| s.url.as_str()).collect();
            urls.sort_unstable();
            urls.dedup();
            prop_assert_eq!(urls.len(), sources.len());

            // No placeholder survives the rewrite.
            prop_assert!(!rewritten.contains(ANCHOR_OPEN));
            prop_assert!(!rewritten.contains(ANCHOR_CLOSE));
        }
    }
}
