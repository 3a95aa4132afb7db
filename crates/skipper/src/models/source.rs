use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceKind {
    KnowledgeBase,
    Web,
    #[default]
    Unknown,
}

/// A citation attached to an answer or produced by a retrieval tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: SourceKind,
}

impl Source {
    pub fn new<T: Into<String>, U: Into<String>>(title: T, url: U, kind: SourceKind) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            kind,
        }
    }

    fn dedup_key(&self) -> (String, String) {
        (self.url.trim().to_string(), self.title.trim().to_string())
    }
}

/// Appends `incoming` sources that are not already present, keyed on the
/// trimmed `(url, title)` pair. Existing order is kept.
pub fn append_sources(existing: &mut Vec<Source>, incoming: impl IntoIterator<Item = Source>) {
    let mut seen: HashSet<(String, String)> = existing.iter().map(Source::dedup_key).collect();
    for source in incoming {
        if seen.insert(source.dedup_key()) {
            existing.push(source);
        }
    }
}

/// How well-grounded an answer section is. Variants are declared in rank
/// order so the derived `Ord` matches `unknown < best_guess < sourced < verified`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Confidence {
    #[default]
    Unknown,
    BestGuess,
    Sourced,
    Verified,
}

impl Confidence {
    /// Parses a tag, treating anything unrecognised as `Unknown`
    pub fn from_tag(tag: &str) -> Self {
        tag.trim().to_lowercase().parse().unwrap_or_default()
    }
}

/// One confidence-tagged section of an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBlock {
    pub content: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub sources: Vec<Source>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Unknown < Confidence::BestGuess);
        assert!(Confidence::BestGuess < Confidence::Sourced);
        assert!(Confidence::Sourced < Confidence::Verified);
    }

    #[test]
    fn test_confidence_from_tag() {
        assert_eq!(Confidence::from_tag(" verified "), Confidence::Verified);
        assert_eq!(Confidence::from_tag("best_guess"), Confidence::BestGuess);
        assert_eq!(Confidence::from_tag("certainly"), Confidence::Unknown);
        assert_eq!(Confidence::BestGuess.to_string(), "best_guess");
    }

    #[test]
    fn test_append_sources_dedups_on_url_and_title() {
        let mut sources = vec![Source::new("KB", "https://x/docs", SourceKind::KnowledgeBase)];
        append_sources(
            &mut sources,
            vec![
                Source::new(" KB ", "https://x/docs ", SourceKind::Unknown),
                Source::new("Other", "https://x/docs", SourceKind::Web),
                Source::new("Other", "https://x/docs", SourceKind::Web),
            ],
        );

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].kind, SourceKind::KnowledgeBase);
        assert_eq!(sources[1].title, "Other");
    }

    #[test]
    fn test_source_kind_serializes_snake_case() {
        let json = serde_json::to_value(Source::new("a", "b", SourceKind::KnowledgeBase)).unwrap();
        assert_eq!(json["type"], "knowledge_base");
    }
}
