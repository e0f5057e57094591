//! Canonical shapes produced by source adapters.

use citeverse_db::PaperUpdate;
use serde::{Deserialize, Serialize};

/// External data sources, used for routing and hit attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceTag {
    OpenAlex,
    SemanticScholar,
    Arxiv,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::OpenAlex => "openalex",
            SourceTag::SemanticScholar => "semanticscholar",
            SourceTag::Arxiv => "arxiv",
        }
    }
}

/// Attribute groups an adapter can satisfy. Needs are defined per group,
/// not per row: a row may need an abstract but not identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeGroup {
    Abstract,
    Identifiers,
    CitationGraph,
}

/// The pipeline-internal normalized record shape every adapter produces,
/// regardless of origin. Any subset of fields may be present.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub year: Option<i64>,
    pub publication_date: Option<String>,
    pub citation_count: Option<i64>,
    pub authors: Option<Vec<String>>,
    pub fields_of_study: Option<Vec<String>>,
    pub references: Option<Vec<String>>,
    pub cited_by: Option<Vec<String>>,
    // cross-reference identifiers, usable for fallback lookups
    pub doi: Option<String>,
    pub arxiv_id: Option<String>,
    pub s2_id: Option<String>,
    pub corpus_id: Option<i64>,
    pub pmid: Option<String>,
    pub pmcid: Option<String>,
}

impl PartialRecord {
    pub fn has_abstract(&self) -> bool {
        self.abstract_text
            .as_deref()
            .map(|a| !a.trim().is_empty())
            .unwrap_or(false)
    }

    /// Absorb fields from a later (weaker) result without overwriting
    /// anything already present.
    pub fn merge_missing(&mut self, other: PartialRecord) {
        macro_rules! fill {
            ($field:ident) => {
                if self.$field.is_none() {
                    self.$field = other.$field;
                }
            };
        }
        fill!(title);
        fill!(year);
        fill!(publication_date);
        fill!(citation_count);
        fill!(authors);
        fill!(fields_of_study);
        fill!(references);
        fill!(cited_by);
        fill!(doi);
        fill!(arxiv_id);
        fill!(s2_id);
        fill!(corpus_id);
        fill!(pmid);
        fill!(pmcid);
        if !self.has_abstract() {
            self.abstract_text = other.abstract_text;
        }
    }

    /// Convert into a store update. Blank abstracts are dropped so an empty
    /// source result never clobbers a row.
    pub fn into_update(self) -> PaperUpdate {
        PaperUpdate {
            title: self.title.filter(|t| !t.trim().is_empty()),
            year: self.year,
            publication_date: self.publication_date,
            cited_by_count: self.citation_count,
            doi: self.doi,
            arxiv_id: self.arxiv_id,
            s2_id: self.s2_id,
            corpus_id: self.corpus_id,
            pmid: self.pmid,
            pmcid: self.pmcid,
            authors: self.authors,
            fields_of_study: self.fields_of_study,
            abstract_text: self.abstract_text.filter(|a| !a.trim().is_empty()),
            references: self.references,
            cited_by: self.cited_by,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_missing_keeps_existing_fields() {
        let mut primary = PartialRecord {
            title: Some("kept".to_string()),
            doi: None,
            ..Default::default()
        };
        primary.merge_missing(PartialRecord {
            title: Some("discarded".to_string()),
            doi: Some("10.1/x".to_string()),
            ..Default::default()
        });
        assert_eq!(primary.title.as_deref(), Some("kept"));
        assert_eq!(primary.doi.as_deref(), Some("10.1/x"));
    }

    #[test]
    fn test_merge_missing_replaces_blank_abstract() {
        let mut primary = PartialRecord {
            abstract_text: Some("  ".to_string()),
            ..Default::default()
        };
        primary.merge_missing(PartialRecord {
            abstract_text: Some("real".to_string()),
            ..Default::default()
        });
        assert_eq!(primary.abstract_text.as_deref(), Some("real"));
    }

    #[test]
    fn test_into_update_drops_blank_abstract() {
        let update = PartialRecord {
            abstract_text: Some("".to_string()),
            year: Some(2020),
            ..Default::default()
        }
        .into_update();
        assert!(update.abstract_text.is_none());
        assert_eq!(update.year, Some(2020));
    }
}
