//! Semantic Scholar Graph API client.
//!
//! Three roles:
//! 1. Batch resolution of DOI/arXiv keys to S2 paper ids and metadata
//!    (`POST /paper/batch`)
//! 2. Single-paper lookup with the full field set, including reference ids
//! 3. Incoming-citation listing for the citation-graph rebuild
//!
//! API: https://api.semanticscholar.org/graph/v1
//! An API key (`x-api-key`) is optional but raises the rate limits.

use async_trait::async_trait;
use citeverse_common::{normalize_arxiv, normalize_doi, PaperIdent};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::SourceAdapter;
use crate::fetcher::{FetchError, Fetcher};
use crate::models::{AttributeGroup, PartialRecord, SourceTag};

const S2_BASE: &str = "https://api.semanticscholar.org/graph/v1";
const BATCH_FIELDS: &str =
    "paperId,externalIds,title,abstract,year,publicationDate,citationCount";
const FULL_FIELDS: &str =
    "paperId,externalIds,title,abstract,year,publicationDate,citationCount,references.paperId";
const CITATIONS_PAGE_LIMIT: usize = 1000;
const PROVIDES: &[AttributeGroup] = &[
    AttributeGroup::Abstract,
    AttributeGroup::Identifiers,
    AttributeGroup::CitationGraph,
];

/// A lookup key in the prefixed form the Graph API expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S2Key {
    Doi(String),
    Arxiv(String),
    Hex(String),
}

impl S2Key {
    pub fn from_ident(ident: &PaperIdent) -> Option<S2Key> {
        match ident {
            PaperIdent::Doi(doi) => Some(S2Key::Doi(doi.clone())),
            PaperIdent::ArxivId(id) => Some(S2Key::Arxiv(id.clone())),
            PaperIdent::S2Hex(hex) => Some(S2Key::Hex(hex.clone())),
            _ => None,
        }
    }

    /// The id string to send to the API.
    pub fn api_id(&self) -> String {
        match self {
            S2Key::Doi(doi) => format!("DOI:{doi}"),
            S2Key::Arxiv(id) => format!("ArXiv:{id}"),
            S2Key::Hex(hex) => hex.clone(),
        }
    }

    /// Whether a returned record answers this key, judged by the record's
    /// own identifiers rather than its position in the response.
    fn matches(&self, record: &PartialRecord) -> bool {
        match self {
            S2Key::Doi(doi) => record
                .doi
                .as_deref()
                .is_some_and(|d| d.eq_ignore_ascii_case(doi)),
            S2Key::Arxiv(id) => record.arxiv_id.as_deref() == Some(id.as_str()),
            S2Key::Hex(hex) => record
                .s2_id
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(hex)),
        }
    }
}

pub struct SemanticScholarClient {
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }

    fn headers(&self) -> Vec<(&'static str, String)> {
        self.api_key
            .iter()
            .map(|key| ("x-api-key", key.clone()))
            .collect()
    }

    /// Resolve a batch of keys in one POST. The result vector is parallel
    /// to `keys`, but the association is re-derived from each returned
    /// record's identifiers whenever the response length disagrees with
    /// the request, so a dropped null can never shift results onto the
    /// wrong papers.
    pub async fn batch_resolve(
        &self,
        fetcher: &mut Fetcher,
        keys: &[S2Key],
    ) -> anyhow::Result<Vec<Option<PartialRecord>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{S2_BASE}/paper/batch?fields={BATCH_FIELDS}");
        let ids: Vec<String> = keys.iter().map(S2Key::api_id).collect();
        let payload = json!({ "ids": ids });
        let body = fetcher
            .post_json(SourceTag::SemanticScholar, &url, &payload, &self.headers())
            .await?;
        let results = body.as_array().cloned().unwrap_or_default();
        Ok(reconcile(keys, &results))
    }

    /// Fetch one paper with the full field set. 404 is an explicit
    /// not-found, not an error.
    pub async fn fetch_by_key(
        &self,
        fetcher: &mut Fetcher,
        key: &S2Key,
    ) -> anyhow::Result<Option<PartialRecord>> {
        let url = format!("{S2_BASE}/paper/{}", key.api_id());
        let query = [("fields", FULL_FIELDS.to_string())];
        match fetcher
            .get_json(SourceTag::SemanticScholar, &url, &query, &self.headers())
            .await
        {
            Ok(paper) => Ok(Some(record_from_value(&paper))),
            Err(FetchError::Status { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of papers citing `key`, paged until the API stops returning a
    /// `next` offset.
    pub async fn fetch_citations(
        &self,
        fetcher: &mut Fetcher,
        key: &S2Key,
    ) -> anyhow::Result<Vec<String>> {
        let url = format!("{S2_BASE}/paper/{}/citations", key.api_id());
        let mut citing = Vec::new();
        let mut offset: u64 = 0;
        loop {
            let query = [
                ("fields", "paperId".to_string()),
                ("limit", CITATIONS_PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ];
            let body = match fetcher
                .get_json(SourceTag::SemanticScholar, &url, &query, &self.headers())
                .await
            {
                Ok(body) => body,
                Err(FetchError::Status { status: 404, .. }) => break,
                Err(e) => return Err(e.into()),
            };
            for entry in body["data"].as_array().unwrap_or(&vec![]) {
                if let Some(id) = entry["citingPaper"]["paperId"].as_str() {
                    citing.push(id.to_string());
                }
            }
            match body["next"].as_u64() {
                Some(next) => offset = next,
                None => break,
            }
        }
        debug!(key = %key.api_id(), n = citing.len(), "S2 incoming citations");
        Ok(citing)
    }
}

#[async_trait]
impl SourceAdapter for SemanticScholarClient {
    fn tag(&self) -> SourceTag {
        SourceTag::SemanticScholar
    }

    fn provides(&self) -> &'static [AttributeGroup] {
        PROVIDES
    }

    fn accepts(&self, ident: &PaperIdent) -> bool {
        S2Key::from_ident(ident).is_some()
    }

    async fn lookup(
        &self,
        fetcher: &mut Fetcher,
        ident: &PaperIdent,
    ) -> anyhow::Result<Option<PartialRecord>> {
        let Some(key) = S2Key::from_ident(ident) else {
            return Ok(None);
        };
        self.fetch_by_key(fetcher, &key).await
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn record_from_value(paper: &Value) -> PartialRecord {
    let ext = &paper["externalIds"];
    PartialRecord {
        title: paper["title"].as_str().map(String::from),
        abstract_text: paper["abstract"].as_str().map(String::from),
        year: paper["year"].as_i64(),
        publication_date: paper["publicationDate"].as_str().map(String::from),
        citation_count: paper["citationCount"].as_i64(),
        references: paper["references"].as_array().map(|refs| {
            refs.iter()
                .filter_map(|r| r["paperId"].as_str())
                .map(String::from)
                .collect()
        }),
        s2_id: paper["paperId"].as_str().map(str::to_lowercase),
        doi: ext["DOI"].as_str().and_then(normalize_doi),
        arxiv_id: ext["ArXiv"].as_str().map(normalize_arxiv),
        corpus_id: ext["CorpusId"].as_i64(),
        pmid: ext["PubMed"].as_str().map(String::from),
        pmcid: ext["PubMedCentral"].as_str().map(String::from),
        ..Default::default()
    }
}

/// Pair batch results back to their request keys. A well-behaved response
/// has the same length as the request (nulls for misses) and can be zipped;
/// anything else is matched by identifier, and keys the response does not
/// answer stay `None`.
fn reconcile(keys: &[S2Key], results: &[Value]) -> Vec<Option<PartialRecord>> {
    if results.len() == keys.len() {
        return keys
            .iter()
            .zip(results)
            .map(|(_, value)| value.is_object().then(|| record_from_value(value)))
            .collect();
    }

    warn!(
        requested = keys.len(),
        returned = results.len(),
        "S2 batch length mismatch, matching by identifier"
    );
    let records: Vec<PartialRecord> = results
        .iter()
        .filter(|v| v.is_object())
        .map(record_from_value)
        .collect();
    keys.iter()
        .map(|key| records.iter().find(|r| key.matches(r)).cloned())
        .collect()
}
