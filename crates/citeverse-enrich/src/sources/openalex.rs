//! OpenAlex works client.
//!
//! Two roles:
//! 1. Single-work lookup by work id or DOI, reconstructing the abstract
//!    from the inverted index OpenAlex ships instead of plain text
//! 2. Batched `referenced_works` retrieval for the citation-graph rebuild
//!
//! API: https://api.openalex.org/works
//! Polite pool: pass `mailto` on every request.

use std::collections::HashMap;

use async_trait::async_trait;
use citeverse_common::PaperIdent;
use serde_json::Value;
use tracing::{debug, warn};

use super::SourceAdapter;
use crate::fetcher::{FetchError, Fetcher};
use crate::models::{AttributeGroup, PartialRecord, SourceTag};

const OA_WORKS: &str = "https://api.openalex.org/works";
const WORK_SELECT: &str =
    "ids,doi,title,publication_year,publication_date,cited_by_count,abstract_inverted_index";
const BATCH_SELECT: &str = "id,referenced_works";
const PROVIDES: &[AttributeGroup] = &[
    AttributeGroup::Abstract,
    AttributeGroup::Identifiers,
    AttributeGroup::CitationGraph,
];

pub struct OpenAlexClient {
    mailto: String,
}

impl OpenAlexClient {
    pub fn new(mailto: impl Into<String>) -> Self {
        Self {
            mailto: mailto.into(),
        }
    }

    fn work_url(ident: &PaperIdent) -> Option<String> {
        match ident {
            PaperIdent::Doi(doi) => Some(format!("{OA_WORKS}/https://doi.org/{doi}")),
            _ => ident
                .openalex_short()
                .map(|short| format!("{OA_WORKS}/{short}")),
        }
    }

    /// Fetch one work. A 404 is an explicit not-found, not an error.
    pub async fn fetch_work(
        &self,
        fetcher: &mut Fetcher,
        ident: &PaperIdent,
    ) -> anyhow::Result<Option<PartialRecord>> {
        let url = match Self::work_url(ident) {
            Some(u) => u,
            None => return Ok(None),
        };
        let query = [
            ("select", WORK_SELECT.to_string()),
            ("mailto", self.mailto.clone()),
        ];
        let work = match fetcher.get_json(SourceTag::OpenAlex, &url, &query, &[]).await {
            Ok(body) => body,
            Err(FetchError::Status { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(work_to_record(&work)))
    }

    /// Fetch `referenced_works` for up to `ids.len()` works in one filter
    /// query, keyed by the short `W…` id of each result. Works absent from
    /// the response are simply missing from the map; callers must never
    /// assume positional correspondence with the input.
    pub async fn fetch_referenced_batch(
        &self,
        fetcher: &mut Fetcher,
        short_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Vec<String>>> {
        if short_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let filter = format!(
            "ids.openalex:{}",
            short_ids
                .iter()
                .map(|id| format!("https://openalex.org/{id}"))
                .collect::<Vec<_>>()
                .join("|")
        );
        let query = [
            ("filter", filter),
            ("select", BATCH_SELECT.to_string()),
            ("per-page", short_ids.len().to_string()),
            ("mailto", self.mailto.clone()),
        ];
        let body = match fetcher.get_json(SourceTag::OpenAlex, OA_WORKS, &query, &[]).await {
            Ok(body) => body,
            // Over-long filters get rejected; degrade to one request per id.
            Err(FetchError::Status { status: 403, .. }) => {
                warn!(
                    batch = short_ids.len(),
                    "OpenAlex rejected batch filter, falling back to per-id requests"
                );
                return self.fetch_referenced_each(fetcher, short_ids).await;
            }
            Err(e) => return Err(e.into()),
        };

        let mut out = HashMap::new();
        for result in body["results"].as_array().unwrap_or(&vec![]) {
            let Some(short) = result["id"]
                .as_str()
                .and_then(|id| id.rsplit('/').next())
                .map(String::from)
            else {
                continue;
            };
            out.insert(short, referenced_shorts(result));
        }
        debug!(requested = short_ids.len(), returned = out.len(), "OpenAlex reference batch");
        Ok(out)
    }

    async fn fetch_referenced_each(
        &self,
        fetcher: &mut Fetcher,
        short_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Vec<String>>> {
        let mut out = HashMap::new();
        for short in short_ids {
            let url = format!("{OA_WORKS}/{short}");
            let query = [
                ("select", BATCH_SELECT.to_string()),
                ("mailto", self.mailto.clone()),
            ];
            match fetcher.get_json(SourceTag::OpenAlex, &url, &query, &[]).await {
                Ok(work) => {
                    out.insert(short.clone(), referenced_shorts(&work));
                }
                Err(FetchError::Status { status: 404, .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl SourceAdapter for OpenAlexClient {
    fn tag(&self) -> SourceTag {
        SourceTag::OpenAlex
    }

    fn provides(&self) -> &'static [AttributeGroup] {
        PROVIDES
    }

    fn accepts(&self, ident: &PaperIdent) -> bool {
        matches!(
            ident,
            PaperIdent::Doi(_) | PaperIdent::OpenAlexUrl { .. } | PaperIdent::OpenAlexShort(_)
        )
    }

    async fn lookup(
        &self,
        fetcher: &mut Fetcher,
        ident: &PaperIdent,
    ) -> anyhow::Result<Option<PartialRecord>> {
        self.fetch_work(fetcher, ident).await
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

fn work_to_record(work: &Value) -> PartialRecord {
    // ids.arxiv is a full https://arxiv.org/abs/… URL
    let arxiv_id = work["ids"]["arxiv"]
        .as_str()
        .and_then(|url| url.rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(citeverse_common::normalize_arxiv);
    PartialRecord {
        title: work["title"].as_str().map(String::from),
        abstract_text: reconstruct_abstract(&work["abstract_inverted_index"]),
        year: work["publication_year"].as_i64(),
        publication_date: work["publication_date"].as_str().map(String::from),
        citation_count: work["cited_by_count"].as_i64(),
        doi: work["doi"]
            .as_str()
            .and_then(citeverse_common::normalize_doi),
        arxiv_id,
        ..Default::default()
    }
}

/// Rebuild plain text from OpenAlex's `abstract_inverted_index`
/// (`{word: [positions…]}`). Positions may have gaps; missing slots stay
/// empty and the leading/trailing whitespace is trimmed away.
pub fn reconstruct_abstract(index: &Value) -> Option<String> {
    let map = index.as_object()?;
    if map.is_empty() {
        return None;
    }
    let len = map
        .values()
        .flat_map(|positions| positions.as_array().into_iter().flatten())
        .filter_map(Value::as_u64)
        .max()?
        + 1;
    let mut slots = vec![""; len as usize];
    for (word, positions) in map {
        for pos in positions.as_array().into_iter().flatten() {
            if let Some(pos) = pos.as_u64() {
                slots[pos as usize] = word.as_str();
            }
        }
    }
    let text = slots.join(" ").trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn referenced_shorts(work: &Value) -> Vec<String> {
    work["referenced_works"]
        .as_array()
        .unwrap_or(&vec![])
        .iter()
        .filter_map(Value::as_str)
        .filter_map(|url| url.rsplit('/').next())
        .map(String::from)
        .collect()
}
