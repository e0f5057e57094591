//! Enrichment passes over the paper store.
//!
//! Each pass is select-missing → fetch → write-back, committing per row so
//! an interrupted run loses at most the row in flight. Per-row failures are
//! logged and skipped; only store errors abort a pass.

use std::collections::{HashMap, HashSet};

use citeverse_common::{normalize_arxiv, normalize_doi, PaperIdent};
use citeverse_db::{Need, NeedRow, PaperStore, PaperUpdate};
use tracing::{debug, info, warn};

use crate::fetcher::Fetcher;
use crate::models::{AttributeGroup, PartialRecord, SourceTag};
use crate::sources::openalex::OpenAlexClient;
use crate::sources::semantic_scholar::{S2Key, SemanticScholarClient};
use crate::sources::SourceAdapter;

/// Knobs for one pass invocation.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Rows per Semantic Scholar batch-resolve POST.
    pub batch_size: usize,
    /// Works per OpenAlex reference-batch filter query.
    pub citation_batch_size: usize,
    /// Optional cap on rows scanned, for trial runs.
    pub limit: Option<i64>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            citation_batch_size: 60,
            limit: None,
        }
    }
}

/// What a pass did, for the end-of-run report.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub scanned: usize,
    pub updated: usize,
    pub unsatisfied: usize,
    pub hits: HashMap<SourceTag, usize>,
}

impl RunSummary {
    fn hit(&mut self, tag: SourceTag) {
        *self.hits.entry(tag).or_insert(0) += 1;
    }

    pub fn hits_for(&self, tag: SourceTag) -> usize {
        self.hits.get(&tag).copied().unwrap_or(0)
    }
}

/// Every identifier a row offers, primary key first, deduplicated.
fn row_idents(row: &NeedRow) -> Vec<PaperIdent> {
    let mut idents = vec![PaperIdent::classify(&row.paper_id)];
    let mut push = |ident: PaperIdent| {
        if !matches!(ident, PaperIdent::Unrecognized(_)) && !idents.contains(&ident) {
            idents.push(ident);
        }
    };
    if let Some(doi) = row.doi.as_deref().and_then(normalize_doi) {
        push(PaperIdent::Doi(doi));
    }
    if let Some(id) = row.arxiv_id.as_deref().filter(|s| !s.trim().is_empty()) {
        push(PaperIdent::ArxivId(normalize_arxiv(id)));
    }
    if let Some(s2) = row.s2_id.as_deref().filter(|s| !s.trim().is_empty()) {
        push(PaperIdent::classify(s2));
    }
    idents
}

/// Merge cross-reference identifiers surfaced by a fetched record into the
/// pool, so a later adapter can use them.
fn absorb_cross_refs(idents: &mut Vec<PaperIdent>, rec: &PartialRecord) {
    let mut push = |ident: PaperIdent| {
        if !idents.contains(&ident) {
            idents.push(ident);
        }
    };
    if let Some(ref doi) = rec.doi {
        push(PaperIdent::Doi(doi.clone()));
    }
    if let Some(ref id) = rec.arxiv_id {
        push(PaperIdent::ArxivId(id.clone()));
    }
    if let Some(ref s2) = rec.s2_id {
        push(PaperIdent::S2Hex(s2.clone()));
    }
}

/// Strip the snapshot fields out of a record so an identifier-only pass
/// never overwrites abstracts or edge lists.
fn identifiers_only(mut rec: PartialRecord) -> PaperUpdate {
    rec.abstract_text = None;
    rec.references = None;
    rec.cited_by = None;
    rec.into_update()
}

// ── Identifier backfill ────────────────────────────────────────────────────

/// Fill missing DOI/arXiv/S2 identifiers. Two phases: OpenAlex lookups for
/// rows keyed by work id, then Semantic Scholar batch resolution for every
/// row that has a DOI or arXiv handle to resolve by.
pub async fn enrich_identifiers(
    store: &PaperStore,
    fetcher: &mut Fetcher,
    openalex: &OpenAlexClient,
    s2: &SemanticScholarClient,
    config: &EnrichmentConfig,
) -> anyhow::Result<RunSummary> {
    let mut rows = store.select_needing(Need::IdentifiersMissing, config.limit).await?;
    let mut summary = RunSummary {
        scanned: rows.len(),
        ..Default::default()
    };
    let mut touched: HashSet<String> = HashSet::new();

    for row in &mut rows {
        let ident = PaperIdent::classify(&row.paper_id);
        if ident.openalex_short().is_none() {
            continue;
        }
        match openalex.fetch_work(fetcher, &ident).await {
            Ok(Some(rec)) => {
                // keep the fetched DOI for phase two keying
                if row.doi.as_deref().map_or(true, str::is_empty) {
                    row.doi = rec.doi.clone();
                }
                let update = identifiers_only(rec);
                if !update.is_empty() && store.update_fields(&row.paper_id, &update).await? {
                    touched.insert(row.paper_id.clone());
                    summary.hit(SourceTag::OpenAlex);
                }
            }
            Ok(None) => debug!(paper = %row.paper_id, "OpenAlex has no such work"),
            Err(e) => warn!(paper = %row.paper_id, error = %e, "OpenAlex lookup failed"),
        }
    }

    // Phase two: anything resolvable by DOI or arXiv id goes to S2 in batches.
    let candidates: Vec<(String, S2Key)> = rows
        .iter()
        .filter(|row| row.s2_id.as_deref().map_or(true, str::is_empty))
        .filter_map(|row| {
            let key = row
                .doi
                .as_deref()
                .and_then(normalize_doi)
                .map(S2Key::Doi)
                .or_else(|| {
                    row.arxiv_id
                        .as_deref()
                        .filter(|s| !s.trim().is_empty())
                        .map(|s| S2Key::Arxiv(normalize_arxiv(s)))
                })?;
            Some((row.paper_id.clone(), key))
        })
        .collect();

    for chunk in candidates.chunks(config.batch_size.max(1)) {
        let keys: Vec<S2Key> = chunk.iter().map(|(_, k)| k.clone()).collect();
        let results = match s2.batch_resolve(fetcher, &keys).await {
            Ok(r) => r,
            Err(e) => {
                warn!(batch = keys.len(), error = %e, "S2 batch resolve failed, skipping chunk");
                continue;
            }
        };
        for ((paper_id, _), rec) in chunk.iter().zip(results) {
            match rec {
                Some(rec) => {
                    let update = identifiers_only(rec);
                    if !update.is_empty() && store.update_fields(paper_id, &update).await? {
                        touched.insert(paper_id.clone());
                        summary.hit(SourceTag::SemanticScholar);
                    }
                }
                None => debug!(paper = %paper_id, "S2 could not resolve"),
            }
        }
    }

    summary.updated = touched.len();
    summary.unsatisfied = summary.scanned - summary.updated;
    info!(
        scanned = summary.scanned,
        updated = summary.updated,
        unsatisfied = summary.unsatisfied,
        "Identifier backfill done"
    );
    Ok(summary)
}

// ── Abstract enrichment ────────────────────────────────────────────────────

/// Fill missing abstracts, walking the adapter chain in priority order.
/// Each adapter gets at most one lookup per row; cross-reference
/// identifiers surfaced by an earlier result widen the options for later
/// adapters. Metadata from non-winning lookups is merged fill-if-absent.
pub async fn enrich_abstracts(
    store: &PaperStore,
    fetcher: &mut Fetcher,
    adapters: &[&dyn SourceAdapter],
    config: &EnrichmentConfig,
) -> anyhow::Result<RunSummary> {
    let rows = store.select_needing(Need::AbstractMissing, config.limit).await?;
    let mut summary = RunSummary {
        scanned: rows.len(),
        ..Default::default()
    };

    for row in &rows {
        let mut idents = row_idents(row);
        let mut acc = PartialRecord::default();
        let mut winner: Option<SourceTag> = None;

        for adapter in adapters {
            if !adapter.provides().contains(&AttributeGroup::Abstract) {
                continue;
            }
            let Some(ident) = idents.iter().find(|i| adapter.accepts(i)).cloned() else {
                continue;
            };
            match adapter.lookup(fetcher, &ident).await {
                Ok(Some(rec)) => {
                    absorb_cross_refs(&mut idents, &rec);
                    let had = acc.has_abstract();
                    acc.merge_missing(rec);
                    if !had && acc.has_abstract() {
                        winner = Some(adapter.tag());
                        break;
                    }
                }
                Ok(None) => {
                    debug!(paper = %row.paper_id, source = adapter.tag().as_str(), "Not found")
                }
                Err(e) => warn!(
                    paper = %row.paper_id,
                    source = adapter.tag().as_str(),
                    error = %e,
                    "Lookup failed, trying next source"
                ),
            }
        }

        let satisfied = acc.has_abstract();
        let update = acc.into_update();
        if !update.is_empty() && store.update_fields(&row.paper_id, &update).await? {
            summary.updated += 1;
            if let Some(tag) = winner {
                summary.hit(tag);
            }
        }
        if !satisfied {
            summary.unsatisfied += 1;
        }
    }

    info!(
        scanned = summary.scanned,
        updated = summary.updated,
        unsatisfied = summary.unsatisfied,
        "Abstract enrichment done"
    );
    Ok(summary)
}

// ── Citation rebuild ───────────────────────────────────────────────────────

/// Rebuild the citation edge table. Rows that already have outgoing edges
/// are skipped, which makes the pass resumable. OpenAlex-keyed rows go in
/// reference batches; Semantic Scholar hex ids fall back to per-paper
/// lookups that also refresh the `references`/`citedBy` snapshots.
/// Edge targets stay in the key space the source row itself uses: rows
/// keyed by a full OpenAlex URL get URL targets, short-id rows keep the
/// bare `W…` form.
fn edge_targets(paper_id: &str, shorts: &[String]) -> Vec<String> {
    let full_url = matches!(
        PaperIdent::classify(paper_id),
        PaperIdent::OpenAlexUrl { .. }
    );
    shorts
        .iter()
        .map(|t| {
            if full_url {
                format!("https://openalex.org/{t}")
            } else {
                t.clone()
            }
        })
        .collect()
}

pub async fn rebuild_citations(
    store: &PaperStore,
    fetcher: &mut Fetcher,
    openalex: &OpenAlexClient,
    s2: &SemanticScholarClient,
    config: &EnrichmentConfig,
) -> anyhow::Result<RunSummary> {
    let pair = store.ensure_citations_table().await?;
    let done = store.sources_with_edges(&pair).await?;
    let ids = store.all_paper_ids().await?;
    let mut summary = RunSummary {
        scanned: ids.len(),
        ..Default::default()
    };

    let mut oa_rows: Vec<(String, String)> = Vec::new();
    let mut s2_rows: Vec<(String, S2Key)> = Vec::new();
    for id in ids {
        if done.contains(&id) {
            continue;
        }
        match PaperIdent::classify(&id) {
            ref ident if ident.openalex_short().is_some() => {
                let short = ident.openalex_short().unwrap_or_default().to_string();
                oa_rows.push((id, short));
            }
            PaperIdent::S2Hex(hex) => s2_rows.push((id, S2Key::Hex(hex))),
            _ => summary.unsatisfied += 1,
        }
    }

    for chunk in oa_rows.chunks(config.citation_batch_size.max(1)) {
        let shorts: Vec<String> = chunk.iter().map(|(_, s)| s.clone()).collect();
        let referenced = match openalex.fetch_referenced_batch(fetcher, &shorts).await {
            Ok(map) => map,
            Err(e) => {
                warn!(batch = shorts.len(), error = %e, "Reference batch failed, skipping chunk");
                summary.unsatisfied += chunk.len();
                continue;
            }
        };
        for (paper_id, short) in chunk {
            match referenced.get(short) {
                Some(targets) => {
                    let targets = edge_targets(paper_id, targets);
                    store.replace_citations(&pair, paper_id, &targets).await?;
                    summary.updated += 1;
                    summary.hit(SourceTag::OpenAlex);
                }
                None => summary.unsatisfied += 1,
            }
        }
    }

    for (paper_id, key) in &s2_rows {
        let rec = match s2.fetch_by_key(fetcher, key).await {
            Ok(rec) => rec,
            Err(e) => {
                warn!(paper = %paper_id, error = %e, "S2 lookup failed during rebuild");
                summary.unsatisfied += 1;
                continue;
            }
        };
        let Some(rec) = rec else {
            summary.unsatisfied += 1;
            continue;
        };
        let references = rec.references.clone().unwrap_or_default();
        let citing = match s2.fetch_citations(fetcher, key).await {
            Ok(c) => c,
            Err(e) => {
                warn!(paper = %paper_id, error = %e, "S2 citations listing failed");
                Vec::new()
            }
        };
        store.replace_citations(&pair, paper_id, &references).await?;
        let update = PaperUpdate {
            references: Some(references),
            cited_by: (!citing.is_empty()).then_some(citing),
            ..Default::default()
        };
        store.update_fields(paper_id, &update).await?;
        summary.updated += 1;
        summary.hit(SourceTag::SemanticScholar);
    }

    info!(
        scanned = summary.scanned,
        updated = summary.updated,
        unsatisfied = summary.unsatisfied,
        "Citation rebuild done"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(paper_id: &str) -> NeedRow {
        NeedRow {
            paper_id: paper_id.to_string(),
            title: None,
            abstract_text: None,
            doi: None,
            arxiv_id: None,
            s2_id: None,
            year: None,
            journal: None,
            authors: None,
        }
    }

    #[test]
    fn test_row_idents_primary_key_first() {
        let mut r = row("W123");
        r.doi = Some("doi:10.1/x".to_string());
        r.arxiv_id = Some("2401.01234v2".to_string());
        let idents = row_idents(&r);
        assert_eq!(idents[0], PaperIdent::OpenAlexShort("W123".to_string()));
        assert!(idents.contains(&PaperIdent::Doi("10.1/x".to_string())));
        assert!(idents.contains(&PaperIdent::ArxivId("2401.01234".to_string())));
    }

    #[test]
    fn test_row_idents_skips_blank_and_duplicate() {
        let mut r = row("10.1/x");
        r.doi = Some("10.1/x".to_string());
        r.arxiv_id = Some("  ".to_string());
        let idents = row_idents(&r);
        assert_eq!(idents, vec![PaperIdent::Doi("10.1/x".to_string())]);
    }

    #[test]
    fn test_absorb_cross_refs_extends_pool() {
        let mut idents = vec![PaperIdent::ArxivId("2401.01234".to_string())];
        let rec = PartialRecord {
            doi: Some("10.1/x".to_string()),
            s2_id: Some("ab".repeat(20)),
            ..Default::default()
        };
        absorb_cross_refs(&mut idents, &rec);
        assert_eq!(idents.len(), 3);
    }

    #[test]
    fn test_edge_targets_match_row_key_space() {
        let shorts = vec!["W1".to_string(), "W2".to_string()];
        assert_eq!(
            edge_targets("https://openalex.org/W9", &shorts),
            vec!["https://openalex.org/W1", "https://openalex.org/W2"]
        );
        assert_eq!(edge_targets("W9", &shorts), vec!["W1", "W2"]);
    }

    #[test]
    fn test_identifiers_only_strips_snapshots() {
        let rec = PartialRecord {
            doi: Some("10.1/x".to_string()),
            abstract_text: Some("text".to_string()),
            references: Some(vec!["r".to_string()]),
            cited_by: Some(vec!["c".to_string()]),
            ..Default::default()
        };
        let update = identifiers_only(rec);
        assert_eq!(update.doi.as_deref(), Some("10.1/x"));
        assert!(update.abstract_text.is_none());
        assert!(update.references.is_none());
        assert!(update.cited_by.is_none());
    }
}
