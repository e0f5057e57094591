//! Node/edge document builders.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use citeverse_common::PaperIdent;
use citeverse_db::PaperStore;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::layout;

/// One frontend node, serialized in the camelCase shape the viewer expects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub paper_id: String,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub primary_field: Option<String>,
    pub year: Option<i64>,
    pub publication_date: Option<String>,
    pub doi: Option<String>,
    pub journal: Option<String>,
    pub first_author: Option<String>,
    pub all_authors: Option<String>,
    pub citation_count: Option<i64>,
    pub url: String,
    pub position: [f64; 3],
    pub size: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub weight: f64,
}

/// Node selection filters. All default to "keep everything".
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub min_citations: Option<i64>,
    /// Keep only the N most-cited matching rows.
    pub top_n: Option<i64>,
    /// Exact-match allowlist on the primary field.
    pub fields: Vec<String>,
    /// Each keyword must appear in the title or the summary.
    pub keywords: Vec<String>,
    /// Each author substring must appear in the author list.
    pub authors: Vec<String>,
    pub year_from: Option<i64>,
    pub year_to: Option<i64>,
}

enum Param {
    Int(i64),
    Text(String),
}

pub async fn build_nodes(store: &PaperStore, filter: &ExportFilter) -> anyhow::Result<Vec<Node>> {
    let mut conditions: Vec<String> = Vec::new();
    let mut params: Vec<Param> = Vec::new();

    if let Some(min) = filter.min_citations.filter(|m| *m > 0) {
        conditions.push("cited_by_count >= ?".to_string());
        params.push(Param::Int(min));
    }
    if let Some(from) = filter.year_from {
        conditions.push("year >= ?".to_string());
        params.push(Param::Int(from));
    }
    if let Some(to) = filter.year_to {
        conditions.push("year <= ?".to_string());
        params.push(Param::Int(to));
    }
    if !filter.fields.is_empty() {
        let ors = vec!["AI_primary_field = ?"; filter.fields.len()].join(" OR ");
        conditions.push(format!("({ors})"));
        params.extend(filter.fields.iter().cloned().map(Param::Text));
    }
    for kw in &filter.keywords {
        conditions.push("(title LIKE ? OR AI_summary LIKE ?)".to_string());
        let like = format!("%{kw}%");
        params.push(Param::Text(like.clone()));
        params.push(Param::Text(like));
    }
    for author in &filter.authors {
        conditions.push("all_author_names LIKE ?".to_string());
        params.push(Param::Text(format!("%{author}%")));
    }

    let mut sql = String::from(
        "SELECT paperId, title, AI_summary, AI_primary_field, cited_by_count, year, \
         publicationDate, doi, journal_name, first_author_name, all_author_names FROM papers",
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    // citations-descending order makes top_n meaningful
    sql.push_str(" ORDER BY cited_by_count DESC NULLS LAST");
    if let Some(n) = filter.top_n.filter(|n| *n > 0) {
        sql.push_str(" LIMIT ?");
        params.push(Param::Int(n));
    }
    debug!(sql = %sql, "Node query");

    let mut query = sqlx::query(&sql);
    for p in &params {
        query = match p {
            Param::Int(v) => query.bind(*v),
            Param::Text(s) => query.bind(s.clone()),
        };
    }
    let rows = query.fetch_all(store.pool()).await?;

    let bands = layout::field_bands(&store.distinct_primary_fields().await?);

    let mut nodes = Vec::with_capacity(rows.len());
    for r in &rows {
        let paper_id: String = r.get("paperId");
        let primary_field: Option<String> = r.get("AI_primary_field");
        let citation_count: Option<i64> = r.get("cited_by_count");
        let year: Option<i64> = r.get("year");
        let doi: Option<String> = r.get("doi");

        let band = primary_field
            .as_deref()
            .and_then(|f| bands.get(f).copied())
            .unwrap_or(0.0);

        nodes.push(Node {
            id: paper_id.clone(),
            url: paper_url(&paper_id, doi.as_deref()),
            title: r.get("title"),
            summary: r.get("AI_summary"),
            publication_date: r.get("publicationDate"),
            journal: r.get("journal_name"),
            first_author: r.get("first_author_name"),
            all_authors: r.get("all_author_names"),
            position: layout::position(year, band, citation_count),
            size: layout::size_from_citations(citation_count),
            paper_id,
            primary_field,
            year,
            doi,
            citation_count,
        });
    }
    info!(nodes = nodes.len(), "Built frontend nodes");
    Ok(nodes)
}

/// Edges from the citations table, restricted to pairs where both endpoints
/// made it into the node set. A missing or unrecognized edge table yields an
/// empty list, not an error.
pub async fn build_edges(store: &PaperStore, nodes: &[Node]) -> anyhow::Result<Vec<Edge>> {
    let Some(pair) = store.detect_relation_columns().await? else {
        warn!("No recognized citation columns; exporting zero edges");
        return Ok(Vec::new());
    };
    let ids: HashSet<&str> = nodes.iter().map(|n| n.paper_id.as_str()).collect();
    let raw = store.load_edges(&pair).await?;
    let total = raw.len();
    let edges: Vec<Edge> = raw
        .into_iter()
        .filter(|(s, t)| ids.contains(s.as_str()) && ids.contains(t.as_str()))
        .map(|(source, target)| Edge {
            source,
            target,
            weight: 1.0,
        })
        .collect();
    info!(kept = edges.len(), total, "Built frontend edges");
    Ok(edges)
}

/// A clickable URL for the row, derived from whatever identifier shape the
/// primary key carries, with the DOI resolver as fallback.
fn paper_url(paper_id: &str, doi: Option<&str>) -> String {
    match PaperIdent::classify(paper_id) {
        PaperIdent::OpenAlexUrl { .. } => paper_id.to_string(),
        PaperIdent::OpenAlexShort(short) => format!("https://openalex.org/{short}"),
        PaperIdent::Doi(d) => format!("https://doi.org/{d}"),
        PaperIdent::ArxivId(id) => format!("https://arxiv.org/abs/{id}"),
        PaperIdent::S2Hex(hex) => format!("https://www.semanticscholar.org/paper/{hex}"),
        PaperIdent::Unrecognized(_) => match doi {
            Some(d) => format!("https://doi.org/{d}"),
            None => format!("https://openalex.org/{paper_id}"),
        },
    }
}

/// Pretty-printed JSON to disk.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)?;
    info!(path = %path.display(), "Wrote JSON document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paper_url_shapes() {
        assert_eq!(paper_url("W12", None), "https://openalex.org/W12");
        assert_eq!(
            paper_url("https://openalex.org/W12", None),
            "https://openalex.org/W12"
        );
        assert_eq!(paper_url("10.1/x", None), "https://doi.org/10.1/x");
        assert_eq!(paper_url("2401.01234", None), "https://arxiv.org/abs/2401.01234");
        assert_eq!(paper_url("???", Some("10.1/y")), "https://doi.org/10.1/y");
    }

    #[test]
    fn test_node_serializes_camel_case() {
        let node = Node {
            id: "W1".to_string(),
            paper_id: "W1".to_string(),
            title: None,
            summary: None,
            primary_field: Some("Optics".to_string()),
            year: Some(2001),
            publication_date: None,
            doi: None,
            journal: None,
            first_author: None,
            all_authors: None,
            citation_count: Some(3),
            url: "https://openalex.org/W1".to_string(),
            position: [51.0, 0.0, 13.86],
            size: 1.28,
        };
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["paperId"], "W1");
        assert_eq!(json["primaryField"], "Optics");
        assert_eq!(json["citationCount"], 3);
        assert!(json.get("paper_id").is_none());
    }
}
