//! Exporter tests against an in-memory store.

use citeverse_db::PaperStore;
use citeverse_export::{build_edges, build_nodes, write_json, ExportFilter};

async fn seeded_store() -> PaperStore {
    let store = PaperStore::open_in_memory().await.unwrap();
    store.ensure_columns().await.unwrap();
    let papers = [
        // (paperId, title, field, citations, year)
        ("W1", "Gravitational Lensing Review", "Astrophysics", 500, 1995),
        ("W2", "Quantum Error Correction", "Quantum computing", 120, 2010),
        ("W3", "Niche Note", "Astrophysics", 2, 2021),
    ];
    for (id, title, field, cites, year) in papers {
        sqlx::query(
            "INSERT INTO papers (paperId, title, AI_primary_field, AI_summary, cited_by_count, year) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(title)
        .bind(field)
        .bind(format!("Summary of {title}"))
        .bind(cites)
        .bind(year)
        .execute(store.pool())
        .await
        .unwrap();
    }
    let pair = store.ensure_citations_table().await.unwrap();
    store
        .replace_citations(&pair, "W2", &["W1".to_string(), "W999".to_string()])
        .await
        .unwrap();
    store
        .replace_citations(&pair, "W3", &["W1".to_string()])
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn nodes_carry_layout_and_order() {
    let store = seeded_store().await;
    let nodes = build_nodes(&store, &ExportFilter::default()).await.unwrap();

    assert_eq!(nodes.len(), 3);
    // citations-descending order
    assert_eq!(nodes[0].paper_id, "W1");
    assert_eq!(nodes[0].citation_count, Some(500));
    assert_eq!(nodes[0].url, "https://openalex.org/W1");
    // x = year - 1950
    assert_eq!(nodes[0].position[0], 45.0);
    // two distinct fields, sorted: Astrophysics = -1.5, Quantum computing = +1.5
    assert_eq!(nodes[0].position[1], -1.5);
    assert_eq!(nodes[1].position[1], 1.5);
    // clamp on the heavy hitter; 0.5 + 0.5·2^0.4 ≈ 1.16 on the niche note
    assert_eq!(nodes[0].size, 2.0);
    assert_eq!(nodes[2].size, 1.16);
}

#[tokio::test]
async fn filters_restrict_the_node_set() {
    let store = seeded_store().await;

    let by_citations = build_nodes(
        &store,
        &ExportFilter {
            min_citations: Some(100),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_citations.len(), 2);

    let top_one = build_nodes(
        &store,
        &ExportFilter {
            top_n: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(top_one.len(), 1);
    assert_eq!(top_one[0].paper_id, "W1");

    let by_field = build_nodes(
        &store,
        &ExportFilter {
            fields: vec!["Quantum computing".to_string()],
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_field.len(), 1);
    assert_eq!(by_field[0].paper_id, "W2");

    let by_keyword = build_nodes(
        &store,
        &ExportFilter {
            keywords: vec!["Lensing".to_string()],
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_keyword.len(), 1);

    let by_years = build_nodes(
        &store,
        &ExportFilter {
            year_from: Some(2000),
            year_to: Some(2015),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_years.len(), 1);
    assert_eq!(by_years[0].paper_id, "W2");
}

#[tokio::test]
async fn edges_keep_only_exported_endpoints() {
    let store = seeded_store().await;
    let nodes = build_nodes(&store, &ExportFilter::default()).await.unwrap();
    let edges = build_edges(&store, &nodes).await.unwrap();

    // W2→W999 is dropped: W999 is not a node
    assert_eq!(edges.len(), 2);
    assert!(edges.iter().all(|e| e.weight == 1.0));
    assert!(edges.iter().all(|e| e.target == "W1"));

    // shrinking the node set shrinks the edge set
    let top = build_nodes(
        &store,
        &ExportFilter {
            top_n: Some(1),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let edges = build_edges(&store, &top).await.unwrap();
    assert!(edges.is_empty());
}

#[tokio::test]
async fn edges_empty_without_citation_table() {
    let store = PaperStore::open_in_memory().await.unwrap();
    store.ensure_columns().await.unwrap();
    let nodes = build_nodes(&store, &ExportFilter::default()).await.unwrap();
    let edges = build_edges(&store, &nodes).await.unwrap();
    assert!(edges.is_empty());
}

#[tokio::test]
async fn written_documents_round_trip() {
    let store = seeded_store().await;
    let nodes = build_nodes(&store, &ExportFilter::default()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nodes.json");
    write_json(&nodes, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let parsed: Vec<citeverse_export::Node> = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.len(), nodes.len());
    assert_eq!(parsed[0].paper_id, nodes[0].paper_id);
    assert!(text.contains("\"paperId\""));
}
