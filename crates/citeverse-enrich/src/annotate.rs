//! AI annotation pass.
//!
//! For every row still missing annotations: generate a placeholder abstract
//! when the row has none (guarded so a real abstract arriving in the
//! meantime wins), then derive field labels and a reader-facing summary
//! from whichever abstract the row ends up with. Model failures degrade
//! per row and never abort the pass.

use citeverse_db::{Need, PaperStore};
use citeverse_llm::{Annotator, PaperContext, UNKNOWN_FIELD};
use tracing::{info, warn};

use crate::pipeline::{EnrichmentConfig, RunSummary};

pub async fn annotate_papers(
    store: &PaperStore,
    annotator: &Annotator,
    config: &EnrichmentConfig,
) -> anyhow::Result<RunSummary> {
    let rows = store.select_needing(Need::AnnotationsMissing, config.limit).await?;
    let mut summary = RunSummary {
        scanned: rows.len(),
        ..Default::default()
    };

    for row in &rows {
        let ctx = PaperContext {
            title: row.title.clone(),
            journal: row.journal.clone(),
            authors: row.authors.clone(),
            year: row.year,
            primary_concept: None,
        };

        let mut abstract_text = row.abstract_text.clone().unwrap_or_default();
        if abstract_text.trim().is_empty() {
            let generated = annotator.ai_abstract(&ctx).await;
            if generated.is_empty() {
                warn!(paper = %row.paper_id, "No abstract and generation failed, skipping");
                summary.unsatisfied += 1;
                continue;
            }
            if store.write_ai_abstract(&row.paper_id, &generated).await? {
                abstract_text = generated;
            } else {
                // a real abstract landed after the row was selected; the
                // guard refused the write, so annotate the stored text
                abstract_text = store
                    .abstract_of(&row.paper_id)
                    .await?
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or(generated);
            }
        }

        let fields = annotator.categorize(&abstract_text).await;
        let primary = fields
            .first()
            .cloned()
            .unwrap_or_else(|| UNKNOWN_FIELD.to_string());
        let summary_text = annotator.summarize(&abstract_text, &ctx).await;
        let summary_opt = (!summary_text.trim().is_empty()).then_some(summary_text.as_str());

        store
            .update_annotations(&row.paper_id, &fields, &primary, summary_opt)
            .await?;
        summary.updated += 1;
    }

    info!(
        scanned = summary.scanned,
        updated = summary.updated,
        unsatisfied = summary.unsatisfied,
        model = annotator.model_id(),
        "Annotation pass done"
    );
    Ok(summary)
}
