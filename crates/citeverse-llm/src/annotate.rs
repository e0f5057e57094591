//! Annotation prompts and tolerant output parsing.
//!
//! Three operations, all best-effort:
//! - `categorize` — list of field labels for an abstract, `["Unknown"]` when
//!   the model fails or returns something unparseable
//! - `summarize` — 2–3 sentence newspaper-style summary, empty on failure
//! - `ai_abstract` — plausible placeholder abstract from metadata alone,
//!   always prefixed `AI abstract - `

use tracing::{debug, warn};

use crate::backend::{LlmBackend, LlmRequest};

pub const AI_ABSTRACT_PREFIX: &str = "AI abstract - ";
pub const UNKNOWN_FIELD: &str = "Unknown";

/// Row metadata handed to the prompts for context.
#[derive(Debug, Clone, Default)]
pub struct PaperContext {
    pub title: Option<String>,
    pub journal: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i64>,
    pub primary_concept: Option<String>,
}

impl PaperContext {
    fn metadata_block(&self) -> String {
        let mut lines = Vec::new();
        if let Some(ref t) = self.title {
            lines.push(format!("Title: {t}"));
        }
        if let Some(ref j) = self.journal {
            lines.push(format!("Journal: {j}"));
        }
        if let Some(ref a) = self.authors {
            lines.push(format!("Authors: {a}"));
        }
        if let Some(y) = self.year {
            lines.push(format!("Year: {y}"));
        }
        if let Some(ref c) = self.primary_concept {
            lines.push(format!("Primary concept: {c}"));
        }
        lines.join("\n")
    }
}

/// Annotation service over an injected backend handle.
pub struct Annotator {
    backend: Box<dyn LlmBackend>,
}

impl Annotator {
    pub fn new(backend: Box<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Field labels for an abstract. Never fails: degraded output is
    /// `["Unknown"]`.
    pub async fn categorize(&self, abstract_text: &str) -> Vec<String> {
        if abstract_text.trim().is_empty() {
            return vec![UNKNOWN_FIELD.to_string()];
        }
        let prompt = format!(
            "In a few key words pick the closest field of physics for this \
             scientific paper based on this abstract. \
             Return ONLY a JSON list of strings, e.g. \
             [\"High energy physics\", \"Particle physics\"].\n\n{abstract_text}"
        );
        let mut req = LlmRequest::user(prompt);
        req.temperature = Some(0.0);
        req.top_p = Some(0.0);

        match self.backend.complete(req).await {
            Ok(resp) => {
                let fields = parse_field_list(&resp.content);
                debug!(n = fields.len(), "Categorize returned fields");
                fields
            }
            Err(e) => {
                warn!(error = %e, "Categorize call failed");
                vec![UNKNOWN_FIELD.to_string()]
            }
        }
    }

    /// 2–3 sentence summary of the abstract, empty string on failure.
    pub async fn summarize(&self, abstract_text: &str, ctx: &PaperContext) -> String {
        if abstract_text.trim().is_empty() {
            return String::new();
        }
        let prompt = format!(
            "Create a headline and 2 to 3 sentence summary of this scientific paper \
             in the style of a short newspaper article.\n\
             - Use the abstract as the main source of information.\n\
             - Use the title, authors and journal only to understand context.\n\
             - Focus on: (1) what broader area this paper belongs to, \
             (2) which important ideas or prior work it builds upon, and \
             (3) what direction it is trying to support.\n\n\
             Metadata:\n{}\n\nAbstract:\n{}",
            ctx.metadata_block(),
            abstract_text
        );
        match self.backend.complete(LlmRequest::user(prompt)).await {
            Ok(resp) => resp.content.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Summarize call failed");
                String::new()
            }
        }
    }

    /// Plausible placeholder abstract from metadata alone. Empty string on
    /// failure; otherwise guaranteed to carry the `AI abstract - ` prefix.
    pub async fn ai_abstract(&self, ctx: &PaperContext) -> String {
        let prompt = format!(
            "You are an assistant that guesses a likely scientific abstract \
             from metadata when the true abstract is missing.\n\n{}\n\n\
             Task:\n\
             - Based on this metadata, write a plausible two-line scientific abstract.\n\
             - It should be written in a standard physics-paper abstract style.\n\
             - The VERY FIRST line must start exactly with 'AI abstract - ' \
             (for example: 'AI abstract - We investigate ...').\n\
             - Use two sentences total, broken on a newline between them.",
            ctx.metadata_block()
        );
        let mut req = LlmRequest::user(prompt);
        req.temperature = Some(0.5);
        req.top_p = Some(0.95);

        match self.backend.complete(req).await {
            Ok(resp) => enforce_prefix(resp.content.trim()),
            Err(e) => {
                warn!(error = %e, "AI-abstract call failed");
                String::new()
            }
        }
    }
}

/// Parse a model reply expected to be a JSON list of strings. Tolerates code
/// fences and surrounding prose; anything else degrades to `["Unknown"]`.
pub fn parse_field_list(raw: &str) -> Vec<String> {
    let trimmed = strip_code_fence(raw);
    // the list may be embedded in prose; take the outermost [...] span
    let candidate = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    };
    match serde_json::from_str::<Vec<String>>(candidate) {
        Ok(list) if !list.is_empty() => list
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => vec![UNKNOWN_FIELD.to_string()],
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let t = raw.trim();
    t.strip_prefix("```json")
        .or_else(|| t.strip_prefix("```"))
        .map(|s| s.trim_end_matches("```"))
        .map(str::trim)
        .unwrap_or(t)
}

/// Ensure the placeholder-abstract prefix even when the model forgot it.
pub fn enforce_prefix(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    if text.to_lowercase().starts_with("ai abstract -") {
        text.to_string()
    } else {
        format!("{AI_ABSTRACT_PREFIX}{}", text.trim_start())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_list_plain_json() {
        assert_eq!(
            parse_field_list(r#"["High energy physics", "Particle physics"]"#),
            vec!["High energy physics", "Particle physics"]
        );
    }

    #[test]
    fn test_parse_field_list_with_code_fence_and_prose() {
        let raw = "Sure! Here you go:\n```json\n[\"Astrophysics\"]\n```";
        assert_eq!(parse_field_list(raw), vec!["Astrophysics"]);
    }

    #[test]
    fn test_parse_field_list_degrades_to_unknown() {
        assert_eq!(parse_field_list("no list here"), vec![UNKNOWN_FIELD]);
        assert_eq!(parse_field_list("[]"), vec![UNKNOWN_FIELD]);
        assert_eq!(parse_field_list(""), vec![UNKNOWN_FIELD]);
    }

    #[test]
    fn test_enforce_prefix() {
        assert_eq!(
            enforce_prefix("AI abstract - We investigate X."),
            "AI abstract - We investigate X."
        );
        assert_eq!(
            enforce_prefix("We investigate X."),
            "AI abstract - We investigate X."
        );
        assert_eq!(enforce_prefix(""), "");
    }
}
