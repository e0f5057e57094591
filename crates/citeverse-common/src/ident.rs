//! Identifier normalization.
//!
//! Paper rows carry identifiers in whatever shape the importing script left
//! behind: bare DOIs, `doi:`/resolver-prefixed DOIs, arXiv ids with or
//! without version suffixes, 40-hex Semantic Scholar paper ids, and OpenAlex
//! work ids as either `W123…` or the full `https://openalex.org/W123…` URL.
//! Everything here is pure string work; unrecognizable input is classified,
//! never rejected with an error.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref OPENALEX_URL_RE: Regex =
        Regex::new(r"(?i)^https?://(www\.)?openalex\.org/(W\d+)$").unwrap();
    static ref OPENALEX_SHORT_RE: Regex = Regex::new(r"^W\d+$").unwrap();
    static ref S2_HEX_RE: Regex = Regex::new(r"(?i)^[0-9a-f]{40}$").unwrap();
    // new-style 2007.12345, old-style hep-th/9901001 or math.GT/0309136,
    // optionally arXiv:-prefixed and version-suffixed
    static ref ARXIV_NEW_RE: Regex =
        Regex::new(r"(?i)^(arxiv:)?\d{4}\.\d{4,5}(v\d+)?$").unwrap();
    static ref ARXIV_OLD_RE: Regex =
        Regex::new(r"(?i)^(arxiv:)?[a-z-]+(\.[a-z]{2})?/\d{7}(v\d+)?$").unwrap();
}

/// A recognized identifier shape, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperIdent {
    /// Bare DOI starting with `10.`.
    Doi(String),
    /// arXiv id with any trailing `v<digits>` stripped.
    ArxivId(String),
    /// 40-hex Semantic Scholar paper id.
    S2Hex(String),
    /// Full OpenAlex URL; `short` is the extracted `W<digits>` form.
    OpenAlexUrl { short: String },
    /// Bare `W<digits>` OpenAlex work id.
    OpenAlexShort(String),
    Unrecognized(String),
}

impl PaperIdent {
    /// Classify a raw identifier string into one of the known shapes.
    pub fn classify(raw: &str) -> PaperIdent {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return PaperIdent::Unrecognized(String::new());
        }
        if let Some(caps) = OPENALEX_URL_RE.captures(trimmed) {
            return PaperIdent::OpenAlexUrl {
                short: caps[2].to_string(),
            };
        }
        if OPENALEX_SHORT_RE.is_match(trimmed) {
            return PaperIdent::OpenAlexShort(trimmed.to_string());
        }
        if S2_HEX_RE.is_match(trimmed) {
            return PaperIdent::S2Hex(trimmed.to_lowercase());
        }
        if let Some(doi) = normalize_doi(trimmed) {
            return PaperIdent::Doi(doi);
        }
        if ARXIV_NEW_RE.is_match(trimmed) || ARXIV_OLD_RE.is_match(trimmed) {
            return PaperIdent::ArxivId(normalize_arxiv(trimmed));
        }
        PaperIdent::Unrecognized(trimmed.to_string())
    }

    /// The OpenAlex `W<digits>` form, if this identifier has one.
    pub fn openalex_short(&self) -> Option<&str> {
        match self {
            PaperIdent::OpenAlexUrl { short } => Some(short),
            PaperIdent::OpenAlexShort(s) => Some(s),
            _ => None,
        }
    }
}

const DOI_PREFIXES: &[&str] = &[
    "doi:",
    "https://doi.org/",
    "http://doi.org/",
    "https://dx.doi.org/",
    "http://dx.doi.org/",
];

/// Normalize a DOI string: strip accepted prefixes case-insensitively,
/// then require the remainder to start with `10.` and contain no whitespace.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim().trim_matches('"').trim_matches('\'');
    let lower = doi.to_lowercase();
    for prefix in DOI_PREFIXES {
        if lower.starts_with(prefix) {
            doi = doi[prefix.len()..].trim();
            break;
        }
    }
    if !doi.starts_with("10.") || doi.chars().any(char::is_whitespace) {
        return None;
    }
    Some(doi.to_string())
}

/// Normalize an arXiv id: strip an optional `arXiv:` prefix and a trailing
/// `v<digits>` version suffix. Old-style (`hep-th/9901001`) and new-style
/// (`2401.01234`) ids pass through otherwise unchanged. Idempotent.
pub fn normalize_arxiv(raw: &str) -> String {
    let mut id = raw.trim();
    let lower = id.to_lowercase();
    if lower.starts_with("arxiv:") {
        id = &id["arxiv:".len()..];
    }
    if let Some(pos) = id.rfind('v') {
        let suffix = &id[pos + 1..];
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) {
            return id[..pos].to_string();
        }
    }
    id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doi_prefix_stripping_is_uniform() {
        for raw in [
            "10.1/x",
            "doi:10.1/x",
            "DOI:10.1/x",
            "https://doi.org/10.1/x",
            "http://dx.doi.org/10.1/x",
        ] {
            assert_eq!(normalize_doi(raw).as_deref(), Some("10.1/x"), "input: {raw}");
        }
    }

    #[test]
    fn test_doi_rejects_non_doi_remainder() {
        assert_eq!(normalize_doi("doi:11.1/x"), None);
        assert_eq!(normalize_doi("10.1/x y"), None);
        assert_eq!(normalize_doi(""), None);
        assert_eq!(normalize_doi("https://example.org/10.1/x"), None);
    }

    #[test]
    fn test_arxiv_version_stripping() {
        assert_eq!(normalize_arxiv("2401.01234v3"), "2401.01234");
        assert_eq!(normalize_arxiv("hep-th/9901001v12"), "hep-th/9901001");
        assert_eq!(normalize_arxiv("arXiv:2401.01234v1"), "2401.01234");
        // 'v' not followed by digits is part of the id
        assert_eq!(normalize_arxiv("cond-mat/9901001va"), "cond-mat/9901001va");
    }

    #[test]
    fn test_arxiv_normalization_is_idempotent() {
        for raw in ["2401.01234v3", "hep-th/9901001", "arXiv:1207.7214v2"] {
            let once = normalize_arxiv(raw);
            assert_eq!(normalize_arxiv(&once), once);
        }
    }

    #[test]
    fn test_classify_shapes() {
        assert_eq!(
            PaperIdent::classify("https://openalex.org/W2100837269"),
            PaperIdent::OpenAlexUrl {
                short: "W2100837269".to_string()
            }
        );
        assert_eq!(
            PaperIdent::classify("W2100837269"),
            PaperIdent::OpenAlexShort("W2100837269".to_string())
        );
        let hex = "deadbeef".repeat(5);
        assert_eq!(PaperIdent::classify(&hex), PaperIdent::S2Hex(hex.clone()));
        assert_eq!(
            PaperIdent::classify("doi:10.1103/PhysRevLett.19.1264"),
            PaperIdent::Doi("10.1103/PhysRevLett.19.1264".to_string())
        );
        assert!(matches!(
            PaperIdent::classify("not an id"),
            PaperIdent::Unrecognized(_)
        ));
    }

    #[test]
    fn test_classify_arxiv_ids() {
        assert_eq!(
            PaperIdent::classify("2401.01234"),
            PaperIdent::ArxivId("2401.01234".to_string())
        );
        assert_eq!(
            PaperIdent::classify("2401.01234v3"),
            PaperIdent::ArxivId("2401.01234".to_string())
        );
        assert_eq!(
            PaperIdent::classify("hep-th/9901001"),
            PaperIdent::ArxivId("hep-th/9901001".to_string())
        );
        assert_eq!(
            PaperIdent::classify("math.GT/0309136v2"),
            PaperIdent::ArxivId("math.GT/0309136".to_string())
        );
        assert_eq!(
            PaperIdent::classify("arXiv:1207.7214"),
            PaperIdent::ArxivId("1207.7214".to_string())
        );
        // DOIs keep winning over the old-style shape
        assert_eq!(
            PaperIdent::classify("10.1103/PhysRevLett.19.1264"),
            PaperIdent::Doi("10.1103/PhysRevLett.19.1264".to_string())
        );
    }

    #[test]
    fn test_classify_hex_is_case_insensitive() {
        let mixed = "DeadBeef".repeat(5);
        assert_eq!(
            PaperIdent::classify(&mixed),
            PaperIdent::S2Hex(mixed.to_lowercase())
        );
    }
}
