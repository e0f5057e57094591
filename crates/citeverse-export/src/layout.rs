//! Spatial layout heuristics for the 3D frontend.
//!
//! Axes: X is time (years since 1950), Y is a stable band per primary
//! field, Z is log-scaled citation count. Node size grows sublinearly with
//! citations and is clamped so a mega-cited paper cannot dominate the view.

use std::collections::HashMap;

const BAND_STEP: f64 = 3.0;
const YEAR_ORIGIN: i64 = 1950;
const SIZE_BASE: f64 = 0.5;
const SIZE_MAX: f64 = 2.0;

/// Node radius from citation count: `min(0.5 + 0.5·c^0.4, 2.0)`, two
/// decimals. Zero or unknown citations give the base size.
pub fn size_from_citations(citations: Option<i64>) -> f64 {
    let c = citations.unwrap_or(0);
    if c <= 0 {
        return SIZE_BASE;
    }
    let size = (SIZE_BASE + 0.5 * (c as f64).powf(0.4)).min(SIZE_MAX);
    (size * 100.0).round() / 100.0
}

/// Stable Y band per field label: labels sorted, spaced by 3.0 and centered
/// on zero, so adding papers (but not fields) never moves existing bands.
pub fn field_bands(fields: &[String]) -> HashMap<String, f64> {
    let mut sorted: Vec<&String> = fields.iter().collect();
    sorted.sort();
    sorted.dedup();
    if sorted.is_empty() {
        return HashMap::new();
    }
    let offset = -((sorted.len() - 1) as f64) * BAND_STEP / 2.0;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, f)| (f.clone(), offset + i as f64 * BAND_STEP))
        .collect()
}

/// `[x, y, z]` for one node. Unknown years collapse onto the far-left edge.
pub fn position(year: Option<i64>, band: f64, citations: Option<i64>) -> [f64; 3] {
    let x = (year.unwrap_or(0) - YEAR_ORIGIN) as f64;
    let z = (citations.unwrap_or(0).max(0) as f64).ln_1p() * 10.0;
    [x, band, z]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_boundaries() {
        assert_eq!(size_from_citations(None), 0.5);
        assert_eq!(size_from_citations(Some(0)), 0.5);
        assert_eq!(size_from_citations(Some(-3)), 0.5);
        // c = 1: 0.5 + 0.5*1 = 1.0
        assert_eq!(size_from_citations(Some(1)), 1.0);
        // the clamp kicks in around c = 16
        assert_eq!(size_from_citations(Some(100_000)), 2.0);
    }

    #[test]
    fn test_size_rounds_to_two_decimals() {
        let s = size_from_citations(Some(5));
        assert_eq!(s, (s * 100.0).round() / 100.0);
        assert!(s > 0.5 && s < 2.0);
    }

    #[test]
    fn test_bands_are_centered() {
        let bands = field_bands(&[
            "Cosmology".to_string(),
            "Astrophysics".to_string(),
            "Optics".to_string(),
        ]);
        assert_eq!(bands["Astrophysics"], -3.0);
        assert_eq!(bands["Cosmology"], 0.0);
        assert_eq!(bands["Optics"], 3.0);
    }

    #[test]
    fn test_single_field_sits_at_zero() {
        let bands = field_bands(&["Optics".to_string()]);
        assert_eq!(bands["Optics"], 0.0);
    }

    #[test]
    fn test_bands_empty() {
        assert!(field_bands(&[]).is_empty());
    }

    #[test]
    fn test_position_axes() {
        let p = position(Some(2000), 3.0, Some(0));
        assert_eq!(p, [50.0, 3.0, 0.0]);
        let p = position(None, 0.0, Some(99));
        assert_eq!(p[0], -1950.0);
        assert!((p[2] - (100.0f64).ln() * 10.0).abs() < 1e-9);
    }
}
