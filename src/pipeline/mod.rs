pub mod headers;
pub mod sanitize;
pub mod structure;

use rayon::prelude::*;

/// Tunables for the text-normalization passes.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum consecutive pages before a repeated edge line counts as a
    /// running header/footer.
    pub min_consecutive: usize,
    /// Line offsets probed from the top and from the bottom of each page.
    pub probe_depth: usize,
    /// Lines longer than this (in chars) get runaway separator runs collapsed.
    pub long_line_limit: usize,
    /// Length a runaway separator run is collapsed down to.
    pub collapse_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_consecutive: 3,
            probe_depth: 2,
            long_line_limit: 500,
            collapse_len: 3,
        }
    }
}

/// Two-pass local-mode pipeline: strip running headers/footers across the
/// whole collection, then infer heading structure per page.
pub fn normalize_pages(pages: &[String], cfg: &PipelineConfig) -> Vec<String> {
    let stripped = headers::strip_headers(pages, cfg);
    stripped
        .par_iter()
        .map(|page| structure::infer_structure(page))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_stripped_then_headings_inferred() {
        let pages = vec![
            "Handbook of Things\n4 Professional conduct\nBody 1.".to_string(),
            "Handbook of Things\nBody 2.".to_string(),
            "Handbook of Things\n4.1 Conduct at work\nBody 3.".to_string(),
        ];
        let result = normalize_pages(&pages, &PipelineConfig::default());
        assert_eq!(result.len(), 3);
        for page in &result {
            assert!(!page.contains("Handbook of Things"));
        }
        assert!(result[0].starts_with("## 4 Professional conduct"));
        assert!(result[2].starts_with("### 4.1 Conduct at work"));
        assert!(result[1].contains("Body 2."));
    }

    #[test]
    fn empty_collection() {
        let result = normalize_pages(&[], &PipelineConfig::default());
        assert!(result.is_empty());
    }
}
