use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());
static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)$").unwrap());

const SCAN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// List scan images in `dir`, sorted by the numeric part of the filename
/// so "scan_2.jpg" comes before "scan_10.jpg".
pub fn sorted_scans(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| SCAN_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect();

    files.sort_by_key(|path| scan_number(path));
    Ok(files)
}

/// Numeric scan number from a filename: "scan_012.jpg" → 12. Files
/// without digits sort first as 0.
pub fn scan_number(path: &Path) -> u32 {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| NUMBER_RE.find(stem))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Apply a 1-indexed inclusive "START-END" filter to the sorted scan list.
pub fn filter_page_range(files: Vec<PathBuf>, range: Option<&str>) -> Result<Vec<PathBuf>> {
    let Some(range) = range else {
        return Ok(files);
    };
    let Some(caps) = RANGE_RE.captures(range) else {
        bail!("Invalid page range '{}'. Use the form '1-10'.", range);
    };
    let start: usize = caps[1].parse()?;
    let end: usize = caps[2].parse()?;
    let start = start.saturating_sub(1);

    Ok(files
        .into_iter()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn sorts_numerically_not_lexically() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["scan_10.jpg", "scan_2.jpg", "scan_1.jpg"] {
            touch(dir.path(), name);
        }
        let files = sorted_scans(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["scan_1.jpg", "scan_2.jpg", "scan_10.jpg"]);
    }

    #[test]
    fn ignores_non_image_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "scan_1.jpg");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "scan_2.PNG");
        let files = sorted_scans(dir.path()).unwrap();
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn scan_number_extraction() {
        assert_eq!(scan_number(Path::new("scan_012.jpg")), 12);
        assert_eq!(scan_number(Path::new("IMG4711.png")), 4711);
        assert_eq!(scan_number(Path::new("cover.jpg")), 0);
    }

    #[test]
    fn range_filter() {
        let files: Vec<PathBuf> = (1..=5).map(|i| PathBuf::from(format!("{i}.jpg"))).collect();
        let filtered = filter_page_range(files, Some("2-4")).unwrap();
        let names: Vec<_> = filtered
            .iter()
            .map(|p| p.to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["2.jpg", "3.jpg", "4.jpg"]);
    }

    #[test]
    fn no_range_returns_all() {
        let files: Vec<PathBuf> = (1..=3).map(|i| PathBuf::from(format!("{i}.jpg"))).collect();
        assert_eq!(filter_page_range(files, None).unwrap().len(), 3);
    }

    #[test]
    fn malformed_range_rejected() {
        assert!(filter_page_range(vec![], Some("abc")).is_err());
        assert!(filter_page_range(vec![], Some("1-")).is_err());
    }
}
