use std::path::Path;

use anyhow::{Context, Result};

/// Join processed pages into a single Markdown document with per-page
/// comment markers and write it to `output`.
pub fn write_document(
    pages: &[String],
    output: &Path,
    scan_numbers: &[u32],
    page_numbers: &[Option<u32>],
) -> Result<()> {
    let content = render(pages, scan_numbers, page_numbers);
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(output, content)
        .with_context(|| format!("Failed to write {}", output.display()))
}

fn render(pages: &[String], scan_numbers: &[u32], page_numbers: &[Option<u32>]) -> String {
    let mut parts = Vec::with_capacity(pages.len() * 3);
    for (i, page) in pages.iter().enumerate() {
        let scan = scan_numbers.get(i).copied().unwrap_or(i as u32 + 1);
        let label = page_numbers
            .get(i)
            .copied()
            .flatten()
            .map(|n| format!("#{n}"))
            .unwrap_or_else(|| "none".to_string());
        parts.push(format!("<!-- page {label} / scan #{scan} -->"));
        parts.push(page.trim().to_string());
        // Blank line after each page.
        parts.push(String::new());
    }
    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_carry_page_and_scan_numbers() {
        let pages = vec!["First page.".to_string(), "Second page.".to_string()];
        let rendered = render(&pages, &[3, 4], &[Some(1), None]);
        let lines: Vec<&str> = rendered.split('\n').collect();
        assert_eq!(lines[0], "<!-- page #1 / scan #3 -->");
        assert_eq!(lines[1], "First page.");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "<!-- page none / scan #4 -->");
        assert_eq!(lines[4], "Second page.");
    }

    #[test]
    fn missing_scan_numbers_default_to_position() {
        let pages = vec!["Only page.".to_string()];
        let rendered = render(&pages, &[], &[]);
        assert!(rendered.starts_with("<!-- page none / scan #1 -->"));
    }

    #[test]
    fn writes_file_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("nested/out.md");
        let pages = vec!["Content.".to_string()];
        write_document(&pages, &output, &[1], &[None]).unwrap();
        let written = std::fs::read_to_string(&output).unwrap();
        assert!(written.contains("Content."));
    }
}
