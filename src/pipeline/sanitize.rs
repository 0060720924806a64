use std::sync::LazyLock;

use regex::Regex;

use super::PipelineConfig;

static PAGE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\[page:(\d+|none)\]$").unwrap());
static DASH_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-{4,}").unwrap());
static EQUALS_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"={4,}").unwrap());
static UNDERSCORE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{4,}").unwrap());

/// Repair malformed model output: wrapping code fences, runaway separator
/// runs on overlong lines, and a leading `[page:N]` marker. Returns the
/// cleaned text plus the printed page number when the marker carried one.
pub fn sanitize_page(text: &str, cfg: &PipelineConfig) -> (String, Option<u32>) {
    let text = strip_code_fences(text);
    let text = collapse_runaway_lines(&text, cfg);
    extract_page_marker(&text)
}

/// Remove a wrapping markdown code fence, at most once at each end.
fn strip_code_fences(text: &str) -> String {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```") {
        t = rest.strip_prefix("markdown").unwrap_or(rest);
    }
    t = t.strip_suffix("```").unwrap_or(t);
    t.trim().to_string()
}

/// Collapse runs of repeated separator characters on excessively long
/// lines. Vision models sometimes hallucinate endless dashes in table
/// separators and ASCII-art borders, producing lines of 100K+ characters.
fn collapse_runaway_lines(text: &str, cfg: &PipelineConfig) -> String {
    let dash = "-".repeat(cfg.collapse_len);
    let equals = "=".repeat(cfg.collapse_len);
    let underscore = "_".repeat(cfg.collapse_len);

    text.split('\n')
        .map(|line| {
            if line.chars().count() <= cfg.long_line_limit {
                return line.to_string();
            }
            let line = DASH_RUN_RE.replace_all(line, dash.as_str());
            let line = EQUALS_RUN_RE.replace_all(&line, equals.as_str());
            UNDERSCORE_RUN_RE
                .replace_all(&line, underscore.as_str())
                .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Pull a `[page:N]` / `[page:none]` marker off the first line. Anything
/// that does not match exactly is left in place.
fn extract_page_marker(text: &str) -> (String, Option<u32>) {
    let (first, rest) = match text.split_once('\n') {
        Some((first, rest)) => (first, rest),
        None => (text, ""),
    };
    let Some(caps) = PAGE_MARKER_RE.captures(first.trim()) else {
        return (text.to_string(), None);
    };
    // The "none" token fails the parse and reports no page number.
    let number = caps[1].parse::<u32>().ok();
    (rest.trim().to_string(), number)
}
