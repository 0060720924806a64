use std::sync::LazyLock;

use regex::{Captures, Regex};

// Numbered section lines at the start of a line, most specific first: a
// line rewritten as a heading starts with '#' and cannot re-match a later
// pattern.
static SUBSECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\d+\.\d+\.\d+)[ \t]+(.+)$").unwrap());
static SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\d+\.\d+)[ \t]+(.+)$").unwrap());
// Bare number + capitalized title. Can false-positive on a numbered list
// item whose text starts with a capital letter; there is no line-level
// signal to tell the two apart.
static CHAPTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(\d+)[ \t]+([A-Z\u{00C0}-\u{024F}].{2,})$").unwrap());
static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{4,}").unwrap());

/// Detect numbered section patterns and convert them to Markdown
/// headings: `X.Y.Z` → H4, `X.Y` → H3, bare `X` with a capitalized
/// title → H2.
pub fn infer_structure(text: &str) -> String {
    let text = SUBSECTION_RE.replace_all(text, |caps: &Captures| heading(4, caps));
    let text = SECTION_RE.replace_all(&text, |caps: &Captures| heading(3, caps));
    let text = CHAPTER_RE.replace_all(&text, |caps: &Captures| heading(2, caps));
    BLANK_RUN_RE.replace_all(&text, "\n\n\n").to_string()
}

fn heading(level: usize, caps: &Captures) -> String {
    // Headings carry their own emphasis; drop stray bold markers.
    let title = caps[2].trim().replace("**", "");
    format!("{} {} {}", "#".repeat(level), &caps[1], title)
}
