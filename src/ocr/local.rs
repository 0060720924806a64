use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::preprocess;

static EMPTY_BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*\s+\*\*").unwrap());
static ADJACENT_BOLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*]+)\*\*(\s+)\*\*([^*]+)\*\*").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Check for the tesseract binary before a run starts.
pub fn tesseract_available() -> bool {
    Command::new("tesseract").arg("--version").output().is_ok()
}

/// OCR a single scan with Tesseract, marking bold words via hOCR font
/// attributes.
pub fn ocr_page(image_path: &Path, lang: &str) -> Result<String> {
    let binarized = preprocess::binarize(image_path)?;

    let output = Command::new("tesseract")
        .arg(binarized.path())
        .arg("stdout")
        .args(["-l", lang, "--oem", "1", "hocr"])
        .output()
        .context("Failed to run tesseract")?;
    if !output.status.success() {
        bail!(
            "tesseract failed on {}: {}",
            image_path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(parse_hocr(&String::from_utf8_lossy(&output.stdout)))
}

/// Extract line-per-line text from hOCR markup, wrapping bold words in
/// `**`. Falls back to tag stripping when the markup does not parse as
/// XML.
fn parse_hocr(hocr: &str) -> String {
    let escaped = escape_stray_ampersands(hocr);
    match parse_hocr_xml(&escaped) {
        Ok(text) => merge_bold_runs(&text),
        Err(_) => fallback_extract(hocr),
    }
}

fn parse_hocr_xml(hocr: &str) -> Result<String> {
    let mut reader = quick_xml::Reader::from_str(hocr);
    let mut lines: Vec<String> = Vec::new();
    let mut current_line: Vec<String> = Vec::new();
    let mut in_word = false;
    let mut word_bold = false;
    let mut word_buf = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let class = attr(&e, "class").unwrap_or_default();
                if class.contains("ocr_line") && !current_line.is_empty() {
                    lines.push(current_line.join(" "));
                    current_line.clear();
                }
                if class.contains("ocrx_word") {
                    in_word = true;
                    word_bold = is_bold(&e);
                    word_buf.clear();
                }
            }
            // A word's text can arrive in several pieces; collect until the
            // span closes.
            Ok(Event::Text(e)) if in_word => word_buf.push_str(e.unescape()?.as_ref()),
            Ok(Event::End(_)) => {
                if in_word {
                    let word = word_buf.trim();
                    if !word.is_empty() {
                        current_line.push(if word_bold {
                            format!("**{word}**")
                        } else {
                            word.to_string()
                        });
                    }
                    in_word = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.into()),
            _ => {}
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line.join(" "));
    }
    Ok(lines.join("\n"))
}

/// Bold detection from Tesseract's hOCR attributes: font name in `title`
/// or an explicit font-weight in `style`.
fn is_bold(e: &BytesStart) -> bool {
    let title = attr(e, "title").unwrap_or_default();
    if title.contains("Bold") || title.contains("bold") {
        return true;
    }
    let style = attr(e, "style").unwrap_or_default();
    style.contains("font-weight") && style.contains("bold")
}

fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.to_string())
}

/// Join adjacent bold words: `**a** **b**` → `**a b**`.
fn merge_bold_runs(text: &str) -> String {
    let text = EMPTY_BOLD_RE.replace_all(text, " ");
    let text = ADJACENT_BOLD_RE.replace_all(&text, "**${1}${2}${3}**");
    // Second pass catches chains of three or more.
    ADJACENT_BOLD_RE
        .replace_all(&text, "**${1}${2}${3}**")
        .to_string()
}

/// Tesseract writes hOCR as XHTML but bare ampersands slip through; escape
/// them without touching real entities.
fn escape_stray_ampersands(hocr: &str) -> String {
    hocr.replace('&', "&amp;")
        .replace("&amp;amp;", "&amp;")
        .replace("&amp;lt;", "&lt;")
        .replace("&amp;gt;", "&gt;")
        .replace("&amp;quot;", "&quot;")
        .replace("&amp;apos;", "&apos;")
}

/// Plain-text rescue when the hOCR is not parseable: drop tags, collapse
/// whitespace.
fn fallback_extract(hocr: &str) -> String {
    let text = TAG_RE.replace_all(hocr, " ");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}
