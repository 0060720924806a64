use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use base64::Engine as _;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::budget::{self, BudgetTracker};
use crate::pipeline::{sanitize, PipelineConfig};

const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const MAX_TOKENS: u32 = 8192;
const REQUEST_TIMEOUT_SECS: u64 = 120;

const SYSTEM_PROMPT: &str = "\
You are an OCR and formatting assistant. You will receive a single scanned page from a \
printed non-fiction book. Your task:

1. Extract ALL text from the image accurately, preserving language-specific characters \
and diacritics.

2. Format the extracted text as Markdown:
   - Chapter titles -> ## (H2)
   - Section numbers like \"4.1 Title\" -> ### (H3)
   - Sub-sections like \"4.1.1 Title\" -> #### (H4)
   - Bold text -> **bold**
   - Preserve paragraph breaks
   - Footnote markers -> [^N] inline; footnote text (usually at the page bottom) -> [^N]: text
   - Tables -> Markdown tables with a short separator row such as | --- | --- |. \
Never repeat dashes excessively.
   - Diagrams, flowcharts, or architectural figures -> compact ASCII art inside a fenced \
code block, using +, -, |, >, <, v, ^. Max 30 lines, max 80 characters wide; simplify \
complex visuals rather than generating excessive spacing.
   - Photos or other non-diagrammatic images -> a blockquote: > [Image]: description

3. EXCLUDE running headers (book or chapter title repeated at the top of the page) and \
running footers (page numbers at the bottom).

4. On the very first line, report the printed page number visible on the scan as [page:N], \
or [page:none] if no page number is visible (cover pages, title pages, blank pages). Then \
continue with the Markdown content.

5. Return ONLY the page marker and the Markdown content. No commentary, no explanations, \
no code fences.";

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: serde_json::Value,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

/// One page's cloud OCR outcome. `text` is `None` when the page failed
/// after retries or was skipped because the budget ran out.
#[derive(Debug)]
pub struct PageResult {
    pub index: usize,
    pub text: Option<String>,
    pub page_number: Option<u32>,
    pub cost: f64,
}

/// Outcome of a full cloud run: per-page results in scan order plus the
/// total spend.
pub struct CloudRun {
    pub pages: Vec<PageResult>,
    pub spent: f64,
}

/// OCR all scans concurrently (bounded by `workers`), streaming results
/// back as they arrive. The budget is checked before each page is
/// dispatched; a failed page degrades to an empty placeholder.
pub async fn ocr_pages(
    files: Vec<PathBuf>,
    api_key: String,
    model: String,
    workers: usize,
    max_budget: f64,
    cfg: &PipelineConfig,
) -> Result<CloudRun> {
    let client = reqwest::Client::new();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let tracker = Arc::new(Mutex::new(BudgetTracker::new(max_budget)));
    let api_key = Arc::new(api_key);
    let model = Arc::new(model);
    let total = files.len();

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} ({per_sec}, eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = mpsc::channel::<PageResult>(workers.max(1) * 2);

    for (index, path) in files.into_iter().enumerate() {
        let client = client.clone();
        let sem = Arc::clone(&semaphore);
        let tracker = Arc::clone(&tracker);
        let api_key = Arc::clone(&api_key);
        let model = Arc::clone(&model);
        let cfg = cfg.clone();
        let tx = tx.clone();

        tokio::spawn(async move {
            let _permit = sem.acquire().await.unwrap();
            if tracker.lock().unwrap().exceeded() {
                warn!("Budget exceeded, skipping page {}", index + 1);
                let _ = tx.send(PageResult { index, text: None, page_number: None, cost: 0.0 }).await;
                return;
            }
            match ocr_page_with_retry(&client, &path, &api_key, &model, &cfg).await {
                Ok((text, cost, page_number)) => {
                    tracker.lock().unwrap().record(cost);
                    let _ = tx
                        .send(PageResult { index, text: Some(text), page_number, cost })
                        .await;
                }
                Err(e) => {
                    warn!("Page {} failed: {}", index + 1, e);
                    let _ = tx.send(PageResult { index, text: None, page_number: None, cost: 0.0 }).await;
                }
            }
        });
    }

    // Drop our copy of tx so rx closes when all spawned tasks finish.
    drop(tx);

    let mut pages: Vec<PageResult> = Vec::with_capacity(total);
    while let Some(result) = rx.recv().await {
        if result.text.is_some() {
            tracing::debug!("Page {}: ${:.4}", result.index + 1, result.cost);
        }
        pages.push(result);
        pb.inc(1);
    }
    pb.finish_and_clear();

    pages.sort_by_key(|p| p.index);
    let ok = pages.iter().filter(|p| p.text.is_some()).count();
    let spent = tracker.lock().unwrap().spent();
    info!("Extracted {} pages ({} ok, {} failed)", total, ok, total - ok);

    Ok(CloudRun { pages, spent })
}

/// OCR one scan via a vision model, retrying with exponential backoff.
/// Returns the sanitized Markdown, the cost in USD, and the printed page
/// number when the model reported one.
pub async fn ocr_page_with_retry(
    client: &reqwest::Client,
    image_path: &Path,
    api_key: &str,
    model: &str,
    cfg: &PipelineConfig,
) -> Result<(String, f64, Option<u32>)> {
    let payload = build_payload(image_path, model).await?;

    let mut last_err = None;
    for attempt in 0..MAX_RETRIES {
        match request_once(client, api_key, &payload).await {
            Ok(response) => {
                let content = response
                    .choices
                    .first()
                    .map(|c| c.message.content.as_str())
                    .ok_or_else(|| anyhow!("No choices in model response"))?;
                let (text, page_number) = sanitize::sanitize_page(content, cfg);
                let cost = usage_cost(&response.usage, model);
                return Ok((text, cost, page_number));
            }
            Err(e) => {
                if attempt + 1 < MAX_RETRIES {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "OCR attempt {}/{} failed for {}: {} (backing off {:.1}s)",
                        attempt + 1,
                        MAX_RETRIES,
                        image_path.display(),
                        e,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                }
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("Max retries exceeded")))
}

/// Chat-completions payload with the scan attached as a base64 data URL.
async fn build_payload(image_path: &Path, model: &str) -> Result<serde_json::Value> {
    let bytes = tokio::fs::read(image_path)
        .await
        .with_context(|| format!("Failed to read {}", image_path.display()))?;
    let mime = match image_path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("png") => "image/png",
        _ => "image/jpeg",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);

    Ok(serde_json::json!({
        "model": model,
        "messages": [
            { "role": "system", "content": SYSTEM_PROMPT },
            { "role": "user", "content": [
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:{mime};base64,{encoded}") },
                },
                {
                    "type": "text",
                    "text": "Please extract and format all text from this scanned page.",
                },
            ]},
        ],
        "max_tokens": MAX_TOKENS,
        "temperature": 0.0,
    }))
}

async fn request_once(
    client: &reqwest::Client,
    api_key: &str,
    payload: &serde_json::Value,
) -> Result<ChatResponse> {
    let response = client
        .post(OPENROUTER_URL)
        .bearer_auth(api_key)
        .json(payload)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}

/// Cost in USD from the response usage block: OpenRouter sometimes
/// reports it directly, otherwise derive it from token counts.
fn usage_cost(usage: &serde_json::Value, model: &str) -> f64 {
    if let Some(total) = usage.get("total_cost").and_then(|v| v.as_f64()) {
        return total;
    }
    let prompt = usage
        .get("prompt_tokens")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let completion = usage
        .get("completion_tokens")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let (input_price, output_price) = budget::model_pricing(model);
    (prompt * input_price + completion * output_price) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_cost_prefers_direct_total() {
        let usage = serde_json::json!({ "total_cost": 0.0123, "prompt_tokens": 99999 });
        assert_eq!(usage_cost(&usage, "google/gemini-2.5-flash"), 0.0123);
    }

    #[test]
    fn usage_cost_from_tokens() {
        let usage = serde_json::json!({ "prompt_tokens": 1000, "completion_tokens": 500 });
        // 1000 * 0.10 + 500 * 0.40 = 300 micro-dollars.
        let cost = usage_cost(&usage, "google/gemini-2.5-flash");
        assert!((cost - 0.0003).abs() < 1e-12);
    }

    #[test]
    fn usage_cost_empty_usage() {
        assert_eq!(usage_cost(&serde_json::Value::Null, "any"), 0.0);
    }

    #[test]
    fn response_shape_deserializes() {
        let raw = r#"{
            "choices": [{ "message": { "role": "assistant", "content": "[page:3]\nText" } }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5 }
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].message.content, "[page:3]\nText");
    }

    #[tokio::test]
    async fn payload_tags_png_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_1.png");
        std::fs::write(&path, b"notapng").unwrap();
        let payload = build_payload(&path, "m").await.unwrap();
        let url = payload["messages"][1]["content"][0]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn payload_defaults_to_jpeg_mime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan_1.jpg");
        std::fs::write(&path, b"notajpeg").unwrap();
        let payload = build_payload(&path, "m").await.unwrap();
        let url = payload["messages"][1]["content"][0]["image_url"]["url"]
            .as_str()
            .unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
    }
}
