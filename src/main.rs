mod assemble;
mod budget;
mod ocr;
mod pipeline;
mod preprocess;
mod scans;

use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use pipeline::PipelineConfig;

#[derive(Parser)]
#[command(name = "scanmark", about = "Convert scanned book pages to structured Markdown")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate cloud OCR cost without processing
    Estimate {
        /// Directory containing scan images
        input_dir: PathBuf,
        /// OpenRouter model ID
        #[arg(short, long, default_value = "google/gemini-2.5-flash")]
        model: String,
    },
    /// OCR scans with a vision model via OpenRouter
    Cloud {
        /// Directory containing scan images
        input_dir: PathBuf,
        /// Path for the output Markdown file
        output_file: PathBuf,
        /// OpenRouter model ID
        #[arg(short, long, default_value = "google/gemini-2.5-flash")]
        model: String,
        /// Maximum spend in USD
        #[arg(short, long, default_value_t = 12.0)]
        budget: f64,
        /// Concurrent API requests
        #[arg(short, long, default_value_t = 1)]
        workers: usize,
        /// Process a subset, e.g. "1-10"
        #[arg(long)]
        page_range: Option<String>,
        /// OpenRouter API key (falls back to OPENROUTER_API_KEY)
        #[arg(long)]
        api_key: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// OCR scans locally with Tesseract
    Local {
        /// Directory containing scan images
        input_dir: PathBuf,
        /// Path for the output Markdown file
        output_file: PathBuf,
        /// Tesseract language code
        #[arg(short, long, default_value = "nld")]
        lang: String,
        /// Process a subset, e.g. "1-10"
        #[arg(long)]
        page_range: Option<String>,
        /// Minimum consecutive pages for running header/footer removal
        #[arg(long, default_value_t = 3)]
        min_consecutive: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Estimate { input_dir, model } => {
            let files = scans::sorted_scans(&input_dir)?;
            let est = budget::estimate(files.len(), &model);
            println!(
                "{} pages, estimated cost ${:.2} with {}",
                files.len(),
                est,
                model
            );
            Ok(())
        }
        Commands::Cloud {
            input_dir,
            output_file,
            model,
            budget,
            workers,
            page_range,
            api_key,
            yes,
        } => {
            run_cloud(
                input_dir,
                output_file,
                model,
                budget,
                workers,
                page_range,
                api_key,
                yes,
            )
            .await
        }
        Commands::Local {
            input_dir,
            output_file,
            lang,
            page_range,
            min_consecutive,
        } => run_local(input_dir, output_file, lang, page_range, min_consecutive),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_cloud(
    input_dir: PathBuf,
    output_file: PathBuf,
    model: String,
    max_budget: f64,
    workers: usize,
    page_range: Option<String>,
    api_key: Option<String>,
    yes: bool,
) -> Result<()> {
    let files = scans::sorted_scans(&input_dir)?;
    if files.is_empty() {
        bail!("No scan images found in {}", input_dir.display());
    }
    let files = scans::filter_page_range(files, page_range.as_deref())?;
    println!("Found {} pages to process.", files.len());

    let est = budget::estimate(files.len(), &model);
    println!(
        "Estimated cost: ${:.2} for {} pages (budget: ${:.2})",
        est,
        files.len(),
        max_budget
    );
    if est > max_budget {
        bail!("Estimated cost exceeds budget. Aborting.");
    }

    let api_key = api_key
        .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
        .ok_or_else(|| anyhow!("API key required. Pass --api-key or set OPENROUTER_API_KEY."))?;

    if !yes && !confirm("Proceed with cloud processing?")? {
        return Ok(());
    }

    let cfg = PipelineConfig::default();
    let scan_numbers: Vec<u32> = files.iter().map(|f| scans::scan_number(f)).collect();
    let run = ocr::cloud::ocr_pages(files, api_key, model, workers, max_budget, &cfg).await?;

    let failed: Vec<String> = run
        .pages
        .iter()
        .filter(|p| p.text.is_none())
        .map(|p| (p.index + 1).to_string())
        .collect();
    if !failed.is_empty() {
        println!("Failed pages: {}", failed.join(", "));
    }
    println!("Total cost: ${:.4}", run.spent);

    let pages: Vec<String> = run
        .pages
        .iter()
        .map(|p| p.text.clone().unwrap_or_default())
        .collect();
    let page_numbers: Vec<Option<u32>> = run.pages.iter().map(|p| p.page_number).collect();
    assemble::write_document(&pages, &output_file, &scan_numbers, &page_numbers)?;
    println!("Output written to {}", output_file.display());
    Ok(())
}

fn run_local(
    input_dir: PathBuf,
    output_file: PathBuf,
    lang: String,
    page_range: Option<String>,
    min_consecutive: usize,
) -> Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};

    if !ocr::local::tesseract_available() {
        bail!("tesseract binary not found on PATH. Install it or use cloud mode.");
    }

    let files = scans::sorted_scans(&input_dir)?;
    if files.is_empty() {
        bail!("No scan images found in {}", input_dir.display());
    }
    let files = scans::filter_page_range(files, page_range.as_deref())?;
    println!("Found {} pages to process.", files.len());

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap()
            .progress_chars("#>-"),
    );

    let mut raw_pages: Vec<String> = Vec::with_capacity(files.len());
    for (idx, file) in files.iter().enumerate() {
        match ocr::local::ocr_page(file, &lang) {
            Ok(text) => raw_pages.push(text),
            Err(e) => {
                warn!("Page {} failed: {}", idx + 1, e);
                raw_pages.push(String::new());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("Normalizing extracted text...");
    let cfg = PipelineConfig {
        min_consecutive,
        ..Default::default()
    };
    let structured = pipeline::normalize_pages(&raw_pages, &cfg);

    let scan_numbers: Vec<u32> = files.iter().map(|f| scans::scan_number(f)).collect();
    let page_numbers = vec![None; structured.len()];
    assemble::write_document(&structured, &output_file, &scan_numbers, &page_numbers)?;
    println!("Output written to {}", output_file.display());
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
