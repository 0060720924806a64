use std::collections::HashSet;

use super::PipelineConfig;

#[derive(Clone, Copy)]
enum Edge {
    Top,
    Bottom,
}

/// Remove running headers and footers from a collection of page texts.
///
/// A line qualifies when its normalized value repeats at the same top or
/// bottom offset across `cfg.min_consecutive` or more consecutive pages.
/// Detection produces a per-page set of line indices first; removal is
/// applied in a single pass at the end.
pub fn strip_headers(pages: &[String], cfg: &PipelineConfig) -> Vec<String> {
    if pages.len() < cfg.min_consecutive {
        return pages.to_vec();
    }

    let mut removals: Vec<HashSet<usize>> = vec![HashSet::new(); pages.len()];
    for edge in [Edge::Top, Edge::Bottom] {
        for offset in 0..cfg.probe_depth {
            collect_runs(pages, edge, offset, cfg.min_consecutive, &mut removals);
        }
    }

    pages
        .iter()
        .zip(&removals)
        .map(|(page, remove)| {
            page.split('\n')
                .enumerate()
                .filter(|(i, _)| !remove.contains(i))
                .map(|(_, line)| line)
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .collect()
}

/// Walk the page sequence once for a fixed (edge, offset) probe, tracking
/// the current run of pages sharing a normalized line value. Blank lines
/// and out-of-range offsets end the run without starting a new one.
fn collect_runs(
    pages: &[String],
    edge: Edge,
    offset: usize,
    min_consecutive: usize,
    removals: &mut [HashSet<usize>],
) {
    // (normalized value, index of the page the run started on)
    let mut run: Option<(String, usize)> = None;

    for (i, page) in pages.iter().enumerate() {
        let lines: Vec<&str> = page.split('\n').collect();
        let value = index_at(lines.len(), edge, offset)
            .map(|idx| normalize(lines[idx]))
            .filter(|v| !v.is_empty());

        let Some(value) = value else {
            if let Some((_, start)) = run.take() {
                flush_run(pages, edge, offset, start, i, min_consecutive, removals);
            }
            continue;
        };

        run = match run.take() {
            Some((current, start)) if current == value => Some((current, start)),
            Some((_, start)) => {
                flush_run(pages, edge, offset, start, i, min_consecutive, removals);
                Some((value, i))
            }
            None => Some((value, i)),
        };
    }

    if let Some((_, start)) = run {
        flush_run(pages, edge, offset, start, pages.len(), min_consecutive, removals);
    }
}

/// Mark the probed line for removal on every page of a closed run, if the
/// run spans enough pages. The line index is recomputed per page because
/// page lengths differ.
fn flush_run(
    pages: &[String],
    edge: Edge,
    offset: usize,
    start: usize,
    end: usize,
    min_consecutive: usize,
    removals: &mut [HashSet<usize>],
) {
    if end - start < min_consecutive {
        return;
    }
    for j in start..end {
        let line_count = pages[j].split('\n').count();
        if let Some(idx) = index_at(line_count, edge, offset) {
            removals[j].insert(idx);
        }
    }
}

fn index_at(line_count: usize, edge: Edge, offset: usize) -> Option<usize> {
    match edge {
        Edge::Top => (offset < line_count).then_some(offset),
        Edge::Bottom => line_count.checked_sub(1 + offset),
    }
}

/// Lowercase with internal whitespace collapsed, for run comparison.
fn normalize(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
