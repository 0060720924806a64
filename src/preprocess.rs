use std::path::Path;

use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use tempfile::NamedTempFile;

/// Binarize a scan before OCR: grayscale, then black/white at an Otsu
/// threshold computed from the histogram. Returns the temporary PNG; the
/// file is removed when the handle drops.
pub fn binarize(image_path: &Path) -> Result<NamedTempFile> {
    let img = image::open(image_path)
        .with_context(|| format!("Failed to open {}", image_path.display()))?;
    let gray = img.into_luma8();

    let mut histogram = [0u32; 256];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    let total = gray.width() as u64 * gray.height() as u64;
    let threshold = otsu_threshold(&histogram, total);

    let binary = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let value = gray.get_pixel(x, y).0[0];
        Luma([if value > threshold { 255 } else { 0 }])
    });

    let tmp = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .context("Failed to create temp image")?;
    binary
        .save_with_format(tmp.path(), image::ImageFormat::Png)
        .with_context(|| format!("Failed to write binarized copy of {}", image_path.display()))?;
    Ok(tmp)
}

/// Otsu's method: the threshold maximizing between-class variance of the
/// grayscale histogram.
fn otsu_threshold(histogram: &[u32; 256], total: u64) -> u8 {
    let sum_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut sum_bg = 0.0;
    let mut weight_bg = 0u64;
    let mut max_variance = 0.0;
    let mut best = 0u8;

    for t in 0..256usize {
        weight_bg += histogram[t] as u64;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }

        sum_bg += t as f64 * histogram[t] as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_total - sum_bg) / weight_fg as f64;

        let variance = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if variance > max_variance {
            max_variance = variance;
            best = t as u8;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otsu_separates_bimodal_histogram() {
        let mut histogram = [0u32; 256];
        histogram[20] = 1000;
        histogram[230] = 1000;
        let threshold = otsu_threshold(&histogram, 2000);
        assert!(threshold >= 20 && threshold < 230);
    }

    #[test]
    fn otsu_uniform_image_is_harmless() {
        let mut histogram = [0u32; 256];
        histogram[128] = 5000;
        // Single-valued histogram: any threshold is fine, must not panic.
        let _ = otsu_threshold(&histogram, 5000);
    }

    #[test]
    fn binarize_produces_black_and_white_png() {
        let mut img = GrayImage::new(8, 8);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = Luma([if x < 4 { 30 } else { 220 }]);
        }
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan_1.png");
        img.save(&input).unwrap();

        let tmp = binarize(&input).unwrap();
        let result = image::open(tmp.path()).unwrap().into_luma8();
        let values: std::collections::HashSet<u8> =
            result.pixels().map(|p| p.0[0]).collect();
        assert!(values.iter().all(|v| *v == 0 || *v == 255));
        assert!(values.contains(&0));
        assert!(values.contains(&255));
    }
}
