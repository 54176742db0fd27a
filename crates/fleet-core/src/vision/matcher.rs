//! Template matching over captured frames.
//!
//! Normalized cross-correlation on grayscale images, equivalent to OpenCV's
//! `TM_CCOEFF_NORMED`: both images are mean-subtracted per window, so the
//! score is invariant to uniform brightness shifts. Matching is exhaustive
//! and deterministic: identical pixels in, identical result out.

use std::time::{Duration, Instant};

use image::GrayImage;
use tracing::debug;

use crate::device::Device;
use crate::error::Result;
use crate::vision::capture::{self, CaptureOptions};
use crate::vision::frame::{Frame, Template};

/// Best template match within a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    /// X of the match center.
    pub x: i32,
    /// Y of the match center.
    pub y: i32,
    /// Correlation score in `[0, 1]`.
    pub confidence: f64,
}

/// Search for `template` inside `frame`.
///
/// Returns the single best-scoring location when its confidence reaches
/// `threshold` (inclusive), with coordinates at the template center.
pub fn match_template(frame: &Frame, template: &Template, threshold: f64) -> Option<MatchResult> {
    let best = best_match(&frame.to_gray(), template.gray())?;
    if best.confidence >= threshold {
        Some(best)
    } else {
        debug!(
            template = %template.path().display(),
            confidence = best.confidence,
            threshold,
            "best match below threshold"
        );
        None
    }
}

/// Repeatedly capture and match until the template appears or `timeout`
/// elapses.
pub fn wait_for_template(
    device: &mut dyn Device,
    template: &Template,
    threshold: f64,
    timeout: Duration,
    opts: &CaptureOptions,
) -> Result<Option<MatchResult>> {
    let deadline = Instant::now() + timeout;
    loop {
        let frame = capture::capture(device, opts)?;
        if let Some(found) = match_template(&frame, template, threshold) {
            return Ok(Some(found));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(opts.backoff());
    }
}

/// Exhaustive normalized cross-correlation; best placement only.
///
/// Window mean and variance come from integral images, and the needle is
/// zero-mean so the window-mean term of the cross product cancels. That
/// leaves a single pass over each window.
fn best_match(haystack: &GrayImage, needle: &GrayImage) -> Option<MatchResult> {
    let (fw, fh) = haystack.dimensions();
    let (tw, th) = needle.dimensions();
    if tw == 0 || th == 0 || tw > fw || th > fh {
        return None;
    }

    let n = (tw * th) as f64;
    let needle_px: Vec<f64> = needle.as_raw().iter().map(|&v| v as f64).collect();
    let needle_mean = needle_px.iter().sum::<f64>() / n;
    let needle_dev: Vec<f64> = needle_px.iter().map(|v| v - needle_mean).collect();
    let needle_norm_sq: f64 = needle_dev.iter().map(|v| v * v).sum();

    let raw = haystack.as_raw();
    let (w, h) = (fw as usize, fh as usize);
    let stride = w + 1;
    let mut sums = vec![0.0f64; stride * (h + 1)];
    let mut squares = vec![0.0f64; stride * (h + 1)];
    for y in 0..h {
        for x in 0..w {
            let v = raw[y * w + x] as f64;
            let i = (y + 1) * stride + x + 1;
            sums[i] = v + sums[i - 1] + sums[i - stride] - sums[i - stride - 1];
            squares[i] = v * v + squares[i - 1] + squares[i - stride] - squares[i - stride - 1];
        }
    }
    let window = |table: &[f64], ox: usize, oy: usize| {
        table[(oy + th as usize) * stride + ox + tw as usize]
            - table[oy * stride + ox + tw as usize]
            - table[(oy + th as usize) * stride + ox]
            + table[oy * stride + ox]
    };

    let mut best: Option<(u32, u32, f64)> = None;
    for oy in 0..=(fh - th) {
        for ox in 0..=(fw - tw) {
            let window_mean = window(&sums, ox as usize, oy as usize) / n;
            // Float error can push a flat window a hair negative.
            let window_norm_sq = (window(&squares, ox as usize, oy as usize)
                - n * window_mean * window_mean)
                .max(0.0);

            let mut cross = 0.0;
            for y in 0..th {
                for x in 0..tw {
                    cross += raw[(oy + y) as usize * w + (ox + x) as usize] as f64
                        * needle_dev[(y * tw + x) as usize];
                }
            }

            let denom = (window_norm_sq * needle_norm_sq).sqrt();
            if denom <= f64::EPSILON {
                continue;
            }
            let score = cross / denom;
            if best.map(|(_, _, s)| score > s).unwrap_or(true) {
                best = Some((ox, oy, score));
            }
        }
    }

    best.map(|(ox, oy, score)| MatchResult {
        x: ox as i32 + (tw / 2) as i32,
        y: oy as i32 + (th / 2) as i32,
        confidence: score.clamp(0.0, 1.0),
    })
}
