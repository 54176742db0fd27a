//! OCR text detection over captured frames.
//!
//! The recognition backend sits behind the [`OcrEngine`] trait; the shipped
//! implementation shells out to the `tesseract` binary. Keyword detection is
//! a case-insensitive substring search over the recognized text rather than
//! layout parsing, which tolerates the font and DPI variance between device
//! renders.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use image::GrayImage;
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::gaussian_blur_f32;
use tracing::debug;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::vision::capture::{self, CaptureOptions};
use crate::vision::frame::Frame;

/// One recognized word with its bounding box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Bounding box of located text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Recognition backend boundary.
pub trait OcrEngine: Send + Sync {
    /// Recognize all text in the image as one string.
    fn recognize(&self, image: &GrayImage, lang: &str) -> Result<String>;

    /// Recognize individual words with bounding boxes.
    fn recognize_words(&self, image: &GrayImage, lang: &str) -> Result<Vec<Word>>;
}

/// Prepare a frame for OCR: grayscale, light blur, Otsu binarization.
pub fn preprocess(frame: &Frame) -> GrayImage {
    let gray = frame.to_gray();
    let blurred = gaussian_blur_f32(&gray, 0.8);
    let level = otsu_level(&blurred);
    threshold(&blurred, level, ThresholdType::Binary)
}

/// Find the first keyword present in the frame's text.
///
/// Keywords are checked in the order given; the first listed keyword wins
/// even when several are present in the noisy OCR output, so callers encode
/// their branch priority in the list order. Matching is a case-insensitive
/// substring test.
pub fn find_keyword(
    engine: &dyn OcrEngine,
    frame: &Frame,
    keywords: &[&str],
    lang: &str,
) -> Result<Option<String>> {
    let text = engine.recognize(&preprocess(frame), lang)?;
    Ok(first_keyword_in(&text, keywords))
}

/// Poll the device with OCR until one of the keywords appears or `timeout`
/// elapses.
pub fn wait_for_keyword(
    device: &mut dyn Device,
    engine: &dyn OcrEngine,
    keywords: &[&str],
    lang: &str,
    timeout: Duration,
    opts: &CaptureOptions,
) -> Result<Option<String>> {
    let deadline = Instant::now() + timeout;
    loop {
        let frame = capture::capture(device, opts)?;
        if let Some(found) = find_keyword(engine, &frame, keywords, lang)? {
            return Ok(Some(found));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        std::thread::sleep(opts.backoff());
    }
}

/// Locate `needle` in the frame, returning the bounding box of the first
/// word containing it. Used by the standalone probe harness.
pub fn locate_text(
    engine: &dyn OcrEngine,
    frame: &Frame,
    needle: &str,
    lang: &str,
) -> Result<Option<TextBox>> {
    let words = engine.recognize_words(&preprocess(frame), lang)?;
    let needle = needle.to_lowercase();
    Ok(words
        .iter()
        .find(|w| w.text.to_lowercase().contains(&needle))
        .map(|w| TextBox {
            x: w.x,
            y: w.y,
            width: w.width,
            height: w.height,
        }))
}

fn first_keyword_in(text: &str, keywords: &[&str]) -> Option<String> {
    let haystack = text.to_lowercase();
    keywords
        .iter()
        .find(|k| haystack.contains(&k.to_lowercase()))
        .map(|k| k.to_string())
}

/// OCR engine backed by the `tesseract` command-line tool.
pub struct TesseractOcr {
    binary: PathBuf,
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
        }
    }
}

impl TesseractOcr {
    /// Use `tesseract` from `PATH`, verifying it is runnable.
    ///
    /// Misconfiguration is surfaced once, with remediation instructions; it
    /// is never retried.
    pub fn probe() -> Result<Self> {
        let engine = Self::default();
        match Command::new(&engine.binary).arg("--version").output() {
            Ok(out) if out.status.success() => Ok(engine),
            Ok(out) => Err(Error::OcrUnavailable(format!(
                "`tesseract --version` failed: {}\n{}",
                out.status,
                INSTALL_HINT
            ))),
            Err(e) => Err(Error::OcrUnavailable(format!(
                "could not run tesseract: {}\n{}",
                e, INSTALL_HINT
            ))),
        }
    }

    fn run(&self, image: &GrayImage, lang: &str, extra: &[&str]) -> Result<String> {
        let input = std::env::temp_dir().join(format!(
            "fleet_ocr_{}.png",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default()
        ));
        image.save(&input)?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg(&input)
            .arg("stdout")
            .args(["-l", lang, "--oem", "3", "--psm", "6"])
            .args(extra);
        let output = cmd
            .output()
            .map_err(|e| Error::OcrUnavailable(format!("could not run tesseract: {}", e)));
        let _ = std::fs::remove_file(&input);
        let output = output?;

        if !output.status.success() {
            return Err(Error::Other(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(bytes = output.stdout.len(), "tesseract output");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

const INSTALL_HINT: &str = "To use OCR detection, install Tesseract:\n\
  - Debian/Ubuntu: sudo apt-get install tesseract-ocr\n\
  - macOS: brew install tesseract\n\
  - Windows: https://github.com/UB-Mannheim/tesseract/wiki\n\
and make sure the binary is on PATH.";

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &GrayImage, lang: &str) -> Result<String> {
        self.run(image, lang, &[])
    }

    fn recognize_words(&self, image: &GrayImage, lang: &str) -> Result<Vec<Word>> {
        let tsv = self.run(image, lang, &["tsv"])?;
        Ok(parse_tsv_words(&tsv))
    }
}

/// Parse tesseract TSV output into words.
///
/// Columns: level page block par line word left top width height conf text.
fn parse_tsv_words(tsv: &str) -> Vec<Word> {
    tsv.lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split('\t').collect();
            if cols.len() < 12 {
                return None;
            }
            let text = cols[11].trim();
            if text.is_empty() {
                return None;
            }
            Some(Word {
                text: text.to_string(),
                x: cols[6].parse().ok()?,
                y: cols[7].parse().ok()?,
                width: cols[8].parse().ok()?,
                height: cols[9].parse().ok()?,
            })
        })
        .collect()
}
