//! Frame and template types.
//!
//! A [`Frame`] is one captured screen bitmap; a [`Template`] is a reference
//! bitmap searched for inside frames. Both are converted to single-channel
//! intensity before matching, which keeps matching robust against minor
//! color and brightness drift between device renders.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{GrayImage, RgbImage};

use crate::error::{Error, Result};

/// Mean intensity at or above which a frame counts as blank.
///
/// Devices render an all-white surface while a screen is still loading;
/// those captures carry no information and are rejected.
pub const BLANK_MEAN_THRESHOLD: f64 = 250.0;

/// One captured screen bitmap.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    captured_at: DateTime<Utc>,
}

impl Frame {
    /// Wrap a raw capture.
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// When this frame was captured.
    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Borrow the underlying bitmap.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Mean pixel intensity across all channels, in `[0, 255]`.
    ///
    /// Returns 255 for a zero-sized image so that empty captures are
    /// rejected by the same blank check.
    pub fn mean_intensity(&self) -> f64 {
        let pixels = self.image.as_raw();
        if pixels.is_empty() {
            return 255.0;
        }
        let sum: u64 = pixels.iter().map(|&v| v as u64).sum();
        sum as f64 / pixels.len() as f64
    }

    /// Whether this frame is unusable: zero-sized, or still rendering
    /// (mean intensity at or above [`BLANK_MEAN_THRESHOLD`]).
    pub fn is_blank(&self) -> bool {
        self.width() == 0 || self.height() == 0 || self.mean_intensity() >= BLANK_MEAN_THRESHOLD
    }

    /// Single-channel intensity version of this frame.
    pub fn to_gray(&self) -> GrayImage {
        image::imageops::grayscale(&self.image)
    }
}

/// A named reference bitmap used as a matching target.
///
/// The grayscale conversion is done once at load time; match calls reuse it.
#[derive(Debug, Clone)]
pub struct Template {
    path: PathBuf,
    gray: GrayImage,
}

impl Template {
    /// Load a template from disk.
    ///
    /// Fails with [`Error::TemplateLoad`] when the file is missing or not a
    /// readable image.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path).map_err(|_| Error::TemplateLoad {
            path: path.to_path_buf(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            gray: img.to_luma8(),
        })
    }

    /// Build a template from an in-memory grayscale image.
    pub fn from_gray(name: impl Into<PathBuf>, gray: GrayImage) -> Self {
        Self {
            path: name.into(),
            gray,
        }
    }

    /// Path (or name) this template was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Template width in pixels.
    pub fn width(&self) -> u32 {
        self.gray.width()
    }

    /// Template height in pixels.
    pub fn height(&self) -> u32 {
        self.gray.height()
    }

    /// Borrow the grayscale pixels.
    pub fn gray(&self) -> &GrayImage {
        &self.gray
    }
}
