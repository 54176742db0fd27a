//! Error types for fleet-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for fleet operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("No valid screenshot after {attempts} attempts")]
    CaptureUnavailable { attempts: u32 },

    #[error("Failed to load template image: {path}")]
    TemplateLoad { path: PathBuf },

    #[error("Device action failed: {0}")]
    DeviceAction(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for fleet operations
pub type Result<T> = std::result::Result<T, Error>;
