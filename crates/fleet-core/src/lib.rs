//! # fleet-core
//!
//! Core library for running bulk account operations against a mobile game
//! client on a fleet of connected Android devices.
//!
//! The engine is a perception-and-control loop: screenshots are captured
//! with validity checks and bounded retries, screens are understood through
//! template matching and OCR keyword search, and account flows drive
//! click/type actions as fixed step sequences with explicit terminal
//! outcomes. A device-pool scheduler fans the work list out across all
//! connected devices with per-device serialization and records every
//! identifier into success/die/retry lists.
//!
//! ## Modules
//!
//! - [`config`] - Run configuration and identifier list loading
//! - [`device`] - Device driver boundary and the adb implementation
//! - [`error`] - Error types and Result alias
//! - [`flow`] - Account-operation step sequences
//! - [`outcome`] - Append-only outcome classification store
//! - [`rewrite`] - HTML form-field rewriting for the interception proxy
//! - [`scheduler`] - Balanced chunking and the device-pool scheduler
//! - [`vision`] - Screen capture, template matching, OCR

pub mod config;
pub mod device;
pub mod error;
pub mod flow;
pub mod outcome;
pub mod rewrite;
pub mod scheduler;
pub mod vision;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for convenience

// Error types
pub use error::{Error, Result};

// Configuration
pub use config::{read_identifiers, RunConfig};

// Device boundary
pub use device::{AdbDevice, AdbDriver, Device, DeviceDriver, Locator};

// Vision
pub use vision::{
    capture, find_keyword, locate_text, match_template, wait_for_keyword, wait_for_template,
    CaptureOptions, Frame, MatchResult, OcrEngine, Template, TesseractOcr, TextBox,
};

// Flows
pub use flow::{
    AccountFlow, FlowConfig, PasswordResetFlow, SecurityAnswers, SecurityLoginFlow, StepOutcome,
};

// Outcome store
pub use outcome::{Classification, OutcomeSink, OutcomeSummary};

// Scheduler
pub use scheduler::{
    split_balanced, worker_count, DevicePool, ProgressCallback, ProgressUpdate, RunReport,
    Scheduler,
};

// Proxy rewriting
pub use rewrite::{HtmlRewriter, RewriteConfig};
