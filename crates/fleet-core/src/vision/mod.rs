//! Screen perception: capture, template matching, OCR.

pub mod capture;
pub mod frame;
pub mod matcher;
pub mod ocr;

pub use capture::{capture, CaptureOptions};
pub use frame::{Frame, Template, BLANK_MEAN_THRESHOLD};
pub use matcher::{match_template, wait_for_template, MatchResult};
pub use ocr::{
    find_keyword, locate_text, preprocess, wait_for_keyword, OcrEngine, TesseractOcr, TextBox,
    Word,
};
