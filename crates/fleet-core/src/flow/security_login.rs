//! Security-question login flow.
//!
//! Enters the identifier, reads the first response screen with OCR, and if
//! the account asks its security questions, fills in the two configured
//! answers and reads the final verdict. Keyword checks run in a fixed
//! priority order: the first listed keyword decides the branch even when
//! noisy OCR output superficially contains several of them.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::device::Device;
use crate::error::Result;
use crate::flow::{step, AccountFlow, FlowConfig, ProgressFn, StepOutcome};
use crate::outcome::Classification;
use crate::vision::{capture, find_keyword, match_template, wait_for_keyword, OcrEngine};

const INPUT_TEMPLATE: &str = "isi.png";
const SECURITY_TEMPLATE: &str = "security.png";
const DISMISS_TEMPLATE: &str = "silang.png";

// Keyword meaning the account proceeds to its security questions.
const PROMPT_KEYWORD: &str = "Anda";
// Initial-response branches, checked in this order.
const INITIAL_KEYWORDS: [&str; 2] = ["sandi", "SUKSES"];
// Final-verdict branches, checked in this order.
const FINAL_KEYWORDS: [&str; 2] = ["SUKSES", "Salah"];

const INPUT_OFFSET: (i32, i32) = (150, 100);
const SUBMIT_BUTTON: (i32, i32) = (600, 450);
const ACK_BUTTON: (i32, i32) = (600, 440);
const ANSWER1_OFFSET: (i32, i32) = (300, 55);
const ANSWER2_OFFSET: (i32, i32) = (300, 180);
const FINAL_SUBMIT_BUTTON: (i32, i32) = (600, 500);

/// The two security-question answers tried for every identifier.
#[derive(Debug, Clone)]
pub struct SecurityAnswers {
    pub first: String,
    pub second: String,
}

impl SecurityAnswers {
    pub fn new(first: impl Into<String>, second: impl Into<String>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }
}

/// Login attempt through the security-question dialog.
pub struct SecurityLoginFlow {
    config: FlowConfig,
    ocr: Arc<dyn OcrEngine>,
    answers: SecurityAnswers,
}

impl SecurityLoginFlow {
    pub fn new(config: FlowConfig, ocr: Arc<dyn OcrEngine>, answers: SecurityAnswers) -> Self {
        Self {
            config,
            ocr,
            answers,
        }
    }

    fn locate_input(&self, device: &mut dyn Device) -> Result<StepOutcome> {
        let template = self.config.template(INPUT_TEMPLATE)?;
        let frame = capture(device, &self.config.capture)?;
        match match_template(&frame, &template, self.config.match_threshold) {
            Some(m) => {
                device.click(m.x + INPUT_OFFSET.0, m.y + INPUT_OFFSET.1)?;
                Ok(StepOutcome::Continue)
            }
            None => Ok(StepOutcome::Retry),
        }
    }

    fn clear_field(&self, device: &mut dyn Device) -> Result<StepOutcome> {
        if device.clear_focused()? {
            Ok(StepOutcome::Continue)
        } else {
            Ok(StepOutcome::Die)
        }
    }

    /// Poll the first response screen.
    ///
    /// `Continue` means the security-question prompt appeared. A password
    /// reset demand or a direct success are terminal. Timing out without
    /// any recognizable keyword counts as a confirmed failure: the account
    /// responded, just not with anything this flow can work with.
    fn await_initial(&self, device: &mut dyn Device) -> Result<StepOutcome> {
        let deadline = Instant::now() + self.config.response_timeout;
        loop {
            let frame = capture(device, &self.config.capture)?;
            if find_keyword(self.ocr.as_ref(), &frame, &[PROMPT_KEYWORD], &self.config.ocr_lang)?
                .is_some()
            {
                device.click(ACK_BUTTON.0, ACK_BUTTON.1)?;
                self.config.settle();
                return Ok(StepOutcome::Continue);
            }

            match find_keyword(self.ocr.as_ref(), &frame, &INITIAL_KEYWORDS, &self.config.ocr_lang)?
                .as_deref()
            {
                Some("sandi") => {
                    device.click(ACK_BUTTON.0, ACK_BUTTON.1)?;
                    self.config.settle();
                    return Ok(StepOutcome::Die);
                }
                Some("SUKSES") => {
                    device.click(ACK_BUTTON.0, ACK_BUTTON.1)?;
                    return Ok(StepOutcome::Success);
                }
                _ => {}
            }

            if Instant::now() >= deadline {
                return Ok(StepOutcome::Die);
            }
            std::thread::sleep(self.config.capture.backoff());
        }
    }

    /// Locate the security prompt and answer both questions.
    fn answer_questions(&self, device: &mut dyn Device) -> Result<StepOutcome> {
        std::thread::sleep(self.config.settle * 2);
        let template = self.config.template(SECURITY_TEMPLATE)?;
        let frame = capture(device, &self.config.capture)?;
        let anchor = match match_template(&frame, &template, self.config.match_threshold) {
            Some(m) => m,
            None => return Ok(StepOutcome::Retry),
        };

        device.click(anchor.x + ANSWER1_OFFSET.0, anchor.y + ANSWER1_OFFSET.1)?;
        device.send_keys(&self.answers.first)?;
        self.config.settle();

        std::thread::sleep(self.config.settle * 2);
        device.click(anchor.x + ANSWER2_OFFSET.0, anchor.y + ANSWER2_OFFSET.1)?;
        self.config.settle();
        device.send_keys(&self.answers.second)?;
        self.config.settle();

        device.click(FINAL_SUBMIT_BUTTON.0, FINAL_SUBMIT_BUTTON.1)?;
        std::thread::sleep(self.config.settle * 2);
        Ok(StepOutcome::Continue)
    }

    /// Poll for the final verdict.
    fn await_final(&self, device: &mut dyn Device) -> Result<StepOutcome> {
        let found = wait_for_keyword(
            device,
            self.ocr.as_ref(),
            &FINAL_KEYWORDS,
            &self.config.ocr_lang,
            self.config.response_timeout,
            &self.config.capture,
        )?;
        let Some(found) = found else {
            return Ok(StepOutcome::Die);
        };

        if found.eq_ignore_ascii_case("salah") {
            device.click(ACK_BUTTON.0, ACK_BUTTON.1)?;
            self.config.settle();
            self.dismiss_dialog(device)?;
            return Ok(StepOutcome::Die);
        }
        device.click(ACK_BUTTON.0, ACK_BUTTON.1)?;
        Ok(StepOutcome::Success)
    }

    /// Close the wrong-answer dialog via its close-button template.
    fn dismiss_dialog(&self, device: &mut dyn Device) -> Result<()> {
        let template = self.config.template(DISMISS_TEMPLATE)?;
        let frame = capture(device, &self.config.capture)?;
        if let Some(m) = match_template(&frame, &template, self.config.match_threshold) {
            device.click(m.x, m.y)?;
        }
        Ok(())
    }
}

impl AccountFlow for SecurityLoginFlow {
    fn name(&self) -> &str {
        "security-login"
    }

    fn run(
        &self,
        device: &mut dyn Device,
        identifier: &str,
        progress: &ProgressFn,
    ) -> Classification {
        progress("Locating input field");
        let outcome = step(self.name(), "locate-input", self.locate_input(device));
        if let Some(class) = outcome.classification() {
            return class;
        }
        self.config.settle();

        progress("Clearing field");
        let outcome = step(self.name(), "clear-field", self.clear_field(device));
        if let Some(class) = outcome.classification() {
            return class;
        }
        self.config.settle();

        progress("Entering identifier");
        let outcome = step(self.name(), "enter-identifier", {
            device.send_keys(identifier).map(|_| StepOutcome::Continue)
        });
        if let Some(class) = outcome.classification() {
            return class;
        }
        self.config.settle();

        progress("Submitting");
        let outcome = step(self.name(), "submit", {
            device
                .click(SUBMIT_BUTTON.0, SUBMIT_BUTTON.1)
                .map(|_| StepOutcome::Continue)
        });
        if let Some(class) = outcome.classification() {
            return class;
        }
        std::thread::sleep(self.config.settle * 2);

        progress("Checking initial response");
        let outcome = step(self.name(), "await-initial", self.await_initial(device));
        if let Some(class) = outcome.classification() {
            info!(identifier, %class, "resolved on initial response");
            return class;
        }

        progress("Answering security questions");
        let outcome = step(self.name(), "answer-questions", self.answer_questions(device));
        if let Some(class) = outcome.classification() {
            return class;
        }

        progress("Waiting for verdict");
        let outcome = step(self.name(), "await-final", self.await_final(device));
        let class = outcome.classification().unwrap_or(Classification::Die);
        info!(identifier, %class, "security login finished");
        class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{frame_with_patch, write_template, MockDevice, MockOcr};
    use crate::vision::CaptureOptions;
    use std::time::Duration;

    const INPUT: u8 = 1;
    const SECURITY: u8 = 2;
    const DISMISS: u8 = 3;

    fn test_flow(dir: &std::path::Path, ocr: MockOcr) -> SecurityLoginFlow {
        write_template(dir, INPUT_TEMPLATE, INPUT);
        write_template(dir, SECURITY_TEMPLATE, SECURITY);
        write_template(dir, DISMISS_TEMPLATE, DISMISS);
        SecurityLoginFlow::new(
            FlowConfig {
                template_dir: dir.to_path_buf(),
                settle: Duration::from_millis(0),
                locate_timeout: Duration::from_millis(50),
                response_timeout: Duration::from_millis(100),
                capture: CaptureOptions {
                    max_attempts: 2,
                    backoff_ms: 0,
                },
                ..FlowConfig::default()
            },
            Arc::new(ocr),
            SecurityAnswers::new("naruto", "bakso"),
        )
    }

    fn no_progress() -> Box<ProgressFn<'static>> {
        Box::new(|_status: &str| {})
    }

    #[test]
    fn test_direct_success_on_initial_response() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(dir.path(), MockOcr::with_texts(&["login SUKSES"]));
        let mut device = MockDevice::new("dev", vec![frame_with_patch(INPUT, 10, 10)]);
        assert_eq!(
            flow.run(&mut device, "100001", &no_progress()),
            Classification::Success
        );
        assert_eq!(device.keys, vec!["100001"]);
    }

    #[test]
    fn test_password_reset_demand_classifies_die() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(dir.path(), MockOcr::with_texts(&["ganti kata sandi dulu"]));
        let mut device = MockDevice::new("dev", vec![frame_with_patch(INPUT, 10, 10)]);
        assert_eq!(flow.run(&mut device, "x", &no_progress()), Classification::Die);
    }

    #[test]
    fn test_full_security_branch_success() {
        let dir = tempfile::tempdir().unwrap();
        // Initial poll sees the prompt; the final poll sees the verdict.
        // One OCR pass runs per find_keyword call: prompt check hits on the
        // first call, then the verdict polls return SUKSES.
        let flow = test_flow(
            dir.path(),
            MockOcr::with_texts(&["pertanyaan Anda", "SUKSES"]),
        );
        let mut device = MockDevice::new(
            "dev",
            vec![
                frame_with_patch(INPUT, 10, 10),
                frame_with_patch(SECURITY, 20, 20),
            ],
        );
        assert_eq!(
            flow.run(&mut device, "x", &no_progress()),
            Classification::Success
        );
        assert!(device.keys.contains(&"naruto".to_string()));
        assert!(device.keys.contains(&"bakso".to_string()));
        assert!(device.clicks.contains(&FINAL_SUBMIT_BUTTON));
    }

    #[test]
    fn test_priority_order_sukses_beats_salah() {
        let dir = tempfile::tempdir().unwrap();
        // Noisy verdict text contains both keywords; the first listed one
        // (SUKSES) must win.
        let flow = test_flow(
            dir.path(),
            MockOcr::with_texts(&["pertanyaan Anda", "SUKSES walau Salah tertulis"]),
        );
        let mut device = MockDevice::new(
            "dev",
            vec![
                frame_with_patch(INPUT, 10, 10),
                frame_with_patch(SECURITY, 20, 20),
            ],
        );
        assert_eq!(
            flow.run(&mut device, "x", &no_progress()),
            Classification::Success
        );
    }

    #[test]
    fn test_wrong_answer_classifies_die() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(
            dir.path(),
            MockOcr::with_texts(&["pertanyaan Anda", "jawaban Salah"]),
        );
        // One frame per capture: locate-input, initial poll, security
        // prompt, verdict poll, then the dismiss dialog.
        let mut device = MockDevice::new(
            "dev",
            vec![
                frame_with_patch(INPUT, 10, 10),
                crate::testing::dark_frame(),
                frame_with_patch(SECURITY, 20, 20),
                crate::testing::dark_frame(),
                frame_with_patch(DISMISS, 30, 30),
            ],
        );
        assert_eq!(flow.run(&mut device, "x", &no_progress()), Classification::Die);
        // Dismiss tap lands on the close button's center.
        assert!(device.clicks.contains(&(34, 34)));
    }

    #[test]
    fn test_initial_timeout_classifies_die() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(dir.path(), MockOcr::with_texts(&["nothing useful"]));
        let mut device = MockDevice::new("dev", vec![frame_with_patch(INPUT, 10, 10)]);
        assert_eq!(flow.run(&mut device, "x", &no_progress()), Classification::Die);
    }

    #[test]
    fn test_missing_input_classifies_retry() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(dir.path(), MockOcr::with_texts(&[]));
        let mut device = MockDevice::new("dev", vec![crate::testing::dark_frame()]);
        assert_eq!(
            flow.run(&mut device, "x", &no_progress()),
            Classification::Retry
        );
    }
}
