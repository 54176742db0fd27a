//! Password-reset flow.
//!
//! Locates the account-id input via template match, enters the identifier,
//! submits the reset request, and polls the screen for the success or
//! failure banner. Verification here is purely visual; no OCR is involved.

use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::device::{Device, Locator};
use crate::error::Result;
use crate::flow::{step, AccountFlow, FlowConfig, ProgressFn, StepOutcome};
use crate::outcome::Classification;
use crate::vision::{capture, match_template, wait_for_template};

const INPUT_TEMPLATE: &str = "isi1.png";
const SUCCESS_TEMPLATE: &str = "sukses.png";
const FAILURE_TEMPLATE: &str = "gagal.png";

// Tap offsets relative to the matched input-field marker.
const INPUT_OFFSET: (i32, i32) = (-250, 40);
// Fixed-position "forgot password" button.
const FORGOT_BUTTON: (i32, i32) = (850, 350);

/// Bulk password reset against the in-app web form.
pub struct PasswordResetFlow {
    config: FlowConfig,
    confirm_button: Locator,
    forward_button: Locator,
}

impl PasswordResetFlow {
    pub fn new(config: FlowConfig) -> Self {
        Self {
            config,
            confirm_button: Locator::Xpath(
                "//android.webkit.WebView/android.view.View/android.view.View[10]/android.widget.Button"
                    .to_string(),
            ),
            forward_button: Locator::ResourceId("id/btnForward".to_string()),
        }
    }

    /// Override the in-page confirm button locator.
    pub fn with_confirm_button(mut self, locator: Locator) -> Self {
        self.confirm_button = locator;
        self
    }

    /// Override the navigation-forward button locator.
    pub fn with_forward_button(mut self, locator: Locator) -> Self {
        self.forward_button = locator;
        self
    }

    fn locate_input(&self, device: &mut dyn Device) -> Result<StepOutcome> {
        let template = self.config.template(INPUT_TEMPLATE)?;
        let found = wait_for_template(
            device,
            &template,
            self.config.match_threshold,
            self.config.locate_timeout,
            &self.config.capture,
        )?;
        match found {
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

    fn enter_identifier(&self, device: &mut dyn Device, identifier: &str) -> Result<StepOutcome> {
        device.send_keys(identifier)?;
        Ok(StepOutcome::Continue)
    }

    fn submit(&self, device: &mut dyn Device) -> Result<StepOutcome> {
        device.click(FORGOT_BUTTON.0, FORGOT_BUTTON.1)?;
        std::thread::sleep(self.config.settle * 2);

        // The web view's confirm button is only reachable by locator and is
        // not always present.
        match device.click_locator(&self.confirm_button, Duration::from_secs(5)) {
            Ok(_) => {}
            Err(e) => warn!(error = %e, "confirm button tap failed"),
        }
        Ok(StepOutcome::Continue)
    }

    /// Poll for the success or failure banner until the response timeout.
    fn await_result(&self, device: &mut dyn Device) -> Result<StepOutcome> {
        let success = self.config.template(SUCCESS_TEMPLATE)?;
        let failure = self.config.template(FAILURE_TEMPLATE)?;

        let deadline = Instant::now() + self.config.response_timeout;
        loop {
            let frame = capture(device, &self.config.capture)?;
            if match_template(&frame, &success, self.config.match_threshold).is_some() {
                return Ok(StepOutcome::Success);
            }
            if match_template(&frame, &failure, self.config.match_threshold).is_some() {
                return Ok(StepOutcome::Die);
            }
            if Instant::now() >= deadline {
                // No banner at all: the screen never settled, try again in
                // a later pass.
                return Ok(StepOutcome::Retry);
            }
            std::thread::sleep(self.config.capture.backoff());
        }
    }

    fn return_to_entry(&self, device: &mut dyn Device) {
        if let Err(e) = device.click_locator(&self.forward_button, Duration::from_secs(5)) {
            warn!(error = %e, "forward button tap failed");
        }
        self.config.settle();
    }
}

impl AccountFlow for PasswordResetFlow {
    fn name(&self) -> &str {
        "password-reset"
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

        progress("Clearing field");
        let outcome = step(self.name(), "clear-field", self.clear_field(device));
        if let Some(class) = outcome.classification() {
            return class;
        }
        self.config.settle();

        progress("Entering identifier");
        let outcome = step(
            self.name(),
            "enter-identifier",
            self.enter_identifier(device, identifier),
        );
        if let Some(class) = outcome.classification() {
            return class;
        }
        self.config.settle();

        progress("Submitting");
        let outcome = step(self.name(), "submit", self.submit(device));
        if let Some(class) = outcome.classification() {
            return class;
        }
        self.config.settle();

        progress("Waiting for result");
        let outcome = step(self.name(), "await-result", self.await_result(device));
        let class = outcome.classification().unwrap_or(Classification::Die);
        info!(identifier, %class, "password reset finished");

        progress("Returning to entry screen");
        self.return_to_entry(device);
        class
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{dark_frame, frame_with_patch, write_template, MockDevice};
    use crate::vision::CaptureOptions;

    const INPUT: u8 = 1;
    const SUCCESS: u8 = 2;
    const FAILURE: u8 = 3;

    fn test_flow(dir: &std::path::Path) -> PasswordResetFlow {
        write_template(dir, INPUT_TEMPLATE, INPUT);
        write_template(dir, SUCCESS_TEMPLATE, SUCCESS);
        write_template(dir, FAILURE_TEMPLATE, FAILURE);
        PasswordResetFlow::new(FlowConfig {
            template_dir: dir.to_path_buf(),
            settle: Duration::from_millis(0),
            locate_timeout: Duration::from_millis(50),
            response_timeout: Duration::from_millis(200),
            capture: CaptureOptions {
                max_attempts: 2,
                backoff_ms: 0,
            },
            ..FlowConfig::default()
        })
    }

    fn no_progress() -> Box<ProgressFn<'static>> {
        Box::new(|_status: &str| {})
    }

    #[test]
    fn test_success_banner_classifies_success() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(dir.path());
        let mut device = MockDevice::new(
            "dev",
            vec![
                frame_with_patch(INPUT, 30, 20),
                frame_with_patch(SUCCESS, 10, 40),
            ],
        );

        let class = flow.run(&mut device, "100001", &no_progress());
        assert_eq!(class, Classification::Success);
        // Input tap at the offset from the matched marker center (34, 24),
        // then the fixed forgot-button tap.
        assert_eq!(device.clicks[0], (34 - 250, 24 + 40));
        assert_eq!(device.clicks[1], FORGOT_BUTTON);
        assert_eq!(device.keys, vec!["100001"]);
        assert_eq!(device.locator_clicks.len(), 2);
    }

    #[test]
    fn test_failure_banner_classifies_die() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(dir.path());
        let mut device = MockDevice::new(
            "dev",
            vec![
                frame_with_patch(INPUT, 30, 20),
                frame_with_patch(FAILURE, 10, 40),
            ],
        );
        assert_eq!(flow.run(&mut device, "x", &no_progress()), Classification::Die);
    }

    #[test]
    fn test_missing_input_field_classifies_retry() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(dir.path());
        let mut device = MockDevice::new("dev", vec![dark_frame()]);
        assert_eq!(
            flow.run(&mut device, "x", &no_progress()),
            Classification::Retry
        );
        assert!(device.clicks.is_empty());
    }

    #[test]
    fn test_no_banner_times_out_to_retry() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(dir.path());
        let mut device = MockDevice::new("dev", vec![frame_with_patch(INPUT, 30, 20), dark_frame()]);
        assert_eq!(
            flow.run(&mut device, "x", &no_progress()),
            Classification::Retry
        );
    }

    #[test]
    fn test_unfocused_field_classifies_die() {
        let dir = tempfile::tempdir().unwrap();
        let flow = test_flow(dir.path());
        let mut device = MockDevice::new("dev", vec![frame_with_patch(INPUT, 30, 20)]);
        device.focused = false;
        assert_eq!(flow.run(&mut device, "x", &no_progress()), Classification::Die);
    }

    #[test]
    fn test_missing_templates_classify_retry() {
        let dir = tempfile::tempdir().unwrap();
        // No templates written at all.
        let flow = PasswordResetFlow::new(FlowConfig {
            template_dir: dir.path().to_path_buf(),
            settle: Duration::from_millis(0),
            capture: CaptureOptions {
                max_attempts: 1,
                backoff_ms: 0,
            },
            ..FlowConfig::default()
        });
        let mut device = MockDevice::new("dev", vec![dark_frame()]);
        assert_eq!(
            flow.run(&mut device, "x", &no_progress()),
            Classification::Retry
        );
    }
}
