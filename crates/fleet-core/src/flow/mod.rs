//! Account-operation flows.
//!
//! Each flow is a fixed linear sequence of perception, action, and
//! verification steps driven against one device. Steps return an explicit
//! [`StepOutcome`] instead of signalling through errors: the sequencer
//! stops at the first terminal outcome, and any error a step does produce
//! is mapped at the step boundary so nothing escapes a worker thread.

mod password_reset;
mod security_login;

pub use password_reset::PasswordResetFlow;
pub use security_login::{SecurityAnswers, SecurityLoginFlow};

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::config::RunConfig;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::outcome::Classification;
use crate::vision::{CaptureOptions, Template};

/// Result of one step in a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step done, move on to the next.
    Continue,
    /// Positive terminal signal.
    Success,
    /// Confirmed negative terminal signal.
    Die,
    /// Perception failure; the identifier deserves a later pass.
    Retry,
}

impl StepOutcome {
    /// Terminal classification, if this outcome ends the flow.
    pub fn classification(self) -> Option<Classification> {
        match self {
            Self::Continue => None,
            Self::Success => Some(Classification::Success),
            Self::Die => Some(Classification::Die),
            Self::Retry => Some(Classification::Retry),
        }
    }
}

/// Map a step's error into a terminal outcome.
///
/// Exhausted capture and unreadable templates are perception problems and
/// classify as retry; anything else fails closed so the device's script
/// state is not left in limbo.
pub fn outcome_from_error(err: &Error) -> StepOutcome {
    match err {
        Error::CaptureUnavailable { .. } | Error::TemplateLoad { .. } => StepOutcome::Retry,
        _ => StepOutcome::Die,
    }
}

/// Collapse a fallible step into an outcome, logging the error path.
pub(crate) fn step(flow: &str, name: &str, result: Result<StepOutcome>) -> StepOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(flow, step = name, error = %e, "step failed");
            outcome_from_error(&e)
        }
    }
}

/// Per-identifier progress reporting hook.
pub type ProgressFn<'a> = dyn Fn(&str) + Send + Sync + 'a;

/// Shared knobs for flow execution.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    /// Directory holding the template images.
    pub template_dir: PathBuf,
    /// Template match acceptance threshold.
    pub match_threshold: f64,
    /// OCR language code.
    pub ocr_lang: String,
    /// UI settle delay between steps.
    pub settle: Duration,
    /// Timeout for result-polling steps.
    pub response_timeout: Duration,
    /// Timeout for element-locating steps.
    pub locate_timeout: Duration,
    /// Screenshot retry policy.
    pub capture: CaptureOptions,
}

impl FlowConfig {
    /// Build from a run configuration.
    pub fn from_run(config: &RunConfig) -> Self {
        Self {
            template_dir: config.template_dir.clone(),
            match_threshold: config.match_threshold,
            ocr_lang: config.ocr_lang.clone(),
            settle: Duration::from_millis(config.settle_ms),
            response_timeout: Duration::from_secs(config.response_timeout_secs),
            locate_timeout: Duration::from_secs(config.locate_timeout_secs),
            capture: config.capture,
        }
    }

    /// Load a template by file name from the template directory.
    pub fn template(&self, name: &str) -> Result<Template> {
        Template::load(self.template_dir.join(name))
    }

    /// Sleep out the inter-step settle delay.
    pub fn settle(&self) {
        std::thread::sleep(self.settle);
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self::from_run(&RunConfig::default())
    }
}

/// One account operation, runnable against any device.
///
/// Implementations must not panic or leak errors: every step error is
/// caught and classified so a failing identifier cannot take down its
/// worker's whole chunk.
pub trait AccountFlow: Send + Sync {
    /// Flow name for logs and progress lines.
    fn name(&self) -> &str;

    /// Drive the full step sequence for one identifier.
    fn run(
        &self,
        device: &mut dyn Device,
        identifier: &str,
        progress: &ProgressFn,
    ) -> Classification;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classifications() {
        assert_eq!(StepOutcome::Continue.classification(), None);
        assert_eq!(
            StepOutcome::Success.classification(),
            Some(Classification::Success)
        );
        assert_eq!(StepOutcome::Die.classification(), Some(Classification::Die));
        assert_eq!(
            StepOutcome::Retry.classification(),
            Some(Classification::Retry)
        );
    }

    #[test]
    fn test_capture_exhaustion_maps_to_retry() {
        let err = Error::CaptureUnavailable { attempts: 25 };
        assert_eq!(outcome_from_error(&err), StepOutcome::Retry);
    }

    #[test]
    fn test_unreadable_template_maps_to_retry() {
        let err = Error::TemplateLoad {
            path: "images/isi.png".into(),
        };
        assert_eq!(outcome_from_error(&err), StepOutcome::Retry);
    }

    #[test]
    fn test_device_errors_fail_closed() {
        let err = Error::DeviceAction("transport reset".into());
        assert_eq!(outcome_from_error(&err), StepOutcome::Die);
    }
}
