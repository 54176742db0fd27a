//! Robust screenshot acquisition.
//!
//! A single `screencap` is unreliable on loaded devices: the transport can
//! hiccup, and a screen mid-render comes back all white. [`capture`] retries
//! with a fixed interval until it gets a usable frame or gives up. The
//! interval is deliberately fixed rather than exponential: device render
//! latency is roughly constant, so backing off further buys nothing.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::device::Device;
use crate::error::{Error, Result};
use crate::vision::frame::Frame;

/// Retry policy for screenshot capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// How many screenshots to attempt before giving up.
    pub max_attempts: u32,
    /// Fixed sleep between attempts, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            max_attempts: 25,
            backoff_ms: 500,
        }
    }
}

impl CaptureOptions {
    /// Policy with a different attempt budget.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Sleep between attempts.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

/// Capture one valid frame from the device.
///
/// Transport errors are logged and retried; blank frames (all white, still
/// rendering) are retried silently. After `max_attempts` failures this
/// returns [`Error::CaptureUnavailable`], which upstream classifies as a
/// retry rather than an account failure.
pub fn capture(device: &mut dyn Device, opts: &CaptureOptions) -> Result<Frame> {
    for attempt in 1..=opts.max_attempts {
        match device.screenshot() {
            Ok(image) => {
                let frame = Frame::new(image);
                if !frame.is_blank() {
                    return Ok(frame);
                }
            }
            Err(e) => {
                warn!(device = device.id(), attempt, error = %e, "screenshot failed");
            }
        }
        if attempt < opts.max_attempts {
            std::thread::sleep(opts.backoff());
        }
    }
    Err(Error::CaptureUnavailable {
        attempts: opts.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Locator;
    use image::{Rgb, RgbImage};

    /// Device whose screenshots are scripted up front.
    struct ScriptedDevice {
        shots: Vec<Result<RgbImage>>,
        taken: usize,
    }

    impl ScriptedDevice {
        fn new(shots: Vec<Result<RgbImage>>) -> Self {
            Self { shots, taken: 0 }
        }
    }

    impl Device for ScriptedDevice {
        fn id(&self) -> &str {
            "scripted"
        }

        fn screenshot(&mut self) -> Result<RgbImage> {
            let shot = self.shots.remove(0);
            self.taken += 1;
            shot
        }

        fn click(&mut self, _x: i32, _y: i32) -> Result<()> {
            Ok(())
        }

        fn send_keys(&mut self, _text: &str) -> Result<()> {
            Ok(())
        }

        fn clear_focused(&mut self) -> Result<bool> {
            Ok(true)
        }

        fn click_locator(&mut self, _locator: &Locator, _timeout: Duration) -> Result<bool> {
            Ok(false)
        }
    }

    fn white() -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]))
    }

    fn dark() -> RgbImage {
        RgbImage::from_pixel(4, 4, Rgb([40, 40, 40]))
    }

    fn fast() -> CaptureOptions {
        CaptureOptions {
            max_attempts: 3,
            backoff_ms: 0,
        }
    }

    #[test]
    fn test_first_valid_frame_wins() {
        let mut device = ScriptedDevice::new(vec![Ok(dark())]);
        let frame = capture(&mut device, &fast()).unwrap();
        assert!(!frame.is_blank());
        assert_eq!(device.taken, 1);
    }

    #[test]
    fn test_white_frames_are_retried() {
        let mut device = ScriptedDevice::new(vec![Ok(white()), Ok(white()), Ok(dark())]);
        let frame = capture(&mut device, &fast()).unwrap();
        assert!(!frame.is_blank());
        assert_eq!(device.taken, 3);
    }

    #[test]
    fn test_transport_errors_are_retried() {
        let mut device = ScriptedDevice::new(vec![
            Err(Error::DeviceAction("transport reset".into())),
            Ok(dark()),
        ]);
        assert!(capture(&mut device, &fast()).is_ok());
    }

    #[test]
    fn test_exhausted_attempts_report_unavailable() {
        let mut device = ScriptedDevice::new(vec![Ok(white()), Ok(white()), Ok(white())]);
        let err = capture(&mut device, &fast()).unwrap_err();
        assert!(matches!(err, Error::CaptureUnavailable { attempts: 3 }));
        assert_eq!(device.taken, 3);
    }
}
