//! Device driver boundary.
//!
//! The automation core never talks to `adb` (or any other transport)
//! directly. It goes through the [`DeviceDriver`] and [`Device`] traits so
//! that flows and the scheduler can be exercised against scripted fakes in
//! tests. The shipped implementation is [`adb::AdbDriver`].

mod adb;

pub use adb::{AdbDevice, AdbDriver};

use std::time::Duration;

use image::RgbImage;

use crate::error::Result;

/// Element locator for driver-level lookups.
///
/// Raw coordinate taps cover most steps; a couple of in-app buttons are only
/// reachable through the UI hierarchy, so drivers that can resolve locators
/// should do so and the rest may report the lookup as unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// XPath into the UI hierarchy.
    Xpath(String),
    /// Android resource id, e.g. `com.example.app:id/btnForward`.
    ResourceId(String),
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Xpath(s) => write!(f, "xpath:{}", s),
            Self::ResourceId(s) => write!(f, "id:{}", s),
        }
    }
}

/// Enumerates and connects physical devices.
pub trait DeviceDriver {
    /// List the ids of all connected devices.
    fn list_devices(&self) -> Result<Vec<String>>;

    /// Connect to a device by id.
    fn connect(&self, id: &str) -> Result<Box<dyn Device>>;
}

/// A handle to one connected device.
///
/// Handles are owned by exactly one worker at a time (enforced by the
/// scheduler's device pool) and are therefore `&mut self` throughout.
pub trait Device: Send {
    /// Identifier this handle was connected with.
    fn id(&self) -> &str;

    /// Capture one raw screenshot. May return transient transport errors;
    /// validity checking and retries live in [`crate::vision::capture`].
    fn screenshot(&mut self) -> Result<RgbImage>;

    /// Tap at absolute screen coordinates.
    fn click(&mut self, x: i32, y: i32) -> Result<()>;

    /// Type text into the currently focused field.
    fn send_keys(&mut self, text: &str) -> Result<()>;

    /// Clear the currently focused text field.
    ///
    /// Returns `Ok(false)` when no field has focus.
    fn clear_focused(&mut self) -> Result<bool>;

    /// Tap an element found by locator, waiting up to `timeout` for it to
    /// appear. Returns `Ok(false)` when the element never showed up or the
    /// driver cannot resolve locators; flows treat these taps as
    /// best-effort.
    fn click_locator(&mut self, locator: &Locator, timeout: Duration) -> Result<bool>;
}
