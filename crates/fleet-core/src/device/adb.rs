//! adb-backed device driver.
//!
//! Talks to devices through the `adb` binary: `exec-out screencap -p` for
//! frames, `input tap`/`input text` for actions, and a `uiautomator dump`
//! for resource-id lookups. Every call shells out, so all methods are
//! blocking; the scheduler runs each device on its own worker thread.

use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use image::RgbImage;
use tracing::{debug, warn};

use crate::device::{Device, DeviceDriver, Locator};
use crate::error::{Error, Result};

const UI_DUMP_REMOTE: &str = "/sdcard/window_dump.xml";

/// Driver that enumerates and connects devices through `adb`.
#[derive(Debug, Clone)]
pub struct AdbDriver {
    adb_path: PathBuf,
}

impl Default for AdbDriver {
    fn default() -> Self {
        Self {
            adb_path: PathBuf::from("adb"),
        }
    }
}

impl AdbDriver {
    /// Create a driver using `adb` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver with an explicit path to the adb binary.
    pub fn with_adb_path(adb_path: impl Into<PathBuf>) -> Self {
        Self {
            adb_path: adb_path.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        debug!(?args, "running adb");
        let output = Command::new(&self.adb_path)
            .args(args)
            .output()
            .map_err(|e| Error::DeviceAction(format!("failed to spawn adb: {}", e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::DeviceAction(format!(
                "adb {} exited with {}: {}",
                args.first().unwrap_or(&""),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

impl DeviceDriver for AdbDriver {
    fn list_devices(&self) -> Result<Vec<String>> {
        let out = self.run(&["devices"])?;
        Ok(parse_device_list(&String::from_utf8_lossy(&out)))
    }

    fn connect(&self, id: &str) -> Result<Box<dyn Device>> {
        // `adb devices` is the source of truth; a serial that is missing or
        // offline must fail here, not on the first screenshot.
        if !self.list_devices()?.iter().any(|d| d == id) {
            return Err(Error::DeviceNotFound(id.to_string()));
        }
        Ok(Box::new(AdbDevice {
            driver: self.clone(),
            serial: id.to_string(),
        }))
    }
}

/// Parse the output of `adb devices` into serials in the `device` state.
fn parse_device_list(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some("device")) => Some(serial.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// One connected device, bound to a serial.
pub struct AdbDevice {
    driver: AdbDriver,
    serial: String,
}

impl AdbDevice {
    fn shell(&self, args: &[&str]) -> Result<Vec<u8>> {
        let mut full = vec!["-s", self.serial.as_str(), "shell"];
        full.extend_from_slice(args);
        self.driver.run(&full)
    }
}

impl Device for AdbDevice {
    fn id(&self) -> &str {
        &self.serial
    }

    fn screenshot(&mut self) -> Result<RgbImage> {
        let png = self
            .driver
            .run(&["-s", &self.serial, "exec-out", "screencap", "-p"])?;
        if png.is_empty() {
            return Err(Error::DeviceAction("screencap returned no data".into()));
        }
        let img = image::load_from_memory(&png)?;
        Ok(img.to_rgb8())
    }

    fn click(&mut self, x: i32, y: i32) -> Result<()> {
        self.shell(&["input", "tap", &x.to_string(), &y.to_string()])?;
        Ok(())
    }

    fn send_keys(&mut self, text: &str) -> Result<()> {
        let escaped = escape_input_text(text);
        self.shell(&["input", "text", &escaped])?;
        Ok(())
    }

    fn clear_focused(&mut self) -> Result<bool> {
        let dump = self.shell(&["dumpsys", "input_method"])?;
        if !input_shown(&String::from_utf8_lossy(&dump)) {
            return Ok(false);
        }
        // Jump to end of field, then long-press delete until empty.
        self.shell(&["input", "keyevent", "KEYCODE_MOVE_END"])?;
        self.shell(&["input", "keyevent", "--longpress", "KEYCODE_DEL"])?;
        self.shell(&["input", "keyevent", "--longpress", "KEYCODE_DEL"])?;
        Ok(true)
    }

    fn click_locator(&mut self, locator: &Locator, timeout: Duration) -> Result<bool> {
        let resource_id = match locator {
            Locator::ResourceId(id) => id,
            Locator::Xpath(_) => {
                // A uiautomator dump carries no xpath index; callers treat
                // these taps as best-effort.
                warn!(%locator, "xpath lookup not supported by adb driver");
                return Ok(false);
            }
        };

        let deadline = Instant::now() + timeout;
        loop {
            self.shell(&["uiautomator", "dump", UI_DUMP_REMOTE])?;
            let xml = self.shell(&["cat", UI_DUMP_REMOTE])?;
            if let Some((x, y)) = find_node_center(&String::from_utf8_lossy(&xml), resource_id) {
                self.click(x, y)?;
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(Duration::from_millis(500));
        }
    }
}

/// Escape text for `adb shell input text`.
///
/// The argument is re-parsed by the device-side shell, so spaces become
/// `%s` and every shell metacharacter gets a backslash; otherwise an
/// answer like `a&b` would background the `input` call mid-string.
fn escape_input_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ' ' => out.push_str("%s"),
            '\\' | '\'' | '"' | '`' | '$' | '&' | ';' | '|' | '<' | '>' | '(' | ')' | '*'
            | '?' | '~' | '#' | '!' | '[' | ']' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Whether `dumpsys input_method` reports an open input connection.
fn input_shown(dump: &str) -> bool {
    dump.contains("mInputShown=true")
}

/// Find the tap center of the first node with the given resource-id in a
/// uiautomator dump.
///
/// A bare `id/name` also matches the package-qualified form the dump
/// actually carries (`com.example:id/name`).
fn find_node_center(xml: &str, resource_id: &str) -> Option<(i32, i32)> {
    let qualified_suffix = format!(":{}", resource_id);
    let mut search = xml;
    loop {
        let attr = search.find("resource-id=\"")?;
        let value_start = attr + "resource-id=\"".len();
        let value_end = search[value_start..].find('"')? + value_start;
        let value = &search[value_start..value_end];
        if value == resource_id || value.ends_with(&qualified_suffix) {
            let rest = &search[value_end..];
            let bounds_start = rest.find("bounds=\"")? + "bounds=\"".len();
            let bounds_end = rest[bounds_start..].find('"')? + bounds_start;
            return parse_bounds_center(&rest[bounds_start..bounds_end]);
        }
        search = &search[value_end..];
    }
}

/// Parse a uiautomator bounds string `[x1,y1][x2,y2]` into its center.
fn parse_bounds_center(bounds: &str) -> Option<(i32, i32)> {
    let inner = bounds.trim_start_matches('[').trim_end_matches(']');
    let mut coords = inner
        .split("][")
        .flat_map(|pair| pair.split(','))
        .map(|n| n.trim().parse::<i32>().ok());
    let x1 = coords.next()??;
    let y1 = coords.next()??;
    let x2 = coords.next()??;
    let y2 = coords.next()??;
    Some(((x1 + x2) / 2, (y1 + y2) / 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_list() {
        let output = "List of devices attached\n\
                      emulator-5554\tdevice\n\
                      192.168.1.20:5555\tdevice\n\
                      0123456789\tunauthorized\n\n";
        let devices = parse_device_list(output);
        assert_eq!(devices, vec!["emulator-5554", "192.168.1.20:5555"]);
    }

    #[test]
    fn test_parse_device_list_empty() {
        assert!(parse_device_list("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn test_escape_input_text() {
        assert_eq!(escape_input_text("hello world"), "hello%sworld");
        assert_eq!(escape_input_text("plain"), "plain");
    }

    #[test]
    fn test_escape_input_text_shell_metacharacters() {
        assert_eq!(escape_input_text("a&b"), r"a\&b");
        assert_eq!(escape_input_text("x;rm"), r"x\;rm");
        assert_eq!(escape_input_text("it's"), r"it\'s");
        assert_eq!(escape_input_text(r#"say "hi""#), r#"say%s\"hi\""#);
        assert_eq!(escape_input_text("$(id)"), r"\$\(id\)");
        assert_eq!(escape_input_text(r"back\slash"), r"back\\slash");
    }

    #[test]
    fn test_input_shown() {
        assert!(input_shown("  mInputShown=true mShowRequested=true"));
        assert!(!input_shown("  mInputShown=false"));
    }

    #[test]
    fn test_parse_bounds_center() {
        assert_eq!(parse_bounds_center("[0,0][100,200]"), Some((50, 100)));
        assert_eq!(parse_bounds_center("[10,20][30,40]"), Some((20, 30)));
        assert_eq!(parse_bounds_center("garbage"), None);
    }

    #[test]
    fn test_find_node_center() {
        let xml = r#"<node resource-id="com.example:id/other" bounds="[0,0][10,10]"/>
                     <node resource-id="com.example:id/btnForward" bounds="[100,400][300,500]"/>"#;
        assert_eq!(
            find_node_center(xml, "com.example:id/btnForward"),
            Some((200, 450))
        );
        assert_eq!(find_node_center(xml, "com.example:id/missing"), None);
    }

    #[test]
    fn test_find_node_center_bare_id_matches_qualified() {
        let xml = r#"<node resource-id="com.example:id/btnForward" bounds="[100,400][300,500]"/>"#;
        assert_eq!(find_node_center(xml, "id/btnForward"), Some((200, 450)));
        assert_eq!(find_node_center(xml, "id/btn"), None);
    }
}
