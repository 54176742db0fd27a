//! Shared test doubles for flows and the scheduler.

use std::collections::VecDeque;
use std::time::Duration;

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::device::{Device, DeviceDriver, Locator};
use crate::error::{Error, Result};
use crate::vision::ocr::{OcrEngine, Word};

/// Scripted device: screenshots are served from a queue, the last frame
/// repeating once the queue runs dry. All actions are recorded.
pub struct MockDevice {
    id: String,
    frames: VecDeque<RgbImage>,
    pub clicks: Vec<(i32, i32)>,
    pub keys: Vec<String>,
    pub locator_clicks: Vec<Locator>,
    pub focused: bool,
    pub fail_screenshot: bool,
}

impl MockDevice {
    pub fn new(id: &str, frames: Vec<RgbImage>) -> Self {
        Self {
            id: id.to_string(),
            frames: frames.into(),
            clicks: Vec::new(),
            keys: Vec::new(),
            locator_clicks: Vec::new(),
            focused: true,
            fail_screenshot: false,
        }
    }
}

impl Device for MockDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn screenshot(&mut self) -> Result<RgbImage> {
        if self.fail_screenshot {
            return Err(Error::DeviceAction("scripted transport failure".into()));
        }
        match self.frames.len() {
            0 => Err(Error::DeviceAction("no frames scripted".into())),
            1 => Ok(self.frames[0].clone()),
            _ => Ok(self.frames.pop_front().unwrap()),
        }
    }

    fn click(&mut self, x: i32, y: i32) -> Result<()> {
        self.clicks.push((x, y));
        Ok(())
    }

    fn send_keys(&mut self, text: &str) -> Result<()> {
        self.keys.push(text.to_string());
        Ok(())
    }

    fn clear_focused(&mut self) -> Result<bool> {
        Ok(self.focused)
    }

    fn click_locator(&mut self, locator: &Locator, _timeout: Duration) -> Result<bool> {
        self.locator_clicks.push(locator.clone());
        Ok(true)
    }
}

/// Driver handing out [`MockDevice`]s with plain dark frames.
pub struct MockDriver {
    pub devices: Vec<String>,
    /// Serials that fail to connect.
    pub broken: Vec<String>,
}

impl MockDriver {
    pub fn with_devices(n: usize) -> Self {
        Self {
            devices: (0..n).map(|i| format!("emulator-{}", 5554 + 2 * i)).collect(),
            broken: Vec::new(),
        }
    }
}

impl DeviceDriver for MockDriver {
    fn list_devices(&self) -> Result<Vec<String>> {
        Ok(self.devices.clone())
    }

    fn connect(&self, id: &str) -> Result<Box<dyn Device>> {
        if self.broken.iter().any(|b| b == id) {
            return Err(Error::DeviceNotFound(id.to_string()));
        }
        Ok(Box::new(MockDevice::new(id, vec![dark_frame()])))
    }
}

/// OCR engine scripted with a queue of recognition results; the last one
/// repeats.
pub struct MockOcr {
    texts: std::sync::Mutex<VecDeque<String>>,
}

impl MockOcr {
    pub fn with_texts(texts: &[&str]) -> Self {
        Self {
            texts: std::sync::Mutex::new(texts.iter().map(|s| s.to_string()).collect()),
        }
    }
}

impl OcrEngine for MockOcr {
    fn recognize(&self, _image: &GrayImage, _lang: &str) -> Result<String> {
        let mut texts = self.texts.lock().unwrap();
        match texts.len() {
            0 => Ok(String::new()),
            1 => Ok(texts[0].clone()),
            _ => Ok(texts.pop_front().unwrap()),
        }
    }

    fn recognize_words(&self, _image: &GrayImage, _lang: &str) -> Result<Vec<Word>> {
        Ok(Vec::new())
    }
}

/// Plain dark frame with no features.
pub fn dark_frame() -> RgbImage {
    RgbImage::from_pixel(64, 64, Rgb([40, 40, 40]))
}

/// A distinctive 8×8 patch, parameterized so different templates do not
/// match each other.
pub fn patch(seed: u8) -> GrayImage {
    GrayImage::from_fn(8, 8, |x, y| {
        let mut h = (x + 8 * y + 64 * seed as u32).wrapping_mul(2_654_435_761);
        h ^= h >> 15;
        h = h.wrapping_mul(2_246_822_519);
        h ^= h >> 13;
        Luma([(h >> 8) as u8])
    })
}

/// Dark frame with `patch(seed)` stamped at `(ox, oy)`.
pub fn frame_with_patch(seed: u8, ox: u32, oy: u32) -> RgbImage {
    let mut img = dark_frame();
    let p = patch(seed);
    for y in 0..8 {
        for x in 0..8 {
            let v = p.get_pixel(x, y).0[0];
            img.put_pixel(ox + x, oy + y, Rgb([v, v, v]));
        }
    }
    img
}

/// Write `patch(seed)` to `dir/name` as a PNG template file.
pub fn write_template(dir: &std::path::Path, name: &str, seed: u8) {
    patch(seed).save(dir.join(name)).unwrap();
}
