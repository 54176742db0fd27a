//! Standalone matcher test harness.
//!
//! Captures one frame from the first connected device and reports whether a
//! template or a piece of text is visible on it. Useful when calibrating
//! templates and thresholds without running a full flow.

use std::path::PathBuf;

use anyhow::{bail, Context};
use image::Rgb;
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use fleet_core::vision::{capture, locate_text, match_template, preprocess, CaptureOptions};
use fleet_core::{AdbDriver, DeviceDriver, Frame, RunConfig, Template, TesseractOcr};

/// What the probe should look for on the captured frame.
#[derive(Debug, Clone, Default)]
pub struct ProbeOptions {
    pub template: Option<PathBuf>,
    pub text: Option<String>,
    pub lang: String,
    pub debug: bool,
}

pub fn run(mut options: ProbeOptions) -> anyhow::Result<()> {
    if options.lang.is_empty() {
        options.lang = "eng".to_string();
    }

    let config = RunConfig::load();
    let driver = AdbDriver::new();
    let devices = driver.list_devices()?;
    let Some(id) = devices.first() else {
        bail!("No devices found");
    };
    println!("Capturing from {}", id);

    let mut device = driver.connect(id)?;
    let frame = capture(device.as_mut(), &CaptureOptions::default())?;
    println!(
        "Captured {}x{} frame at {} (mean intensity {:.1})",
        frame.width(),
        frame.height(),
        frame.captured_at().format("%H:%M:%S%.3f"),
        frame.mean_intensity()
    );

    if options.debug {
        frame.image().save("screen.png").context("save screen.png")?;
        frame.to_gray().save("screen_gray.png").context("save screen_gray.png")?;
        preprocess(&frame)
            .save("screen_thresh.png")
            .context("save screen_thresh.png")?;
        println!("Wrote screen.png, screen_gray.png, screen_thresh.png");
    }

    let mut hit = None;

    if let Some(path) = &options.template {
        let template = Template::load(path)?;
        match match_template(&frame, &template, config.match_threshold) {
            Some(found) => {
                println!(
                    "Template {} FOUND at ({}, {}) confidence {:.3}",
                    path.display(),
                    found.x,
                    found.y,
                    found.confidence
                );
                hit = Some(Rect::at(
                    found.x - template.width() as i32 / 2,
                    found.y - template.height() as i32 / 2,
                )
                .of_size(template.width(), template.height()));
            }
            None => println!(
                "Template {} not found (threshold {})",
                path.display(),
                config.match_threshold
            ),
        }
    }

    if let Some(needle) = &options.text {
        let ocr = TesseractOcr::probe().map_err(|e| anyhow::anyhow!("{}", e))?;
        match locate_text(&ocr, &frame, needle, &options.lang)? {
            Some(found) => {
                println!(
                    "Text '{}' FOUND at ({}, {}) size {}x{}",
                    needle, found.x, found.y, found.width, found.height
                );
                if found.width > 0 && found.height > 0 {
                    hit = Some(
                        Rect::at(found.x, found.y).of_size(found.width as u32, found.height as u32),
                    );
                }
            }
            None => println!("Text '{}' not found", needle),
        }
    }

    if options.debug {
        if let Some(rect) = hit {
            write_annotated(&frame, rect)?;
            println!("Wrote result.png");
        }
    }

    Ok(())
}

fn write_annotated(frame: &Frame, rect: Rect) -> anyhow::Result<()> {
    let mut annotated = frame.image().clone();
    draw_hollow_rect_mut(&mut annotated, rect, Rgb([255, 0, 0]));
    annotated.save("result.png").context("save result.png")?;
    Ok(())
}
