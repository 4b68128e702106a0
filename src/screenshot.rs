//! One-shot image capture at boosted quality.
//!
//! A capture spans frames: [`CaptureFlow::begin`] boosts quality and asks the host for
//! a frame, the host hands the pixels back through [`CaptureFlow::complete`], and
//! [`CaptureFlow::expire`] recovers when the frame never arrives. Both exits restore
//! the quality level and bed visibility. Notifications are only raised once a capture
//! has ended, so none can land in the captured frame.

use std::rc::Rc;

use egui::ColorImage;

use crate::bed::BedFitEngine;
use crate::events::{Notifier, Severity, Toast};
use crate::quality::{AdaptiveQualityController, RenderBackend};

pub const CAPTURE_TIMEOUT_MS: f64 = 3000.0;
/// Transparent margin kept around a trimmed model cutout.
pub const TRIM_PADDING: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Everything on screen.
    Scene,
    /// The model alone on a transparent background, cropped to its pixels.
    Model,
}

impl CaptureMode {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Scene => "scene_render.png",
            Self::Model => "model_cutout.png",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    mode: CaptureMode,
    started_ms: f64,
    bed_was_visible: bool,
}

pub struct CaptureFlow {
    notifier: Rc<dyn Notifier>,
    pending: Option<Pending>,
}

impl CaptureFlow {
    pub fn new(notifier: Rc<dyn Notifier>) -> Self {
        Self { notifier, pending: None }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn mode(&self) -> Option<CaptureMode> {
        self.pending.map(|p| p.mode)
    }

    /// Starts a capture. Returns false while another one is still in flight.
    pub fn begin<B: RenderBackend>(
        &mut self,
        mode: CaptureMode,
        now_ms: f64,
        quality: &mut AdaptiveQualityController<B>,
        bed: &mut BedFitEngine,
    ) -> bool {
        if self.pending.is_some() {
            log::debug!("capture already in progress");
            return false;
        }

        let bed_was_visible = bed.is_visible();
        if mode == CaptureMode::Model {
            bed.set_visible(false);
        }
        quality.boost_for_screenshot();

        self.pending = Some(Pending { mode, started_ms: now_ms, bed_was_visible });
        true
    }

    /// Takes the captured frame. Quality and bed are restored before any
    /// post-processing, so a failure past this point cannot leave them boosted.
    pub fn complete<B: RenderBackend>(
        &mut self,
        image: &ColorImage,
        quality: &mut AdaptiveQualityController<B>,
        bed: &mut BedFitEngine,
    ) -> Option<(CaptureMode, ColorImage)> {
        let pending = self.finish(quality, bed)?;
        let image = match pending.mode {
            CaptureMode::Scene => image.clone(),
            CaptureMode::Model => trim_transparent(image, TRIM_PADDING),
        };
        Some((pending.mode, image))
    }

    /// Abandons a capture whose frame has not arrived in time. Returns true when it did.
    pub fn expire<B: RenderBackend>(
        &mut self,
        now_ms: f64,
        quality: &mut AdaptiveQualityController<B>,
        bed: &mut BedFitEngine,
    ) -> bool {
        match self.pending {
            Some(p) if now_ms - p.started_ms >= CAPTURE_TIMEOUT_MS => {
                self.finish(quality, bed);
                self.report_failure(&anyhow::anyhow!("no frame within {CAPTURE_TIMEOUT_MS} ms"));
                true
            }
            _ => false,
        }
    }

    pub fn report_saved(&self) {
        self.notifier.show(Toast::new("Screenshot saved", 2500, Severity::Success));
    }

    pub fn report_failure(&self, error: &anyhow::Error) {
        log::error!("Screenshot error: {error:#}");
        self.notifier.show(Toast::new("Error creating screenshot", 3000, Severity::Error));
    }

    fn finish<B: RenderBackend>(
        &mut self,
        quality: &mut AdaptiveQualityController<B>,
        bed: &mut BedFitEngine,
    ) -> Option<Pending> {
        let pending = self.pending.take()?;
        quality.restore_after_screenshot();
        if pending.mode == CaptureMode::Model {
            bed.set_visible(pending.bed_was_visible);
        }
        Some(pending)
    }
}

/// Crops `image` to its non-transparent pixels plus `padding`, clamped to the image.
/// An image with no visible pixel is returned unchanged.
pub fn trim_transparent(image: &ColorImage, padding: usize) -> ColorImage {
    let [w, h] = image.size;
    let mut bounds: Option<(usize, usize, usize, usize)> = None;
    for y in 0..h {
        for x in 0..w {
            if image.pixels[y * w + x].a() == 0 {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
    }
    let Some((x0, y0, x1, y1)) = bounds else {
        return image.clone();
    };

    let (left, top) = (x0.saturating_sub(padding), y0.saturating_sub(padding));
    let right = (x1 + 1 + padding).min(w);
    let bottom = (y1 + 1 + padding).min(h);

    let mut pixels = Vec::with_capacity((right - left) * (bottom - top));
    for y in top..bottom {
        pixels.extend_from_slice(&image.pixels[y * w + left..y * w + right]);
    }
    ColorImage { size: [right - left, bottom - top], pixels }
}

#[cfg(test)]
mod tests {
    use egui::Color32;

    use super::*;

    fn canvas(w: usize, h: usize) -> ColorImage {
        ColorImage::new([w, h], Color32::TRANSPARENT)
    }

    fn paint(image: &mut ColorImage, x: usize, y: usize) {
        let w = image.size[0];
        image.pixels[y * w + x] = Color32::WHITE;
    }

    #[test]
    fn trims_to_padded_content() {
        let mut img = canvas(100, 80);
        paint(&mut img, 40, 30);
        paint(&mut img, 50, 35);

        let out = trim_transparent(&img, 20);
        assert_eq!(out.size, [51, 46]);
        assert_eq!(out.pixels[20 * 51 + 20], Color32::WHITE);
    }

    #[test]
    fn padding_is_clamped_to_the_image() {
        let mut img = canvas(30, 30);
        paint(&mut img, 2, 28);
        let out = trim_transparent(&img, 20);
        assert_eq!(out.size, [23, 22]);
    }

    #[test]
    fn blank_image_is_kept_whole() {
        let img = canvas(8, 6);
        assert_eq!(trim_transparent(&img, 20).size, [8, 6]);
    }

    #[test]
    fn file_names() {
        assert_eq!(CaptureMode::Scene.file_name(), "scene_render.png");
        assert_eq!(CaptureMode::Model.file_name(), "model_cutout.png");
    }
}
