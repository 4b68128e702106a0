//! Two-line bed label: printer name over the bed dimensions.
//!
//! Layout runs against a [`LabelSurface`] so the text metrics come from whatever
//! actually rasterizes the label (an off-screen canvas in the browser).

use std::sync::Arc;

use egui::{Color32, ColorImage};

/// Raster pixels per plane unit, keeps text crisp once mapped onto the bed.
pub const SUPERSAMPLE: f32 = 4.0;
/// Longest raster side; larger planes get fewer pixels per unit.
pub const MAX_RASTER_SIDE: u32 = 4096;
pub const NAME_FONT_STEP: f32 = 2.0;
pub const MIN_NAME_FONT: f32 = 10.0;
pub const ELLIPSIS: &str = "…";

pub const FIT_TEXT: Color32 = Color32::from_rgb(0x00, 0xff, 0x99);
pub const NO_FIT_TEXT: Color32 = Color32::from_rgb(0xff, 0x44, 0x66);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Font {
    pub px: f32,
    pub bold: bool,
}

impl Font {
    pub fn css(&self) -> String {
        let weight = if self.bold { "bold " } else { "" };
        format!("{weight}{}px Arial, sans-serif", self.px)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub color: Color32,
    pub shadow_color: Color32,
    pub shadow_blur: f32,
    pub shadow_offset: f32,
}

impl TextStyle {
    /// `scale` is the raster's pixels per plane unit.
    pub fn for_fit(fits: bool, scale: f32) -> Self {
        Self {
            color: if fits { FIT_TEXT } else { NO_FIT_TEXT },
            shadow_color: Color32::from_black_alpha(204),
            shadow_blur: 4.0 * scale,
            shadow_offset: scale,
        }
    }
}

/// Raster target for a label. Text is drawn centered on `x`, vertically centered on `y`.
pub trait LabelSurface {
    fn resize(&mut self, width: u32, height: u32);
    fn measure(&mut self, text: &str, font: Font) -> f32;
    fn fill_text(&mut self, text: &str, x: f32, y: f32, font: Font, style: &TextStyle);
    fn snapshot(&mut self) -> anyhow::Result<ColorImage>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelText {
    pub name: String,
    pub dimensions: String,
}

impl LabelText {
    pub fn new(name: impl Into<String>, x: f32, y: f32, z: f32) -> Self {
        Self { name: name.into(), dimensions: format!("{x} × {y} × {z} mm") }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabelLayout {
    pub width: u32,
    pub height: u32,
    pub padding: f32,
    /// The name as drawn, possibly truncated.
    pub name: String,
    pub name_font: Font,
    pub name_y: f32,
    pub dimensions_font: Font,
    pub dimensions_y: f32,
    /// Width the name may occupy.
    pub available_width: f32,
}

#[derive(Debug, Clone)]
pub struct RenderedLabel {
    pub image: Arc<ColorImage>,
    pub layout: LabelLayout,
}

pub struct LabelRenderer {
    surface: Box<dyn LabelSurface>,
}

impl LabelRenderer {
    pub fn new(surface: Box<dyn LabelSurface>) -> Self {
        Self { surface }
    }

    /// Pixels per plane unit: [`SUPERSAMPLE`], lowered so no side exceeds [`MAX_RASTER_SIDE`].
    pub fn raster_scale(plane_width: f32, plane_height: f32) -> f32 {
        let longest = plane_width.max(plane_height);
        let limit = MAX_RASTER_SIDE as f32;
        if longest.is_finite() && longest * SUPERSAMPLE > limit {
            limit / longest
        } else {
            SUPERSAMPLE
        }
    }

    /// Raster size for a label plane of `plane_width × plane_height` world units.
    pub fn raster_size(plane_width: f32, plane_height: f32) -> (u32, u32) {
        let scale = Self::raster_scale(plane_width, plane_height);
        let px = |v: f32| ((v * scale).floor() as u32).clamp(1, MAX_RASTER_SIDE);
        (px(plane_width), px(plane_height))
    }

    pub fn layout(&mut self, name: &str, width: u32, height: u32) -> LabelLayout {
        let (w, h) = (width as f32, height as f32);
        let padding = h * 0.1;
        let available_width = w - padding * 2.0;

        let initial = (h - padding * 2.0) * 0.5;
        let dimensions_font = Font { px: initial * 0.7, bold: false };

        let mut name_font = Font { px: initial, bold: true };
        while self.surface.measure(name, name_font) > available_width && name_font.px > MIN_NAME_FONT {
            name_font.px = (name_font.px - NAME_FONT_STEP).max(MIN_NAME_FONT);
        }

        let mut drawn = name.to_string();
        if self.surface.measure(&drawn, name_font) > available_width {
            let mut kept: Vec<char> = name.chars().collect();
            loop {
                kept.pop();
                drawn = kept.iter().collect::<String>() + ELLIPSIS;
                if kept.is_empty() || self.surface.measure(&drawn, name_font) <= available_width {
                    break;
                }
            }
        }

        let name_y = padding + name_font.px * 0.8;
        let dimensions_y = name_y + h * 0.1 + dimensions_font.px * 0.8;

        LabelLayout {
            width,
            height,
            padding,
            name: drawn,
            name_font,
            name_y,
            dimensions_font,
            dimensions_y,
            available_width,
        }
    }

    pub fn render(&mut self, text: &LabelText, fits: bool, plane: (f32, f32)) -> anyhow::Result<RenderedLabel> {
        let (width, height) = Self::raster_size(plane.0, plane.1);
        self.surface.resize(width, height);

        let layout = self.layout(&text.name, width, height);
        let style = TextStyle::for_fit(fits, Self::raster_scale(plane.0, plane.1));
        let center_x = width as f32 * 0.5;

        self.surface.fill_text(&layout.name, center_x, layout.name_y, layout.name_font, &style);
        self.surface.fill_text(&text.dimensions, center_x, layout.dimensions_y, layout.dimensions_font, &style);

        let image = self.surface.snapshot()?;
        Ok(RenderedLabel { image: Arc::new(image), layout })
    }
}

/// Headless surface with fixed-advance metrics (0.6 em per character).
///
/// Produces a transparent raster and records what was drawn, for hosts without a
/// canvas and for tests.
#[derive(Debug, Default)]
pub struct MonospaceSurface {
    size: (u32, u32),
    pub drawn: Vec<(String, Font, Color32)>,
}

impl LabelSurface for MonospaceSurface {
    fn resize(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.drawn.clear();
    }

    fn measure(&mut self, text: &str, font: Font) -> f32 {
        text.chars().count() as f32 * font.px * 0.6
    }

    fn fill_text(&mut self, text: &str, _x: f32, _y: f32, font: Font, style: &TextStyle) {
        self.drawn.push((text.to_string(), font, style.color));
    }

    fn snapshot(&mut self) -> anyhow::Result<ColorImage> {
        Ok(ColorImage::new([self.size.0 as usize, self.size.1 as usize], Color32::TRANSPARENT))
    }
}

#[cfg(target_arch = "wasm32")]
pub use web::CanvasSurface;

#[cfg(target_arch = "wasm32")]
mod web {
    use egui::{Color32, ColorImage};
    use wasm_bindgen::JsCast;
    use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement};

    use super::{Font, LabelSurface, TextStyle};

    /// Off-screen `<canvas>` 2D context.
    pub struct CanvasSurface {
        canvas: HtmlCanvasElement,
        ctx: CanvasRenderingContext2d,
    }

    fn css_rgba(c: Color32) -> String {
        format!("rgba({}, {}, {}, {:.3})", c.r(), c.g(), c.b(), c.a() as f32 / 255.0)
    }

    impl CanvasSurface {
        pub fn new() -> anyhow::Result<Self> {
            let document = web_sys::window()
                .and_then(|w| w.document())
                .ok_or_else(|| anyhow::anyhow!("no document"))?;
            let canvas: HtmlCanvasElement = document
                .create_element("canvas")
                .map_err(|e| anyhow::anyhow!("create canvas: {e:?}"))?
                .dyn_into()
                .map_err(|_| anyhow::anyhow!("element is not a canvas"))?;
            let ctx: CanvasRenderingContext2d = canvas
                .get_context("2d")
                .map_err(|e| anyhow::anyhow!("get 2d context: {e:?}"))?
                .ok_or_else(|| anyhow::anyhow!("2d context unavailable"))?
                .dyn_into()
                .map_err(|_| anyhow::anyhow!("unexpected context type"))?;
            Ok(Self { canvas, ctx })
        }
    }

    impl LabelSurface for CanvasSurface {
        fn resize(&mut self, width: u32, height: u32) {
            self.canvas.set_width(width);
            self.canvas.set_height(height);
            self.ctx.clear_rect(0.0, 0.0, width as f64, height as f64);
        }

        fn measure(&mut self, text: &str, font: Font) -> f32 {
            self.ctx.set_font(&font.css());
            match self.ctx.measure_text(text) {
                Ok(metrics) => metrics.width() as f32,
                Err(e) => {
                    log::warn!("measureText failed: {e:?}");
                    0.0
                }
            }
        }

        fn fill_text(&mut self, text: &str, x: f32, y: f32, font: Font, style: &TextStyle) {
            let ctx = &self.ctx;
            ctx.set_font(&font.css());
            ctx.set_shadow_color(&css_rgba(style.shadow_color));
            ctx.set_shadow_blur(style.shadow_blur as f64);
            ctx.set_shadow_offset_x(style.shadow_offset as f64);
            ctx.set_shadow_offset_y(style.shadow_offset as f64);
            ctx.set_fill_style_str(&css_rgba(style.color));
            ctx.set_text_align("center");
            ctx.set_text_baseline("middle");
            if let Err(e) = ctx.fill_text(text, x as f64, y as f64) {
                log::warn!("fillText failed: {e:?}");
            }
        }

        fn snapshot(&mut self) -> anyhow::Result<ColorImage> {
            let (w, h) = (self.canvas.width(), self.canvas.height());
            let data = self
                .ctx
                .get_image_data(0.0, 0.0, w as f64, h as f64)
                .map_err(|e| anyhow::anyhow!("getImageData: {e:?}"))?;
            Ok(ColorImage::from_rgba_unmultiplied([w as usize, h as usize], &data.data().0))
        }
    }
}
