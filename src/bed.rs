//! Build volume ("bed") configuration and the fit check against the loaded model.

use std::rc::Rc;

use egui::Color32;

use crate::bed_geometry;
use crate::events::{Channel, FitChanged, Subscription};
use crate::label::{LabelRenderer, LabelText};
use crate::model::ModelProvider;
use crate::scene::{SharedScene, VisualHandle};

#[derive(Debug, PartialEq)]
pub struct PrinterPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

const fn printer(id: &'static str, name: &'static str, x: f32, y: f32, z: f32) -> PrinterPreset {
    PrinterPreset { id, name, x, y, z }
}

pub static PRINTERS: &[PrinterPreset] = &[
    printer("ender3", "Creality Ender-3 V2", 220.0, 220.0, 250.0),
    printer("k1", "Creality K1", 220.0, 220.0, 250.0),
    printer("bambu_x1c", "Bambu Lab X1 Carbon", 256.0, 256.0, 256.0),
    printer("bambu_a1", "Bambu Lab A1", 256.0, 256.0, 256.0),
    printer("bambu_a1_mini", "Bambu Lab A1 mini", 180.0, 180.0, 180.0),
    printer("prusa_mk4", "Prusa MK4", 250.0, 210.0, 220.0),
    printer("prusa_mini", "Prusa MINI+", 180.0, 180.0, 180.0),
    printer("voron24_350", "Voron 2.4 350", 350.0, 350.0, 340.0),
    printer("elegoo_neptune4", "Elegoo Neptune 4", 225.0, 225.0, 265.0),
    printer("anycubic_kobra2", "Anycubic Kobra 2", 220.0, 220.0, 250.0),
];

pub const DEFAULT_PRINTER_ID: &str = "ender3";

pub fn find_printer(id: &str) -> Option<&'static PrinterPreset> {
    PRINTERS.iter().find(|p| p.id == id)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BedPreset {
    None,
    Custom,
    Printer(&'static PrinterPreset),
}

impl BedPreset {
    /// Unknown ids parse to [`BedPreset::None`].
    pub fn from_id(id: &str) -> Self {
        match id {
            "custom" => Self::Custom,
            _ => find_printer(id).map_or(Self::None, Self::Printer),
        }
    }

    pub fn id(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Custom => "custom",
            Self::Printer(p) => p.id,
        }
    }
}

/// Bed dimensions in millimeters: `x` wide, `y` deep, `z` tall.
#[derive(Debug, Clone, PartialEq)]
pub struct BedVolume {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub active: bool,
    pub preset: BedPreset,
    pub custom_name: String,
}

impl Default for BedVolume {
    fn default() -> Self {
        Self { x: 220.0, y: 220.0, z: 250.0, active: false, preset: BedPreset::None, custom_name: String::new() }
    }
}

impl BedVolume {
    pub fn display_name(&self) -> String {
        match self.preset {
            BedPreset::None => String::new(),
            BedPreset::Custom if self.custom_name.trim().is_empty() => "Custom".into(),
            BedPreset::Custom => self.custom_name.clone(),
            BedPreset::Printer(p) => p.name.into(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.active && self.preset != BedPreset::None
    }

    pub fn has_valid_dimensions(&self) -> bool {
        [self.x, self.y, self.z].iter().all(|v| v.is_finite() && *v > 0.0)
    }
}

/// Containment of a model of world extents `size` (Y-up) in `bed`.
///
/// World X runs along the bed width, world Z along its depth and world Y along its
/// height. Bounds are inclusive.
pub fn model_fits(size: nalgebra::Vector3<f32>, bed: &BedVolume) -> bool {
    size.x <= bed.x && size.z <= bed.y && size.y <= bed.z
}

/// Owns the bed visuals and tracks whether the current model fits.
pub struct BedFitEngine {
    scene: SharedScene,
    model: Rc<dyn ModelProvider>,
    labels: LabelRenderer,
    volume: BedVolume,
    fits: bool,
    show_label: bool,
    visible: bool,
    parts: Vec<VisualHandle>,
    label: Option<VisualHandle>,
    floor_color: Option<Color32>,
    floor: Option<VisualHandle>,
    fit_changed: Channel<FitChanged>,
}

impl BedFitEngine {
    pub fn new(scene: SharedScene, model: Rc<dyn ModelProvider>, labels: LabelRenderer) -> Self {
        Self {
            scene,
            model,
            labels,
            volume: BedVolume::default(),
            fits: true,
            show_label: true,
            visible: true,
            parts: Vec::new(),
            label: None,
            floor_color: None,
            floor: None,
            fit_changed: Channel::new(),
        }
    }

    pub fn volume(&self) -> &BedVolume {
        &self.volume
    }

    /// Result of the last fit check.
    pub fn fits(&self) -> bool {
        self.fits
    }

    /// True while grid, frame and base are in the scene.
    pub fn is_shown(&self) -> bool {
        !self.parts.is_empty()
    }

    pub fn has_label(&self) -> bool {
        self.label.is_some()
    }

    pub fn has_floor_grid(&self) -> bool {
        self.floor.is_some()
    }

    pub fn on_fit_changed(&self, listener: impl Fn(&FitChanged) + 'static) -> Subscription {
        self.fit_changed.subscribe(listener)
    }

    pub fn set_bed_volume(&mut self, volume: BedVolume) {
        self.volume = volume;
        self.rebuild();
    }

    /// Neutral ground grid drawn in `color` whenever no bed is shown; `None` turns it off.
    pub fn set_floor_grid(&mut self, color: Option<Color32>) {
        self.floor_color = color;
        self.sync_floor();
    }

    /// Tears down and recreates every bed visual for the current volume.
    pub fn rebuild(&mut self) {
        self.clear();
        self.build_parts();
        self.sync_floor();
    }

    fn build_parts(&mut self) {
        if !self.volume.is_enabled() {
            return;
        }
        if !self.volume.has_valid_dimensions() {
            log::warn!(
                "Ignoring bed with non-positive dimensions {} × {} × {}",
                self.volume.x,
                self.volume.y,
                self.volume.z
            );
            return;
        }

        let BedVolume { x, y, z, .. } = self.volume;
        let color = bed_geometry::fit_color(self.fits);
        self.parts = [
            bed_geometry::grid(x, y, color),
            bed_geometry::volume_frame(x, y, z, color),
            bed_geometry::base_plate(x, y, color),
        ]
        .into_iter()
        .map(|mut visual| {
            visual.visible = self.visible;
            VisualHandle::attach(&self.scene, visual)
        })
        .collect();

        self.update_label();
    }

    fn clear(&mut self) {
        self.label = None;
        self.parts.clear();
    }

    fn sync_floor(&mut self) {
        let color = match self.floor_color {
            Some(color) if self.parts.is_empty() => color,
            _ => {
                self.floor = None;
                return;
            }
        };
        match &self.floor {
            Some(handle) => handle.set_color(color),
            None => {
                let mut visual = bed_geometry::floor_grid(color);
                visual.visible = self.visible;
                self.floor = Some(VisualHandle::attach(&self.scene, visual));
            }
        }
    }

    /// Compares the model's world bounds against the bed, updating colors and label
    /// when the result changes.
    ///
    /// With `notify`, a [`FitChanged`] is published when the result changed or the
    /// model does not fit. No model or no usable bed always fits and never notifies.
    pub fn check_fit(&mut self, notify: bool) -> bool {
        let bounds = match self.model.world_bounds() {
            Some(bounds) if self.volume.is_enabled() && self.volume.has_valid_dimensions() => bounds,
            _ => {
                self.store_fit(true);
                return true;
            }
        };

        let fits = model_fits(bounds.size(), &self.volume);
        let changed = self.store_fit(fits);
        if changed {
            log::debug!("model {} the bed", if fits { "fits" } else { "no longer fits" });
        }
        if notify && (changed || !fits) {
            self.fit_changed.emit(&FitChanged { fits, changed });
        }
        fits
    }

    fn store_fit(&mut self, fits: bool) -> bool {
        if self.fits == fits {
            return false;
        }
        self.fits = fits;

        let color = bed_geometry::fit_color(fits);
        for part in &self.parts {
            part.set_color(color);
        }
        self.update_label();
        true
    }

    /// Shows or hides the name and dimensions label; hiding releases its raster.
    pub fn set_label_visible(&mut self, visible: bool) {
        self.show_label = visible;
        self.update_label();
    }

    /// Hides the whole bed, floor grid included, without tearing it down.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        for handle in self.parts.iter().chain(&self.label).chain(&self.floor) {
            handle.set_visible(visible);
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn update_label(&mut self) {
        if !self.show_label || self.parts.is_empty() {
            self.label = None;
            return;
        }

        let BedVolume { x, y, z, .. } = self.volume;
        let text = LabelText::new(self.volume.display_name(), x, y, z);
        let rendered = match self.labels.render(&text, self.fits, bed_geometry::label_plane(x)) {
            Ok(rendered) => rendered,
            Err(e) => {
                log::warn!("Failed to render bed label: {e:#}");
                self.label = None;
                return;
            }
        };

        let mut visual = bed_geometry::label(x, y, &rendered);
        visual.visible = self.visible;
        match &self.label {
            Some(handle) => handle.replace(visual),
            None => self.label = Some(VisualHandle::attach(&self.scene, visual)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use egui::{Color32, ColorImage};

    use super::*;
    use crate::label::{Font, LabelSurface, MonospaceSurface, TextStyle};
    use crate::model::Aabb;
    use crate::scene::{SceneGraph, Shape};

    #[derive(Default)]
    struct FixedModel(Cell<Option<Aabb>>);

    impl ModelProvider for FixedModel {
        fn world_bounds(&self) -> Option<Aabb> {
            self.0.get()
        }
    }

    /// Lets the test read what the engine's renderer drew.
    #[derive(Clone, Default)]
    struct SharedSurface(Rc<RefCell<MonospaceSurface>>);

    impl LabelSurface for SharedSurface {
        fn resize(&mut self, width: u32, height: u32) {
            self.0.borrow_mut().resize(width, height)
        }
        fn measure(&mut self, text: &str, font: Font) -> f32 {
            self.0.borrow_mut().measure(text, font)
        }
        fn fill_text(&mut self, text: &str, x: f32, y: f32, font: Font, style: &TextStyle) {
            self.0.borrow_mut().fill_text(text, x, y, font, style)
        }
        fn snapshot(&mut self) -> anyhow::Result<ColorImage> {
            self.0.borrow_mut().snapshot()
        }
    }

    struct Fixture {
        scene: SharedScene,
        model: Rc<FixedModel>,
        surface: SharedSurface,
        engine: BedFitEngine,
    }

    fn fixture() -> Fixture {
        let scene = SceneGraph::shared();
        let model = Rc::new(FixedModel::default());
        let surface = SharedSurface::default();
        let engine = BedFitEngine::new(
            Rc::clone(&scene),
            model.clone(),
            LabelRenderer::new(Box::new(surface.clone())),
        );
        Fixture { scene, model, surface, engine }
    }

    fn ender3() -> BedVolume {
        BedVolume { active: true, preset: BedPreset::from_id("ender3"), ..BedVolume::default() }
    }

    fn frame_color(scene: &SharedScene) -> Option<Color32> {
        scene.borrow().find("bed-frame").map(|(_, v)| v.material.color)
    }

    #[test]
    fn presets_parse_by_id() {
        assert_eq!(BedPreset::from_id("custom"), BedPreset::Custom);
        assert_eq!(BedPreset::from_id("nope"), BedPreset::None);
        assert_eq!(BedPreset::from_id("prusa_mk4").id(), "prusa_mk4");
        assert!(find_printer(DEFAULT_PRINTER_ID).is_some());
    }

    #[test]
    fn display_names() {
        let mut bed = BedVolume { preset: BedPreset::Custom, custom_name: "  ".into(), ..BedVolume::default() };
        assert_eq!(bed.display_name(), "Custom");
        bed.custom_name = "Shop".into();
        assert_eq!(bed.display_name(), "Shop");
        bed.preset = BedPreset::None;
        assert_eq!(bed.display_name(), "");
        assert_eq!(ender3().display_name(), "Creality Ender-3 V2");
    }

    #[test]
    fn containment_uses_the_axis_remap() {
        let bed = BedVolume { x: 100.0, y: 200.0, z: 300.0, ..ender3() };
        // world (x, y = height, z = depth)
        assert!(model_fits(nalgebra::Vector3::new(100.0, 300.0, 200.0), &bed));
        assert!(!model_fits(nalgebra::Vector3::new(100.0, 200.0, 300.0), &bed));
        assert!(!model_fits(nalgebra::Vector3::new(100.1, 1.0, 1.0), &bed));
    }

    #[test]
    fn no_model_or_inactive_bed_always_fits() {
        let mut f = fixture();
        f.engine.set_bed_volume(BedVolume { x: 1.0, y: 1.0, z: 1.0, ..ender3() });
        assert!(f.engine.check_fit(true));

        f.model.0.set(Some(Aabb::with_size(500.0, 500.0, 500.0)));
        f.engine.set_bed_volume(BedVolume { x: 1.0, y: 1.0, z: 1.0, active: false, ..ender3() });
        assert!(f.engine.check_fit(true));

        f.engine.set_bed_volume(BedVolume { preset: BedPreset::None, ..ender3() });
        assert!(f.engine.check_fit(true));
    }

    #[test]
    fn failing_check_notifies_every_time_passing_only_on_change() {
        let mut f = fixture();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _sub = {
            let seen = Rc::clone(&seen);
            f.engine.on_fit_changed(move |e| seen.borrow_mut().push(*e))
        };
        f.engine.set_bed_volume(ender3());

        f.model.0.set(Some(Aabb::with_size(300.0, 10.0, 10.0)));
        assert!(!f.engine.check_fit(true));
        assert!(!f.engine.check_fit(true));
        f.model.0.set(Some(Aabb::with_size(10.0, 10.0, 10.0)));
        assert!(f.engine.check_fit(true));
        assert!(f.engine.check_fit(true));

        assert_eq!(
            *seen.borrow(),
            vec![
                FitChanged { fits: false, changed: true },
                FitChanged { fits: false, changed: false },
                FitChanged { fits: true, changed: true },
            ]
        );
    }

    #[test]
    fn silent_check_still_recolors() {
        let mut f = fixture();
        f.engine.set_bed_volume(ender3());
        assert_eq!(frame_color(&f.scene), Some(bed_geometry::FIT_COLOR));

        f.model.0.set(Some(Aabb::with_size(10.0, 260.0, 10.0)));
        assert!(!f.engine.check_fit(false));
        assert_eq!(frame_color(&f.scene), Some(bed_geometry::NO_FIT_COLOR));

        let surface = f.surface.0.borrow();
        let drawn = &surface.drawn;
        assert_eq!(drawn.len(), 2);
        assert!(drawn.iter().all(|(_, _, c)| *c == crate::label::NO_FIT_TEXT));
    }

    #[test]
    fn rebuild_paints_with_current_fit_state() {
        let mut f = fixture();
        f.engine.set_bed_volume(ender3());
        f.model.0.set(Some(Aabb::with_size(300.0, 10.0, 10.0)));
        f.engine.check_fit(false);

        f.engine.set_bed_volume(BedVolume { x: 250.0, ..ender3() });
        assert_eq!(frame_color(&f.scene), Some(bed_geometry::NO_FIT_COLOR));
    }

    #[test]
    fn invalid_dimensions_hide_the_bed() {
        let mut f = fixture();
        f.engine.set_bed_volume(ender3());
        assert_eq!(f.scene.borrow().len(), 4);

        f.engine.set_bed_volume(BedVolume { z: 0.0, ..ender3() });
        assert!(!f.engine.is_shown());
        assert!(f.scene.borrow().is_empty());
    }

    #[test]
    fn label_toggle_releases_the_raster() {
        let mut f = fixture();
        f.engine.set_bed_volume(ender3());
        assert!(f.engine.has_label());

        f.engine.set_label_visible(false);
        assert!(!f.engine.has_label());
        assert!(f.scene.borrow().find("bed-label").is_none());
        assert!(f.engine.fits());

        f.engine.set_label_visible(true);
        let scene = f.scene.borrow();
        let (_, label) = scene.find("bed-label").unwrap();
        assert!(matches!(label.shape, Shape::Label { .. }));
    }

    #[test]
    fn floor_grid_stands_in_for_a_missing_bed() {
        let mut f = fixture();
        let gray = Color32::from_gray(0x88);
        f.engine.set_floor_grid(Some(gray));
        assert!(f.engine.has_floor_grid());
        assert!(f.scene.borrow().find("floor-grid").is_some_and(|(_, v)| v.material.color == gray));

        f.engine.set_bed_volume(ender3());
        assert!(!f.engine.has_floor_grid());
        assert!(f.scene.borrow().find("floor-grid").is_none());

        f.engine.set_bed_volume(BedVolume { active: false, ..ender3() });
        assert!(f.engine.has_floor_grid());

        f.engine.set_visible(false);
        assert!(f.scene.borrow().draw_list().is_empty());
        f.engine.set_visible(true);
        assert_eq!(f.scene.borrow().draw_list().len(), 1);

        f.engine.set_floor_grid(None);
        assert!(f.scene.borrow().is_empty());
    }

    #[test]
    fn hiding_keeps_the_visuals() {
        let mut f = fixture();
        f.engine.set_bed_volume(ender3());
        f.engine.set_visible(false);
        assert_eq!(f.scene.borrow().len(), 4);
        assert!(f.scene.borrow().draw_list().is_empty());

        f.engine.set_bed_volume(BedVolume { x: 200.0, ..ender3() });
        assert!(f.scene.borrow().draw_list().is_empty());

        f.engine.set_visible(true);
        assert_eq!(f.scene.borrow().draw_list().len(), 4);
    }
}
