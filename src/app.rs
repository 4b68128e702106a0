use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use egui::{Color32, ColorImage, TextureHandle};
use egui_plot::{Line, Plot, PlotPoints};
use nalgebra::{Isometry3, Matrix4, Perspective3, Point3, UnitQuaternion, Vector3};
use wasm_bindgen::{Clamped, JsCast, JsValue};
use web_sys::{CanvasRenderingContext2d, HtmlAnchorElement, HtmlCanvasElement, ImageData};

use crate::bed::{BedFitEngine, PRINTERS};
use crate::bed_geometry::FLOOR_GRID_SIZE;
use crate::events::{Notifier, Severity, Subscription, Toast, ToastQueue};
use crate::label::{CanvasSurface, LabelRenderer, MonospaceSurface};
use crate::loader::AsyncSlot;
use crate::material::{MATERIAL_PRESETS, find_material, grid_color_for};
use crate::model::{MeshModel, ModelProvider, ModelSlot, dimension_labels};
use crate::quality::{
    AdaptiveQualityController, AmbientOcclusionPass, AntialiasPass, DeviceProfile, QualityLevel, RenderBackend,
};
use crate::renderer::{GpuLines, VertexBatch};
use crate::scene::{SceneGraph, SharedScene, Shape, VisualId};
use crate::screenshot::{CaptureFlow, CaptureMode};
use crate::settings::{BedAxis, LocalStore, Settings, SettingsManager};

const DIMENSION_TEXT: Color32 = Color32::from_rgb(0x00, 0xb8, 0x94);

/// Renderer state the quality controller drives. The line painter has no shadow or
/// post passes of its own; their settings are shown in the quality HUD.
struct GlBackend {
    pixel_ratio: f32,
    shadows: bool,
    shadow_map_size: u32,
    ao: AmbientOcclusionPass,
    aa: AntialiasPass,
    viewport: (f32, f32),
}

impl GlBackend {
    fn new(device: &DeviceProfile) -> Self {
        let preset = device.initial_quality().preset();
        Self {
            pixel_ratio: device.device_pixel_ratio,
            shadows: preset.shadows,
            shadow_map_size: preset.shadow_map_size,
            ao: AmbientOcclusionPass::new(preset, device.mobile),
            aa: AntialiasPass::default(),
            viewport: (0.0, 0.0),
        }
    }
}

impl RenderBackend for GlBackend {
    fn set_pixel_ratio(&mut self, ratio: f32) {
        self.pixel_ratio = ratio;
    }

    fn pixel_ratio(&self) -> f32 {
        self.pixel_ratio
    }

    fn set_shadow_map(&mut self, enabled: bool, size: u32) {
        self.shadows = enabled;
        self.shadow_map_size = size;
    }

    fn shadows_enabled(&self) -> bool {
        self.shadows
    }

    fn request_shadow_refresh(&mut self) {
        log::debug!("shadow map refresh requested");
    }

    fn ambient_occlusion(&mut self) -> Option<&mut AmbientOcclusionPass> {
        Some(&mut self.ao)
    }

    fn antialias(&mut self) -> Option<&mut AntialiasPass> {
        Some(&mut self.aa)
    }

    fn viewport_size(&self) -> (f32, f32) {
        self.viewport
    }

    fn resize(&mut self, width: f32, height: f32) {
        log::debug!("render targets {width}×{height} at ratio {}", self.pixel_ratio);
    }
}

struct ActiveToast {
    toast: Toast,
    expires_ms: f64,
}

pub struct ViewerApp {
    scene: SharedScene,
    model: Rc<RefCell<ModelSlot>>,
    model_dirty: Rc<Cell<bool>>,
    bed: BedFitEngine,
    settings: SettingsManager<LocalStore>,
    quality: AdaptiveQualityController<GlBackend>,
    capture: CaptureFlow,
    toasts: Rc<ToastQueue>,
    active_toasts: Vec<ActiveToast>,
    remote: AsyncSlot<Vec<u8>>,
    model_url: String,
    import_text: String,
    confirm_reset: bool,
    rotation: UnitQuaternion<f32>,
    model_rotation: Vector3<f32>,
    zoom: f32,
    viewport: egui::Rect,
    gpu: Option<Arc<GpuLines>>,
    uploaded: Option<(u64, u64, Color32)>,
    label_textures: HashMap<VisualId, (Arc<ColorImage>, TextureHandle)>,
    _subscriptions: Vec<Subscription>,
}

impl ViewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let scene = SceneGraph::shared();
        let model = Rc::new(RefCell::new(ModelSlot::default()));
        let toasts = Rc::new(ToastQueue::default());

        let labels = match CanvasSurface::new() {
            Ok(surface) => LabelRenderer::new(Box::new(surface)),
            Err(e) => {
                log::warn!("No canvas for bed labels ({e:#}), labels will be blank");
                LabelRenderer::new(Box::new(MonospaceSurface::default()))
            }
        };
        let mut bed = BedFitEngine::new(Rc::clone(&scene), model.clone(), labels);

        let model_dirty = Rc::new(Cell::new(false));
        let mut subscriptions = Vec::new();
        {
            let toasts = Rc::clone(&toasts);
            subscriptions.push(bed.on_fit_changed(move |e| {
                if let Some(toast) = e.toast() {
                    toasts.show(toast);
                }
            }));
        }
        {
            let dirty = Rc::clone(&model_dirty);
            subscriptions.push(model.borrow().events().subscribe(move |_| dirty.set(true)));
        }

        let settings = SettingsManager::load(LocalStore);
        bed.set_label_visible(settings.get().show_bed_label);
        bed.set_bed_volume(settings.get().bed_volume());
        bed.set_floor_grid(floor_grid_color(settings.get()));

        let mut quality = AdaptiveQualityController::new(DeviceProfile::detect());
        quality.set_shadows_allowed(settings.get().shadows);
        {
            let ctx = cc.egui_ctx.clone();
            subscriptions.push(quality.on_change(move |_| ctx.request_repaint()));
        }

        Self {
            scene,
            model,
            model_dirty,
            bed,
            settings,
            quality,
            capture: CaptureFlow::new(toasts.clone()),
            toasts,
            active_toasts: Vec::new(),
            remote: AsyncSlot::default(),
            model_url: String::new(),
            import_text: String::new(),
            confirm_reset: false,
            rotation: UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.4),
            model_rotation: Vector3::zeros(),
            zoom: 1.0,
            viewport: egui::Rect::NOTHING,
            gpu: None,
            uploaded: None,
            label_textures: HashMap::new(),
            _subscriptions: subscriptions,
        }
    }

    fn apply_settings(&mut self, before: &Settings) {
        let after = self.settings.get().clone();
        if after.show_bed_label != before.show_bed_label {
            self.bed.set_label_visible(after.show_bed_label);
        }
        if after.bed_volume() != before.bed_volume() {
            self.bed.set_bed_volume(after.bed_volume());
            self.bed.check_fit(true);
        }
        if after.shadows != before.shadows {
            self.quality.set_shadows_allowed(after.shadows);
        }
        let grid = floor_grid_color(&after);
        if grid != floor_grid_color(before) {
            self.bed.set_floor_grid(grid);
        }
    }

    fn load_stl(&mut self, bytes: &[u8], source: &str) {
        match MeshModel::from_stl(bytes) {
            Ok(model) => {
                log::info!("Model loaded from {source} ({} bytes, {} vertices)", bytes.len(), model.vertex_count());
                self.model_rotation = Vector3::zeros();
                self.model.borrow_mut().replace(model);
            }
            Err(e) => {
                log::error!("Could not parse {source}: {e:#}");
                self.toasts.show(Toast::new("Could not load model", 3000, Severity::Error));
            }
        }
    }

    fn on_model_changed(&mut self) {
        self.bed.check_fit(true);
        let bounds = self.model.borrow().world_bounds();
        if let Some(bounds) = bounds {
            self.quality.fit_ambient_occlusion(bounds.size().max());
        }
    }

    fn fetch_model(&mut self) {
        let url = self.model_url.trim().to_string();
        if url.is_empty() {
            return;
        }
        let Some(tx) = self.remote.request() else { return };
        crate::execute(async move {
            let result: anyhow::Result<Vec<u8>> = async {
                let response = gloo_net::http::Request::get(&url).send().await?;
                anyhow::ensure!(response.ok(), "HTTP {} for {url}", response.status());
                Ok(response.binary().await?)
            }
            .await;
            tx.send(result).ok();
        });
    }

    fn poll_remote(&mut self) {
        if self.remote.poll() {
            if let Some(bytes) = self.remote.take() {
                self.load_stl(&bytes, "url");
            }
        }
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        for file in dropped {
            match file.bytes {
                Some(bytes) => self.load_stl(&bytes, &file.name),
                None => log::warn!("Dropped file {} has no contents", file.name),
            }
        }
    }

    fn begin_capture(&mut self, ctx: &egui::Context, mode: CaptureMode, now_ms: f64) {
        if self.capture.begin(mode, now_ms, &mut self.quality, &mut self.bed) {
            ctx.send_viewport_cmd(egui::ViewportCommand::Screenshot(Default::default()));
        }
    }

    fn handle_screenshots(&mut self, ctx: &egui::Context) {
        let shots: Vec<Arc<ColorImage>> = ctx.input(|i| {
            i.events
                .iter()
                .filter_map(|e| match e {
                    egui::Event::Screenshot { image, .. } => Some(Arc::clone(image)),
                    _ => None,
                })
                .collect()
        });
        for shot in shots {
            let cropped = shot.region(&self.viewport, Some(ctx.pixels_per_point()));
            let Some((mode, image)) = self.capture.complete(&cropped, &mut self.quality, &mut self.bed) else {
                continue;
            };
            match download_png(&image, mode.file_name()) {
                Ok(()) => self.capture.report_saved(),
                Err(e) => self.capture.report_failure(&e),
            }
        }
    }

    fn side_panel(&mut self, ctx: &egui::Context, now_ms: f64) {
        let before = self.settings.get().clone();
        let mut edited = before.clone();
        let (mut export, mut import, mut reset) = (false, false, false);

        egui::SidePanel::left("side_panel").resizable(false).min_width(180.0).show(ctx, |ui| {
            ui.heading("Viewer");

            ui.separator();
            ui.horizontal(|ui| {
                ui.text_edit_singleline(&mut self.model_url);
                let busy = self.remote.is_loading();
                if ui.add_enabled(!busy, egui::Button::new("Load")).clicked() {
                    self.fetch_model();
                }
            });
            ui.label("…or drop an STL file onto the page");

            ui.separator();
            ui.collapsing("Model rotation (°)", |ui| {
                let mut rotation = self.model_rotation;
                for (axis, label) in ["X:", "Y:", "Z:"].iter().enumerate() {
                    ui.horizontal(|ui| {
                        ui.label(*label);
                        ui.add(egui::DragValue::new(&mut rotation[axis]).speed(1.0).range(-180.0..=180.0));
                    });
                }
                if rotation != self.model_rotation {
                    self.model_rotation = rotation;
                    self.model.borrow_mut().transform(|m| m.set_rotation(rotation));
                }
                if ui.button("Center on bed").clicked() {
                    self.model.borrow_mut().transform(MeshModel::center_on_bed);
                }
            });

            ui.separator();
            ui.collapsing("Print bed", |ui| {
                let mut preset = edited.bed_preset.clone();
                egui::ComboBox::from_label("Printer")
                    .selected_text(edited.bed_volume().display_name())
                    .show_ui(ui, |ui| {
                        ui.selectable_value(&mut preset, "none".to_string(), "None");
                        for printer in PRINTERS {
                            ui.selectable_value(&mut preset, printer.id.to_string(), printer.name);
                        }
                        ui.selectable_value(&mut preset, "custom".to_string(), "Custom");
                    });
                if preset != edited.bed_preset {
                    edited.select_preset(&preset);
                }

                ui.add_enabled_ui(edited.bed_active, |ui| {
                    for (axis, label, mut value) in [
                        (BedAxis::X, "Width X:", edited.bed_x),
                        (BedAxis::Y, "Depth Y:", edited.bed_y),
                        (BedAxis::Z, "Height Z:", edited.bed_z),
                    ] {
                        ui.horizontal(|ui| {
                            ui.label(label);
                            let response = ui.add(egui::DragValue::new(&mut value).speed(1.0).range(50.0..=500.0));
                            if response.changed() {
                                edited.set_bed_dimension(axis, value);
                            }
                        });
                    }
                    if edited.bed_preset == "custom" {
                        ui.horizontal(|ui| {
                            ui.label("Name:");
                            ui.text_edit_singleline(&mut edited.bed_custom_name);
                        });
                    }
                });

                let mut active = edited.bed_active;
                if ui.checkbox(&mut active, "show bed").changed() {
                    edited.toggle_bed();
                }
                ui.checkbox(&mut edited.show_bed_label, "bed label");
            });

            ui.separator();
            ui.checkbox(&mut edited.show_dimensions, "dimensions");
            ui.checkbox(&mut edited.grid, "grid");
            ui.checkbox(&mut edited.shadows, "shadows");

            ui.separator();
            ui.collapsing("Appearance", |ui| {
                let mut material = edited.preset.clone();
                let selected = find_material(&material).map_or("Custom", |p| p.name);
                egui::ComboBox::from_label("Material").selected_text(selected).show_ui(ui, |ui| {
                    for preset in MATERIAL_PRESETS {
                        ui.selectable_value(&mut material, preset.id.to_string(), preset.name);
                    }
                });
                if material != edited.preset {
                    edited.select_material(&material);
                }

                ui.horizontal(|ui| {
                    let mut color = edited.model_color();
                    if ui.color_edit_button_srgba(&mut color).changed() {
                        edited.set_model_color(color);
                    }
                    ui.label("model color");
                });
                ui.horizontal(|ui| {
                    let mut color = edited.background_color();
                    if ui.color_edit_button_srgba(&mut color).changed() {
                        edited.set_background_color(color);
                    }
                    ui.label("background");
                });
            });

            ui.collapsing("Settings", |ui| {
                ui.horizontal(|ui| {
                    export = ui.button("Export").on_hover_text("copy settings to the clipboard").clicked();
                    if self.confirm_reset {
                        ui.label("Reset all?");
                        reset = ui.button("Yes").clicked();
                        if reset || ui.button("No").clicked() {
                            self.confirm_reset = false;
                        }
                    } else if ui.button("Reset all").clicked() {
                        self.confirm_reset = true;
                    }
                });
                ui.add(
                    egui::TextEdit::multiline(&mut self.import_text)
                        .desired_rows(3)
                        .hint_text("paste exported settings"),
                );
                let ready = !self.import_text.trim().is_empty();
                import = ui.add_enabled(ready, egui::Button::new("Import")).clicked();
            });

            ui.separator();
            ui.horizontal(|ui| {
                let idle = !self.capture.is_pending();
                if ui.add_enabled(idle, egui::Button::new("Screenshot")).clicked() {
                    self.begin_capture(ctx, CaptureMode::Scene, now_ms);
                }
                if ui.add_enabled(idle, egui::Button::new("Model cutout")).clicked() {
                    self.begin_capture(ctx, CaptureMode::Model, now_ms);
                }
            });

            ui.separator();
            self.quality_hud(ui);
        });

        if export {
            ctx.copy_text(self.settings.export());
            self.toasts.show(Toast::new("Settings copied to clipboard", 2000, Severity::Success));
        }

        if reset {
            self.settings.reset();
            self.apply_settings(&before);
            self.toasts.show(Toast::new("Settings reset", 2000, Severity::Success));
        } else if import {
            if self.settings.import(&self.import_text) {
                self.import_text.clear();
                self.apply_settings(&before);
                self.toasts.show(Toast::new("Settings imported", 2000, Severity::Success));
            } else {
                self.toasts.show(Toast::new("Could not import settings", 3000, Severity::Error));
            }
        } else if edited != before {
            self.settings.update(|s| *s = edited);
            self.apply_settings(&before);
        }
    }

    fn quality_hud(&mut self, ui: &mut egui::Ui) {
        ui.label(format!("Quality: {}  ·  {} fps", self.quality.current(), self.quality.fps()));

        let mut selected = self.quality.current();
        egui::ComboBox::from_id_salt("quality_level").selected_text(selected.id()).show_ui(ui, |ui| {
            for level in QualityLevel::LADDER {
                ui.selectable_value(&mut selected, level, level.id());
            }
        });
        if selected != self.quality.current() && !self.quality.is_boosted() {
            self.quality.apply_id(selected.id());
        }

        if let Some(backend) = self.quality.backend() {
            let shadows = if backend.shadows { format!("{} px", backend.shadow_map_size) } else { "off".into() };
            ui.label(format!(
                "ratio {:.2}  ·  shadows {shadows}  ·  AO {}  ·  FXAA {}",
                backend.pixel_ratio,
                on_off(backend.ao.enabled),
                on_off(backend.aa.enabled)
            ));
        }

        let mut adaptive = self.quality.is_adaptive();
        if ui.checkbox(&mut adaptive, "adaptive").changed() {
            self.quality.set_adaptive(adaptive);
        }

        let points: PlotPoints =
            self.quality.sampler().samples().enumerate().map(|(i, fps)| [i as f64, fps as f64]).collect();
        Plot::new("fps_plot")
            .height(80.0)
            .include_y(0.0)
            .include_y(60.0)
            .show_axes([false, true])
            .allow_drag(false)
            .allow_zoom(false)
            .show(ui, |plot_ui| plot_ui.line(Line::new(points)));
    }

    fn central_panel(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let model_capture = self.capture.mode() == Some(CaptureMode::Model);
        let panel_frame = if model_capture {
            egui::Frame::none()
        } else {
            egui::Frame::central_panel(&ctx.style()).fill(self.settings.get().background_color())
        };

        egui::CentralPanel::default().frame(panel_frame).show(ctx, |ui| {
            let (rect, response) = ui.allocate_exact_size(ui.available_size(), egui::Sense::drag());
            self.viewport = rect;
            if let Some(backend) = self.quality.backend_mut() {
                backend.viewport = (rect.width(), rect.height());
            }

            // left‑drag → orbit
            if response.dragged() {
                let delta = response.drag_delta();
                self.rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), delta.x * 0.01)
                    * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), delta.y * 0.01)
                    * self.rotation;
            }

            // scroll → zoom
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll.abs() > 0.0 {
                self.zoom = (self.zoom * (1.0 + scroll * 0.001)).clamp(0.1, 20.0);
            }

            let mvp = self.mvp(rect);

            if let Some(gl) = frame.gl() {
                if self.gpu.is_none() {
                    match unsafe { GpuLines::new(gl) } {
                        Ok(gpu) => {
                            self.gpu = Some(Arc::new(gpu));
                            self.quality.attach_backend(GlBackend::new(self.quality.device()));
                        }
                        Err(e) => log::error!("Failed to set up the line painter: {e:#}"),
                    }
                }
                self.sync_buffers(gl);

                if let Some(gpu) = &self.gpu {
                    let gpu = Arc::clone(gpu);
                    let callback = egui_glow::CallbackFn::new(move |_info, painter| unsafe {
                        gpu.paint(painter.gl(), mvp);
                    });
                    ui.painter().add(egui::PaintCallback { rect, callback: Arc::new(callback) });
                }
            }

            self.paint_labels(ui, rect, &mvp);
            if self.settings.get().show_dimensions && !model_capture {
                self.paint_dimensions(ui, rect, &mvp);
            }
        });
    }

    /// Re-uploads vertices when the scene, the model or its color changed.
    fn sync_buffers(&mut self, gl: &glow::Context) {
        let color = self.settings.get().model_color();
        let key = (self.scene.borrow().revision(), self.model.borrow().revision(), color);
        if self.uploaded == Some(key) {
            return;
        }
        let edges = self.model.borrow().model().map(MeshModel::world_edges).unwrap_or_default();
        let batch = VertexBatch::build(&self.scene.borrow(), &edges, color.to_normalized_gamma_f32());

        if let Some(gpu) = self.gpu.as_mut().and_then(Arc::get_mut) {
            unsafe { gpu.upload(gl, &batch) };
            self.uploaded = Some(key);
        }
    }

    fn paint_labels(&mut self, ui: &egui::Ui, rect: egui::Rect, mvp: &Matrix4<f32>) {
        let scene = self.scene.borrow();
        let mut live = Vec::new();

        for (id, visual) in scene.draw_list() {
            let Shape::Label { image, .. } = &visual.shape else { continue };
            live.push(id);

            let texture = match self.label_textures.get(&id) {
                Some((source, texture)) if Arc::ptr_eq(source, image) => texture.clone(),
                _ => {
                    let texture =
                        ui.ctx().load_texture(format!("label-{id:?}"), (**image).clone(), egui::TextureOptions::LINEAR);
                    self.label_textures.insert(id, (Arc::clone(image), texture.clone()));
                    texture
                }
            };

            let Some(corners) = visual.world_corners() else { continue };
            let projected: Option<Vec<egui::Pos2>> = corners.iter().map(|p| project(mvp, rect, p)).collect();
            let Some(projected) = projected else { continue };

            let uvs = [egui::pos2(0.0, 1.0), egui::pos2(1.0, 1.0), egui::pos2(1.0, 0.0), egui::pos2(0.0, 0.0)];
            let mut mesh = egui::Mesh::with_texture(texture.id());
            for (pos, uv) in projected.into_iter().zip(uvs) {
                mesh.vertices.push(egui::epaint::Vertex { pos, uv, color: Color32::WHITE });
            }
            mesh.add_triangle(0, 1, 2);
            mesh.add_triangle(0, 2, 3);
            ui.painter().add(egui::Shape::mesh(mesh));
        }

        self.label_textures.retain(|id, _| live.contains(id));
    }

    fn paint_dimensions(&self, ui: &egui::Ui, rect: egui::Rect, mvp: &Matrix4<f32>) {
        let Some(bounds) = self.model.borrow().world_bounds() else { return };
        let (min, max, c) = (bounds.min, bounds.max, bounds.center());
        let anchors = [
            Point3::new(c.x, min.y, max.z),
            Point3::new(max.x, min.y, c.z),
            Point3::new(max.x, c.y, max.z),
        ];

        let painter = ui.painter();
        for (text, anchor) in dimension_labels(&bounds).into_iter().zip(anchors) {
            let Some(pos) = project(mvp, rect, &anchor) else { continue };
            let galley = painter.layout_no_wrap(text, egui::FontId::monospace(12.0), DIMENSION_TEXT);
            let bg = egui::Rect::from_center_size(pos, galley.size() + egui::vec2(12.0, 8.0));
            painter.rect_filled(bg, 2.0, Color32::from_black_alpha(180));
            painter.galley(bg.min + egui::vec2(6.0, 4.0), galley, DIMENSION_TEXT);
        }
    }

    /// Toasts stay queued while a capture is pending so they cannot end up in the image.
    fn show_toasts(&mut self, ctx: &egui::Context, now_ms: f64) {
        if self.capture.is_pending() {
            return;
        }
        for toast in self.toasts.drain() {
            let expires_ms = now_ms + f64::from(toast.duration_ms);
            self.active_toasts.push(ActiveToast { toast, expires_ms });
        }
        self.active_toasts.retain(|t| t.expires_ms > now_ms);
        if self.active_toasts.is_empty() {
            return;
        }

        egui::Area::new(egui::Id::new("toasts"))
            .anchor(egui::Align2::CENTER_BOTTOM, egui::vec2(0.0, -24.0))
            .show(ctx, |ui| {
                for active in &self.active_toasts {
                    let color = match active.toast.severity {
                        Severity::Success => Color32::from_rgb(0x00, 0xb8, 0x94),
                        Severity::Info => Color32::LIGHT_BLUE,
                        Severity::Error => Color32::from_rgb(0xff, 0x44, 0x66),
                    };
                    egui::Frame::popup(ui.style()).show(ui, |ui| {
                        ui.colored_label(color, &active.toast.text);
                    });
                }
            });
    }

    /// Camera framing the bed (or a default floor) and the model.
    fn mvp(&self, rect: egui::Rect) -> Matrix4<f32> {
        let v = self.bed.volume();
        let mut radius = if self.bed.is_shown() {
            Vector3::new(v.x, v.z, v.y).norm() * 0.5
        } else {
            FLOOR_GRID_SIZE * 0.5
        };
        if let Some(bounds) = self.model.borrow().world_bounds() {
            radius = radius.max(bounds.size().norm() * 0.5);
        }

        let distance = radius * 2.5 / self.zoom;
        let eye = Point3::new(0.0, 0.0, distance);
        let aspect = (rect.width() / rect.height().max(1.0)).max(0.01);

        let proj = Perspective3::new(aspect, 50_f32.to_radians(), radius / 100.0, radius * 100.0).to_homogeneous();
        let view = Isometry3::look_at_rh(&eye, &Point3::origin(), &Vector3::y()).to_homogeneous();
        let model = self.rotation.to_homogeneous();

        proj * view * model
    }
}

impl eframe::App for ViewerApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let now_ms = ctx.input(|i| i.time) * 1000.0;

        self.quality.update(now_ms);
        self.handle_dropped_files(ctx);
        self.poll_remote();
        if self.model_dirty.replace(false) {
            self.on_model_changed();
        }

        self.handle_screenshots(ctx);
        self.capture.expire(now_ms, &mut self.quality, &mut self.bed);

        self.side_panel(ctx, now_ms);
        self.central_panel(ctx, frame);
        self.show_toasts(ctx, now_ms);

        // keep frames coming so the FPS sampler sees real frame rates
        ctx.request_repaint();
    }

    fn clear_color(&self, _visuals: &egui::Visuals) -> [f32; 4] {
        if self.capture.mode() == Some(CaptureMode::Model) {
            [0.0; 4]
        } else {
            self.settings.get().background_color().to_normalized_gamma_f32()
        }
    }

    fn on_exit(&mut self, gl: Option<&glow::Context>) {
        if let (Some(gl), Some(gpu)) = (gl, &self.gpu) {
            unsafe { gpu.destroy(gl) };
        }
    }
}

/// Floor grid color while the grid setting is on.
fn floor_grid_color(settings: &Settings) -> Option<Color32> {
    settings.grid.then(|| grid_color_for(settings.background_color()))
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

fn project(mvp: &Matrix4<f32>, rect: egui::Rect, p: &Point3<f32>) -> Option<egui::Pos2> {
    let clip = mvp * p.to_homogeneous();
    if clip.w <= 0.0 {
        return None;
    }
    let ndc = clip.xyz() / clip.w;
    let center = rect.center();
    Some(egui::pos2(center.x + ndc.x * rect.width() * 0.5, center.y - ndc.y * rect.height() * 0.5))
}

fn js_err(e: JsValue) -> anyhow::Error {
    anyhow::anyhow!("{e:?}")
}

/// Encodes `image` as PNG through an off-screen canvas and downloads it.
fn download_png(image: &ColorImage, file_name: &str) -> anyhow::Result<()> {
    let document = web_sys::window().and_then(|w| w.document()).ok_or_else(|| anyhow::anyhow!("no document"))?;
    let [w, h] = image.size;

    let canvas: HtmlCanvasElement = document
        .create_element("canvas")
        .map_err(js_err)?
        .dyn_into()
        .map_err(|_| anyhow::anyhow!("element is not a canvas"))?;
    canvas.set_width(w as u32);
    canvas.set_height(h as u32);
    let ctx: CanvasRenderingContext2d = canvas
        .get_context("2d")
        .map_err(js_err)?
        .ok_or_else(|| anyhow::anyhow!("2d context unavailable"))?
        .dyn_into()
        .map_err(|_| anyhow::anyhow!("unexpected context type"))?;

    let rgba: Vec<u8> = image.pixels.iter().flat_map(|c| c.to_srgba_unmultiplied()).collect();
    let data = ImageData::new_with_u8_clamped_array_and_sh(Clamped(&rgba), w as u32, h as u32).map_err(js_err)?;
    ctx.put_image_data(&data, 0.0, 0.0).map_err(js_err)?;
    let url = canvas.to_data_url_with_type("image/png").map_err(js_err)?;

    let anchor: HtmlAnchorElement = document
        .create_element("a")
        .map_err(js_err)?
        .dyn_into()
        .map_err(|_| anyhow::anyhow!("element is not an anchor"))?;
    anchor.set_href(&url);
    anchor.set_download(file_name);
    anchor.click();
    Ok(())
}
