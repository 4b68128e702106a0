//! In-browser viewer for 3D print files.
//!
//! The platform-independent core lives in the public modules: the bed fit check,
//! the bed label, the adaptive quality ladder and the pieces they are wired with. The
//! wasm32 build adds an eframe host that paints the scene with glow.

pub mod bed;
pub mod bed_geometry;
pub mod events;
pub mod label;
pub mod loader;
pub mod material;
pub mod model;
pub mod quality;
pub mod scene;
pub mod screenshot;
pub mod settings;

#[cfg(target_arch = "wasm32")]
mod app;
#[cfg(target_arch = "wasm32")]
mod renderer;

// ── Web entry‑point ──
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Id of the `<canvas>` in index.html.
#[cfg(target_arch = "wasm32")]
const CANVAS_ID: &str = "viewer_canvas";

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn start() -> Result<(), JsValue> {
    // Redirect `log` macros & panic messages to the browser console
    console_log::init_with_level(log::Level::Debug).ok();
    console_error_panic_hook::set_once();

    let canvas = web_sys::window()
        .and_then(|w| w.document())
        .and_then(|d| d.get_element_by_id(CANVAS_ID))
        .ok_or_else(|| JsValue::from_str("viewer canvas not found"))?
        .dyn_into::<web_sys::HtmlCanvasElement>()?;

    eframe::WebRunner::new()
        .start(canvas, eframe::WebOptions::default(), Box::new(|cc| Ok(Box::new(app::ViewerApp::new(cc)))))
        .await
}

// Executes an async future without blocking the egui thread
#[cfg(target_arch = "wasm32")]
fn execute<F: std::future::Future<Output = ()> + 'static>(f: F) {
    wasm_bindgen_futures::spawn_local(f);
}
