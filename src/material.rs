//! Model color presets and the hex color strings settings are stored as.

use egui::Color32;

#[derive(Debug, PartialEq)]
pub struct MaterialPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub color: Color32,
}

const fn preset(id: &'static str, name: &'static str, color: Color32) -> MaterialPreset {
    MaterialPreset { id, name, color }
}

pub static MATERIAL_PRESETS: &[MaterialPreset] = &[
    preset("basic", "Basic gray", Color32::from_rgb(0xbd, 0xc3, 0xc7)),
    preset("white_pla", "White PLA", Color32::from_rgb(0xf2, 0xf2, 0xf2)),
    preset("black_pla", "Black PLA", Color32::from_rgb(0x2b, 0x2b, 0x2b)),
    preset("red_pla", "Red PLA", Color32::from_rgb(0xc0, 0x39, 0x2b)),
    preset("orange_petg", "Orange PETG", Color32::from_rgb(0xe6, 0x7e, 0x22)),
    preset("blue_petg", "Blue PETG", Color32::from_rgb(0x2e, 0x86, 0xde)),
    preset("green_tpu", "Green TPU", Color32::from_rgb(0x27, 0xae, 0x60)),
    preset("silk_gold", "Silk gold", Color32::from_rgb(0xd4, 0xaf, 0x37)),
];

pub const DEFAULT_MATERIAL_ID: &str = "basic";
pub const DEFAULT_MODEL_COLOR: Color32 = Color32::from_rgb(0xbd, 0xc3, 0xc7);
pub const DEFAULT_BACKGROUND: Color32 = Color32::from_rgb(0x2a, 0x2a, 0x2a);

pub fn find_material(id: &str) -> Option<&'static MaterialPreset> {
    MATERIAL_PRESETS.iter().find(|p| p.id == id)
}

/// Parses `#rrggbb` (the leading `#` is optional).
pub fn parse_hex(text: &str) -> Option<Color32> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Color32::from_rgb(channel(0)?, channel(2)?, channel(4)?))
}

pub fn to_hex(color: Color32) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b())
}

/// Floor grid lines that stay readable on `background`.
pub fn grid_color_for(background: Color32) -> Color32 {
    let [r, g, b] = [background.r(), background.g(), background.b()].map(f32::from);
    let luma = 0.299 * r + 0.587 * g + 0.114 * b;
    if luma < 127.5 { Color32::from_gray(0x88) } else { Color32::from_gray(0xaa) }
}
