//! Visuals that make up the bed: grid, volume frame, base plate and label plane.
//!
//! Bed axes map onto world axes as X → X, Y (depth) → Z, Z (height) → Y.

use egui::Color32;
use nalgebra::{Point3, Vector3};

use crate::label::RenderedLabel;
use crate::scene::{Material, Shape, Transform, Visual};

pub const FIT_COLOR: Color32 = Color32::from_rgb(0x00, 0xff, 0x99);
pub const NO_FIT_COLOR: Color32 = Color32::from_rgb(0xff, 0x44, 0x66);

/// Target grid cell size in mm.
pub const GRID_CELL: f32 = 10.0;
pub const MIN_GRID_DIVISIONS: u32 = 10;
/// Lift of the frame and grid above the base, keeps coplanar lines from flickering.
pub const CLEARANCE: f32 = 0.3;

pub fn fit_color(fits: bool) -> Color32 {
    if fits { FIT_COLOR } else { NO_FIT_COLOR }
}

pub fn grid_divisions(size: f32) -> u32 {
    ((size / GRID_CELL).floor() as u32).max(MIN_GRID_DIVISIONS)
}

/// Square grid on the ground plane sized to the larger horizontal side, then
/// squashed to the bed's aspect ratio.
pub fn grid(x: f32, y: f32, color: Color32) -> Visual {
    let size = x.max(y);
    let divisions = grid_divisions(size);
    let half = size * 0.5;
    let step = size / divisions as f32;

    let mut points = Vec::with_capacity((divisions as usize + 1) * 4);
    for i in 0..=divisions {
        let k = -half + i as f32 * step;
        points.push(Point3::new(-half, 0.0, k));
        points.push(Point3::new(half, 0.0, k));
        points.push(Point3::new(k, 0.0, -half));
        points.push(Point3::new(k, 0.0, half));
    }

    Visual {
        name: "bed-grid",
        shape: Shape::Lines(points),
        material: Material::translucent(color, 0.6),
        transform: Transform::at(0.0, CLEARANCE, 0.0).scaled(Vector3::new(x / size, 1.0, y / size)),
        render_order: 11,
        visible: true,
    }
}

/// Side of the neutral grid shown when no bed is.
pub const FLOOR_GRID_SIZE: f32 = 200.0;

/// Neutral ground grid used while no bed is shown.
pub fn floor_grid(color: Color32) -> Visual {
    let mut visual = grid(FLOOR_GRID_SIZE, FLOOR_GRID_SIZE, color);
    visual.name = "floor-grid";
    visual.transform = Transform::at(0.0, 0.0, 0.0);
    visual
}

/// The twelve edges of the build volume.
pub fn volume_frame(x: f32, y: f32, z: f32, color: Color32) -> Visual {
    let (hx, hy, hz) = (x * 0.5, z * 0.5, y * 0.5);
    let corner = |sx: f32, sy: f32, sz: f32| Point3::new(sx * hx, sy * hy, sz * hz);

    let mut points = Vec::with_capacity(24);
    for &(sy, sz) in &[(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
        points.push(corner(-1.0, sy, sz));
        points.push(corner(1.0, sy, sz));
    }
    for &(sx, sz) in &[(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
        points.push(corner(sx, -1.0, sz));
        points.push(corner(sx, 1.0, sz));
    }
    for &(sx, sy) in &[(-1.0, -1.0), (-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)] {
        points.push(corner(sx, sy, -1.0));
        points.push(corner(sx, sy, 1.0));
    }

    let mut material = Material::translucent(color, 0.9);
    material.depth_write = true;
    Visual {
        name: "bed-frame",
        shape: Shape::Lines(points),
        material,
        transform: Transform::at(0.0, z * 0.5 + CLEARANCE, 0.0),
        render_order: 50,
        visible: true,
    }
}

pub fn base_plate(x: f32, y: f32, color: Color32) -> Visual {
    let mut material = Material::translucent(color, 0.1);
    material.double_sided = true;
    Visual {
        name: "bed-base",
        shape: Shape::Quad { width: x, height: y },
        material,
        transform: Transform::at(0.0, 0.2, 0.0).laid_flat(),
        render_order: 10,
        visible: true,
    }
}

/// World size of the label plane for a bed `x` mm wide.
pub fn label_plane(x: f32) -> (f32, f32) {
    let width = x / 3.0;
    (width, width * 0.35)
}

/// Label laid flat just outside the front-right corner of the bed.
pub fn label(x: f32, y: f32, rendered: &RenderedLabel) -> Visual {
    let (width, height) = label_plane(x);
    let mut material = Material::translucent(Color32::WHITE, 1.0);
    material.double_sided = true;
    Visual {
        name: "bed-label",
        shape: Shape::Label { width, height, image: rendered.image.clone() },
        material,
        transform: Transform::at(x * 0.5 - width * 0.5, 0.5, y * 0.5 + height * 0.5 + 2.0).laid_flat(),
        render_order: 100,
        visible: true,
    }
}
