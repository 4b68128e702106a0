//! The loaded print model, as seen by the bed and the painter.
//!
//! World space is Y-up: a model's footprint lies in XZ and its height runs along Y.

use std::cell::RefCell;

use csgrs::mesh::Mesh;
use nalgebra::{Point3, UnitQuaternion, Vector3};

use crate::events::Channel;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    pub fn new(min: Point3<f32>, max: Point3<f32>) -> Self {
        Self { min, max }
    }

    /// Box of the given extents resting on the floor, centered in XZ.
    pub fn with_size(x: f32, y: f32, z: f32) -> Self {
        Self::new(Point3::new(-x * 0.5, 0.0, -z * 0.5), Point3::new(x * 0.5, y, z * 0.5))
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Point3<f32>>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bounds = Self::new(first, first);
        for p in iter {
            bounds.min = bounds.min.inf(p);
            bounds.max = bounds.max.sup(p);
        }
        Some(bounds)
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Point3<f32> {
        nalgebra::center(&self.min, &self.max)
    }

    /// True when any extent is zero or inverted.
    pub fn is_empty(&self) -> bool {
        let size = self.size();
        size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0
    }
}

/// Source of the current model's world-space bounds. `None` means no model.
pub trait ModelProvider {
    fn world_bounds(&self) -> Option<Aabb>;
}

impl<M: ModelProvider + ?Sized> ModelProvider for RefCell<M> {
    fn world_bounds(&self) -> Option<Aabb> {
        self.borrow().world_bounds()
    }
}

/// A mesh plus the rotation and placement the user applied to it.
#[derive(Debug, Clone)]
pub struct MeshModel {
    points: Vec<Point3<f32>>,
    edges: Vec<[Point3<f32>; 2]>,
    rotation_deg: Vector3<f32>,
    position: Vector3<f32>,
}

impl MeshModel {
    pub fn from_stl(bytes: &[u8]) -> anyhow::Result<Self> {
        let mesh = Mesh::<()>::from_stl(bytes, None)?;
        let model = Self::from_mesh(&mesh);
        anyhow::ensure!(!model.points.is_empty(), "Empty model");
        Ok(model)
    }

    /// Copies the mesh outline, recentered on its bounding-box center.
    pub fn from_mesh(mesh: &Mesh<()>) -> Self {
        let mut points = Vec::new();
        let mut edges = Vec::new();
        for polygon in &mesh.polygons {
            let ring: Vec<Point3<f32>> = polygon
                .vertices
                .iter()
                .map(|v| Point3::new(v.pos.x as f32, v.pos.y as f32, v.pos.z as f32))
                .collect();
            for (i, a) in ring.iter().enumerate() {
                edges.push([*a, ring[(i + 1) % ring.len()]]);
            }
            points.extend(ring);
        }

        if let Some(bounds) = Aabb::from_points(&points) {
            let offset = bounds.center().coords;
            for p in &mut points {
                *p -= offset;
            }
            for edge in &mut edges {
                edge[0] -= offset;
                edge[1] -= offset;
            }
        }

        Self { points, edges, rotation_deg: Vector3::zeros(), position: Vector3::zeros() }
    }

    pub fn rotation_deg(&self) -> Vector3<f32> {
        self.rotation_deg
    }

    /// Euler rotation in X, Y, Z order, then rests the model on the floor.
    pub fn set_rotation(&mut self, degrees: Vector3<f32>) {
        self.rotation_deg = degrees;
        self.place_on_floor();
    }

    pub fn place_on_floor(&mut self) {
        self.position.y = 0.0;
        if let Some(bounds) = self.world_bounds() {
            self.position.y = -bounds.min.y;
        }
    }

    /// Moves the footprint center onto the world origin.
    pub fn center_on_bed(&mut self) {
        if let Some(bounds) = self.world_bounds() {
            let center = bounds.center();
            self.position.x -= center.x;
            self.position.z -= center.z;
        }
    }

    fn rotation(&self) -> UnitQuaternion<f32> {
        let r = self.rotation_deg.map(f32::to_radians);
        UnitQuaternion::from_axis_angle(&Vector3::x_axis(), r.x)
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), r.y)
            * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), r.z)
    }

    fn to_world(&self, rotation: &UnitQuaternion<f32>, p: &Point3<f32>) -> Point3<f32> {
        rotation * p + self.position
    }

    /// Wireframe edges in world space.
    pub fn world_edges(&self) -> Vec<[Point3<f32>; 2]> {
        let rotation = self.rotation();
        self.edges.iter().map(|[a, b]| [self.to_world(&rotation, a), self.to_world(&rotation, b)]).collect()
    }

    pub fn vertex_count(&self) -> usize {
        self.points.len()
    }
}

impl ModelProvider for MeshModel {
    fn world_bounds(&self) -> Option<Aabb> {
        let rotation = self.rotation();
        let world: Vec<_> = self.points.iter().map(|p| self.to_world(&rotation, p)).collect();
        Aabb::from_points(&world)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelEvent {
    Replaced,
    Transformed,
    Cleared,
}

/// Holder of the current model; announces every change.
#[derive(Default)]
pub struct ModelSlot {
    model: Option<MeshModel>,
    revision: u64,
    events: Channel<ModelEvent>,
}

impl ModelSlot {
    pub fn model(&self) -> Option<&MeshModel> {
        self.model.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn events(&self) -> &Channel<ModelEvent> {
        &self.events
    }

    pub fn replace(&mut self, mut model: MeshModel) {
        model.place_on_floor();
        self.model = Some(model);
        self.bump(ModelEvent::Replaced);
    }

    pub fn clear(&mut self) {
        if self.model.take().is_some() {
            self.bump(ModelEvent::Cleared);
        }
    }

    pub fn transform(&mut self, f: impl FnOnce(&mut MeshModel)) {
        if let Some(model) = self.model.as_mut() {
            f(model);
            self.bump(ModelEvent::Transformed);
        }
    }

    fn bump(&mut self, event: ModelEvent) {
        self.revision += 1;
        self.events.emit(&event);
    }
}

impl ModelProvider for ModelSlot {
    fn world_bounds(&self) -> Option<Aabb> {
        self.model.as_ref().and_then(MeshModel::world_bounds)
    }
}

/// Texts for the dimension overlay, in display order.
///
/// The second entry reports the depth (world Z) and the third the height (world Y);
/// this lettering is what users of the viewer already know.
pub fn dimension_labels(bounds: &Aabb) -> [String; 3] {
    let size = bounds.size();
    [
        format!("X: {:.1} mm", size.x),
        format!("Z: {:.1} mm", size.z),
        format!("Y: {:.1} mm", size.y),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cuboid(w: f64, l: f64, h: f64) -> MeshModel {
        MeshModel::from_mesh(&Mesh::<()>::cuboid(w, l, h, None))
    }

    fn assert_size(bounds: Aabb, expected: [f32; 3]) {
        let size = bounds.size();
        for (axis, want) in expected.iter().enumerate() {
            assert!((size[axis] - want).abs() < 1e-3, "axis {axis}: {} != {want}", size[axis]);
        }
    }

    #[test]
    fn mesh_is_recentered() {
        let model = cuboid(30.0, 20.0, 10.0);
        let bounds = model.world_bounds().unwrap();
        assert_size(bounds, [30.0, 20.0, 10.0]);
        assert!(bounds.center().coords.norm() < 1e-3);
    }

    #[test]
    fn rotation_rests_model_on_floor() {
        let mut model = cuboid(30.0, 20.0, 10.0);
        model.set_rotation(Vector3::new(-90.0, 0.0, 0.0));
        let bounds = model.world_bounds().unwrap();

        assert_size(bounds, [30.0, 10.0, 20.0]);
        assert!(bounds.min.y.abs() < 1e-3);
    }

    #[test]
    fn slot_announces_changes() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut slot = ModelSlot::default();
        let seen = Rc::new(Cell::new(0));
        let _sub = {
            let seen = Rc::clone(&seen);
            slot.events().subscribe(move |_| seen.set(seen.get() + 1))
        };

        assert!(slot.world_bounds().is_none());
        slot.replace(cuboid(10.0, 10.0, 10.0));
        slot.transform(|m| m.center_on_bed());
        slot.clear();
        slot.clear();

        assert_eq!(seen.get(), 3);
        assert_eq!(slot.revision(), 3);
    }

    #[test]
    fn dimension_label_lettering() {
        let labels = dimension_labels(&Aabb::with_size(10.0, 20.0, 30.0));
        assert_eq!(labels, ["X: 10.0 mm".to_string(), "Z: 30.0 mm".to_string(), "Y: 20.0 mm".to_string()]);
    }
}
