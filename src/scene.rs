//! Scene graph shared by the core and the painter.
//!
//! Visuals are only ever owned through a [`VisualHandle`]; dropping the handle is the
//! one teardown path that removes the visual and releases its buffers and raster.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use egui::{Color32, ColorImage};
use nalgebra::{Matrix4, Point3, Translation3, UnitQuaternion, Vector3};

pub type SharedScene = Rc<RefCell<SceneGraph>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VisualId(u64);

#[derive(Debug, Clone)]
pub enum Shape {
    /// Line segments, two points per segment.
    Lines(Vec<Point3<f32>>),
    /// Rectangle in the local XY plane, centered on the origin.
    Quad { width: f32, height: f32 },
    /// Quad textured with a rasterized label.
    Label { width: f32, height: f32, image: Arc<ColorImage> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub color: Color32,
    pub opacity: f32,
    pub depth_test: bool,
    pub depth_write: bool,
    pub double_sided: bool,
}

impl Material {
    pub fn translucent(color: Color32, opacity: f32) -> Self {
        Self { color, opacity, depth_test: true, depth_write: false, double_sided: false }
    }

    /// Color with the material opacity folded into alpha.
    pub fn rgba(&self) -> [f32; 4] {
        let [r, g, b, _] = self.color.to_normalized_gamma_f32();
        [r, g, b, self.opacity]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Transform {
    fn default() -> Self {
        Self { translation: Vector3::zeros(), rotation: UnitQuaternion::identity(), scale: Vector3::repeat(1.0) }
    }
}

impl Transform {
    pub fn at(x: f32, y: f32, z: f32) -> Self {
        Self { translation: Vector3::new(x, y, z), ..Self::default() }
    }

    /// Lays a local-XY shape flat onto the XZ ground plane.
    pub fn laid_flat(mut self) -> Self {
        self.rotation = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -std::f32::consts::FRAC_PI_2);
        self
    }

    pub fn scaled(mut self, scale: Vector3<f32>) -> Self {
        self.scale = scale;
        self
    }

    pub fn matrix(&self) -> Matrix4<f32> {
        Translation3::from(self.translation).to_homogeneous()
            * self.rotation.to_homogeneous()
            * Matrix4::new_nonuniform_scaling(&self.scale)
    }

    pub fn apply(&self, p: &Point3<f32>) -> Point3<f32> {
        let scaled = Point3::from(p.coords.component_mul(&self.scale));
        self.rotation * scaled + self.translation
    }
}

#[derive(Debug, Clone)]
pub struct Visual {
    pub name: &'static str,
    pub shape: Shape,
    pub material: Material,
    pub transform: Transform,
    pub render_order: i32,
    pub visible: bool,
}

impl Visual {
    /// Segment endpoints in world space (empty for quads).
    pub fn world_lines(&self) -> Vec<Point3<f32>> {
        match &self.shape {
            Shape::Lines(points) => points.iter().map(|p| self.transform.apply(p)).collect(),
            _ => Vec::new(),
        }
    }

    /// Quad corners in world space, counter-clockwise from the local (-w/2, -h/2).
    pub fn world_corners(&self) -> Option<[Point3<f32>; 4]> {
        let (w, h) = match &self.shape {
            Shape::Quad { width, height } | Shape::Label { width, height, .. } => (*width * 0.5, *height * 0.5),
            Shape::Lines(_) => return None,
        };
        let local = [
            Point3::new(-w, -h, 0.0),
            Point3::new(w, -h, 0.0),
            Point3::new(w, h, 0.0),
            Point3::new(-w, h, 0.0),
        ];
        Some(local.map(|p| self.transform.apply(&p)))
    }
}

/// Flat store of visuals plus a revision counter bumped on every mutation.
#[derive(Debug, Default)]
pub struct SceneGraph {
    next_id: u64,
    visuals: BTreeMap<VisualId, Visual>,
    revision: u64,
}

impl SceneGraph {
    pub fn shared() -> SharedScene {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len(&self) -> usize {
        self.visuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visuals.is_empty()
    }

    pub fn get(&self, id: VisualId) -> Option<&Visual> {
        self.visuals.get(&id)
    }

    pub fn find(&self, name: &str) -> Option<(VisualId, &Visual)> {
        self.visuals.iter().find(|(_, v)| v.name == name).map(|(id, v)| (*id, v))
    }

    /// Visible visuals in draw order (ascending render order, then insertion).
    pub fn draw_list(&self) -> Vec<(VisualId, &Visual)> {
        let mut list: Vec<_> = self.visuals.iter().filter(|(_, v)| v.visible).map(|(id, v)| (*id, v)).collect();
        list.sort_by_key(|(id, v)| (v.render_order, *id));
        list
    }

    fn insert(&mut self, visual: Visual) -> VisualId {
        let id = VisualId(self.next_id);
        self.next_id += 1;
        self.visuals.insert(id, visual);
        self.revision += 1;
        id
    }

    fn remove(&mut self, id: VisualId) -> Option<Visual> {
        let removed = self.visuals.remove(&id);
        if removed.is_some() {
            self.revision += 1;
        }
        removed
    }

    fn modify(&mut self, id: VisualId, f: impl FnOnce(&mut Visual)) {
        if let Some(v) = self.visuals.get_mut(&id) {
            f(v);
            self.revision += 1;
        }
    }
}

/// Exclusive owner of one visual in a [`SceneGraph`].
#[derive(Debug)]
pub struct VisualHandle {
    scene: Weak<RefCell<SceneGraph>>,
    id: VisualId,
}

impl VisualHandle {
    pub fn attach(scene: &SharedScene, visual: Visual) -> Self {
        let id = scene.borrow_mut().insert(visual);
        Self { scene: Rc::downgrade(scene), id }
    }

    pub fn id(&self) -> VisualId {
        self.id
    }

    pub fn set_color(&self, color: Color32) {
        self.modify(|v| v.material.color = color);
    }

    pub fn set_visible(&self, visible: bool) {
        self.modify(|v| v.visible = visible);
    }

    /// Swaps the whole visual in place, keeping the id and draw position.
    pub fn replace(&self, visual: Visual) {
        self.modify(|v| *v = visual);
    }

    pub fn read<R>(&self, f: impl FnOnce(&Visual) -> R) -> Option<R> {
        let scene = self.scene.upgrade()?;
        let graph = scene.borrow();
        graph.get(self.id).map(f)
    }

    fn modify(&self, f: impl FnOnce(&mut Visual)) {
        if let Some(scene) = self.scene.upgrade() {
            scene.borrow_mut().modify(self.id, f);
        }
    }
}

impl Drop for VisualHandle {
    fn drop(&mut self) {
        let Some(scene) = self.scene.upgrade() else { return };
        match scene.try_borrow_mut() {
            Ok(mut graph) => {
                graph.remove(self.id);
            }
            Err(_) => log::error!("scene busy while disposing visual {:?}", self.id),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(name: &'static str, order: i32) -> Visual {
        Visual {
            name,
            shape: Shape::Lines(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]),
            material: Material::translucent(Color32::WHITE, 1.0),
            transform: Transform::default(),
            render_order: order,
            visible: true,
        }
    }

    #[test]
    fn dropping_handle_disposes_visual() {
        let scene = SceneGraph::shared();
        let handle = VisualHandle::attach(&scene, line("a", 0));
        assert_eq!(scene.borrow().len(), 1);
        let rev = scene.borrow().revision();

        drop(handle);
        assert!(scene.borrow().is_empty());
        assert!(scene.borrow().revision() > rev);
    }

    #[test]
    fn draw_list_follows_render_order() {
        let scene = SceneGraph::shared();
        let _late = VisualHandle::attach(&scene, line("late", 100));
        let early = VisualHandle::attach(&scene, line("early", 10));
        let hidden = VisualHandle::attach(&scene, line("hidden", 0));
        hidden.set_visible(false);

        let graph = scene.borrow();
        let names: Vec<_> = graph.draw_list().iter().map(|(_, v)| v.name).collect();
        assert_eq!(names, vec!["early", "late"]);
        drop(graph);
        drop(early);
    }

    #[test]
    fn laid_flat_maps_local_y_onto_negative_z() {
        let t = Transform::at(1.0, 2.0, 3.0).laid_flat();
        let p = t.apply(&Point3::new(0.0, 1.0, 0.0));
        assert!((p - Point3::new(1.0, 2.0, 2.0)).norm() < 1e-5);

        let via_matrix = t.matrix().transform_point(&Point3::new(0.0, 1.0, 0.0));
        assert!((via_matrix - p).norm() < 1e-5);
    }

    #[test]
    fn handle_outliving_scene_is_harmless() {
        let scene = SceneGraph::shared();
        let handle = VisualHandle::attach(&scene, line("a", 0));
        drop(scene);
        handle.set_color(Color32::RED);
        assert!(handle.read(|v| v.name).is_none());
    }

    #[test]
    fn replace_keeps_identity() {
        let scene = SceneGraph::shared();
        let handle = VisualHandle::attach(&scene, line("a", 0));
        handle.replace(line("b", 5));
        assert_eq!(handle.read(|v| (v.name, v.render_order)), Some(("b", 5)));
        assert_eq!(scene.borrow().find("b").map(|(id, _)| id), Some(handle.id()));
    }
}
