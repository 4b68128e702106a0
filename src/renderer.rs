use glow::{Context, HasContext as _};
use nalgebra::{Matrix4, Point3};

use crate::scene::{SceneGraph, Shape, Visual};

/// Floats per vertex: xyz rgba.
const STRIDE: usize = 7;

/// Line and flat-triangle painter for scene visuals and the model wireframe.
pub struct GpuLines {
    program: glow::Program,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    triangle_count: i32,
    line_count: i32,
    u_mvp: glow::UniformLocation,
}

unsafe impl Send for GpuLines {}
unsafe impl Sync for GpuLines {}

impl GpuLines {
    pub unsafe fn new(gl: &Context) -> anyhow::Result<Self> {
        unsafe {
            let program = {
                let vs = gl.create_shader(glow::VERTEX_SHADER).map_err(anyhow::Error::msg)?;
                gl.shader_source(
                    vs,
                    r#"#version 300 es
                precision highp float;
                uniform mat4 u_mvp;
                layout(location = 0) in vec3 a_pos;
                layout(location = 1) in vec4 a_col;
                out vec4 v_col;
                void main() {
                    v_col       = a_col;
                    gl_Position = u_mvp * vec4(a_pos, 1.0);
                }"#,
                );
                gl.compile_shader(vs);

                let fs = gl.create_shader(glow::FRAGMENT_SHADER).map_err(anyhow::Error::msg)?;
                gl.shader_source(
                    fs,
                    r#"#version 300 es
                precision mediump float;
                in  vec4 v_col;
                out vec4 o_col;
                void main() { o_col = v_col; }"#,
                );
                gl.compile_shader(fs);

                let prog = gl.create_program().map_err(anyhow::Error::msg)?;
                gl.attach_shader(prog, vs);
                gl.attach_shader(prog, fs);
                gl.link_program(prog);
                gl.delete_shader(vs);
                gl.delete_shader(fs);
                anyhow::ensure!(gl.get_program_link_status(prog), "{}", gl.get_program_info_log(prog));
                prog
            };

            let vao = gl.create_vertex_array().map_err(anyhow::Error::msg)?;
            let vbo = gl.create_buffer().map_err(anyhow::Error::msg)?;

            let stride = (STRIDE * size_of::<f32>()) as i32;
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, stride, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 4, glow::FLOAT, false, stride, 12);

            let u_mvp = gl
                .get_uniform_location(program, "u_mvp")
                .ok_or_else(|| anyhow::anyhow!("u_mvp uniform missing"))?;

            Ok(Self { program, vao, vbo, triangle_count: 0, line_count: 0, u_mvp })
        }
    }

    pub unsafe fn upload(&mut self, gl: &Context, batch: &VertexBatch) {
        let mut verts = Vec::with_capacity(batch.triangles.len() + batch.lines.len());
        verts.extend_from_slice(&batch.triangles);
        verts.extend_from_slice(&batch.lines);
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, bytemuck::cast_slice(&verts), glow::STATIC_DRAW);
        }
        self.triangle_count = (batch.triangles.len() / STRIDE) as i32;
        self.line_count = (batch.lines.len() / STRIDE) as i32;
    }

    pub unsafe fn paint(&self, gl: &Context, mvp: Matrix4<f32>) {
        unsafe {
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.disable(glow::CULL_FACE);
            gl.use_program(Some(self.program));
            gl.uniform_matrix_4_f32_slice(Some(&self.u_mvp), false, mvp.as_slice());
            gl.bind_vertex_array(Some(self.vao));
            gl.draw_arrays(glow::TRIANGLES, 0, self.triangle_count);
            gl.draw_arrays(glow::LINES, self.triangle_count, self.line_count);
        }
    }

    pub unsafe fn destroy(&self, gl: &Context) {
        unsafe {
            gl.delete_program(self.program);
            gl.delete_vertex_array(self.vao);
            gl.delete_buffer(self.vbo);
        }
    }
}

/// Interleaved vertices ready for upload.
#[derive(Debug, Default)]
pub struct VertexBatch {
    pub triangles: Vec<f32>,
    pub lines: Vec<f32>,
}

impl VertexBatch {
    /// Visible scene visuals in draw order, then the model wireframe. Labels are painted
    /// by egui and skipped here.
    pub fn build(scene: &SceneGraph, model_edges: &[[Point3<f32>; 2]], model_rgba: [f32; 4]) -> Self {
        let mut batch = Self::default();
        for (_, visual) in scene.draw_list() {
            batch.push_visual(visual);
        }
        for [a, b] in model_edges {
            push_vertex(&mut batch.lines, a, model_rgba);
            push_vertex(&mut batch.lines, b, model_rgba);
        }
        batch
    }

    fn push_visual(&mut self, visual: &Visual) {
        let rgba = visual.material.rgba();
        match &visual.shape {
            Shape::Lines(_) => {
                for p in visual.world_lines() {
                    push_vertex(&mut self.lines, &p, rgba);
                }
            }
            Shape::Quad { .. } => {
                if let Some([a, b, c, d]) = visual.world_corners() {
                    for p in [a, b, c, a, c, d] {
                        push_vertex(&mut self.triangles, &p, rgba);
                    }
                }
            }
            Shape::Label { .. } => {}
        }
    }
}

fn push_vertex(out: &mut Vec<f32>, p: &Point3<f32>, rgba: [f32; 4]) {
    out.extend_from_slice(&[p.x, p.y, p.z]);
    out.extend_from_slice(&rgba);
}
