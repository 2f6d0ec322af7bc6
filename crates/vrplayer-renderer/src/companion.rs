use glow::HasContext;
use vrplayer_core::{Eye, RenderError, Resolution};

use crate::framebuffer::StereoFramebufferSet;
use crate::mesh::{ATTRIB_POSITION, ATTRIB_UV};
use crate::shader::{Program, COMPANION_FRAGMENT, COMPANION_VERTEX};

const FLOATS_PER_VERTEX: usize = 4;
const VERTICES_PER_EYE: i32 = 6;

/// Two quads filling the left and right halves of clip space.
fn side_by_side_quads() -> [f32; 2 * VERTICES_PER_EYE as usize * FLOATS_PER_VERTEX] {
    let mut out = [0.0; 2 * VERTICES_PER_EYE as usize * FLOATS_PER_VERTEX];
    for (half, x0) in [-1.0f32, 0.0].into_iter().enumerate() {
        let x1 = x0 + 1.0;
        let corners = [
            [x0, -1.0, 0.0, 0.0],
            [x1, -1.0, 1.0, 0.0],
            [x1, 1.0, 1.0, 1.0],
            [x0, -1.0, 0.0, 0.0],
            [x1, 1.0, 1.0, 1.0],
            [x0, 1.0, 0.0, 1.0],
        ];
        for (i, corner) in corners.iter().enumerate() {
            let at = (half * VERTICES_PER_EYE as usize + i) * FLOATS_PER_VERTEX;
            out[at..at + FLOATS_PER_VERTEX].copy_from_slice(corner);
        }
    }
    out
}

/// Desktop preview drawing both resolved eyes side by side.
pub struct CompanionView {
    program: Program,
    eye_uniform: glow::UniformLocation,
    vao: glow::VertexArray,
    vbo: glow::Buffer,
}

impl CompanionView {
    pub fn new(gl: &glow::Context) -> Result<Self, RenderError> {
        let program = Program::compile(gl, "companion", COMPANION_VERTEX, COMPANION_FRAGMENT)?;
        let eye_uniform = program.uniform(gl, "eye")?;
        let quads = side_by_side_quads();
        let bytes: Vec<u8> = quads.iter().flat_map(|f| f.to_ne_bytes()).collect();
        let stride = (FLOATS_PER_VERTEX * std::mem::size_of::<f32>()) as i32;

        unsafe {
            let vao = gl
                .create_vertex_array()
                .map_err(|reason| RenderError::allocation("companion vertex array", reason))?;
            let vbo = gl
                .create_buffer()
                .map_err(|reason| RenderError::allocation("companion vertex buffer", reason))?;
            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, &bytes, glow::STATIC_DRAW);
            gl.enable_vertex_attrib_array(ATTRIB_POSITION);
            gl.vertex_attrib_pointer_f32(ATTRIB_POSITION, 2, glow::FLOAT, false, stride, 0);
            gl.enable_vertex_attrib_array(ATTRIB_UV);
            gl.vertex_attrib_pointer_f32(ATTRIB_UV, 2, glow::FLOAT, false, stride, 8);
            gl.bind_vertex_array(None);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            Ok(Self { program, eye_uniform, vao, vbo })
        }
    }

    /// Draw both eyes into the default framebuffer.
    pub fn draw(&self, gl: &glow::Context, eyes: &StereoFramebufferSet, window: Resolution) {
        let window = window.at_least_one();
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            gl.viewport(0, 0, window.width as i32, window.height as i32);
            gl.disable(glow::DEPTH_TEST);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT);

            gl.use_program(Some(self.program.raw));
            gl.uniform_1_i32(Some(&self.eye_uniform), 0);
            gl.active_texture(glow::TEXTURE0);
            gl.bind_vertex_array(Some(self.vao));
            for eye in Eye::BOTH {
                gl.bind_texture(glow::TEXTURE_2D, Some(eyes.eye(eye).texture()));
                gl.draw_arrays(glow::TRIANGLES, eye.index() as i32 * VERTICES_PER_EYE, VERTICES_PER_EYE);
            }
            gl.bind_vertex_array(None);
            gl.bind_texture(glow::TEXTURE_2D, None);
            gl.use_program(None);
        }
    }

    pub fn destroy(self, gl: &glow::Context) {
        self.program.destroy(gl);
        unsafe {
            gl.delete_vertex_array(self.vao);
            gl.delete_buffer(self.vbo);
        }
    }
}
