use glow::HasContext;
use tracing::debug;
use vrplayer_core::RenderError;
use vrplayer_projection::{Mesh, Vertex};

pub const ATTRIB_POSITION: u32 = 0;
pub const ATTRIB_UV: u32 = 1;

/// Vertex array + buffer holding the current projection mesh.
pub struct MeshBuffer {
    vao: glow::VertexArray,
    vbo: glow::Buffer,
    vertex_count: i32,
}

impl MeshBuffer {
    pub fn new(gl: &glow::Context, mesh: &Mesh) -> Result<Self, RenderError> {
        unsafe {
            let vao = gl
                .create_vertex_array()
                .map_err(|reason| RenderError::allocation("vertex array", reason))?;
            let vbo = gl
                .create_buffer()
                .map_err(|reason| RenderError::allocation("vertex buffer", reason))?;

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.enable_vertex_attrib_array(ATTRIB_POSITION);
            gl.vertex_attrib_pointer_f32(ATTRIB_POSITION, 3, glow::FLOAT, false, Vertex::STRIDE as i32, 0);
            gl.enable_vertex_attrib_array(ATTRIB_UV);
            gl.vertex_attrib_pointer_f32(
                ATTRIB_UV,
                2,
                glow::FLOAT,
                false,
                Vertex::STRIDE as i32,
                Vertex::UV_OFFSET as i32,
            );
            gl.bind_vertex_array(None);

            let mut buffer = Self { vao, vbo, vertex_count: 0 };
            buffer.replace(gl, mesh);
            Ok(buffer)
        }
    }

    /// Upload a rebuilt mesh over the previous one.
    pub fn replace(&mut self, gl: &glow::Context, mesh: &Mesh) {
        unsafe {
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vbo));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, mesh.as_bytes(), glow::STATIC_DRAW);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
        }
        self.vertex_count = mesh.vertices.len() as i32;
        debug!("Mesh[{}] uploaded: {} triangles", mesh.topology, mesh.triangle_count());
    }

    pub fn draw(&self, gl: &glow::Context) {
        unsafe {
            gl.bind_vertex_array(Some(self.vao));
            gl.draw_arrays(glow::TRIANGLES, 0, self.vertex_count);
            gl.bind_vertex_array(None);
        }
    }

    pub fn destroy(self, gl: &glow::Context) {
        unsafe {
            gl.delete_vertex_array(self.vao);
            gl.delete_buffer(self.vbo);
        }
    }
}
