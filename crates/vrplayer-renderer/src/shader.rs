use glow::HasContext;
use tracing::debug;
use vrplayer_core::RenderError;

// ── Sources ───────────────────────────────────────────────────────────────────

/// Projects the mesh and picks the eye's horizontal slice of the source.
/// Mesh z grows away from the viewer; GL looks down −z.
pub const SCENE_VERTEX: &str = r#"#version 330 core
uniform mat4 mvp;
uniform float uv_scale;
uniform float uv_offset;
layout(location = 0) in vec3 position;
layout(location = 1) in vec2 uv_in;
out vec2 uv;

void main() {
    uv = vec2((1.0 - uv_in.x) * uv_scale + uv_offset, uv_in.y);
    gl_Position = mvp * vec4(position.xy, -position.z, 1.0);
}
"#;

/// Samples the source and composites the cursor sprite over it.
pub const SCENE_FRAGMENT: &str = r#"#version 330 core
uniform sampler2D source;
uniform sampler2D cursor;
uniform vec2 cursor_location;
uniform vec2 cursor_size;
in vec2 uv;
out vec4 frag_color;

void main() {
    vec4 col = texture(source, uv);
    vec2 diff = (cursor_location + cursor_size) - uv;
    vec2 arrow_uv = (cursor_size - diff) / max(cursor_size, vec2(1e-6));
    vec4 arrow = texture(cursor, arrow_uv);
    float a = arrow.a;
    if (cursor_size.x <= 0.0
        || any(lessThan(arrow_uv, vec2(0.0)))
        || any(greaterThan(arrow_uv, vec2(1.0)))) {
        a = 0.0;
    }
    frag_color = vec4(mix(col.rgb, arrow.rgb, a), 1.0);
}
"#;

/// Textured quad for the desktop preview; v is flipped because eye
/// textures are stored bottom-up.
pub const COMPANION_VERTEX: &str = r#"#version 330 core
layout(location = 0) in vec2 position;
layout(location = 1) in vec2 uv_in;
out vec2 uv;

void main() {
    uv = vec2(uv_in.x, 1.0 - uv_in.y);
    gl_Position = vec4(position, 0.0, 1.0);
}
"#;

pub const COMPANION_FRAGMENT: &str = r#"#version 330 core
uniform sampler2D eye;
in vec2 uv;
out vec4 frag_color;

void main() {
    frag_color = texture(eye, uv);
}
"#;

// ── Program ───────────────────────────────────────────────────────────────────

/// A linked program. Deleted explicitly with [`Program::destroy`] since the
/// context must be current.
pub struct Program {
    pub name: &'static str,
    pub raw: glow::Program,
}

impl Program {
    pub fn compile(
        gl: &glow::Context,
        name: &'static str,
        vertex: &str,
        fragment: &str,
    ) -> Result<Self, RenderError> {
        unsafe {
            let vs = compile_stage(gl, name, glow::VERTEX_SHADER, vertex)?;
            let fs = match compile_stage(gl, name, glow::FRAGMENT_SHADER, fragment) {
                Ok(fs) => fs,
                Err(e) => {
                    gl.delete_shader(vs);
                    return Err(e);
                }
            };

            let program = gl
                .create_program()
                .map_err(|reason| RenderError::allocation("shader program", reason))?;
            gl.attach_shader(program, vs);
            gl.attach_shader(program, fs);
            gl.link_program(program);
            gl.detach_shader(program, vs);
            gl.detach_shader(program, fs);
            gl.delete_shader(vs);
            gl.delete_shader(fs);

            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(RenderError::ProgramLink { program: name.into(), log });
            }
            debug!("Shader[{}] linked", name);
            Ok(Self { name, raw: program })
        }
    }

    pub fn uniform(&self, gl: &glow::Context, uniform: &str) -> Result<glow::UniformLocation, RenderError> {
        unsafe { gl.get_uniform_location(self.raw, uniform) }.ok_or_else(|| RenderError::MissingUniform {
            program: self.name.into(),
            name: uniform.into(),
        })
    }

    pub fn destroy(&self, gl: &glow::Context) {
        unsafe { gl.delete_program(self.raw) };
    }
}

unsafe fn compile_stage(
    gl: &glow::Context,
    program: &str,
    stage: u32,
    source: &str,
) -> Result<glow::Shader, RenderError> {
    let stage_name = if stage == glow::VERTEX_SHADER { "vertex" } else { "fragment" };
    let shader = gl
        .create_shader(stage)
        .map_err(|reason| RenderError::allocation("shader", reason))?;
    gl.shader_source(shader, source);
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(RenderError::ShaderCompilation {
            program: program.into(),
            stage: stage_name.into(),
            log,
        });
    }
    Ok(shader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_shaders_declare_uniforms_the_pipeline_looks_up() {
        for name in ["uniform mat4 mvp;", "uniform float uv_scale;", "uniform float uv_offset;"] {
            assert!(SCENE_VERTEX.contains(name), "missing {name}");
        }
        for name in ["source", "cursor", "cursor_location", "cursor_size"] {
            assert!(SCENE_FRAGMENT.contains(name), "missing {name}");
        }
    }

    #[test]
    fn sources_start_with_version_directive() {
        for src in [SCENE_VERTEX, SCENE_FRAGMENT, COMPANION_VERTEX, COMPANION_FRAGMENT] {
            assert!(src.starts_with("#version 330 core\n"));
        }
    }
}
