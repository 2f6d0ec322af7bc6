//! vrplayer-projection — surface meshes for captured content.
//!
//! Every topology is generated from scratch by [`build`]; there is no
//! incremental update. Callers rebuild whenever the source size, zoom or
//! stretch flag changes and replace the previous mesh wholesale.
//!
//! # Conventions
//! ```text
//!            +y
//!             │
//!             │   viewer at origin, content in front along +z
//!             └──── +x          (the scene shader negates z)
//!
//! u runs right→left across the source (column 0 samples the right edge),
//! v runs top→bottom.
//! ```

mod cubemap;
mod cylinder;
mod flat;
mod hemisphere;

use tracing::debug;
use vrplayer_core::{Resolution, Topology};

// ── Vertex ────────────────────────────────────────────────────────────────────

/// Interleaved vertex as uploaded to the GPU: position then uv.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const STRIDE: usize = std::mem::size_of::<Vertex>();
    pub const UV_OFFSET: usize = std::mem::size_of::<[f32; 3]>();

    pub(crate) fn new(x: f64, y: f64, z: f64, u: f64, v: f64) -> Self {
        Self {
            position: [x as f32, y as f32, z as f32],
            uv: [u as f32, v as f32],
        }
    }
}

// ── Mesh ──────────────────────────────────────────────────────────────────────

/// Triangle list plus the cursor stretch factor that goes with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub topology: Topology,
    pub vertices: Vec<Vertex>,
    /// Horizontal stretch applied to the cursor sprite on this surface.
    pub cursor_aspect: f32,
}

impl Mesh {
    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Raw bytes of the vertex array for buffer upload.
    pub fn as_bytes(&self) -> &[u8] {
        let len = self.vertices.len() * Vertex::STRIDE;
        // SAFETY: Vertex is repr(C) and made only of f32, so it has no padding
        // and every byte is initialised.
        unsafe { std::slice::from_raw_parts(self.vertices.as_ptr().cast::<u8>(), len) }
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Generate the mesh for `topology`.
///
/// `source` is the size of the content texture; only its aspect ratio matters
/// except for [`Topology::CubemapSphere360`], which measures `border_inset`
/// and `zoom` in texels of it.
pub fn build(
    topology: Topology,
    source: Resolution,
    zoom: f32,
    stretch: bool,
    border_inset: u32,
) -> Mesh {
    let source = source.at_least_one();
    let aspect = source.aspect_ratio();
    let zoom = zoom as f64;

    let (vertices, cursor_aspect) = match topology {
        Topology::HemisphereSphere => (hemisphere::build(aspect, zoom), aspect),
        Topology::CubemapSphere360 => (cubemap::build(source, zoom, border_inset), aspect),
        Topology::Cylinder => (cylinder::build(aspect, zoom), aspect),
        Topology::FlatQuad => {
            let cursor_aspect = if stretch { aspect * 2.0 } else { aspect };
            (flat::build(aspect, zoom, stretch), cursor_aspect)
        }
    };

    debug!(
        "Mesh[{}] {} triangles for {} (zoom {:.3})",
        topology,
        vertices.len() / 3,
        source,
        zoom
    );

    Mesh {
        topology,
        vertices,
        cursor_aspect: cursor_aspect as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Topology; 4] = [
        Topology::HemisphereSphere,
        Topology::CubemapSphere360,
        Topology::Cylinder,
        Topology::FlatQuad,
    ];

    #[test]
    fn build_is_deterministic() {
        let source = Resolution::new(2560, 1440);
        for topology in ALL {
            let a = build(topology, source, 0.35, true, 3);
            let b = build(topology, source, 0.35, true, 3);
            assert_eq!(a.as_bytes(), b.as_bytes(), "{topology} differs between builds");
            assert_eq!(a.cursor_aspect.to_bits(), b.cursor_aspect.to_bits());
        }
    }

    #[test]
    fn every_topology_emits_whole_triangles() {
        let source = Resolution::new(1920, 1080);
        for topology in ALL {
            let mesh = build(topology, source, 0.0, false, 0);
            assert!(!mesh.vertices.is_empty());
            assert_eq!(mesh.vertices.len() % 3, 0, "{topology}");
            assert!(mesh
                .vertices
                .iter()
                .all(|v| v.position.iter().chain(v.uv.iter()).all(|c| c.is_finite())));
        }
    }

    #[test]
    fn expected_triangle_counts() {
        let source = Resolution::new(1920, 1080);
        assert_eq!(build(Topology::HemisphereSphere, source, 0.0, true, 0).triangle_count(), 32 * 32 * 2);
        assert_eq!(build(Topology::Cylinder, source, 0.0, true, 0).triangle_count(), 64 * 2);
        assert_eq!(build(Topology::CubemapSphere360, source, 0.0, true, 0).triangle_count(), 6 * 32 * 32 * 2);
        assert_eq!(build(Topology::FlatQuad, source, 0.0, true, 0).triangle_count(), 2);
    }

    #[test]
    fn zero_sized_source_is_clamped() {
        let mesh = build(Topology::FlatQuad, Resolution::new(0, 0), 1.0, true, 0);
        assert_eq!(mesh.cursor_aspect, 2.0);
        assert!(mesh.vertices.iter().all(|v| v.position[0].is_finite()));
    }

    #[test]
    fn cursor_aspect_doubles_only_for_stretched_flat() {
        let source = Resolution::new(2000, 1000);
        assert_eq!(build(Topology::FlatQuad, source, 1.0, true, 0).cursor_aspect, 4.0);
        assert_eq!(build(Topology::FlatQuad, source, 1.0, false, 0).cursor_aspect, 2.0);
        assert_eq!(build(Topology::Cylinder, source, 1.0, true, 0).cursor_aspect, 2.0);
    }

    #[test]
    fn byte_view_matches_vertex_count() {
        let mesh = build(Topology::FlatQuad, Resolution::new(16, 9), 1.0, true, 0);
        assert_eq!(mesh.as_bytes().len(), 6 * Vertex::STRIDE);
        assert_eq!(Vertex::STRIDE, 20);
        assert_eq!(Vertex::UV_OFFSET, 12);
    }
}
