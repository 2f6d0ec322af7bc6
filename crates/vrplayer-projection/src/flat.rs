use crate::Vertex;

const HALF_HEIGHT: f64 = 0.5;

/// Two triangles facing the viewer.
///
/// Without `stretch` the quad is half as wide, for sources whose halves are
/// meant for separate eyes.
pub(crate) fn build(aspect: f64, zoom: f64, stretch: bool) -> Vec<Vertex> {
    let h = HALF_HEIGHT;
    let w = half_width(aspect, stretch);
    vec![
        Vertex::new(-w, h, zoom, 1.0, 0.0),
        Vertex::new(w, h, zoom, 0.0, 0.0),
        Vertex::new(-w, -h, zoom, 1.0, 1.0),
        Vertex::new(-w, -h, zoom, 1.0, 1.0),
        Vertex::new(w, -h, zoom, 0.0, 1.0),
        Vertex::new(w, h, zoom, 0.0, 0.0),
    ]
}

pub(crate) fn half_width(aspect: f64, stretch: bool) -> f64 {
    HALF_HEIGHT * if stretch { 1.0 } else { 0.5 } * aspect
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build as build_mesh;
    use vrplayer_core::{Resolution, Topology};

    #[test]
    fn stretched_widescreen_quad() {
        let mesh = build_mesh(Topology::FlatQuad, Resolution::new(1777, 1000), 1.0, true, 0);
        assert_eq!(mesh.triangle_count(), 2);

        let (mut umin, mut umax, mut vmin, mut vmax) = (f32::MAX, f32::MIN, f32::MAX, f32::MIN);
        for v in &mesh.vertices {
            umin = umin.min(v.uv[0]);
            umax = umax.max(v.uv[0]);
            vmin = vmin.min(v.uv[1]);
            vmax = vmax.max(v.uv[1]);
        }
        assert_eq!((umin, umax, vmin, vmax), (0.0, 1.0, 0.0, 1.0));

        let expected = (0.5 * 1.0 * 1.777) as f32;
        let width = mesh.vertices.iter().map(|v| v.position[0]).fold(f32::MIN, f32::max);
        assert!((width - expected).abs() < 1e-6, "{width} vs {expected}");
        assert!(mesh.vertices.iter().all(|v| v.position[2] == 1.0));
    }

    #[test]
    fn unstretched_quad_is_half_as_wide() {
        assert_eq!(half_width(2.0, false) * 2.0, half_width(2.0, true));
    }
}
