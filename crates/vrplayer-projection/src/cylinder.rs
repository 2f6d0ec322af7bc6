use crate::Vertex;

const COLUMNS: u32 = 64;
const ANGLE_START: f64 = -0.8;
const ANGLE_END: f64 = 0.8;
const HALF_HEIGHT: f64 = 1.5;
/// Flattens the arc's depth so the curve is shallower than a true circle.
const DEPTH_SQUASH: f64 = 0.6;

pub(crate) fn radius_for(aspect: f64) -> f64 {
    let target_radius = HALF_HEIGHT * aspect;
    2.0 * (target_radius / (ANGLE_END.sin() - ANGLE_START.sin()))
}

/// Horizontal arc of quads in front of the viewer.
pub(crate) fn build(aspect: f64, zoom: f64) -> Vec<Vertex> {
    build_with_columns(aspect, zoom, COLUMNS)
}

fn build_with_columns(aspect: f64, zoom: f64, columns: u32) -> Vec<Vertex> {
    let radius = radius_for(aspect);
    let span = ANGLE_END - ANGLE_START;
    let mut out = Vec::with_capacity(columns as usize * 6);

    for column in 0..columns {
        let t1 = column as f64 / columns as f64;
        let t2 = (column + 1) as f64 / columns as f64;
        let a1 = ANGLE_START + t1 * span;
        let a2 = ANGLE_START + t2 * span;

        let (x1, z1) = (a1.sin() * radius, a1.cos() * radius * DEPTH_SQUASH + zoom);
        let (x2, z2) = (a2.sin() * radius, a2.cos() * radius * DEPTH_SQUASH + zoom);

        out.push(Vertex::new(x1, HALF_HEIGHT, z1, 1.0 - t1, 0.0));
        out.push(Vertex::new(x2, HALF_HEIGHT, z2, 1.0 - t2, 0.0));
        out.push(Vertex::new(x1, -HALF_HEIGHT, z1, 1.0 - t1, 1.0));

        out.push(Vertex::new(x1, -HALF_HEIGHT, z1, 1.0 - t1, 1.0));
        out.push(Vertex::new(x2, HALF_HEIGHT, z2, 1.0 - t2, 0.0));
        out.push(Vertex::new(x2, -HALF_HEIGHT, z2, 1.0 - t2, 1.0));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord_width(mesh: &[Vertex]) -> f32 {
        let min = mesh.iter().map(|v| v.position[0]).fold(f32::MAX, f32::min);
        let max = mesh.iter().map(|v| v.position[0]).fold(f32::MIN, f32::max);
        max - min
    }

    #[test]
    fn chord_matches_aspect_times_height() {
        for aspect in [1.0, 16.0 / 9.0, 2.4] {
            for columns in [4, 64, 257] {
                let mesh = build_with_columns(aspect, 1.0, columns);
                let full_height = (2.0 * HALF_HEIGHT) as f32;
                let expected = aspect as f32 * full_height;
                let width = chord_width(&mesh);
                assert!(
                    (width - expected).abs() < 1e-4,
                    "aspect {aspect} columns {columns}: {width} vs {expected}"
                );
            }
        }
    }

    #[test]
    fn uv_spans_source() {
        let mesh = build(1.5, 0.0);
        assert_eq!(mesh[0].uv, [1.0, 0.0]);
        assert_eq!(mesh.last().unwrap().uv, [0.0, 1.0]);
        assert!(mesh.iter().all(|v| v.position[1].abs() == HALF_HEIGHT as f32));
    }

    #[test]
    fn zoom_offsets_depth() {
        let mesh = build(1.0, 2.0);
        let centre = &mesh[(COLUMNS as usize / 2) * 6];
        let expected = (radius_for(1.0) * DEPTH_SQUASH + 2.0) as f32;
        assert!((centre.position[2] - expected).abs() < 1e-5);
    }
}
