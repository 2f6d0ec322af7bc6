use crate::Vertex;

const COLUMNS: u32 = 32;
const ROWS: u32 = 32;
/// Angular span of the surface, both around and top to bottom.
const SPAN: f64 = 3.14;
const RADIUS_HEIGHT: f64 = 1.0;

/// Latitude/longitude half sphere around the viewer.
pub(crate) fn build(aspect: f64, zoom: f64) -> Vec<Vertex> {
    let radius = RADIUS_HEIGHT * aspect * 0.5;
    let mut out = Vec::with_capacity((COLUMNS * ROWS * 6) as usize);

    let point = |column: u32, row: u32| -> Vertex {
        let around = column as f64 / COLUMNS as f64 * SPAN;
        let down = row as f64 / ROWS as f64 * SPAN;
        let ring = down.sin();
        Vertex::new(
            -around.cos() * radius * ring,
            down.cos() * RADIUS_HEIGHT,
            around.sin() * radius * ring + zoom,
            1.0 - column as f64 / COLUMNS as f64,
            row as f64 / ROWS as f64,
        )
    };

    for row in 0..ROWS {
        for column in 0..COLUMNS {
            out.push(point(column, row));
            out.push(point(column + 1, row));
            out.push(point(column, row + 1));

            out.push(point(column, row + 1));
            out.push(point(column + 1, row + 1));
            out.push(point(column + 1, row));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uv_is_mirrored_horizontally() {
        let mesh = build(16.0 / 9.0, 0.0);
        // first vertex: column 0, row 0 → right edge of the source, top row
        assert_eq!(mesh[0].uv, [1.0, 0.0]);
        // second vertex steps one column to the left in texture space
        assert_eq!(mesh[1].uv, [1.0 - 1.0 / 32.0, 0.0]);
        let last = mesh.last().unwrap();
        assert_eq!(last.uv[1], 31.0 / 32.0);
    }

    #[test]
    fn zoom_moves_surface_along_view_axis() {
        let near = build(2.0, 0.0);
        let far = build(2.0, 0.5);
        for (a, b) in near.iter().zip(&far) {
            assert!((b.position[2] - a.position[2] - 0.5).abs() < 1e-6);
            assert_eq!(a.position[0], b.position[0]);
            assert_eq!(a.uv, b.uv);
        }
    }

    #[test]
    fn radius_follows_aspect() {
        let mesh = build(2.0, 0.0);
        let widest = mesh
            .iter()
            .map(|v| v.position[0].abs())
            .fold(0.0f32, f32::max);
        // radius = aspect * 0.5 = 1.0, reached at the equator on the sides
        assert!(widest <= 1.0 + 1e-6);
        assert!(widest > 0.99);
    }
}
