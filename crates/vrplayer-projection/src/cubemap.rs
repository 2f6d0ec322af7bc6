use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec3};
use vrplayer_core::Resolution;

use crate::Vertex;

/// Tessellation of each cube face, per axis.
const SEGMENTS: u32 = 32;
const FACE_DEPTH: f32 = 1.0;

/// Sub-rectangle of the source texture sampled by one face.
#[derive(Debug, Clone, Copy)]
struct UvRect {
    width: f32,
    height: f32,
    offset_x: f32,
    offset_y: f32,
}

/// 360° source laid out as a 3×2 cubemap: the top row holds the
/// right/front/left faces, the bottom row holds top/back/bottom.
pub(crate) fn build(source: Resolution, zoom: f64, border_inset: u32) -> Vec<Vertex> {
    let (tex_w, tex_h) = (source.width as f32, source.height as f32);
    let px = border_inset as f32 / tex_w;
    let py = border_inset as f32 / tex_h;

    let face_w = (1.0 - px * 2.0) / 3.0;
    let face_h = (1.0 - py * 2.0) * 0.5;
    let zoom_v = zoom as f32 / tex_h;

    let face_len = (SEGMENTS * SEGMENTS * 6) as usize;
    let mut out = Vec::with_capacity(face_len * 6);

    for i in 0..3 {
        let mut face = segmented_plane(UvRect {
            width: face_w,
            height: face_h - zoom_v,
            offset_x: face_w * (2 - i) as f32 + px,
            offset_y: py + zoom_v,
        });
        normalize_depth(&mut face, FACE_DEPTH);
        rotate_triangles(&mut face, -FRAC_PI_2 + i as f32 * FRAC_PI_2, Vec3::Y);
        out.extend(face);
    }

    for i in 0..3 {
        let mut face = segmented_plane(UvRect {
            width: face_w,
            height: face_h - zoom_v,
            offset_x: px + face_w * i as f32,
            offset_y: 0.5,
        });
        normalize_depth(&mut face, FACE_DEPTH);
        rotate_triangles(&mut face, -FRAC_PI_2, Vec3::Z);
        rotate_triangles(&mut face, -FRAC_PI_2 - i as f32 * FRAC_PI_2, Vec3::X);
        out.extend(face);
    }

    out
}

/// Unit square at `z = FACE_DEPTH` split into `SEGMENTS²` quads.
///
/// Positions run from +1 to −1 on both axes while the uv runs forward
/// through `uv`, which mirrors the face the same way the other topologies are
/// mirrored.
fn segmented_plane(uv: UvRect) -> Vec<Vertex> {
    let (width, height) = (1.0f32, 1.0f32);
    let seg_w = width / SEGMENTS as f32;
    let seg_h = height / SEGMENTS as f32;
    let seg_u = uv.width / SEGMENTS as f32;
    let seg_v = uv.height / SEGMENTS as f32;

    let vertex = |x: f32, y: f32, u: f32, v: f32| Vertex {
        position: [x, y, FACE_DEPTH],
        uv: [u, v],
    };

    let mut out = Vec::with_capacity((SEGMENTS * SEGMENTS * 6) as usize);
    for row in 0..SEGMENTS {
        let y = height - seg_h * 2.0 * row as f32;
        let v = seg_v * row as f32 + uv.offset_y;
        for column in 0..SEGMENTS {
            let x = width - seg_w * 2.0 * column as f32;
            let u = seg_u * column as f32 + uv.offset_x;

            out.push(vertex(x, y, u, v));
            out.push(vertex(x - seg_w * 2.0, y, u + seg_u, v));
            out.push(vertex(x - seg_w * 2.0, y - seg_h * 2.0, u + seg_u, v + seg_v));

            out.push(vertex(x - seg_w * 2.0, y - seg_h * 2.0, u + seg_u, v + seg_v));
            out.push(vertex(x, y - seg_h * 2.0, u, v + seg_v));
            out.push(vertex(x, y, u, v));
        }
    }
    out
}

/// Push every vertex onto the sphere of radius `depth`.
fn normalize_depth(vertices: &mut [Vertex], depth: f32) {
    for v in vertices {
        let p = Vec3::from_array(v.position);
        v.position = (p / p.length() * depth).to_array();
    }
}

/// Rotate each triangle by `angle` around `axis`, expressed relative to the
/// triangle centroid: `v' = R · T(c) · (v − c)`.
fn rotate_triangles(vertices: &mut [Vertex], angle: f32, axis: Vec3) {
    let rotation = Mat4::from_quat(Quat::from_axis_angle(axis, angle));
    for tri in vertices.chunks_exact_mut(3) {
        let points = [
            Vec3::from_array(tri[0].position),
            Vec3::from_array(tri[1].position),
            Vec3::from_array(tri[2].position),
        ];
        let centre = (points[0] + points[1] + points[2]) / 3.0;
        let transform = rotation * Mat4::from_translation(centre);
        for (vertex, point) in tri.iter_mut().zip(points) {
            vertex.position = transform.transform_point3(point - centre).to_array();
        }
    }
}
