// SPDX-License-Identifier: CEPL-1.0
//! Hex-grid terrain geometry and the animated orbit camera.
use hexa_math::{HexGridLayout, Mat4, OrbitCamera, Vec2, Vec3};
use hexa_platform::CameraInput;
use hexa_render::{CameraSource, CameraUniforms, GeometryBatch, InstanceData, RenderSize, Vertex};
use std::time::Instant;

const SIDES: u16 = 6;
const INNER_RADIUS: f32 = 0.9;
const ROTATION_DEG: f32 = 30.0;
const HALF_HEIGHT: f32 = 1.0;
const TOP_BORDER: f32 = 0.111;
const BOTTOM_BORDER: f32 = 0.11;
const SIDE_BORDER: f32 = 0.1;
/// Unit-mesh to world scale; tiles then meet at the grid spacing.
const MESH_SCALE: f32 = 0.1;
/// Radians per arrow-key press.
const ORBIT_STEP: f32 = 0.1;
/// Field-of-view degrees per wheel line.
const ZOOM_STEP: f32 = 1.0;

const GREEN: [f32; 3] = [0.293, 0.711, 0.129];
const BROWN: [f32; 3] = [0.367, 0.172, 0.039];
const BLACK: [f32; 3] = [0.0, 0.0, 0.0];
const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

fn vertex(pos: Vec3, color: [f32; 3]) -> Vertex {
    Vertex {
        pos: pos.to_array(),
        color,
    }
}

fn centroid(verts: &[Vertex]) -> Vec3 {
    let sum = verts
        .iter()
        .fold(Vec3::ZERO, |acc, v| acc + Vec3::from_array(v.pos));
    sum / verts.len() as f32
}

/// Regular hexagon ring at `z`, followed by its center vertex.
fn ring_with_center(z: f32, color: [f32; 3], out: &mut Vec<Vertex>) {
    let step = 360.0_f32.to_radians() / SIDES as f32;
    for i in 0..SIDES {
        let angle = i as f32 * step + ROTATION_DEG.to_radians();
        let (s, c) = angle.sin_cos();
        out.push(vertex(Vec3::new(INNER_RADIUS * c, INNER_RADIUS * s, z), color));
    }
    out.push(vertex(Vec3::new(0.0, 0.0, z), color));
}

/// Copies `ring`, each vertex pushed `offset` away from the ring centroid.
fn offset_ring(ring: &[Vertex], offset: f32, color: [f32; 3], out: &mut Vec<Vertex>) {
    let center = centroid(ring);
    for v in ring {
        let p = Vec3::from_array(v.pos);
        let dir = (p - center).normalize_or_zero();
        out.push(vertex(p + dir * offset, color));
    }
}

/// Inset copy of a quad plus its centroid.
fn inset_quad(quad: &[Vertex; 4], offset: f32) -> ([Vec3; 4], Vec3) {
    let center = centroid(quad);
    let inset = quad.map(|v| {
        let p = Vec3::from_array(v.pos);
        p + (center - p).normalize_or_zero() * offset
    });
    (inset, center)
}

fn push(verts: &mut Vec<Vertex>, v: Vertex) -> u16 {
    verts.push(v);
    (verts.len() - 1) as u16
}

/// One cap (top or bottom): filled hexagon plus a black border ring.
/// Returns the base index of the outer border ring.
fn cap(z: f32, fill: [f32; 3], border: f32, top: bool, verts: &mut Vec<Vertex>, idx: &mut Vec<u16>) -> u16 {
    let fill_base = verts.len() as u16;
    ring_with_center(z, fill, verts);
    let center = fill_base + SIDES;
    for i in 0..SIDES {
        let (a, b) = (fill_base + i, fill_base + (i + 1) % SIDES);
        if top {
            idx.extend_from_slice(&[a, b, center]);
        } else {
            idx.extend_from_slice(&[a, center, b]);
        }
    }

    let inner_base = verts.len() as u16;
    let ring: Vec<Vertex> = verts[fill_base as usize..center as usize].to_vec();
    offset_ring(&ring, 0.0, BLACK, verts);
    let outer_base = verts.len() as u16;
    let inner: Vec<Vertex> = verts[inner_base as usize..outer_base as usize].to_vec();
    offset_ring(&inner, border, BLACK, verts);

    for i in 0..SIDES {
        let (ic, inx) = (inner_base + i, inner_base + (i + 1) % SIDES);
        let (oc, on) = (outer_base + i, outer_base + (i + 1) % SIDES);
        if top {
            idx.extend_from_slice(&[ic, oc, on, ic, on, inx]);
        } else {
            idx.extend_from_slice(&[oc, ic, on, on, ic, inx]);
        }
    }
    outer_base
}

/// A single tile: green top, white bottom, black borders. Edge tiles also
/// get brown side walls framed in black.
pub fn hex_tile_mesh(include_sides: bool) -> (Vec<Vertex>, Vec<u16>) {
    let mut verts = Vec::new();
    let mut idx = Vec::new();

    let top_outer = cap(HALF_HEIGHT, GREEN, TOP_BORDER, true, &mut verts, &mut idx);
    let bottom_outer = cap(-HALF_HEIGHT, WHITE, BOTTOM_BORDER, false, &mut verts, &mut idx);

    if include_sides {
        for i in 0..SIDES {
            let next = (i + 1) % SIDES;
            let quad = [
                verts[(top_outer + i) as usize],
                verts[(bottom_outer + i) as usize],
                verts[(bottom_outer + next) as usize],
                verts[(top_outer + next) as usize],
            ]
            .map(|v| Vertex { color: BLACK, ..v });

            let frame: [u16; 4] = quad.map(|v| push(&mut verts, v));
            let (inset, center) = inset_quad(&quad, SIDE_BORDER);
            let inner: [u16; 4] = inset.map(|p| push(&mut verts, vertex(p, BLACK)));
            let brown: [u16; 4] = inset.map(|p| push(&mut verts, vertex(p, BROWN)));
            let hub = push(&mut verts, vertex(center, BROWN));

            for k in 0..4 {
                let n = (k + 1) % 4;
                idx.extend_from_slice(&[frame[k], frame[n], inner[n], frame[k], inner[n], inner[k]]);
            }
            for k in 0..4 {
                idx.extend_from_slice(&[brown[k], brown[(k + 1) % 4], hub]);
            }
        }
    }

    for v in &mut verts {
        v.pos = (Vec3::from_array(v.pos) * MESH_SCALE).to_array();
    }
    (verts, idx)
}

fn instances(offsets: &[Vec2]) -> Vec<InstanceData> {
    offsets
        .iter()
        .map(|o| InstanceData {
            offset: o.to_array(),
        })
        .collect()
}

/// "edge" tiles (with walls) and "internal" tiles; a grid too small to have
/// an interior yields only the edge batch.
pub fn hex_grid_batches(width: u32, height: u32) -> Vec<GeometryBatch> {
    let layout = HexGridLayout::new(width, height);
    let mut batches = Vec::with_capacity(2);
    for (label, sides, offsets) in [
        ("edge", true, &layout.edge),
        ("internal", false, &layout.internal),
    ] {
        if offsets.is_empty() {
            continue;
        }
        let (vertices, indices) = hex_tile_mesh(sides);
        batches.push(GeometryBatch {
            label: label.into(),
            vertices,
            indices,
            instances: instances(offsets),
        });
    }
    batches
}

pub fn camera_uniforms_at(cam: &OrbitCamera, seconds: f32, extent: RenderSize) -> CameraUniforms {
    CameraUniforms {
        model: Mat4::IDENTITY.to_cols_array_2d(),
        view: cam.view(seconds).to_cols_array_2d(),
        proj: cam.projection(extent.aspect()).to_cols_array_2d(),
    }
}

/// Orbit camera animated by wall-clock time since construction.
pub struct TerrainCamera {
    orbit: OrbitCamera,
    start: Instant,
}

impl TerrainCamera {
    pub fn new(orbit: OrbitCamera) -> Self {
        Self {
            orbit,
            start: Instant::now(),
        }
    }

    pub fn apply_input(&mut self, input: CameraInput) {
        if input.is_idle() {
            return;
        }
        self.orbit.nudge(
            input.azimuth_steps as f32 * ORBIT_STEP,
            input.polar_steps as f32 * ORBIT_STEP,
        );
        self.orbit.zoom(input.scroll * ZOOM_STEP);
    }
}

impl CameraSource for TerrainCamera {
    fn camera_uniforms(&mut self, extent: RenderSize) -> CameraUniforms {
        let seconds = self.start.elapsed().as_secs_f32();
        camera_uniforms_at(&self.orbit, seconds, extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_form_triangles_within_bounds() {
        for sides in [false, true] {
            let (verts, idx) = hex_tile_mesh(sides);
            assert_eq!(idx.len() % 3, 0);
            assert!(idx.iter().all(|&i| (i as usize) < verts.len()));
        }
    }

    #[test]
    fn side_walls_only_on_edge_tiles() {
        let (plain_v, plain_i) = hex_tile_mesh(false);
        let (edge_v, edge_i) = hex_tile_mesh(true);
        // two caps: 7 fill + 6 inner border + 6 outer border each
        assert_eq!(plain_v.len(), 38);
        assert_eq!(plain_i.len(), 2 * (6 * 3 + 6 * 6));
        // per wall: 4 frame + 4 inset + 4 brown + hub
        assert_eq!(edge_v.len(), 38 + 6 * 13);
        assert_eq!(edge_i.len(), plain_i.len() + 6 * (4 * 6 + 4 * 3));
        assert!(edge_v.iter().any(|v| v.color == BROWN));
        assert!(!plain_v.iter().any(|v| v.color == BROWN));
    }

    #[test]
    fn caps_sit_at_scaled_height() {
        let (verts, _) = hex_tile_mesh(false);
        let top = verts[SIDES as usize];
        assert_eq!(top.color, GREEN);
        assert!((top.pos[2] - HALF_HEIGHT * MESH_SCALE).abs() < 1e-6);
        assert!(verts.iter().all(|v| v.pos[2].abs() <= HALF_HEIGHT * MESH_SCALE + 1e-6));
        assert!(verts.iter().any(|v| v.color == WHITE && v.pos[2] < 0.0));
    }

    #[test]
    fn border_ring_is_wider_than_fill() {
        let (verts, _) = hex_tile_mesh(false);
        let fill = Vec2::new(verts[0].pos[0], verts[0].pos[1]).length();
        let outer = Vec2::new(verts[13].pos[0], verts[13].pos[1]).length();
        assert!((fill - INNER_RADIUS * MESH_SCALE).abs() < 1e-5);
        assert!((outer - (INNER_RADIUS + TOP_BORDER) * MESH_SCALE).abs() < 1e-5);
    }

    #[test]
    fn ten_by_ten_grid_splits_edge_and_interior() {
        let batches = hex_grid_batches(10, 10);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].label, "edge");
        assert_eq!(batches[0].instances.len(), 36);
        assert_eq!(batches[1].instances.len(), 64);
        assert!(batches.iter().all(GeometryBatch::is_instanced));
    }

    #[test]
    fn small_grid_has_no_interior_batch() {
        let batches = hex_grid_batches(2, 2);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].instances.len(), 4);
        assert!(hex_grid_batches(0, 5).is_empty());
    }

    #[test]
    fn camera_projection_tracks_extent() {
        let cam = OrbitCamera::default();
        let wide = camera_uniforms_at(&cam, 0.0, RenderSize::new(1600, 800));
        let square = camera_uniforms_at(&cam, 0.0, RenderSize::new(800, 800));
        assert_eq!(wide.model, Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(wide.view, square.view);
        // x scale halves when the aspect doubles
        let ratio = wide.proj[0][0] / square.proj[0][0];
        assert!((ratio - 0.5).abs() < 1e-5);
    }

    #[test]
    fn camera_moves_over_time() {
        let cam = OrbitCamera::default();
        let a = camera_uniforms_at(&cam, 0.0, RenderSize::new(800, 600));
        let b = camera_uniforms_at(&cam, 2.0, RenderSize::new(800, 600));
        assert_ne!(a.view, b.view);
        assert_eq!(a.proj, b.proj);
    }

    #[test]
    fn arrows_and_wheel_steer_the_camera() {
        let mut cam = TerrainCamera::new(OrbitCamera::default());
        cam.apply_input(CameraInput {
            azimuth_steps: -3,
            polar_steps: 2,
            scroll: -5.0,
        });
        assert!((cam.orbit.azimuth + 0.3).abs() < 1e-6);
        assert!((cam.orbit.polar - 0.8).abs() < 1e-6);
        assert_eq!(cam.orbit.fov_degrees, 40.0);

        // wheel up past the limit holds at 45 degrees
        cam.apply_input(CameraInput {
            scroll: 20.0,
            ..Default::default()
        });
        assert_eq!(cam.orbit.fov_degrees, 45.0);
    }
}
