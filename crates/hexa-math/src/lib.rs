// SPDX-License-Identifier: CEPL-1.0
//! Camera matrices and hex-grid placement used by the scene collaborators.

pub use glam::{Mat4, Vec2, Vec3};

const POLAR_MIN: f32 = 0.01;
const POLAR_MAX: f32 = std::f32::consts::PI - 0.01;
const FOV_MIN: f32 = 1.0;
const FOV_MAX: f32 = 45.0;

/// Camera orbiting the origin on a sphere. `polar` is measured from +Y.
#[derive(Clone, Copy, Debug)]
pub struct OrbitCamera {
    pub radius: f32,
    /// Azimuth at `seconds == 0`; the animation adds `speed * seconds`.
    pub azimuth: f32,
    pub polar: f32,
    pub speed: f32,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            radius: 3.0,
            azimuth: 0.0,
            polar: 0.6,
            speed: 0.25,
            fov_degrees: 45.0,
            near: 0.1,
            far: 500.0,
        }
    }
}

impl OrbitCamera {
    /// Eye position after `seconds` of animation.
    pub fn eye(&self, seconds: f32) -> Vec3 {
        let azimuth = self.azimuth + seconds * self.speed;
        let (sin_p, cos_p) = self.polar.sin_cos();
        let (sin_a, cos_a) = azimuth.sin_cos();
        Vec3::new(
            self.radius * sin_p * sin_a,
            self.radius * cos_p,
            self.radius * sin_p * cos_a,
        )
    }

    /// Moves the eye around the sphere. The polar angle stays off the poles
    /// so `look_at` keeps a usable up vector.
    pub fn nudge(&mut self, d_azimuth: f32, d_polar: f32) {
        self.azimuth += d_azimuth;
        self.polar = (self.polar + d_polar).clamp(POLAR_MIN, POLAR_MAX);
    }

    pub fn zoom(&mut self, d_fov_degrees: f32) {
        self.fov_degrees = (self.fov_degrees + d_fov_degrees).clamp(FOV_MIN, FOV_MAX);
    }

    pub fn view(&self, seconds: f32) -> Mat4 {
        Mat4::look_at_rh(self.eye(seconds), Vec3::ZERO, Vec3::Y)
    }

    /// Zero-to-one depth range. Degenerate aspect ratios fall back to 1.0.
    pub fn projection(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        Mat4::perspective_rh(self.fov_degrees.to_radians(), aspect, self.near, self.far)
    }
}

const HEX_STEP_X: f32 = 1.5;
const HEX_ROW_SHIFT: f32 = 0.75;
const HEX_SCALE_X: f32 = 0.1167;
const HEX_SCALE_Y: f32 = 0.0875;

/// Offset of tile `(x, y)` in a `width` x `height` grid centered on the origin.
/// Odd rows are shifted half a tile so neighbours interlock.
pub fn hex_offset(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    let cx = (width.saturating_sub(1)) as f32 / 2.0;
    let cy = (height.saturating_sub(1)) as f32 / 2.0;
    let mut ox = (x as f32 - cx) * HEX_STEP_X;
    let oy = (y as f32 - cy) * 3.0_f32.sqrt();
    if y % 2 == 1 {
        ox += HEX_ROW_SHIFT;
    }
    Vec2::new(ox * HEX_SCALE_X, oy * HEX_SCALE_Y)
}

pub fn is_edge_tile(x: u32, y: u32, width: u32, height: u32) -> bool {
    x == 0 || y == 0 || x + 1 == width || y + 1 == height
}

/// Grid tile offsets split into border tiles and interior tiles.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct HexGridLayout {
    pub edge: Vec<Vec2>,
    pub internal: Vec<Vec2>,
}

impl HexGridLayout {
    pub fn new(width: u32, height: u32) -> Self {
        let mut layout = Self::default();
        for y in 0..height {
            for x in 0..width {
                let offset = hex_offset(x, y, width, height);
                if is_edge_tile(x, y, width, height) {
                    layout.edge.push(offset);
                } else {
                    layout.internal.push(offset);
                }
            }
        }
        layout
    }
}
