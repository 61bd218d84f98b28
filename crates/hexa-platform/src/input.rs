// SPDX-License-Identifier: CEPL-1.0
use winit::event::{ElementState, KeyEvent, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pixel deltas (touchpads) are scaled to wheel lines.
const PIXELS_PER_LINE: f64 = 40.0;

/// Camera input gathered between two frames. Steps are signed counts of
/// arrow-key presses; `scroll` is in wheel lines, positive away from the user.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraInput {
    pub azimuth_steps: i32,
    pub polar_steps: i32,
    pub scroll: f32,
}

impl CameraInput {
    pub fn is_idle(&self) -> bool {
        self.azimuth_steps == 0 && self.polar_steps == 0 && self.scroll == 0.0
    }

    /// Counts a press or auto-repeat of an arrow key. Releases and other
    /// keys are ignored.
    pub fn on_key(&mut self, state: ElementState, key: PhysicalKey) {
        if state != ElementState::Pressed {
            return;
        }
        if let PhysicalKey::Code(code) = key {
            if let Some((da, dp)) = arrow_steps(code) {
                self.azimuth_steps += da;
                self.polar_steps += dp;
            }
        }
    }

    pub fn on_key_event(&mut self, event: &KeyEvent) {
        self.on_key(event.state, event.physical_key);
    }

    pub fn on_scroll(&mut self, delta: MouseScrollDelta) {
        self.scroll += match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(p) => (p.y / PIXELS_PER_LINE) as f32,
        };
    }
}

/// (azimuth, polar) step for an arrow key.
fn arrow_steps(code: KeyCode) -> Option<(i32, i32)> {
    match code {
        KeyCode::ArrowLeft => Some((-1, 0)),
        KeyCode::ArrowRight => Some((1, 0)),
        KeyCode::ArrowUp => Some((0, 1)),
        KeyCode::ArrowDown => Some((0, -1)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    #[test]
    fn arrows_accumulate_until_taken() {
        let mut input = CameraInput::default();
        let left = PhysicalKey::Code(KeyCode::ArrowLeft);
        input.on_key(ElementState::Pressed, left);
        input.on_key(ElementState::Pressed, left);
        input.on_key(ElementState::Released, left);
        input.on_key(ElementState::Pressed, PhysicalKey::Code(KeyCode::ArrowUp));
        input.on_key(ElementState::Pressed, PhysicalKey::Code(KeyCode::KeyW));
        assert_eq!(input.azimuth_steps, -2);
        assert_eq!(input.polar_steps, 1);

        let taken = std::mem::take(&mut input);
        assert!(!taken.is_idle());
        assert!(input.is_idle());
    }

    #[test]
    fn scroll_lines_and_pixels() {
        let mut input = CameraInput::default();
        input.on_scroll(MouseScrollDelta::LineDelta(0.0, 2.0));
        input.on_scroll(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, -40.0)));
        assert_eq!(input.scroll, 1.0);
    }
}
