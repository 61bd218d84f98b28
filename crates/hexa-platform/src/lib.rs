// SPDX-License-Identifier: CEPL-1.0
//! Windowing for the frame loop. The event loop is pumped by the caller
//! rather than run, so the renderer can block on it while minimized.
#![deny(unsafe_op_in_unsafe_fn)]

pub use winit;

mod input;
mod window;

pub use input::CameraInput;
pub use window::{PlatformWindow, SurfaceTracker, WindowSpec};
