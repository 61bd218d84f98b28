// SPDX-License-Identifier: CEPL-1.0
//! Backend-agnostic half of the frame pipeline: the collaborator interfaces,
//! the per-frame protocol and the orchestrator that drives it.
#![deny(unsafe_op_in_unsafe_fn)]

mod error;
mod frame;
mod orchestrator;
mod scene;

pub use error::RenderError;
pub use frame::{AcquireOutcome, FrameBackend, FrameCounter, PresentOutcome, MAX_FRAMES_IN_FLIGHT};
pub use orchestrator::{FrameOrchestrator, FrameOutcome};
pub use scene::{CameraSource, CameraUniforms, GeometryBatch, InstanceData, Vertex, WindowSurface};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero dimension.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl std::fmt::Display for RenderSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
