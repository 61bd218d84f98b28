// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;

use crate::{CameraUniforms, RenderSize};

/// Frames the host may run ahead of the device.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Round-robin selector for the active in-flight slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCounter {
    frame: u64,
}

impl FrameCounter {
    pub fn slot(&self) -> usize {
        (self.frame % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    pub fn advance(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }

    /// Number of completed advances.
    pub fn frames(&self) -> u64 {
        self.frame
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Ready { image_index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn needs_recreate(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// The GPU-facing half of one frame. Each method maps to one step of the
/// per-slot protocol; the orchestrator decides the order.
///
/// `slot` is always `< MAX_FRAMES_IN_FLIGHT`.
pub trait FrameBackend {
    /// Extent of the live swapchain.
    fn extent(&self) -> RenderSize;

    /// Blocks until the slot's previous submission has retired.
    fn wait_for_slot(&mut self, slot: usize) -> Result<()>;

    /// Acquires the next presentable image, signalling the slot's
    /// "image available" semaphore.
    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome>;

    fn write_uniforms(&mut self, slot: usize, uniforms: &CameraUniforms) -> Result<()>;

    /// Un-signals the slot's fence. Only called once submission is certain.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;

    fn submit(&mut self, slot: usize) -> Result<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome>;

    fn wait_idle(&mut self) -> Result<()>;

    /// Tears down and rebuilds everything sized to the surface. The device
    /// must be idle.
    fn rebuild_surface(&mut self, size: RenderSize) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_cycles_through_slots() {
        let mut counter = FrameCounter::default();
        let slots: Vec<usize> = (0..5)
            .map(|_| {
                let s = counter.slot();
                counter.advance();
                s
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(counter.frames(), 5);
    }

    #[test]
    fn only_clean_present_skips_recreate() {
        assert!(!PresentOutcome::Presented.needs_recreate());
        assert!(PresentOutcome::Suboptimal.needs_recreate());
        assert!(PresentOutcome::OutOfDate.needs_recreate());
    }
}
