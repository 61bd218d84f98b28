// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use tracing::{debug, info};

use crate::{AcquireOutcome, CameraSource, FrameBackend, FrameCounter, WindowSurface};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        slot: usize,
        image_index: u32,
        /// The swapchain was rebuilt after this present.
        recreated: bool,
    },
    /// Acquire reported the swapchain out of date; it was rebuilt and the
    /// slot was left untouched for the next tick.
    Abandoned,
    /// The window closed while we were waiting for a non-zero size.
    Closed,
}

/// Drives one frame per call and owns the decision to rebuild the
/// swapchain. The backend is released only after the device is idle.
pub struct FrameOrchestrator<B: FrameBackend> {
    backend: B,
    counter: FrameCounter,
    recreations: u64,
}

impl<B: FrameBackend> FrameOrchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            counter: FrameCounter::default(),
            recreations: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn current_slot(&self) -> usize {
        self.counter.slot()
    }

    pub fn frames(&self) -> u64 {
        self.counter.frames()
    }

    /// Completed swapchain rebuilds since construction.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    pub fn draw_frame<W, C>(&mut self, window: &mut W, camera: &mut C) -> Result<FrameOutcome>
    where
        W: WindowSurface + ?Sized,
        C: CameraSource + ?Sized,
    {
        let slot = self.counter.slot();
        self.backend.wait_for_slot(slot)?;

        let (image_index, acquire_suboptimal) = match self.backend.acquire_image(slot)? {
            AcquireOutcome::Ready {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("acquire: swapchain out of date (slot {slot})");
                // Fence stays signaled and the slot is not consumed.
                return Ok(if self.recreate_swapchain(window)? {
                    FrameOutcome::Abandoned
                } else {
                    FrameOutcome::Closed
                });
            }
        };

        let uniforms = camera.camera_uniforms(self.backend.extent());
        self.backend.write_uniforms(slot, &uniforms)?;

        self.backend.reset_slot(slot)?;
        self.backend.record(slot, image_index)?;
        self.backend.submit(slot)?;
        let present = self.backend.present(slot, image_index)?;

        self.counter.advance();

        let resized = window.take_resized();
        if !(acquire_suboptimal || present.needs_recreate() || resized) {
            return Ok(FrameOutcome::Presented {
                slot,
                image_index,
                recreated: false,
            });
        }

        debug!(?present, acquire_suboptimal, resized, "swapchain stale after present");
        if !self.recreate_swapchain(window)? {
            return Ok(FrameOutcome::Closed);
        }
        Ok(FrameOutcome::Presented {
            slot,
            image_index,
            recreated: true,
        })
    }

    /// Blocks while the surface is zero-sized, then rebuilds everything sized
    /// to it. Returns `false` if the window closed during the wait.
    pub fn recreate_swapchain<W>(&mut self, window: &mut W) -> Result<bool>
    where
        W: WindowSurface + ?Sized,
    {
        let mut size = window.framebuffer_size();
        if size.is_empty() {
            info!("surface minimized; waiting for a non-zero size");
        }
        while size.is_empty() {
            if window.close_requested() {
                return Ok(false);
            }
            window.wait_events()?;
            size = window.framebuffer_size();
        }

        // Any resize seen up to here is covered by this rebuild.
        window.take_resized();

        self.backend.wait_idle()?;
        self.backend.rebuild_surface(size)?;
        self.recreations += 1;
        info!("swapchain rebuilt #{} at {}", self.recreations, size);
        Ok(true)
    }

    /// Waits for the device to drain, then drops the backend.
    pub fn shutdown(mut self) -> Result<()> {
        self.backend.wait_idle()?;
        drop(self.backend);
        Ok(())
    }
}
