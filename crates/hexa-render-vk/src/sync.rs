// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

/// Per-slot primitives. The fence starts signaled so the first wait on
/// each slot returns immediately.
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

pub fn in_flight_fence_info() -> vk::FenceCreateInfo<'static> {
    vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    }
}

pub unsafe fn create_sync_objects(device: &ash::Device, count: usize) -> Result<Vec<FrameSync>> {
    let sem_info = vk::SemaphoreCreateInfo {
        s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
        ..Default::default()
    };
    let fence_info = in_flight_fence_info();

    let mut out: Vec<FrameSync> = Vec::with_capacity(count);
    for _ in 0..count {
        let created = (|| -> Result<FrameSync> {
            let image_available = device
                .create_semaphore(&sem_info, None)
                .context("create_semaphore(image_available)")?;
            let render_finished = device
                .create_semaphore(&sem_info, None)
                .context("create_semaphore(render_finished)")?;
            let in_flight = device
                .create_fence(&fence_info, None)
                .context("create_fence(in_flight)")?;
            Ok(FrameSync {
                image_available,
                render_finished,
                in_flight,
            })
        })();
        match created {
            Ok(s) => out.push(s),
            Err(e) => {
                for s in &out {
                    s.destroy(device);
                }
                return Err(e);
            }
        }
    }
    Ok(out)
}

impl FrameSync {
    pub unsafe fn wait(&self, device: &ash::Device) -> Result<()> {
        device
            .wait_for_fences(std::slice::from_ref(&self.in_flight), true, u64::MAX)
            .context("wait_for_fences")
    }

    /// Only once work is certain to be submitted this frame.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        device
            .reset_fences(std::slice::from_ref(&self.in_flight))
            .context("reset_fences")
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_available, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_fence(self.in_flight, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_starts_signaled() {
        let info = in_flight_fence_info();
        assert!(info.flags.contains(vk::FenceCreateFlags::SIGNALED));
        assert_eq!(info.s_type, vk::StructureType::FENCE_CREATE_INFO);
    }
}
