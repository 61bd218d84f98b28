// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use hexa_render::RenderError;

use crate::buffer::GpuBatch;

/// One resettable primary buffer per frame slot.
#[derive(Default)]
pub struct CommandStream {
    pub pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandStream {
    pub unsafe fn allocate(device: &ash::Device, family: u32, count: usize) -> Result<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            queue_family_index: family,
            ..Default::default()
        };
        let pool = device
            .create_command_pool(&pool_info, None)
            .context("create_command_pool")?;

        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        let buffers = match device.allocate_command_buffers(&alloc_info) {
            Ok(b) => b,
            Err(e) => {
                device.destroy_command_pool(pool, None);
                return Err(e).context("allocate_command_buffers");
            }
        };
        Ok(Self { pool, buffers })
    }

    pub fn buffer(&self, slot: usize) -> vk::CommandBuffer {
        self.buffers[slot]
    }

    pub unsafe fn reset(&self, device: &ash::Device, slot: usize) -> Result<()> {
        device
            .reset_command_buffer(self.buffers[slot], vk::CommandBufferResetFlags::empty())
            .context("reset_command_buffer")
    }

    /// Buffers are freed with the pool.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_command_pool(self.pool, None);
        self.pool = vk::CommandPool::null();
        self.buffers.clear();
    }
}

/// Everything one recording reads. Borrowed for the duration of the call.
pub struct FrameRecording<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub batches: &'a [GpuBatch],
}

/// Color then depth, in attachment order. The resolve target has no clear.
pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// Full-extent, unflipped viewport; depth range 0..1.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub unsafe fn record_frame(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    rec: &FrameRecording<'_>,
) -> Result<()> {
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .map_err(|e| RenderError::contract("begin_command_buffer", e))?;

    let clears = clear_values(rec.clear_color);
    let area = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: rec.extent,
    };
    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: rec.render_pass,
        framebuffer: rec.framebuffer,
        render_area: area,
        clear_value_count: clears.len() as u32,
        p_clear_values: clears.as_ptr(),
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);

    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, rec.pipeline);
    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        rec.pipeline_layout,
        0,
        std::slice::from_ref(&rec.descriptor_set),
        &[],
    );

    let viewport = full_viewport(rec.extent);
    device.cmd_set_viewport(cmd, 0, std::slice::from_ref(&viewport));
    device.cmd_set_scissor(cmd, 0, std::slice::from_ref(&area));

    for batch in rec.batches {
        device.cmd_bind_vertex_buffers(cmd, 0, &[batch.vertices.buffer], &[0]);
        if let Some(inst) = &batch.instances {
            device.cmd_bind_vertex_buffers(cmd, 1, &[inst.buffer], &[0]);
        }
        device.cmd_bind_index_buffer(cmd, batch.indices.buffer, 0, vk::IndexType::UINT16);
        device.cmd_draw_indexed(cmd, batch.index_count, batch.instance_count, 0, 0, 0);
    }

    device.cmd_end_render_pass(cmd);
    device
        .end_command_buffer(cmd)
        .map_err(|e| RenderError::contract("end_command_buffer", e))?;
    Ok(())
}
