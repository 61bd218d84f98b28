// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use hexa_render::{CameraUniforms, GeometryBatch, InstanceData};
use tracing::debug;

use crate::device::DeviceContext;
use crate::pipeline::VertexLayout;

pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl AllocatedBuffer {
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
        self.buffer = vk::Buffer::null();
        self.memory = vk::DeviceMemory::null();
    }
}

/// Runs `release` when `res` is an error, so a half-built object does not
/// outlive the failure.
pub(crate) fn release_on_err<T, E>(res: Result<T, E>, release: impl FnOnce()) -> Result<T, E> {
    if res.is_err() {
        release();
    }
    res
}

pub unsafe fn create_buffer(
    ctx: &DeviceContext,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    props: vk::MemoryPropertyFlags,
) -> Result<AllocatedBuffer> {
    let device = &ctx.device;
    let bci = vk::BufferCreateInfo {
        s_type: vk::StructureType::BUFFER_CREATE_INFO,
        size,
        usage,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        ..Default::default()
    };
    let buffer = device.create_buffer(&bci, None).context("create_buffer")?;
    let req = device.get_buffer_memory_requirements(buffer);
    let memory_type_index = match ctx.find_memory_type(req.memory_type_bits, props) {
        Ok(i) => i,
        Err(e) => {
            device.destroy_buffer(buffer, None);
            return Err(e.into());
        }
    };
    let mai = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index,
        ..Default::default()
    };
    let memory = release_on_err(device.allocate_memory(&mai, None), || {
        device.destroy_buffer(buffer, None)
    })
    .context("allocate_memory(buffer)")?;
    release_on_err(device.bind_buffer_memory(buffer, memory, 0), || {
        device.destroy_buffer(buffer, None);
        device.free_memory(memory, None);
    })
    .context("bind_buffer_memory")?;
    Ok(AllocatedBuffer {
        buffer,
        memory,
        size,
    })
}

/// host -> staging -> `dst`, on the graphics queue. Blocks until the copy
/// has finished.
pub unsafe fn upload_via_staging(
    ctx: &DeviceContext,
    cmd_pool: vk::CommandPool,
    dst: vk::Buffer,
    src_data: &[u8],
) -> Result<()> {
    let device = &ctx.device;
    let size = src_data.len() as vk::DeviceSize;
    let mut staging = create_buffer(
        ctx,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;

    let result = (|| -> Result<()> {
        let ptr = device
            .map_memory(staging.memory, 0, size, vk::MemoryMapFlags::empty())
            .context("map_memory(staging)")?;
        std::ptr::copy_nonoverlapping(src_data.as_ptr(), ptr as *mut u8, src_data.len());
        device.unmap_memory(staging.memory);

        let ai = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: cmd_pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: 1,
            ..Default::default()
        };
        let cmd = device
            .allocate_command_buffers(&ai)
            .context("allocate_command_buffers(upload)")?[0];
        let bi = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        device.begin_command_buffer(cmd, &bi)?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        device.cmd_copy_buffer(cmd, staging.buffer, dst, std::slice::from_ref(&region));
        device.end_command_buffer(cmd)?;

        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        device
            .queue_submit(ctx.graphics_queue, std::slice::from_ref(&si), vk::Fence::null())
            .context("queue_submit(upload)")?;
        device
            .queue_wait_idle(ctx.graphics_queue)
            .context("queue_wait_idle(upload)")?;
        device.free_command_buffers(cmd_pool, std::slice::from_ref(&cmd));
        Ok(())
    })();

    staging.destroy(device);
    result
}

unsafe fn device_local_from(
    ctx: &DeviceContext,
    cmd_pool: vk::CommandPool,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
) -> Result<AllocatedBuffer> {
    let mut buf = create_buffer(
        ctx,
        bytes.len() as vk::DeviceSize,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        vk::MemoryPropertyFlags::DEVICE_LOCAL,
    )?;
    if let Err(e) = upload_via_staging(ctx, cmd_pool, buf.buffer, bytes) {
        buf.destroy(&ctx.device);
        return Err(e);
    }
    Ok(buf)
}

/// Device-resident copy of a [`GeometryBatch`].
pub struct GpuBatch {
    pub label: String,
    pub vertices: AllocatedBuffer,
    pub indices: AllocatedBuffer,
    pub instances: Option<AllocatedBuffer>,
    pub index_count: u32,
    pub instance_count: u32,
}

impl GpuBatch {
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        self.vertices.destroy(device);
        self.indices.destroy(device);
        if let Some(mut inst) = self.instances.take() {
            inst.destroy(device);
        }
    }
}

/// One pipeline serves every batch, so any instanced batch makes the whole
/// scene instanced.
pub fn vertex_layout_for(batches: &[GeometryBatch]) -> VertexLayout {
    if batches.iter().any(GeometryBatch::is_instanced) {
        VertexLayout::Instanced
    } else {
        VertexLayout::PerVertex
    }
}

/// Instance stream contents for `batch` under `layout`. A plain batch drawn
/// through the instanced pipeline gets a single zero offset.
pub fn instance_data_for(batch: &GeometryBatch, layout: VertexLayout) -> Option<Vec<InstanceData>> {
    match layout {
        VertexLayout::PerVertex => None,
        VertexLayout::Instanced if batch.is_instanced() => Some(batch.instances.clone()),
        VertexLayout::Instanced => Some(vec![InstanceData::default()]),
    }
}

pub unsafe fn upload_batches(
    ctx: &DeviceContext,
    batches: &[GeometryBatch],
    layout: VertexLayout,
) -> Result<Vec<GpuBatch>> {
    let device = &ctx.device;
    let pool_info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        flags: vk::CommandPoolCreateFlags::TRANSIENT,
        queue_family_index: ctx.families.graphics,
        ..Default::default()
    };
    let pool = device
        .create_command_pool(&pool_info, None)
        .context("create_command_pool(upload)")?;

    let mut out: Vec<GpuBatch> = Vec::with_capacity(batches.len());
    let result = (|| -> Result<()> {
        for batch in batches {
            if batch.is_empty() {
                debug!("vk: skipping empty batch '{}'", batch.label);
                continue;
            }
            let vertices = device_local_from(
                ctx,
                pool,
                vk::BufferUsageFlags::VERTEX_BUFFER,
                bytemuck::cast_slice(&batch.vertices),
            )?;
            let mut gpu = GpuBatch {
                label: batch.label.clone(),
                vertices,
                indices: AllocatedBuffer {
                    buffer: vk::Buffer::null(),
                    memory: vk::DeviceMemory::null(),
                    size: 0,
                },
                instances: None,
                index_count: batch.index_count(),
                instance_count: batch.instance_count(),
            };
            let rest = (|| -> Result<()> {
                gpu.indices = device_local_from(
                    ctx,
                    pool,
                    vk::BufferUsageFlags::INDEX_BUFFER,
                    bytemuck::cast_slice(&batch.indices),
                )?;
                if let Some(data) = instance_data_for(batch, layout) {
                    gpu.instances = Some(device_local_from(
                        ctx,
                        pool,
                        vk::BufferUsageFlags::VERTEX_BUFFER,
                        bytemuck::cast_slice(&data),
                    )?);
                }
                Ok(())
            })();
            if let Err(e) = rest {
                gpu.destroy(device);
                return Err(e);
            }
            debug!(
                "vk: uploaded '{}' ({} indices x {} instances)",
                gpu.label, gpu.index_count, gpu.instance_count
            );
            out.push(gpu);
        }
        Ok(())
    })();

    device.destroy_command_pool(pool, None);
    match result {
        Ok(()) => Ok(out),
        Err(e) => {
            for b in &mut out {
                b.destroy(device);
            }
            Err(e)
        }
    }
}

pub unsafe fn create_camera_desc_set_layout(
    device: &ash::Device,
) -> Result<vk::DescriptorSetLayout> {
    let binding = vk::DescriptorSetLayoutBinding {
        binding: 0,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::VERTEX,
        ..Default::default()
    };
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: 1,
        p_bindings: &binding,
        ..Default::default()
    };
    Ok(device
        .create_descriptor_set_layout(&ci, None)
        .context("create_descriptor_set_layout")?)
}

/// Host-visible camera block per frame slot plus the sets pointing at them.
#[derive(Default)]
pub struct FrameUniforms {
    buffers: Vec<AllocatedBuffer>,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

impl FrameUniforms {
    pub unsafe fn create(
        ctx: &DeviceContext,
        set_layout: vk::DescriptorSetLayout,
        count: usize,
    ) -> Result<Self> {
        let device = &ctx.device;
        let ubo_size = std::mem::size_of::<CameraUniforms>() as vk::DeviceSize;

        let mut this = Self {
            buffers: Vec::with_capacity(count),
            pool: vk::DescriptorPool::null(),
            sets: Vec::new(),
        };
        let built = (|| -> Result<()> {
            for _ in 0..count {
                this.buffers.push(create_buffer(
                    ctx,
                    ubo_size,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE
                        | vk::MemoryPropertyFlags::HOST_COHERENT,
                )?);
            }

            let pool_sizes = [vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: count as u32,
            }];
            let pool_ci = vk::DescriptorPoolCreateInfo {
                s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
                max_sets: count as u32,
                pool_size_count: pool_sizes.len() as u32,
                p_pool_sizes: pool_sizes.as_ptr(),
                ..Default::default()
            };
            this.pool = device
                .create_descriptor_pool(&pool_ci, None)
                .context("create_descriptor_pool")?;

            let layouts = vec![set_layout; count];
            let alloc = vk::DescriptorSetAllocateInfo {
                s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
                descriptor_pool: this.pool,
                descriptor_set_count: count as u32,
                p_set_layouts: layouts.as_ptr(),
                ..Default::default()
            };
            this.sets = device
                .allocate_descriptor_sets(&alloc)
                .context("allocate_descriptor_sets")?;

            let infos: Vec<vk::DescriptorBufferInfo> = this
                .buffers
                .iter()
                .map(|b| vk::DescriptorBufferInfo {
                    buffer: b.buffer,
                    offset: 0,
                    range: ubo_size,
                })
                .collect();
            let writes: Vec<vk::WriteDescriptorSet> = this
                .sets
                .iter()
                .zip(&infos)
                .map(|(&set, info)| vk::WriteDescriptorSet {
                    s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
                    dst_set: set,
                    dst_binding: 0,
                    descriptor_count: 1,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
                    p_buffer_info: info,
                    ..Default::default()
                })
                .collect();
            device.update_descriptor_sets(&writes, &[]);
            Ok(())
        })();

        match built {
            Ok(()) => Ok(this),
            Err(e) => {
                this.destroy(device);
                Err(e)
            }
        }
    }

    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    /// Caller must have waited on the slot's fence first.
    pub unsafe fn write(
        &self,
        device: &ash::Device,
        slot: usize,
        uniforms: &CameraUniforms,
    ) -> Result<()> {
        let buf = &self.buffers[slot];
        let bytes = bytemuck::bytes_of(uniforms);
        let ptr = device
            .map_memory(buf.memory, 0, buf.size, vk::MemoryMapFlags::empty())
            .context("map_memory(uniforms)")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
        device.unmap_memory(buf.memory);
        Ok(())
    }

    /// Sets are freed with the pool.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.pool != vk::DescriptorPool::null() {
            device.destroy_descriptor_pool(self.pool, None);
            self.pool = vk::DescriptorPool::null();
        }
        self.sets.clear();
        for mut b in self.buffers.drain(..) {
            b.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexa_render::Vertex;
    use std::cell::Cell;

    fn batch(instances: usize) -> GeometryBatch {
        GeometryBatch {
            label: "tile".into(),
            vertices: vec![Vertex::default(); 3],
            indices: vec![0, 1, 2],
            instances: (0..instances)
                .map(|i| InstanceData {
                    offset: [i as f32, 0.0],
                })
                .collect(),
        }
    }

    #[test]
    fn any_instanced_batch_selects_instanced_layout() {
        assert_eq!(vertex_layout_for(&[batch(0), batch(0)]), VertexLayout::PerVertex);
        assert_eq!(vertex_layout_for(&[batch(0), batch(4)]), VertexLayout::Instanced);
        assert_eq!(vertex_layout_for(&[]), VertexLayout::PerVertex);
    }

    #[test]
    fn plain_batch_under_instanced_layout_gets_origin() {
        let data = instance_data_for(&batch(0), VertexLayout::Instanced);
        assert_eq!(data, Some(vec![InstanceData { offset: [0.0, 0.0] }]));
        assert_eq!(instance_data_for(&batch(0), VertexLayout::PerVertex), None);
    }

    #[test]
    fn instanced_batch_keeps_its_offsets() {
        let data = instance_data_for(&batch(3), VertexLayout::Instanced).unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data[2].offset, [2.0, 0.0]);
    }

    #[test]
    fn release_runs_only_on_failure() {
        let released = Cell::new(0);
        let ok: Result<u32, vk::Result> = release_on_err(Ok(7), || released.set(released.get() + 1));
        assert_eq!(ok, Ok(7));
        assert_eq!(released.get(), 0);

        let err: Result<u32, vk::Result> = release_on_err(
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            || released.set(released.get() + 1),
        );
        assert_eq!(err, Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        assert_eq!(released.get(), 1);
    }
}
