// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;
use hexa_render::{
    AcquireOutcome, CameraUniforms, FrameBackend, GeometryBatch, PresentOutcome, RenderError,
    RenderSize, MAX_FRAMES_IN_FLIGHT,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info};

use crate::buffer::{self, FrameUniforms, GpuBatch};
use crate::commands::{self, CommandStream, FrameRecording};
use crate::device::{self, DeviceConfig, DeviceContext};
use crate::instance::{self, InstanceContext};
use crate::pipeline::{PipelineState, ShaderCode, ShaderSource, VertexLayout};
use crate::render_pass::RenderTargetPass;
use crate::swapchain::{PresentModePref, RebuildStep, Swapchain, REBUILD_ORDER};
use crate::sync::{self, FrameSync};

#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub device: DeviceConfig,
    pub present_mode: PresentModePref,
    pub clear_color: [f32; 4],
    pub shaders: ShaderSource,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            present_mode: PresentModePref::default(),
            clear_color: [0.02, 0.02, 0.04, 1.0],
            shaders: ShaderSource::Builtin,
        }
    }
}

/// Vulkan implementation of [`FrameBackend`]. Owns every GPU object; the
/// window must outlive it.
pub struct VkRenderer {
    instance: InstanceContext,
    device: DeviceContext,

    swapchain: Swapchain,
    render_pass: RenderTargetPass,
    set_layout: vk::DescriptorSetLayout,
    pipeline: PipelineState,
    shaders: ShaderCode,

    commands: CommandStream,
    sync: Vec<FrameSync>,
    uniforms: FrameUniforms,
    batches: Vec<GpuBatch>,

    present_mode: PresentModePref,
    clear: [f32; 4],
    generation: u64,
}

impl VkRenderer {
    // STRICT ORDER:
    // 1) Instance + surface
    // 2) Device (queried against the surface)
    // 3) Swapchain + attachments, render pass, pipeline, framebuffers
    // 4) Per-slot commands, sync, uniforms; geometry last
    //
    // From step 3 on the renderer exists with null placeholders, so an early
    // return releases whatever was built through Drop.
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        cfg: &RendererConfig,
        scene: &[GeometryBatch],
    ) -> Result<Self> {
        let vertex_layout = buffer::vertex_layout_for(scene);
        let shaders = cfg.shaders.load(vertex_layout)?;

        unsafe {
            let mut instance = instance::create_instance_and_surface(
                window,
                display,
                cfg.device.enable_validation,
            )?;
            let device = match device::create_device(
                &instance.instance,
                &instance.surface_loader,
                instance.surface,
                &cfg.device,
            ) {
                Ok(d) => d,
                Err(e) => {
                    instance.destroy();
                    return Err(e);
                }
            };

            let swapchain = Swapchain::unbuilt(&instance, &device);
            let mut r = VkRenderer {
                instance,
                device,
                swapchain,
                render_pass: RenderTargetPass::default(),
                set_layout: vk::DescriptorSetLayout::null(),
                pipeline: PipelineState {
                    layout: vk::PipelineLayout::null(),
                    handle: vk::Pipeline::null(),
                    vertex_layout,
                },
                shaders,
                commands: CommandStream::default(),
                sync: Vec::new(),
                uniforms: FrameUniforms::default(),
                batches: Vec::new(),
                present_mode: cfg.present_mode,
                clear: cfg.clear_color,
                generation: 0,
            };

            let d = &r.device.device;
            r.swapchain
                .recreate(&r.instance, &r.device, size, r.present_mode)?;
            r.render_pass = RenderTargetPass::create(
                d,
                r.swapchain.format(),
                r.device.msaa_samples,
                r.device.depth_format,
            )?;
            r.set_layout = buffer::create_camera_desc_set_layout(d)?;
            r.pipeline = PipelineState::create(
                d,
                &r.render_pass,
                r.set_layout,
                vertex_layout,
                &r.shaders,
            )?;
            r.swapchain.create_framebuffers(d, &r.render_pass)?;

            r.commands =
                CommandStream::allocate(d, r.device.families.graphics, MAX_FRAMES_IN_FLIGHT)?;
            r.sync = sync::create_sync_objects(d, MAX_FRAMES_IN_FLIGHT)?;
            r.uniforms = FrameUniforms::create(&r.device, r.set_layout, MAX_FRAMES_IN_FLIGHT)?;
            r.batches = buffer::upload_batches(&r.device, scene, vertex_layout)?;

            info!(
                "vk: renderer ready on \"{}\" ({} batches, {:?} vertex layout)",
                r.device.name,
                r.batches.len(),
                vertex_layout
            );
            Ok(r)
        }
    }

    /// Bumped on every successful surface rebuild.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn device_name(&self) -> &str {
        &self.device.name
    }

    pub fn vertex_layout(&self) -> VertexLayout {
        self.pipeline.vertex_layout
    }

    unsafe fn rebuild_step(&mut self, step: RebuildStep, size: RenderSize) -> Result<()> {
        let d = &self.device.device;
        match step {
            RebuildStep::DestroyFramebuffers => self.swapchain.destroy_framebuffers(d),
            RebuildStep::DestroyPipeline => self.pipeline.destroy(d),
            RebuildStep::DestroyRenderPass => self.render_pass.destroy(d),
            RebuildStep::RecreateSwapchain => {
                self.swapchain
                    .recreate(&self.instance, &self.device, size, self.present_mode)?
            }
            RebuildStep::CreateRenderPass => {
                self.render_pass = RenderTargetPass::create(
                    d,
                    self.swapchain.format(),
                    self.device.msaa_samples,
                    self.device.depth_format,
                )?
            }
            RebuildStep::CreatePipeline => {
                self.pipeline = PipelineState::create(
                    d,
                    &self.render_pass,
                    self.set_layout,
                    self.pipeline.vertex_layout,
                    &self.shaders,
                )?
            }
            RebuildStep::CreateFramebuffers => {
                self.swapchain.create_framebuffers(d, &self.render_pass)?
            }
        }
        Ok(())
    }
}

impl FrameBackend for VkRenderer {
    fn extent(&self) -> RenderSize {
        let e = self.swapchain.extent();
        RenderSize::new(e.width, e.height)
    }

    fn wait_for_slot(&mut self, slot: usize) -> Result<()> {
        unsafe { self.sync[slot].wait(&self.device.device) }
    }

    fn acquire_image(&mut self, slot: usize) -> Result<AcquireOutcome> {
        let acquired = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                self.sync[slot].image_available,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Ready {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(RenderError::contract("acquire_next_image", e).into()),
        }
    }

    fn write_uniforms(&mut self, slot: usize, uniforms: &CameraUniforms) -> Result<()> {
        unsafe { self.uniforms.write(&self.device.device, slot, uniforms) }
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        unsafe { self.sync[slot].reset(&self.device.device) }
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let framebuffer = *self
            .swapchain
            .framebuffers
            .get(image_index as usize)
            .context("image index outside the framebuffer set")?;
        let cmd = self.commands.buffer(slot);
        let rec = FrameRecording {
            render_pass: self.render_pass.handle,
            framebuffer,
            extent: self.swapchain.extent(),
            clear_color: self.clear,
            pipeline: self.pipeline.handle,
            pipeline_layout: self.pipeline.layout,
            descriptor_set: self.uniforms.set(slot),
            batches: &self.batches,
        };
        unsafe {
            self.commands.reset(&self.device.device, slot)?;
            commands::record_frame(&self.device.device, cmd, &rec)
        }
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let s = &self.sync[slot];
        let cmd = self.commands.buffer(slot);
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_available,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_finished,
            ..Default::default()
        };
        unsafe {
            self.device
                .device
                .queue_submit(
                    self.device.graphics_queue,
                    std::slice::from_ref(&submit),
                    s.in_flight,
                )
                .map_err(|e| RenderError::contract("queue_submit", e))?;
        }
        Ok(())
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<PresentOutcome> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &self.sync[slot].render_finished,
            swapchain_count: 1,
            p_swapchains: &self.swapchain.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let presented = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.device.present_queue, &present)
        };
        match presented {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(RenderError::contract("queue_present", e).into()),
        }
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe {
            self.device
                .device
                .device_wait_idle()
                .context("device_wait_idle")
        }
    }

    fn rebuild_surface(&mut self, size: RenderSize) -> Result<()> {
        for step in REBUILD_ORDER {
            unsafe { self.rebuild_step(step, size)? };
        }
        self.generation += 1;
        let e = self.swapchain.extent();
        info!(
            "vk: surface rebuilt to {}x{} (generation {})",
            e.width, e.height, self.generation
        );
        Ok(())
    }
}

impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            let d = &self.device.device;
            d.device_wait_idle().ok();

            // STRICT TEARDOWN ORDER:
            // sync -> commands -> geometry -> uniforms -> pipeline -> set layout
            // -> swapchain stack -> render pass -> device -> surface/instance
            for s in &self.sync {
                s.destroy(d);
            }
            self.commands.destroy(d);
            for b in &mut self.batches {
                b.destroy(d);
            }
            self.uniforms.destroy(d);
            self.pipeline.destroy(d);
            d.destroy_descriptor_set_layout(self.set_layout, None);
            self.swapchain.destroy(d);
            self.render_pass.destroy(d);

            self.device.destroy();
            self.instance.destroy();
        }
        debug!("vk: renderer released");
    }
}
