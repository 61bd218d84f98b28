// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::khr::swapchain;
use ash::vk;
use hexa_render::RenderSize;
use serde::Deserialize;
use tracing::info;

use crate::buffer::release_on_err;
use crate::device::DeviceContext;
use crate::instance::InstanceContext;
use crate::render_pass::RenderTargetPass;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePref {
    Fifo,
    #[default]
    Mailbox,
}

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// FIFO is always available, so it is the fallback for every preference.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    pref: PresentModePref,
) -> vk::PresentModeKHR {
    match pref {
        PresentModePref::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

/// `u32::MAX` in `current_extent` means the surface lets us pick.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 == "no max").
pub fn image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

/// Everything decided before calling `create_swapchain`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainPlan {
    pub fn new(
        caps: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        modes: &[vk::PresentModeKHR],
        want: RenderSize,
        pref: PresentModePref,
    ) -> Option<Self> {
        let surface_format = choose_surface_format(formats)?;
        Some(Self {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: choose_present_mode(modes, pref),
            extent: choose_extent(caps, want),
            image_count: image_count(caps),
            pre_transform: caps.current_transform,
        })
    }
}

/// Framebuffer attachment order matching the render pass: color, depth, then
/// the resolve target when multisampling.
pub fn framebuffer_attachments(
    swap_view: vk::ImageView,
    msaa_color: Option<vk::ImageView>,
    depth: vk::ImageView,
) -> Vec<vk::ImageView> {
    match msaa_color {
        Some(color) => vec![color, depth, swap_view],
        None => vec![swap_view, depth],
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainPart {
    Framebuffers,
    Depth,
    MsaaColor,
    Views,
    Handle,
}

// STRICT ORDER: framebuffers -> attachments -> views -> swapchain
pub const TEARDOWN_ORDER: [SwapchainPart; 5] = [
    SwapchainPart::Framebuffers,
    SwapchainPart::Depth,
    SwapchainPart::MsaaColor,
    SwapchainPart::Views,
    SwapchainPart::Handle,
];

/// One step of `VkRenderer::rebuild_surface`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildStep {
    DestroyFramebuffers,
    DestroyPipeline,
    DestroyRenderPass,
    RecreateSwapchain,
    CreateRenderPass,
    CreatePipeline,
    CreateFramebuffers,
}

// STRICT ORDER:
// teardown: framebuffers -> pipeline -> render pass -> attachments/views/swapchain
// rebuild:  swapchain/views/attachments -> render pass -> pipeline -> framebuffers
pub const REBUILD_ORDER: [RebuildStep; 7] = [
    RebuildStep::DestroyFramebuffers,
    RebuildStep::DestroyPipeline,
    RebuildStep::DestroyRenderPass,
    RebuildStep::RecreateSwapchain,
    RebuildStep::CreateRenderPass,
    RebuildStep::CreatePipeline,
    RebuildStep::CreateFramebuffers,
];

/// Image + memory + view triple sized to the swapchain.
pub struct AttachmentImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
}

impl AttachmentImage {
    pub unsafe fn create(
        ctx: &DeviceContext,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let device = &ctx.device;
        let img_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = device.create_image(&img_ci, None).context("create_image")?;

        let mem_req = device.get_image_memory_requirements(image);
        let memory_type_index = match ctx
            .find_memory_type(mem_req.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)
        {
            Ok(i) => i,
            Err(e) => {
                device.destroy_image(image, None);
                return Err(e.into());
            }
        };
        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: mem_req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = release_on_err(device.allocate_memory(&alloc, None), || {
            device.destroy_image(image, None)
        })
        .context("allocate_memory(attachment)")?;
        let release = || {
            device.destroy_image(image, None);
            device.free_memory(memory, None);
        };
        release_on_err(device.bind_image_memory(image, memory, 0), release)
            .context("bind_image_memory")?;

        let view = release_on_err(create_view(device, image, format, aspect), release)?;
        Ok(Self {
            image,
            memory,
            view,
        })
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_image_view(self.view, None);
        device.destroy_image(self.image, None);
        device.free_memory(self.memory, None);
    }
}

unsafe fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let sub = vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };
    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: sub,
        ..Default::default()
    };
    Ok(device
        .create_image_view(&view_ci, None)
        .context("create_image_view")?)
}

/// Presentable images and everything sized to them. The images belong to
/// the WSI and are never freed individually.
pub struct Swapchain {
    loader: swapchain::Device,
    pub handle: vk::SwapchainKHR,
    pub plan: SwapchainPlan,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub msaa_color: Option<AttachmentImage>,
    pub depth: Option<AttachmentImage>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl Swapchain {
    /// Loader only; no handle yet. `recreate` builds the rest.
    pub fn unbuilt(inst: &InstanceContext, ctx: &DeviceContext) -> Self {
        Self {
            loader: swapchain::Device::new(&inst.instance, &ctx.device),
            handle: vk::SwapchainKHR::null(),
            plan: SwapchainPlan::default(),
            images: Vec::new(),
            views: Vec::new(),
            msaa_color: None,
            depth: None,
            framebuffers: Vec::new(),
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    pub fn format(&self) -> vk::Format {
        self.plan.format
    }

    pub fn loader(&self) -> &swapchain::Device {
        &self.loader
    }

    /// Caller has already waited for the device to go idle.
    pub unsafe fn recreate(
        &mut self,
        inst: &InstanceContext,
        ctx: &DeviceContext,
        want: RenderSize,
        pref: PresentModePref,
    ) -> Result<()> {
        self.destroy(&ctx.device);
        self.plan = query_plan(inst, ctx, want, pref)?;
        self.build(inst, ctx)
    }

    // swapchain -> views -> attachments
    unsafe fn build(&mut self, inst: &InstanceContext, ctx: &DeviceContext) -> Result<()> {
        let plan = self.plan;
        let family_indices = ctx.families.unique();
        let (sharing_mode, qf_count, qf_ptr) = if ctx.families.is_shared() {
            (vk::SharingMode::EXCLUSIVE, 0, std::ptr::null())
        } else {
            (
                vk::SharingMode::CONCURRENT,
                family_indices.len() as u32,
                family_indices.as_ptr(),
            )
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: inst.surface,
            min_image_count: plan.image_count,
            image_format: plan.format,
            image_color_space: plan.color_space,
            image_extent: plan.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: qf_count,
            p_queue_family_indices: qf_ptr,
            pre_transform: plan.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            ..Default::default()
        };
        self.handle = self
            .loader
            .create_swapchain(&swap_info, None)
            .context("create_swapchain")?;
        self.images = self
            .loader
            .get_swapchain_images(self.handle)
            .context("get_swapchain_images")?;

        for &img in &self.images {
            let view = create_view(&ctx.device, img, plan.format, vk::ImageAspectFlags::COLOR)?;
            self.views.push(view);
        }

        if ctx.msaa_samples != vk::SampleCountFlags::TYPE_1 {
            self.msaa_color = Some(AttachmentImage::create(
                ctx,
                plan.extent,
                plan.format,
                ctx.msaa_samples,
                vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
            )?);
        }
        self.depth = Some(AttachmentImage::create(
            ctx,
            plan.extent,
            ctx.depth_format,
            ctx.msaa_samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )?);

        info!(
            "vk: swapchain {:?}/{:?}, {:?}, {}x{}, {} images (requested {})",
            plan.format,
            plan.color_space,
            plan.present_mode,
            plan.extent.width,
            plan.extent.height,
            self.images.len(),
            plan.image_count
        );
        Ok(())
    }

    /// One framebuffer per swapchain image, bound to this generation.
    pub unsafe fn create_framebuffers(
        &mut self,
        device: &ash::Device,
        pass: &RenderTargetPass,
    ) -> Result<()> {
        let depth = self
            .depth
            .as_ref()
            .ok_or_else(|| anyhow!("framebuffers requested before attachments"))?
            .view;
        let msaa_color = self.msaa_color.as_ref().map(|a| a.view);
        let extent = self.plan.extent;

        for &view in &self.views {
            let attachments = framebuffer_attachments(view, msaa_color, depth);
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: pass.handle,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = device
                .create_framebuffer(&fb_info, None)
                .context("create_framebuffer")?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    pub unsafe fn destroy_framebuffers(&mut self, device: &ash::Device) {
        for fb in self.framebuffers.drain(..) {
            device.destroy_framebuffer(fb, None);
        }
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        for part in TEARDOWN_ORDER {
            match part {
                SwapchainPart::Framebuffers => self.destroy_framebuffers(device),
                SwapchainPart::Depth => {
                    if let Some(mut depth) = self.depth.take() {
                        depth.destroy(device);
                    }
                }
                SwapchainPart::MsaaColor => {
                    if let Some(mut color) = self.msaa_color.take() {
                        color.destroy(device);
                    }
                }
                SwapchainPart::Views => {
                    for view in self.views.drain(..) {
                        device.destroy_image_view(view, None);
                    }
                }
                SwapchainPart::Handle => {
                    self.images.clear();
                    if self.handle != vk::SwapchainKHR::null() {
                        self.loader.destroy_swapchain(self.handle, None);
                        self.handle = vk::SwapchainKHR::null();
                    }
                }
            }
        }
    }
}

unsafe fn query_plan(
    inst: &InstanceContext,
    ctx: &DeviceContext,
    want: RenderSize,
    pref: PresentModePref,
) -> Result<SwapchainPlan> {
    let caps = inst
        .surface_loader
        .get_physical_device_surface_capabilities(ctx.phys, inst.surface)
        .context("get_physical_device_surface_capabilities")?;
    let formats = inst
        .surface_loader
        .get_physical_device_surface_formats(ctx.phys, inst.surface)
        .context("get_physical_device_surface_formats")?;
    let modes = inst
        .surface_loader
        .get_physical_device_surface_present_modes(ctx.phys, inst.surface)
        .context("get_physical_device_surface_present_modes")?;
    SwapchainPlan::new(&caps, &formats, &modes, want, pref)
        .ok_or_else(|| anyhow!("surface reports no formats"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 64,
                height: 48,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2160,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            ..Default::default()
        }
    }

    fn sf(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn extent_clamps_for_any_window_size() {
        let c = caps(2, 3);
        for (w, h) in [(1, 1), (64, 48), (800, 600), (4096, 2160), (100_000, 1), (u32::MAX - 1, 9000)] {
            let e = choose_extent(&c, RenderSize::new(w, h));
            assert!((64..=4096).contains(&e.width), "{w}x{h} -> {e:?}");
            assert!((48..=2160).contains(&e.height), "{w}x{h} -> {e:?}");
        }
        assert_eq!(
            choose_extent(&c, RenderSize::new(800, 600)),
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
    }

    #[test]
    fn fixed_surface_extent_wins() {
        let mut c = caps(2, 3);
        c.current_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let e = choose_extent(&c, RenderSize::new(1, 1));
        assert_eq!((e.width, e.height), (1280, 720));
    }

    #[test]
    fn image_count_is_min_plus_one_within_bounds() {
        assert_eq!(image_count(&caps(2, 0)), 3);
        assert_eq!(image_count(&caps(2, 8)), 3);
        assert_eq!(image_count(&caps(3, 3)), 3);
        for (min, max) in [(1, 0), (1, 1), (2, 2), (2, 3), (3, 16)] {
            let n = image_count(&caps(min, max));
            assert!(n >= min);
            if max > 0 {
                assert!(n <= max);
            }
        }
    }

    #[test]
    fn prefers_bgra_srgb_nonlinear() {
        let formats = [
            sf(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats).map(|f| f.format), Some(vk::Format::B8G8R8A8_SRGB));

        let others = [sf(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT)];
        assert_eq!(
            choose_surface_format(&others).map(|f| f.format),
            Some(vk::Format::R16G16B16A16_SFLOAT)
        );
        assert!(choose_surface_format(&[]).is_none());
    }

    #[test]
    fn mailbox_when_offered_else_fifo() {
        let both = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let fifo = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&both, PresentModePref::Mailbox), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&fifo, PresentModePref::Mailbox), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&both, PresentModePref::Fifo), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn planning_twice_is_identical() {
        let c = caps(2, 3);
        let formats = [sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let size = RenderSize::new(1024, 768);
        let a = SwapchainPlan::new(&c, &formats, &modes, size, PresentModePref::Mailbox).unwrap();
        let b = SwapchainPlan::new(&c, &formats, &modes, size, PresentModePref::Mailbox).unwrap();
        assert_eq!(a, b);
        assert_eq!((a.extent.width, a.extent.height), (1024, 768));
        assert_eq!(a.image_count, 3);
    }

    #[test]
    fn resolve_target_is_last_attachment() {
        let swap = vk::ImageView::from_raw(1);
        let color = vk::ImageView::from_raw(2);
        let depth = vk::ImageView::from_raw(3);
        assert_eq!(framebuffer_attachments(swap, None, depth), vec![swap, depth]);
        assert_eq!(
            framebuffer_attachments(swap, Some(color), depth),
            vec![color, depth, swap]
        );
    }

    fn pos<T: PartialEq>(order: &[T], step: T) -> usize {
        order.iter().position(|s| *s == step).unwrap_or(usize::MAX)
    }

    #[test]
    fn swapchain_teardown_releases_consumers_first() {
        let at = |p| pos(&TEARDOWN_ORDER, p);
        assert_eq!(TEARDOWN_ORDER[0], SwapchainPart::Framebuffers);
        assert!(at(SwapchainPart::Depth) < at(SwapchainPart::Handle));
        assert!(at(SwapchainPart::MsaaColor) < at(SwapchainPart::Handle));
        assert!(at(SwapchainPart::Views) < at(SwapchainPart::Handle));
        assert_eq!(TEARDOWN_ORDER[4], SwapchainPart::Handle);
    }

    #[test]
    fn rebuild_tears_down_before_building_in_reverse() {
        use RebuildStep::*;
        let at = |s| pos(&REBUILD_ORDER, s);
        // everything built on the swapchain is gone before it is recreated
        for step in [DestroyFramebuffers, DestroyPipeline, DestroyRenderPass] {
            assert!(at(step) < at(RecreateSwapchain), "{step:?}");
        }
        for step in [CreateRenderPass, CreatePipeline, CreateFramebuffers] {
            assert!(at(RecreateSwapchain) < at(step), "{step:?}");
        }
        assert!(at(DestroyFramebuffers) < at(DestroyPipeline));
        assert!(at(DestroyPipeline) < at(DestroyRenderPass));
        assert!(at(CreateRenderPass) < at(CreatePipeline));
        assert!(at(CreatePipeline) < at(CreateFramebuffers));
        assert_eq!(REBUILD_ORDER.len(), 7);
    }
}
