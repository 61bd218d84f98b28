// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

/// Attachment descriptions plus the subpass references into them.
/// Index order: color, depth, then resolve when multisampling.
#[derive(Clone, Debug)]
pub struct AttachmentPlan {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color_ref: vk::AttachmentReference,
    pub depth_ref: vk::AttachmentReference,
    pub resolve_ref: Option<vk::AttachmentReference>,
}

pub fn attachment_plan(
    color_format: vk::Format,
    samples: vk::SampleCountFlags,
    depth_format: vk::Format,
) -> AttachmentPlan {
    let msaa = samples != vk::SampleCountFlags::TYPE_1;

    let color = vk::AttachmentDescription {
        format: color_format,
        samples,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        // Multisampled color is resolved, never presented.
        final_layout: if msaa {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        },
        ..Default::default()
    };
    let depth = vk::AttachmentDescription {
        format: depth_format,
        samples,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::DONT_CARE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ..Default::default()
    };

    let mut attachments = vec![color, depth];
    let resolve_ref = msaa.then(|| {
        attachments.push(vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        });
        vk::AttachmentReference {
            attachment: 2,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    });

    AttachmentPlan {
        attachments,
        color_ref: vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        },
        depth_ref: vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        },
        resolve_ref,
    }
}

/// External -> subpass 0 on color output and depth tests. Covers the
/// acquire semaphore wait and the previous frame's attachment writes; the
/// depth and MSAA color images are shared by every slot.
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

#[derive(Default)]
pub struct RenderTargetPass {
    pub handle: vk::RenderPass,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub samples: vk::SampleCountFlags,
}

impl RenderTargetPass {
    pub unsafe fn create(
        device: &ash::Device,
        color_format: vk::Format,
        samples: vk::SampleCountFlags,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let plan = attachment_plan(color_format, samples, depth_format);
        let dependency = external_dependency();

        let subpass = vk::SubpassDescription {
            pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
            color_attachment_count: 1,
            p_color_attachments: &plan.color_ref,
            p_depth_stencil_attachment: &plan.depth_ref,
            p_resolve_attachments: plan
                .resolve_ref
                .as_ref()
                .map_or(std::ptr::null(), |r| r as *const _),
            ..Default::default()
        };

        let rp_info = vk::RenderPassCreateInfo {
            s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
            attachment_count: plan.attachments.len() as u32,
            p_attachments: plan.attachments.as_ptr(),
            subpass_count: 1,
            p_subpasses: &subpass,
            dependency_count: 1,
            p_dependencies: &dependency,
            ..Default::default()
        };
        let handle = device
            .create_render_pass(&rp_info, None)
            .context("create_render_pass")?;

        Ok(Self {
            handle,
            color_format,
            depth_format,
            samples,
        })
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_render_pass(self.handle, None);
        self.handle = vk::RenderPass::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_sample_presents_color_directly() {
        let plan = attachment_plan(
            vk::Format::B8G8R8A8_SRGB,
            vk::SampleCountFlags::TYPE_1,
            vk::Format::D32_SFLOAT,
        );
        assert_eq!(plan.attachments.len(), 2);
        assert!(plan.resolve_ref.is_none());
        assert_eq!(plan.attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(plan.attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(plan.attachments[0].store_op, vk::AttachmentStoreOp::STORE);
    }

    #[test]
    fn multisample_adds_resolve_target() {
        let plan = attachment_plan(
            vk::Format::B8G8R8A8_SRGB,
            vk::SampleCountFlags::TYPE_4,
            vk::Format::D32_SFLOAT,
        );
        assert_eq!(plan.attachments.len(), 3);
        let color = plan.attachments[0];
        let resolve = plan.attachments[2];
        assert_eq!(color.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(resolve.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(plan.resolve_ref.map(|r| r.attachment), Some(2));
    }

    #[test]
    fn depth_is_cleared_and_discarded() {
        let plan = attachment_plan(
            vk::Format::B8G8R8A8_SRGB,
            vk::SampleCountFlags::TYPE_2,
            vk::Format::D24_UNORM_S8_UINT,
        );
        let depth = plan.attachments[1];
        assert_eq!(depth.format, vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(depth.samples, vk::SampleCountFlags::TYPE_2);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(plan.depth_ref.attachment, 1);
    }

    #[test]
    fn dependency_guards_color_and_depth() {
        let dep = external_dependency();
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert!(dep
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(dep
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
        // the shared MSAA target is cleared again by the next slot
        assert!(dep.src_access_mask.contains(
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        ));
    }
}
