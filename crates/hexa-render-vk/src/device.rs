// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::{vk, Instance};
use hexa_render::RenderError;
use serde::Deserialize;
use tracing::{info, warn};

use crate::instance::has_extension;

/// Device construction knobs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub enable_validation: bool,
    /// Index into the enumerated physical devices. Falls back to scan order
    /// when out of range or unsuitable.
    pub preferred_device_index: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// A family that does both wins; otherwise the first of each.
    pub fn find(
        props: &[vk::QueueFamilyProperties],
        present_support: impl Fn(u32) -> bool,
    ) -> Option<Self> {
        let mut graphics = None;
        let mut present = None;
        for (i, q) in props.iter().enumerate() {
            let i = i as u32;
            let g = q.queue_count > 0 && q.queue_flags.contains(vk::QueueFlags::GRAPHICS);
            let p = present_support(i);
            if g && p {
                return Some(Self {
                    graphics: i,
                    present: i,
                });
            }
            if g && graphics.is_none() {
                graphics = Some(i);
            }
            if p && present.is_none() {
                present = Some(i);
            }
        }
        Some(Self {
            graphics: graphics?,
            present: present?,
        })
    }

    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// What a physical device offers against our surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct DeviceCandidate {
    pub families: Option<QueueFamilies>,
    pub has_swapchain: bool,
    pub format_count: usize,
    pub present_mode_count: usize,
}

impl DeviceCandidate {
    pub fn is_suitable(&self) -> bool {
        self.families.is_some()
            && self.has_swapchain
            && self.format_count > 0
            && self.present_mode_count > 0
    }
}

/// The preferred index when it is in range and suitable, else the first
/// suitable candidate.
pub fn pick_candidate(candidates: &[DeviceCandidate], preferred: Option<usize>) -> Option<usize> {
    if let Some(idx) = preferred {
        match candidates.get(idx) {
            Some(c) if c.is_suitable() => return Some(idx),
            Some(_) => warn!("vk: preferred device #{idx} is unsuitable; scanning"),
            None => warn!(
                "vk: preferred device #{idx} out of range ({} found); scanning",
                candidates.len()
            ),
        }
    }
    candidates.iter().position(DeviceCandidate::is_suitable)
}

pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts = limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&c| counts.contains(c))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

pub fn choose_depth_format(
    format_props: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    DEPTH_CANDIDATES.into_iter().find(|&fmt| {
        format_props(fmt)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

pub fn memory_type_index(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0
            && props.memory_types[i as usize]
                .property_flags
                .contains(required)
    })
}

/// Logical device plus everything queried about the physical one. Outlives
/// every other GPU object.
pub struct DeviceContext {
    pub phys: vk::PhysicalDevice,
    pub device: ash::Device,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub msaa_samples: vk::SampleCountFlags,
    pub depth_format: vk::Format,
    pub mem_props: vk::PhysicalDeviceMemoryProperties,
    pub name: String,
}

impl DeviceContext {
    pub fn find_memory_type(
        &self,
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    ) -> Result<u32, RenderError> {
        memory_type_index(&self.mem_props, type_bits, required).ok_or_else(|| {
            RenderError::NoMemoryType {
                type_bits,
                required: format!("{required:?}"),
            }
        })
    }

    pub unsafe fn destroy(&mut self) {
        self.device.destroy_device(None);
    }
}

unsafe fn inspect_candidate(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> DeviceCandidate {
    let qprops = instance.get_physical_device_queue_family_properties(phys);
    let families = QueueFamilies::find(&qprops, |i| {
        surface_loader
            .get_physical_device_surface_support(phys, i, surface)
            .unwrap_or(false)
    });
    let has_swapchain = instance
        .enumerate_device_extension_properties(phys)
        .map(|exts| has_extension(&exts, swapchain::NAME))
        .unwrap_or(false);
    // Surface queries only make sense once the extension is known present.
    let (format_count, present_mode_count) = if has_swapchain {
        (
            surface_loader
                .get_physical_device_surface_formats(phys, surface)
                .map(|f| f.len())
                .unwrap_or(0),
            surface_loader
                .get_physical_device_surface_present_modes(phys, surface)
                .map(|m| m.len())
                .unwrap_or(0),
        )
    } else {
        (0, 0)
    };
    DeviceCandidate {
        families,
        has_swapchain,
        format_count,
        present_mode_count,
    }
}

pub unsafe fn create_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
    cfg: &DeviceConfig,
) -> Result<DeviceContext> {
    let physical = instance
        .enumerate_physical_devices()
        .context("enumerate_physical_devices")?;
    let candidates: Vec<DeviceCandidate> = physical
        .iter()
        .map(|&p| inspect_candidate(instance, surface_loader, surface, p))
        .collect();

    let idx = pick_candidate(&candidates, cfg.preferred_device_index)
        .ok_or(RenderError::NoSuitableDevice)?;
    let phys = physical[idx];
    let families = candidates[idx]
        .families
        .ok_or(RenderError::NoSuitableDevice)?;

    let props = instance.get_physical_device_properties(phys);
    let name = props
        .device_name_as_c_str()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_owned());
    let msaa_samples = max_usable_sample_count(&props.limits);
    let depth_format =
        choose_depth_format(|f| instance.get_physical_device_format_properties(phys, f))
            .ok_or(RenderError::NoDepthFormat)?;
    let mem_props = instance.get_physical_device_memory_properties(phys);

    // One queue per distinct family.
    let priorities = [1.0_f32];
    let qinfos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let device_exts = [swapchain::NAME.as_ptr()];
    let features = vk::PhysicalDeviceFeatures::default();
    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: qinfos.len() as u32,
        p_queue_create_infos: qinfos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    let device = instance
        .create_device(phys, &dinfo, None)
        .context("create_device")?;

    let graphics_queue = device.get_device_queue(families.graphics, 0);
    let present_queue = device.get_device_queue(families.present, 0);

    info!(
        "vk: device #{idx} \"{name}\" (graphics qf {}, present qf {}, msaa {:?}, depth {:?})",
        families.graphics, families.present, msaa_samples, depth_format
    );

    Ok(DeviceContext {
        phys,
        device,
        families,
        graphics_queue,
        present_queue,
        msaa_samples,
        depth_format,
        mem_props,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn suitable() -> DeviceCandidate {
        DeviceCandidate {
            families: Some(QueueFamilies {
                graphics: 0,
                present: 0,
            }),
            has_swapchain: true,
            format_count: 2,
            present_mode_count: 1,
        }
    }

    #[test]
    fn combined_family_preferred() {
        let props = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
        ];
        let qf = QueueFamilies::find(&props, |i| i != 0).unwrap();
        assert_eq!(qf, QueueFamilies { graphics: 2, present: 2 });
        assert!(qf.is_shared());
        assert_eq!(qf.unique(), vec![2]);
    }

    #[test]
    fn split_families_when_none_does_both() {
        let props = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::TRANSFER)];
        let qf = QueueFamilies::find(&props, |i| i == 1).unwrap();
        assert_eq!(qf, QueueFamilies { graphics: 0, present: 1 });
        assert_eq!(qf.unique(), vec![0, 1]);
    }

    #[test]
    fn missing_present_family_is_none() {
        let props = [family(vk::QueueFlags::GRAPHICS)];
        assert!(QueueFamilies::find(&props, |_| false).is_none());
    }

    #[test]
    fn suitability_needs_every_criterion() {
        assert!(suitable().is_suitable());
        assert!(!DeviceCandidate { families: None, ..suitable() }.is_suitable());
        assert!(!DeviceCandidate { has_swapchain: false, ..suitable() }.is_suitable());
        assert!(!DeviceCandidate { format_count: 0, ..suitable() }.is_suitable());
        assert!(!DeviceCandidate { present_mode_count: 0, ..suitable() }.is_suitable());
    }

    #[test]
    fn preferred_device_falls_back_to_scan() {
        let bad = DeviceCandidate::default();
        let list = [bad, suitable(), suitable()];
        assert_eq!(pick_candidate(&list, None), Some(1));
        assert_eq!(pick_candidate(&list, Some(2)), Some(2));
        assert_eq!(pick_candidate(&list, Some(0)), Some(1));
        assert_eq!(pick_candidate(&list, Some(9)), Some(1));
        assert_eq!(pick_candidate(&[bad], None), None);
    }

    #[test]
    fn sample_count_is_highest_shared() {
        use vk::SampleCountFlags as S;
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: S::TYPE_1 | S::TYPE_2 | S::TYPE_4 | S::TYPE_8,
            framebuffer_depth_sample_counts: S::TYPE_1 | S::TYPE_2 | S::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), S::TYPE_4);

        let single = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: S::TYPE_1,
            framebuffer_depth_sample_counts: S::TYPE_1 | S::TYPE_64,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&single), S::TYPE_1);
    }

    #[test]
    fn depth_format_follows_candidate_order() {
        let only_d24 = |f: vk::Format| vk::FormatProperties {
            optimal_tiling_features: if f == vk::Format::D24_UNORM_S8_UINT {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            },
            ..Default::default()
        };
        assert_eq!(choose_depth_format(only_d24), Some(vk::Format::D24_UNORM_S8_UINT));

        let all = |_| vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        assert_eq!(choose_depth_format(all), Some(vk::Format::D32_SFLOAT));

        let linear_only = |_| vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        assert_eq!(choose_depth_format(linear_only), None);
    }

    #[test]
    fn memory_type_respects_mask_and_flags() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(memory_type_index(&props, 0b111, host), Some(1));
        assert_eq!(memory_type_index(&props, 0b101, host), Some(2));
        assert_eq!(memory_type_index(&props, 0b001, host), None);
    }
}
