// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry, Instance};
use hexa_render::RenderError;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CStr;
use tracing::{info, warn};

use crate::diagnostics::{self, DiagnosticsHook};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"hexaterrain";

/// Instance-scoped state. Outlives the device; torn down last.
pub struct InstanceContext {
    pub entry: Entry,
    pub instance: Instance,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
    diagnostics: Box<dyn DiagnosticsHook>,
}

pub fn has_layer(props: &[vk::LayerProperties], name: &CStr) -> bool {
    props
        .iter()
        .any(|p| p.layer_name_as_c_str().is_ok_and(|n| n == name))
}

pub fn has_extension(props: &[vk::ExtensionProperties], name: &CStr) -> bool {
    props
        .iter()
        .any(|p| p.extension_name_as_c_str().is_ok_and(|n| n == name))
}

// STRICT ORDER:
// 1) Instance (WSI extensions, optional validation layer + debug utils)
// 2) Diagnostics hook
// 3) Surface FROM THIS INSTANCE; device selection later queries against it
pub unsafe fn create_instance_and_surface(
    window: &dyn HasWindowHandle,
    display: &dyn HasDisplayHandle,
    enable_validation: bool,
) -> Result<InstanceContext> {
    let dh = display
        .display_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();
    let wh = window
        .window_handle()
        .map_err(|e| anyhow!("{e}"))?
        .as_raw();

    let entry = Entry::load().context("load Vulkan loader")?;

    if enable_validation {
        let layers = entry
            .enumerate_instance_layer_properties()
            .context("enumerate_instance_layer_properties")?;
        if !has_layer(&layers, VALIDATION_LAYER) {
            return Err(RenderError::ValidationUnavailable(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            )
            .into());
        }
    }

    let inst_exts = entry
        .enumerate_instance_extension_properties(None)
        .context("enumerate_instance_extension_properties")?;
    let debug_utils_on = enable_validation && has_extension(&inst_exts, debug_utils::NAME);
    if enable_validation && !debug_utils_on {
        warn!("vk: validation on but {:?} missing; messages go to stdout", debug_utils::NAME);
    }

    let mut ext_vec = ash_window::enumerate_required_extensions(dh)
        .context("enumerate_required_extensions")?
        .to_vec();
    if debug_utils_on {
        ext_vec.push(debug_utils::NAME.as_ptr());
    }
    let layer_vec = if enable_validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: APP_NAME.as_ptr(),
        application_version: 0,
        p_engine_name: APP_NAME.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let debug_ci = diagnostics::messenger_create_info();
    let p_next = if debug_utils_on {
        &debug_ci as *const _ as *const std::ffi::c_void
    } else {
        std::ptr::null()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_next,
        p_application_info: &app_info,
        enabled_extension_count: ext_vec.len() as u32,
        pp_enabled_extension_names: ext_vec.as_ptr(),
        enabled_layer_count: layer_vec.len() as u32,
        pp_enabled_layer_names: layer_vec.as_ptr(),
        ..Default::default()
    };
    let instance = entry
        .create_instance(&create_info, None)
        .context("create_instance")?;

    let mut hook = diagnostics::hook_for(debug_utils_on);
    if let Err(e) = hook.install(&entry, &instance) {
        instance.destroy_instance(None);
        return Err(e);
    }

    let surface_loader = surface::Instance::new(&entry, &instance);
    let surface = match ash_window::create_surface(&entry, &instance, dh, wh, None) {
        Ok(s) => s,
        Err(e) => {
            hook.remove();
            instance.destroy_instance(None);
            return Err(anyhow!("ash_window::create_surface: {e:?}"));
        }
    };

    info!(
        "vk: instance ready (validation={}, debug_utils={})",
        enable_validation,
        hook.is_active()
    );

    Ok(InstanceContext {
        entry,
        instance,
        surface_loader,
        surface,
        diagnostics: hook,
    })
}

impl InstanceContext {
    /// Surface, then diagnostics, then the instance. Every child object
    /// must already be gone.
    pub unsafe fn destroy(&mut self) {
        self.surface_loader.destroy_surface(self.surface, None);
        self.surface = vk::SurfaceKHR::null();
        self.diagnostics.remove();
        self.instance.destroy_instance(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &str) -> vk::LayerProperties {
        let mut p = vk::LayerProperties::default();
        for (dst, src) in p.layer_name.iter_mut().zip(name.bytes()) {
            *dst = src as std::ffi::c_char;
        }
        p
    }

    fn extension(name: &str) -> vk::ExtensionProperties {
        let mut p = vk::ExtensionProperties::default();
        for (dst, src) in p.extension_name.iter_mut().zip(name.bytes()) {
            *dst = src as std::ffi::c_char;
        }
        p
    }

    #[test]
    fn finds_validation_layer_by_name() {
        let props = [
            layer("VK_LAYER_MESA_device_select"),
            layer("VK_LAYER_KHRONOS_validation"),
        ];
        assert!(has_layer(&props, VALIDATION_LAYER));
        assert!(!has_layer(&props[..1], VALIDATION_LAYER));
        assert!(!has_layer(&[], VALIDATION_LAYER));
    }

    #[test]
    fn extension_match_is_exact() {
        let props = [extension("VK_EXT_debug_utils_v2"), extension("VK_KHR_surface")];
        assert!(!has_extension(&props, debug_utils::NAME));
        assert!(has_extension(&props, surface::NAME));
    }
}
