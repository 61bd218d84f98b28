// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use std::ffi::CStr;
use tracing::{debug, error, trace, warn};

/// Validation message sink. Installed right after the instance exists and
/// removed right before it is destroyed.
pub trait DiagnosticsHook {
    fn is_active(&self) -> bool;

    /// # Safety
    /// `instance` must be live and created from `entry`.
    unsafe fn install(&mut self, entry: &Entry, instance: &Instance) -> Result<()>;

    /// # Safety
    /// The instance passed to `install` must still be live.
    unsafe fn remove(&mut self);
}

/// Used when validation is off or `VK_EXT_debug_utils` is missing.
pub struct NoDiagnostics;

impl DiagnosticsHook for NoDiagnostics {
    fn is_active(&self) -> bool {
        false
    }

    unsafe fn install(&mut self, _entry: &Entry, _instance: &Instance) -> Result<()> {
        Ok(())
    }

    unsafe fn remove(&mut self) {}
}

#[derive(Default)]
pub struct DebugUtilsHook {
    loader: Option<debug_utils::Instance>,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DiagnosticsHook for DebugUtilsHook {
    fn is_active(&self) -> bool {
        true
    }

    unsafe fn install(&mut self, entry: &Entry, instance: &Instance) -> Result<()> {
        let loader = debug_utils::Instance::new(entry, instance);
        let ci = messenger_create_info();
        self.messenger = loader
            .create_debug_utils_messenger(&ci, None)
            .context("create_debug_utils_messenger")?;
        self.loader = Some(loader);
        Ok(())
    }

    unsafe fn remove(&mut self) {
        if let Some(loader) = self.loader.take() {
            loader.destroy_debug_utils_messenger(self.messenger, None);
            self.messenger = vk::DebugUtilsMessengerEXT::null();
        }
    }
}

pub fn hook_for(debug_utils_enabled: bool) -> Box<dyn DiagnosticsHook> {
    if debug_utils_enabled {
        Box::new(DebugUtilsHook::default())
    } else {
        Box::new(NoDiagnostics)
    }
}

/// Also chained into instance creation so create/destroy of the instance
/// itself is covered.
pub fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Severity {
    Error,
    Warn,
    Info,
    Verbose,
}

fn classify(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Severity {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Severity::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Severity::Warn
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Severity::Info
    } else {
        Severity::Verbose
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    match classify(severity) {
        Severity::Error => error!("vk[{types:?}] {msg}"),
        Severity::Warn => warn!("vk[{types:?}] {msg}"),
        Severity::Info => debug!("vk[{types:?}] {msg}"),
        Severity::Verbose => trace!("vk[{types:?}] {msg}"),
    }
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_hook_is_inert() {
        assert!(!hook_for(false).is_active());
        assert!(hook_for(true).is_active());
    }

    #[test]
    fn severity_routes_to_highest_bit() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(classify(S::ERROR | S::WARNING), Severity::Error);
        assert_eq!(classify(S::WARNING), Severity::Warn);
        assert_eq!(classify(S::INFO), Severity::Info);
        assert_eq!(classify(S::VERBOSE), Severity::Verbose);
    }

    #[test]
    fn messenger_covers_warnings_and_errors() {
        let ci = messenger_create_info();
        assert!(ci
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(ci
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(ci.pfn_user_callback.is_some());
    }
}
