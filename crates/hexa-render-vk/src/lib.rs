// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device bring-up, swapchain, render pass, pipeline and
//! the per-slot frame protocol behind [`hexa_render::FrameBackend`].

mod buffer;
mod commands;
mod device;
mod diagnostics;
mod instance;
mod pipeline;
mod render_pass;
mod renderer;
mod swapchain;
mod sync;

pub use device::DeviceConfig;
pub use pipeline::{ShaderSource, VertexLayout};
pub use renderer::{RendererConfig, VkRenderer};
pub use swapchain::PresentModePref;
