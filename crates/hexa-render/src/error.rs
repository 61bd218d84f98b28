// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

/// Failures callers need to tell apart. Everything here is fatal: recoverable
/// surface conditions travel as [`crate::AcquireOutcome`] /
/// [`crate::PresentOutcome`] values instead.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(
        "no suitable graphics device (needs graphics + present queues, VK_KHR_swapchain, \
         surface formats and present modes)"
    )]
    NoSuitableDevice,

    #[error("validation requested but layer {0} is not installed")]
    ValidationUnavailable(String),

    #[error("failed to load shader {}", path.display())]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no memory type in mask {type_bits:#x} has {required}")]
    NoMemoryType { type_bits: u32, required: String },

    #[error("no supported depth attachment format")]
    NoDepthFormat,

    /// A begin/end/submit call the frame loop relies on was rejected.
    #[error("{op} failed: {result}")]
    Contract { op: &'static str, result: String },
}

impl RenderError {
    pub fn contract(op: &'static str, result: impl std::fmt::Debug) -> Self {
        Self::Contract {
            op,
            result: format!("{result:?}"),
        }
    }
}
