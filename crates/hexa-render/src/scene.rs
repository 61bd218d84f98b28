// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use bytemuck::{Pod, Zeroable};

use crate::RenderSize;

/// Per-vertex stream (binding 0).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

/// Per-instance stream (binding 1): where to place one copy of the mesh.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub offset: [f32; 2],
}

/// Layout matches the vertex shader's `set = 0, binding = 0` block.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl Default for CameraUniforms {
    fn default() -> Self {
        const IDENTITY: [[f32; 4]; 4] = [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ];
        Self {
            model: IDENTITY,
            view: IDENTITY,
            proj: IDENTITY,
        }
    }
}

/// One indexed draw: a mesh plus the optional instance offsets it is
/// replicated at. An empty `instances` list draws the mesh once.
#[derive(Clone, Debug, Default)]
pub struct GeometryBatch {
    pub label: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub instances: Vec<InstanceData>,
}

impl GeometryBatch {
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn instance_count(&self) -> u32 {
        self.instances.len().max(1) as u32
    }

    pub fn is_instanced(&self) -> bool {
        !self.instances.is_empty()
    }

    /// Nothing to draw; such batches are skipped at upload.
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }
}

/// What the frame loop needs from the window.
pub trait WindowSurface {
    /// Current framebuffer size in pixels; zero while minimized.
    fn framebuffer_size(&self) -> RenderSize;

    /// Returns and clears the "resized since last asked" flag.
    fn take_resized(&mut self) -> bool;

    /// Blocks until at least one window event has been dispatched.
    fn wait_events(&mut self) -> Result<()>;

    fn close_requested(&self) -> bool {
        false
    }
}

/// Supplies the model/view/projection triple for the frame about to be
/// recorded.
pub trait CameraSource {
    fn camera_uniforms(&mut self, extent: RenderSize) -> CameraUniforms;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_three_mat4() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 3 * 64);
        assert_eq!(std::mem::size_of::<Vertex>(), 24);
        assert_eq!(std::mem::size_of::<InstanceData>(), 8);
    }

    #[test]
    fn non_instanced_batch_draws_once() {
        let batch = GeometryBatch {
            label: "model".into(),
            vertices: vec![Vertex::default(); 3],
            indices: vec![0, 1, 2],
            instances: Vec::new(),
        };
        assert_eq!(batch.instance_count(), 1);
        assert_eq!(batch.index_count(), 3);
        assert!(!batch.is_instanced());
        assert!(!batch.is_empty());
    }
}
