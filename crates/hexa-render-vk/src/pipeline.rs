// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::util::read_spv;
use ash::vk;
use hexa_render::{InstanceData, RenderError, Vertex};
use std::ffi::CStr;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::render_pass::RenderTargetPass;

const ENTRY_POINT: &CStr = c"main";

/// Which vertex streams the pipeline consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexLayout {
    /// binding 0 only: pos + color.
    PerVertex,
    /// binding 0 plus a per-instance vec2 offset at binding 1.
    Instanced,
}

pub struct VertexInput {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

pub fn vertex_input_layout(layout: VertexLayout) -> VertexInput {
    let mut bindings = vec![vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    }];
    let mut attributes = vec![
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, pos) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: std::mem::offset_of!(Vertex, color) as u32,
        },
    ];
    if layout == VertexLayout::Instanced {
        bindings.push(vk::VertexInputBindingDescription {
            binding: 1,
            stride: std::mem::size_of::<InstanceData>() as u32,
            input_rate: vk::VertexInputRate::INSTANCE,
        });
        attributes.push(vk::VertexInputAttributeDescription {
            location: 2,
            binding: 1,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::offset_of!(InstanceData, offset) as u32,
        });
    }
    VertexInput {
        bindings,
        attributes,
    }
}

/// SPIR-V words for both stages.
#[derive(Clone, Debug)]
pub struct ShaderCode {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

/// Where stage binaries come from. `Builtin` is compiled by build.rs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ShaderSource {
    #[default]
    Builtin,
    Files { vertex: PathBuf, fragment: PathBuf },
}

impl ShaderSource {
    pub fn load(&self, layout: VertexLayout) -> Result<ShaderCode, RenderError> {
        match self {
            ShaderSource::Builtin => {
                let (vs_name, vs): (&str, &[u8]) = match layout {
                    VertexLayout::Instanced => (
                        "hex.vert.spv",
                        include_bytes!(concat!(env!("OUT_DIR"), "/hex.vert.spv")),
                    ),
                    VertexLayout::PerVertex => (
                        "mesh.vert.spv",
                        include_bytes!(concat!(env!("OUT_DIR"), "/mesh.vert.spv")),
                    ),
                };
                let fs: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/color.frag.spv"));
                Ok(ShaderCode {
                    vertex: decode_spv(Path::new(vs_name), vs)?,
                    fragment: decode_spv(Path::new("color.frag.spv"), fs)?,
                })
            }
            ShaderSource::Files { vertex, fragment } => Ok(ShaderCode {
                vertex: read_spv_file(vertex)?,
                fragment: read_spv_file(fragment)?,
            }),
        }
    }
}

fn read_spv_file(path: &Path) -> Result<Vec<u32>, RenderError> {
    let bytes = std::fs::read(path).map_err(|source| RenderError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })?;
    decode_spv(path, &bytes)
}

fn decode_spv(path: &Path, bytes: &[u8]) -> Result<Vec<u32>, RenderError> {
    read_spv(&mut Cursor::new(bytes)).map_err(|source| RenderError::ShaderLoad {
        path: path.to_path_buf(),
        source,
    })
}

unsafe fn create_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: code.len() * 4,
        ..Default::default()
    };
    Ok(device
        .create_shader_module(&ci, None)
        .context("create_shader_module")?)
}

/// Graphics pipeline + its layout. Rebuilt whenever the render pass is.
pub struct PipelineState {
    pub layout: vk::PipelineLayout,
    pub handle: vk::Pipeline,
    pub vertex_layout: VertexLayout,
}

impl PipelineState {
    // STRICT: the pass must be the one the framebuffers are built against;
    // sample count comes from it.
    pub unsafe fn create(
        device: &ash::Device,
        pass: &RenderTargetPass,
        set_layout: vk::DescriptorSetLayout,
        vertex_layout: VertexLayout,
        code: &ShaderCode,
    ) -> Result<Self> {
        let vs = create_module(device, &code.vertex)?;
        let fs = match create_module(device, &code.fragment) {
            Ok(m) => m,
            Err(e) => {
                device.destroy_shader_module(vs, None);
                return Err(e);
            }
        };

        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: vs,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fs,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
        ];

        let input = vertex_input_layout(vertex_layout);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: input.bindings.len() as u32,
            p_vertex_binding_descriptions: input.bindings.as_ptr(),
            vertex_attribute_description_count: input.attributes.len() as u32,
            p_vertex_attribute_descriptions: input.attributes.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            ..Default::default()
        };
        let dyn_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
            dynamic_state_count: dyn_states.len() as u32,
            p_dynamic_states: dyn_states.as_ptr(),
            ..Default::default()
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };
        // Hex meshes are wound clockwise when seen from above.
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: pass.samples,
            ..Default::default()
        };
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
            depth_test_enable: vk::TRUE,
            depth_write_enable: vk::TRUE,
            depth_compare_op: vk::CompareOp::LESS,
            max_depth_bounds: 1.0,
            ..Default::default()
        };
        let color_blend_att = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            ..Default::default()
        };

        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: 1,
            p_set_layouts: &set_layout,
            ..Default::default()
        };
        let layout = match device.create_pipeline_layout(&layout_info, None) {
            Ok(l) => l,
            Err(e) => {
                device.destroy_shader_module(vs, None);
                device.destroy_shader_module(fs, None);
                return Err(anyhow!("create_pipeline_layout: {e:?}"));
            }
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_depth_stencil_state: &depth_stencil,
            p_color_blend_state: &color_blend,
            p_dynamic_state: &dynamic_state,
            layout,
            render_pass: pass.handle,
            subpass: 0,
            ..Default::default()
        };

        // Shader modules are only needed until the pipeline exists.
        let created = device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        );
        device.destroy_shader_module(vs, None);
        device.destroy_shader_module(fs, None);

        let handle = match created {
            Ok(p) => p[0],
            Err((_, err)) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(anyhow!("create_graphics_pipelines failed: {:?}", err));
            }
        };

        Ok(Self {
            layout,
            handle,
            vertex_layout,
        })
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        device.destroy_pipeline(self.handle, None);
        device.destroy_pipeline_layout(self.layout, None);
        self.handle = vk::Pipeline::null();
        self.layout = vk::PipelineLayout::null();
    }
}
