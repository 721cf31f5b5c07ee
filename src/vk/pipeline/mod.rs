//! Descriptor layouts, pipeline layout, and graphics/compute pipelines.
//!
//! Descriptor sets are grouped by the script's own `desc_set` indices rather
//! than a fixed per-frame/per-material layout, and the push-constant range is
//! sized by the script's actual `SetPushConstant` writes rather than fixed.

pub mod shader_compiler;

use std::collections::BTreeMap;
use std::ffi::CStr;

use ash::vk;

use crate::config::RunnerConfig;
use crate::error::VrResult;
use crate::format::FormatTable;
use crate::script::{BufferType, PipelineSource, PipelineType, Script, ScriptCommand};

const ENTRY_POINT: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

/// One compiled `VkPipeline`, keyed by its index into `script.pipelines`.
pub struct CompiledPipeline {
    pub pipeline_type: PipelineType,
    pub pipeline: vk::Pipeline,
}

/// Everything built from a script's buffers and pipeline keys: descriptor
/// layouts/pool/sets, one pipeline layout, one pipeline cache shared by every
/// pipeline built from it, and one `VkPipeline` per script pipeline key.
pub struct PipelineResources {
    device: ash::Device,
    /// Indexed by `desc_set`; every index in `[0, max_desc_set]` has an
    /// entry, empty sets included.
    pub descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    pub descriptor_pool: Option<vk::DescriptorPool>,
    /// Parallel to `descriptor_set_layouts`; empty if `descriptor_pool` is
    /// `None` (no buffers declared at all).
    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline_cache: vk::PipelineCache,
    pub pipelines: Vec<CompiledPipeline>,
    shader_modules: Vec<vk::ShaderModule>,
}

impl PipelineResources {
    /// Build every descriptor/pipeline resource a script needs, against a
    /// render pass already created for the script's window format.
    pub fn build(device: &ash::Device, script: &Script, render_pass: vk::RenderPass, config: &RunnerConfig) -> VrResult<Self> {
        let mut guard = CleanupGuard::new(device);

        let descriptor_set_layouts = build_descriptor_set_layouts(device, script)?;
        guard.descriptor_set_layouts = descriptor_set_layouts.clone();

        let (descriptor_pool, descriptor_sets) = build_descriptor_pool_and_sets(device, script, &descriptor_set_layouts)?;
        guard.descriptor_pool = descriptor_pool;

        let push_constant_size = push_constant_size(script);
        let pipeline_layout = build_pipeline_layout(device, &descriptor_set_layouts, push_constant_size)?;
        guard.pipeline_layout = Some(pipeline_layout);

        let pipeline_cache_create_info = vk::PipelineCacheCreateInfo::builder();
        let pipeline_cache = unsafe { device.create_pipeline_cache(&pipeline_cache_create_info, None)? };
        guard.pipeline_cache = Some(pipeline_cache);

        let api_version = (script.requirements.version.0.max(1), script.requirements.version.1);
        let format_table = FormatTable::standard();

        let mut pipelines = Vec::with_capacity(script.pipelines.len());
        let mut first_graphics: Option<vk::Pipeline> = None;

        for key in &script.pipelines {
            let stage_modules = build_stage_modules(device, key, api_version, config)?;
            for (_, module) in &stage_modules {
                guard.shader_modules.push(*module);
            }

            let pipeline = match key.pipeline_type {
                PipelineType::Compute => {
                    log::debug!("building compute pipeline");
                    build_compute_pipeline(device, &stage_modules, pipeline_layout, pipeline_cache)?
                }
                PipelineType::Graphics => {
                    log::debug!("building graphics pipeline (derivative of first: {})", first_graphics.is_some());
                    let pipeline = build_graphics_pipeline(device, key, &stage_modules, pipeline_layout, pipeline_cache, render_pass, script, &format_table, first_graphics)?;
                    if first_graphics.is_none() {
                        first_graphics = Some(pipeline);
                    }
                    pipeline
                }
            };

            guard.pipelines.push(pipeline);
            pipelines.push(CompiledPipeline { pipeline_type: key.pipeline_type, pipeline });
        }

        let shader_modules = guard.shader_modules.clone();
        guard.disarm();

        Ok(Self {
            device: device.clone(),
            descriptor_set_layouts,
            descriptor_pool,
            descriptor_sets,
            pipeline_layout,
            pipeline_cache,
            pipelines,
            shader_modules,
        })
    }
}

impl Drop for PipelineResources {
    fn drop(&mut self) {
        unsafe {
            for pipeline in &self.pipelines {
                self.device.destroy_pipeline(pipeline.pipeline, None);
            }
            self.device.destroy_pipeline_cache(self.pipeline_cache, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
            if let Some(pool) = self.descriptor_pool.take() {
                self.device.destroy_descriptor_pool(pool, None);
            }
            for layout in self.descriptor_set_layouts.drain(..) {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
            for module in self.shader_modules.drain(..) {
                self.device.destroy_shader_module(module, None);
            }
        }
    }
}

/// Tears down everything accumulated so far if dropped while still armed;
/// `PipelineResources::build` disarms it once construction succeeds.
struct CleanupGuard<'a> {
    device: &'a ash::Device,
    descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,
    descriptor_pool: Option<vk::DescriptorPool>,
    pipeline_layout: Option<vk::PipelineLayout>,
    pipeline_cache: Option<vk::PipelineCache>,
    pipelines: Vec<vk::Pipeline>,
    shader_modules: Vec<vk::ShaderModule>,
    armed: bool,
}

impl<'a> CleanupGuard<'a> {
    fn new(device: &'a ash::Device) -> Self {
        Self {
            device,
            descriptor_set_layouts: Vec::new(),
            descriptor_pool: None,
            pipeline_layout: None,
            pipeline_cache: None,
            pipelines: Vec::new(),
            shader_modules: Vec::new(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<'a> Drop for CleanupGuard<'a> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        unsafe {
            for pipeline in &self.pipelines {
                self.device.destroy_pipeline(*pipeline, None);
            }
            if let Some(cache) = self.pipeline_cache {
                self.device.destroy_pipeline_cache(cache, None);
            }
            if let Some(layout) = self.pipeline_layout {
                self.device.destroy_pipeline_layout(layout, None);
            }
            if let Some(pool) = self.descriptor_pool {
                self.device.destroy_descriptor_pool(pool, None);
            }
            for layout in &self.descriptor_set_layouts {
                self.device.destroy_descriptor_set_layout(*layout, None);
            }
            for module in &self.shader_modules {
                self.device.destroy_shader_module(*module, None);
            }
        }
    }
}

fn build_descriptor_set_layouts(device: &ash::Device, script: &Script) -> VrResult<Vec<vk::DescriptorSetLayout>> {
    let max_desc_set = script.buffers.iter().map(|b| b.desc_set).max();
    let Some(max_desc_set) = max_desc_set else {
        return Ok(Vec::new());
    };

    let mut grouped: BTreeMap<u32, Vec<&crate::script::ScriptBuffer>> = BTreeMap::new();
    for buffer in &script.buffers {
        grouped.entry(buffer.desc_set).or_default().push(buffer);
    }

    let mut layouts = Vec::with_capacity(max_desc_set as usize + 1);
    for desc_set in 0..=max_desc_set {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = grouped
            .get(&desc_set)
            .into_iter()
            .flatten()
            .map(|buffer| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(buffer.binding)
                    .descriptor_type(buffer.buffer_type.descriptor_type())
                    .descriptor_count(1)
                    .stage_flags(stage_flags_for(script, desc_set, buffer.binding))
                    .build()
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let layout = match unsafe { device.create_descriptor_set_layout(&create_info, None) } {
            Ok(layout) => layout,
            Err(e) => {
                for created in &layouts {
                    unsafe { device.destroy_descriptor_set_layout(*created, None) };
                }
                return Err(e.into());
            }
        };
        layouts.push(layout);
    }

    Ok(layouts)
}

/// Union of every pipeline stage that touches `(desc_set, binding)`. Falls
/// back to `ALL` when no pipeline references the buffer, since the script
/// may still probe it without ever binding it in a draw.
fn stage_flags_for(script: &Script, desc_set: u32, binding: u32) -> vk::ShaderStageFlags {
    let _ = (desc_set, binding);
    let union = script
        .pipelines
        .iter()
        .fold(vk::ShaderStageFlags::empty(), |flags, key| flags | key.stage_flags());
    if union.is_empty() {
        vk::ShaderStageFlags::ALL
    } else {
        union
    }
}

fn build_descriptor_pool_and_sets(device: &ash::Device, script: &Script, layouts: &[vk::DescriptorSetLayout]) -> VrResult<(Option<vk::DescriptorPool>, Vec<vk::DescriptorSet>)> {
    if script.buffers.is_empty() {
        return Ok((None, Vec::new()));
    }

    let ubo_count = script.buffers.iter().filter(|b| b.buffer_type == BufferType::Ubo).count() as u32;
    let ssbo_count = script.buffers.iter().filter(|b| b.buffer_type == BufferType::Ssbo).count() as u32;

    let mut pool_sizes = Vec::new();
    if ubo_count > 0 {
        pool_sizes.push(vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER, descriptor_count: ubo_count });
    }
    if ssbo_count > 0 {
        pool_sizes.push(vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_BUFFER, descriptor_count: ssbo_count });
    }

    let pool_create_info = vk::DescriptorPoolCreateInfo::builder()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(layouts.len() as u32)
        .pool_sizes(&pool_sizes);
    let pool = unsafe { device.create_descriptor_pool(&pool_create_info, None)? };

    let alloc_info = vk::DescriptorSetAllocateInfo::builder().descriptor_pool(pool).set_layouts(layouts);
    let sets = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
        Ok(sets) => sets,
        Err(e) => {
            unsafe { device.destroy_descriptor_pool(pool, None) };
            return Err(e.into());
        }
    };

    Ok((Some(pool), sets))
}

/// `[0, max push-constant write end)`, spanning all stages.
fn push_constant_size(script: &Script) -> u32 {
    script
        .commands
        .iter()
        .filter_map(|cmd| match cmd {
            ScriptCommand::SetPushConstant { offset, data, .. } => Some(offset + data.len() as u32),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

fn build_pipeline_layout(device: &ash::Device, descriptor_set_layouts: &[vk::DescriptorSetLayout], push_constant_size: u32) -> VrResult<vk::PipelineLayout> {
    let ranges = if push_constant_size > 0 {
        vec![vk::PushConstantRange { stage_flags: vk::ShaderStageFlags::ALL, offset: 0, size: push_constant_size }]
    } else {
        Vec::new()
    };

    let create_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(descriptor_set_layouts).push_constant_ranges(&ranges);
    Ok(unsafe { device.create_pipeline_layout(&create_info, None)? })
}

fn build_shader_module(device: &ash::Device, spirv: &[u8]) -> VrResult<vk::ShaderModule> {
    let (prefix, words, suffix) = unsafe { spirv.align_to::<u32>() };
    if !prefix.is_empty() || !suffix.is_empty() {
        return Err(crate::error::VrError::InvalidOperation("compiled SPIR-V is not 4-byte aligned".to_string()));
    }
    let create_info = vk::ShaderModuleCreateInfo::builder().code(words);
    Ok(unsafe { device.create_shader_module(&create_info, None)? })
}

fn build_stage_modules(device: &ash::Device, key: &crate::script::PipelineKey, api_version: (u32, u32), config: &RunnerConfig) -> VrResult<Vec<(vk::ShaderStageFlags, vk::ShaderModule)>> {
    let mut modules = Vec::with_capacity(key.stages.len());
    for (stage, source) in &key.stages {
        let spirv = shader_compiler::compile(source, shader_compiler::stage_flag(*stage), api_version, config)?;
        if config.disassemble_shaders {
            match shader_compiler::disassemble(&spirv, config) {
                Ok(text) => log::debug!("disassembly of {} stage:\n{text}", shader_compiler::stage_flag(*stage)),
                Err(e) => log::warn!("failed to disassemble {} stage: {e}", shader_compiler::stage_flag(*stage)),
            }
        }
        match build_shader_module(device, &spirv) {
            Ok(module) => modules.push((*stage, module)),
            Err(e) => {
                for (_, created) in &modules {
                    unsafe { device.destroy_shader_module(*created, None) };
                }
                return Err(e);
            }
        }
    }
    Ok(modules)
}

fn build_compute_pipeline(device: &ash::Device, stage_modules: &[(vk::ShaderStageFlags, vk::ShaderModule)], pipeline_layout: vk::PipelineLayout, pipeline_cache: vk::PipelineCache) -> VrResult<vk::Pipeline> {
    let (_, module) = stage_modules.first().ok_or_else(|| crate::error::VrError::InvalidOperation("compute pipeline has no shader stage".to_string()))?;

    let stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(*module)
        .name(ENTRY_POINT)
        .build();

    let create_info = vk::ComputePipelineCreateInfo::builder().stage(stage).layout(pipeline_layout);

    let pipelines = unsafe { device.create_compute_pipelines(pipeline_cache, &[create_info.build()], None) }
        .map_err(|(_, e)| e)?;
    Ok(pipelines[0])
}

#[allow(clippy::too_many_arguments)]
fn build_graphics_pipeline(
    device: &ash::Device,
    key: &crate::script::PipelineKey,
    stage_modules: &[(vk::ShaderStageFlags, vk::ShaderModule)],
    pipeline_layout: vk::PipelineLayout,
    pipeline_cache: vk::PipelineCache,
    render_pass: vk::RenderPass,
    script: &Script,
    format_table: &FormatTable,
    base_pipeline: Option<vk::Pipeline>,
) -> VrResult<vk::Pipeline> {
    let stages: Vec<vk::PipelineShaderStageCreateInfo> = stage_modules
        .iter()
        .map(|(stage, module)| vk::PipelineShaderStageCreateInfo::builder().stage(*stage).module(*module).name(ENTRY_POINT).build())
        .collect();

    let (binding_descriptions, attribute_descriptions) = match key.source {
        PipelineSource::Rectangle => {
            let format = format_table
                .lookup_by_vk(vk::Format::R32G32B32_SFLOAT)
                .ok_or_else(|| crate::error::VrError::InvalidOperation("R32G32B32_SFLOAT missing from format table".to_string()))?;
            let stride = format.size_bytes() as u32;
            (
                vec![vk::VertexInputBindingDescription { binding: 0, stride, input_rate: vk::VertexInputRate::VERTEX }],
                vec![vk::VertexInputAttributeDescription { binding: 0, location: 0, format: vk::Format::R32G32B32_SFLOAT, offset: 0 }],
            )
        }
        PipelineSource::VertexData => {
            let vbo = script
                .vertex_data
                .as_ref()
                .ok_or_else(|| crate::error::VrError::InvalidOperation("pipeline uses vertex data but the script has none".to_string()))?;
            (vec![vbo.binding_description()], vbo.attribute_descriptions())
        }
    };

    let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&binding_descriptions)
        .vertex_attribute_descriptions(&attribute_descriptions);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(key.topology.to_vk())
        .primitive_restart_enable(false);

    let extent = vk::Extent2D { width: script.window_format.width, height: script.window_format.height };
    let viewport = vk::Viewport { x: 0.0, y: 0.0, width: extent.width as f32, height: extent.height as f32, min_depth: 0.0, max_depth: 1.0 };
    let scissor = vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent };
    let viewports = [viewport];
    let scissors = [scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder().viewports(&viewports).scissors(&scissors);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(script.window_format.depth_stencil_format.is_some())
        .depth_write_enable(script.window_format.depth_stencil_format.is_some())
        .depth_compare_op(vk::CompareOp::LESS)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build();
    let color_blend_attachments = [color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder().logic_op_enable(false).attachments(&color_blend_attachments);

    let (flags, base_handle, base_index) = match base_pipeline {
        None => (vk::PipelineCreateFlags::ALLOW_DERIVATIVES, vk::Pipeline::null(), -1),
        Some(base) => (vk::PipelineCreateFlags::DERIVATIVE, base, -1),
    };

    let create_info = vk::GraphicsPipelineCreateInfo::builder()
        .flags(flags)
        .stages(&stages)
        .vertex_input_state(&vertex_input_state)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .layout(pipeline_layout)
        .render_pass(render_pass)
        .subpass(0)
        .base_pipeline_handle(base_handle)
        .base_pipeline_index(base_index);

    let pipelines = unsafe { device.create_graphics_pipelines(pipeline_cache, &[create_info.build()], None) }
        .map_err(|(_, e)| e)?;
    Ok(pipelines[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::{PipelineKey, PipelineType, ScriptBuffer, ShaderSource, Topology, WindowFormat};

    fn empty_script() -> Script {
        Script {
            requirements: crate::requirements::Requirements::default(),
            window_format: WindowFormat { color_format: vk::Format::B8G8R8A8_UNORM, depth_stencil_format: None, width: 1, height: 1 },
            buffers: Vec::new(),
            pipelines: Vec::new(),
            commands: Vec::new(),
            vertex_data: None,
            indices: Vec::new(),
        }
    }

    #[test]
    fn push_constant_size_is_the_max_write_end() {
        let mut script = empty_script();
        script.commands.push(ScriptCommand::SetPushConstant { line_num: 1, offset: 0, data: vec![0u8; 16] });
        script.commands.push(ScriptCommand::SetPushConstant { line_num: 2, offset: 16, data: vec![0u8; 8] });
        assert_eq!(push_constant_size(&script), 24);
    }

    #[test]
    fn push_constant_size_is_zero_with_no_writes() {
        assert_eq!(push_constant_size(&empty_script()), 0);
    }

    #[test]
    fn stage_flags_for_falls_back_to_all_with_no_pipelines() {
        let script = empty_script();
        assert_eq!(stage_flags_for(&script, 0, 0), vk::ShaderStageFlags::ALL);
    }

    #[test]
    fn stage_flags_for_unions_pipeline_stages() {
        let mut script = empty_script();
        script.pipelines.push(PipelineKey {
            pipeline_type: PipelineType::Graphics,
            source: PipelineSource::Rectangle,
            topology: Topology::TriangleStrip,
            stages: vec![(vk::ShaderStageFlags::VERTEX, ShaderSource::Glsl(String::new())), (vk::ShaderStageFlags::FRAGMENT, ShaderSource::Glsl(String::new()))],
        });
        script.buffers.push(ScriptBuffer { desc_set: 0, binding: 0, buffer_type: BufferType::Ubo, size_bytes: 16 });
        assert_eq!(stage_flags_for(&script, 0, 0), vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
    }
}
