//! External input to the engine.
//!
//! The script *parser* — turning shader-test source text into these types —
//! is out of scope; this module only defines the shapes [`crate::engine`]
//! consumes: a tagged enum of commands, each variant carrying its own
//! payload, dispatched by matching rather than virtually.

use ash::vk;

use crate::box_type::{BoxLayout, BoxType, Comparison, Tolerance};
use crate::requirements::Requirements;
use crate::vbo::Vbo;

/// Which kind of descriptor a [`ScriptBuffer`] is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferType {
    Ubo,
    Ssbo,
}

impl BufferType {
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            BufferType::Ubo => vk::DescriptorType::UNIFORM_BUFFER,
            BufferType::Ssbo => vk::DescriptorType::STORAGE_BUFFER,
        }
    }
}

/// One descriptor-bound buffer a script declares.
#[derive(Debug, Clone)]
pub struct ScriptBuffer {
    pub desc_set: u32,
    pub binding: u32,
    pub buffer_type: BufferType,
    pub size_bytes: u64,
}

/// Primitive topology for a graphics pipeline, mirroring
/// `VkPrimitiveTopology` but limited to what `draw arrays`/`draw rect`
/// scripts can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    TriangleList,
    TriangleStrip,
    TriangleFan,
    LineList,
    LineStrip,
    PointList,
}

impl Topology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            Topology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            Topology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            Topology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
            Topology::LineList => vk::PrimitiveTopology::LINE_LIST,
            Topology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            Topology::PointList => vk::PrimitiveTopology::POINT_LIST,
        }
    }
}

/// Which pipeline kind a [`PipelineKey`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineType {
    Graphics,
    Compute,
}

/// Where a graphics pipeline's vertex input comes from.
#[derive(Debug, Clone)]
pub enum PipelineSource {
    /// Single `R32G32B32_SFLOAT` attribute at location 0, stride =
    /// `sizeof(vertex)`; used by `DrawRect`.
    Rectangle,
    /// Attributes come from the script's parsed [`Vbo`].
    VertexData,
}

/// One SPIR-V shader stage's source.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    /// GLSL source text, compiled via `glslangValidator`.
    Glsl(String),
    /// SPIR-V assembly text, compiled via `spirv-as`.
    SpirvAsm(String),
    /// SPIR-V bytes provided directly by the script.
    Binary(Vec<u8>),
}

/// A script-identified vector of pipeline state used to build one
/// `VkPipeline`.
#[derive(Debug, Clone)]
pub struct PipelineKey {
    pub pipeline_type: PipelineType,
    pub source: PipelineSource,
    pub topology: Topology,
    /// Shader source for each stage present, keyed by `VkShaderStageFlags`
    /// (e.g. `VERTEX`, `FRAGMENT`, `COMPUTE`).
    pub stages: Vec<(vk::ShaderStageFlags, ShaderSource)>,
}

impl PipelineKey {
    /// Entry point name for `stage`; vkrunner always compiles shaders with
    /// `main` as the entry point.
    pub fn entrypoint(&self, _stage: vk::ShaderStageFlags) -> &str {
        "main"
    }

    /// Union of every stage this key has a shader for.
    pub fn stage_flags(&self) -> vk::ShaderStageFlags {
        self.stages
            .iter()
            .fold(vk::ShaderStageFlags::empty(), |flags, (stage, _)| flags | *stage)
    }

    pub fn has_stage(&self, stage: vk::ShaderStageFlags) -> bool {
        self.stages.iter().any(|(s, _)| *s == stage)
    }
}

/// A script command, tagged by variant rather than dispatched virtually.
/// Every variant carries the source `line_num` for diagnostics.
#[derive(Debug, Clone)]
pub enum ScriptCommand {
    DrawRect {
        line_num: u32,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
        pipeline_key: usize,
    },
    DrawArrays {
        line_num: u32,
        topology: Topology,
        indexed: bool,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
        pipeline_key: usize,
    },
    DispatchCompute {
        line_num: u32,
        x: u32,
        y: u32,
        z: u32,
        pipeline_key: usize,
    },
    ProbeRect {
        line_num: u32,
        n_components: u32,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        color: [f64; 4],
        tolerance: Tolerance,
    },
    ProbeSsbo {
        line_num: u32,
        desc_set: u32,
        binding: u32,
        comparison: Comparison,
        offset: u64,
        box_type: BoxType,
        layout: BoxLayout,
        value_bytes: Vec<u8>,
        tolerance: Tolerance,
    },
    SetPushConstant {
        line_num: u32,
        offset: u32,
        data: Vec<u8>,
    },
    SetBufferSubdata {
        line_num: u32,
        desc_set: u32,
        binding: u32,
        offset: u64,
        data: Vec<u8>,
    },
    Clear {
        line_num: u32,
        color: [f32; 4],
        depth: f32,
        stencil: u32,
    },
}

impl ScriptCommand {
    pub fn line_num(&self) -> u32 {
        match self {
            ScriptCommand::DrawRect { line_num, .. }
            | ScriptCommand::DrawArrays { line_num, .. }
            | ScriptCommand::DispatchCompute { line_num, .. }
            | ScriptCommand::ProbeRect { line_num, .. }
            | ScriptCommand::ProbeSsbo { line_num, .. }
            | ScriptCommand::SetPushConstant { line_num, .. }
            | ScriptCommand::SetBufferSubdata { line_num, .. }
            | ScriptCommand::Clear { line_num, .. } => *line_num,
        }
    }
}

/// Color/depth-stencil attachment formats a [`crate::vk::window::Window`]
/// is built for.
#[derive(Debug, Clone, Copy)]
pub struct WindowFormat {
    pub color_format: vk::Format,
    pub depth_stencil_format: Option<vk::Format>,
    pub width: u32,
    pub height: u32,
}

/// A fully parsed shader-test script: everything the engine needs to run
/// one scenario.
#[derive(Debug, Clone)]
pub struct Script {
    pub requirements: Requirements,
    pub window_format: WindowFormat,
    pub buffers: Vec<ScriptBuffer>,
    pub pipelines: Vec<PipelineKey>,
    pub commands: Vec<ScriptCommand>,
    pub vertex_data: Option<Vbo>,
    pub indices: Vec<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_key_stage_flags_is_the_union_of_its_stages() {
        let key = PipelineKey {
            pipeline_type: PipelineType::Graphics,
            source: PipelineSource::Rectangle,
            topology: Topology::TriangleStrip,
            stages: vec![
                (vk::ShaderStageFlags::VERTEX, ShaderSource::Glsl(String::new())),
                (vk::ShaderStageFlags::FRAGMENT, ShaderSource::Glsl(String::new())),
            ],
        };
        assert_eq!(key.stage_flags(), vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT);
        assert!(key.has_stage(vk::ShaderStageFlags::VERTEX));
        assert!(!key.has_stage(vk::ShaderStageFlags::COMPUTE));
    }

    #[test]
    fn command_line_num_is_exposed_uniformly() {
        let cmd = ScriptCommand::Clear {
            line_num: 42,
            color: [0.0; 4],
            depth: 1.0,
            stencil: 0,
        };
        assert_eq!(cmd.line_num(), 42);
    }
}
