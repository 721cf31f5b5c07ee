//! Manual smoke-test harness: builds a single-triangle script in-process
//! (standing in for an external script parser) and runs it end to end.
//!
//! Not part of the library's public surface; exists so a developer can
//! exercise device selection, pipeline build, and the engine's state
//! machine against a real Vulkan implementation without a parser on hand.

use ash::vk;

use vkrunner::box_type::Tolerance;
use vkrunner::config::RunnerConfig;
use vkrunner::engine::TestEngine;
use vkrunner::error::VrResult;
use vkrunner::requirements::Requirements;
use vkrunner::script::{PipelineKey, PipelineSource, PipelineType, Script, ScriptCommand, ShaderSource, Topology, WindowFormat};
use vkrunner::vk::context::Context;
use vkrunner::vk::pipeline::PipelineResources;
use vkrunner::vk::window::Window;

const VERTEX_SHADER: &str = r"
#version 450
layout(location = 0) in vec3 position;
void main() {
    gl_Position = vec4(position, 1.0);
}
";

const FRAGMENT_SHADER: &str = r"
#version 450
layout(location = 0) out vec4 color;
void main() {
    color = vec4(1.0, 0.0, 0.0, 1.0);
}
";

fn demo_script() -> Script {
    let pipeline = PipelineKey {
        pipeline_type: PipelineType::Graphics,
        source: PipelineSource::Rectangle,
        topology: Topology::TriangleStrip,
        stages: vec![(vk::ShaderStageFlags::VERTEX, ShaderSource::Glsl(VERTEX_SHADER.to_string())), (vk::ShaderStageFlags::FRAGMENT, ShaderSource::Glsl(FRAGMENT_SHADER.to_string()))],
    };

    Script {
        requirements: Requirements::default(),
        window_format: WindowFormat { color_format: vk::Format::R8G8B8A8_UNORM, depth_stencil_format: None, width: 32, height: 32 },
        buffers: Vec::new(),
        pipelines: vec![pipeline],
        commands: vec![
            ScriptCommand::Clear { line_num: 1, color: [0.0, 0.0, 0.0, 1.0], depth: 1.0, stencil: 0 },
            ScriptCommand::DrawRect { line_num: 2, x: -1.0, y: -1.0, w: 2.0, h: 2.0, pipeline_key: 0 },
            ScriptCommand::ProbeRect {
                line_num: 3,
                n_components: 4,
                x: 0,
                y: 0,
                w: 32,
                h: 32,
                color: [1.0, 0.0, 0.0, 1.0],
                tolerance: Tolerance { absolute: 0.01, relative: 0.0 },
            },
        ],
        vertex_data: None,
        indices: Vec::new(),
    }
}

fn main() -> VrResult<()> {
    vkrunner::logging::init_logging();

    let script = demo_script();
    let config = RunnerConfig::from_env();

    let ctx = Context::new(&script.requirements)?;
    let window = Window::new(&ctx, script.window_format, window_format_size(script.window_format.color_format))?;
    let render_pass = window.render_pass(true);
    let pipeline = PipelineResources::build(ctx.device(), &script, render_pass, &config)?;

    let mut engine = TestEngine::new(&ctx, &window, &pipeline, &script, &config)?;
    let outcome = engine.run(None)?;

    for line in &outcome.diagnostics {
        log::warn!("{line}");
    }
    println!("result: {}", if outcome.passed { "pass" } else { "fail" });

    std::process::exit(i32::from(!outcome.passed));
}

fn window_format_size(format: vk::Format) -> u32 {
    match format {
        vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_UNORM => 4,
        _ => panic!("vkrunner-demo: unsupported color format {format:?}"),
    }
}
