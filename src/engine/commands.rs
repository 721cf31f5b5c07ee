//! Per-`ScriptCommand` execution: one function per command kind, each
//! declaring the minimum engine state it needs before it runs and walking
//! the state machine up to that level before recording anything.

use ash::vk;

use crate::error::VrResult;
use crate::script::{PipelineType, ScriptCommand};

use super::buffers::TestBuffer;
use super::probe;
use super::{EngineState, TestEngine};

/// Run one command, returning whether it succeeded. Failures are reported
/// through the return value, not `Err` — `Err` is reserved for state
/// transitions and is handled by the caller the same way.
pub(super) fn execute(engine: &mut TestEngine, cmd: &ScriptCommand) -> VrResult<bool> {
    match cmd {
        ScriptCommand::DrawRect { x, y, w, h, pipeline_key, .. } => draw_rect(engine, *x, *y, *w, *h, *pipeline_key),
        ScriptCommand::DrawArrays {
            topology,
            indexed,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
            pipeline_key,
            ..
        } => draw_arrays(engine, *topology, *indexed, *vertex_count, *instance_count, *first_vertex, *first_instance, *pipeline_key),
        ScriptCommand::DispatchCompute { x, y, z, pipeline_key, .. } => dispatch_compute(engine, *x, *y, *z, *pipeline_key),
        ScriptCommand::ProbeRect { n_components, x, y, w, h, color, tolerance, .. } => probe::probe_rect(engine, *n_components, *x, *y, *w, *h, *color, *tolerance),
        ScriptCommand::ProbeSsbo {
            desc_set,
            binding,
            comparison,
            offset,
            box_type,
            layout,
            value_bytes,
            tolerance,
            ..
        } => probe::probe_ssbo(engine, *desc_set, *binding, *comparison, *offset, *box_type, *layout, value_bytes, *tolerance),
        ScriptCommand::SetPushConstant { offset, data, .. } => set_push_constant(engine, *offset, data),
        ScriptCommand::SetBufferSubdata { desc_set, binding, offset, data, .. } => set_buffer_subdata(engine, *desc_set, *binding, *offset, data),
        ScriptCommand::Clear { color, depth, stencil, .. } => clear(engine, *color, *depth, *stencil),
    }
}

/// Binds every descriptor set to every bind point the script's pipelines
/// use, at most once per command buffer.
fn bind_ubo_descriptor_set(engine: &mut TestEngine) {
    if engine.ubo_descriptor_set_bound || engine.pipeline.descriptor_sets.is_empty() {
        return;
    }

    let has_graphics = engine.script.pipelines.iter().any(|k| k.pipeline_type == PipelineType::Graphics);
    let has_compute = engine.script.pipelines.iter().any(|k| k.pipeline_type == PipelineType::Compute);

    let device = engine.ctx.device();
    let command_buffer = engine.ctx.command_buffer();
    unsafe {
        if has_graphics {
            device.cmd_bind_descriptor_sets(command_buffer, vk::PipelineBindPoint::GRAPHICS, engine.pipeline.pipeline_layout, 0, &engine.pipeline.descriptor_sets, &[]);
        }
        if has_compute {
            device.cmd_bind_descriptor_sets(command_buffer, vk::PipelineBindPoint::COMPUTE, engine.pipeline.pipeline_layout, 0, &engine.pipeline.descriptor_sets, &[]);
        }
    }
    engine.ubo_descriptor_set_bound = true;
}

fn bind_pipeline(engine: &mut TestEngine, pipeline_key: usize) -> VrResult<bool> {
    let Some(compiled) = engine.pipeline.pipelines.get(pipeline_key) else {
        engine.diagnostics.push(format!("pipeline key {pipeline_key} out of range"));
        return Ok(false);
    };

    if engine.bound_pipeline != Some(pipeline_key) {
        let bind_point = match compiled.pipeline_type {
            PipelineType::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineType::Compute => vk::PipelineBindPoint::COMPUTE,
        };
        unsafe { engine.ctx.device().cmd_bind_pipeline(engine.ctx.command_buffer(), bind_point, compiled.pipeline) };
        engine.bound_pipeline = Some(pipeline_key);
    }
    Ok(true)
}

/// Positions at the four corners of the rect, z=0, strip order
/// `(x,y)(x+w,y)(x,y+h)(x+w,y+h)`.
fn draw_rect(engine: &mut TestEngine, x: f32, y: f32, w: f32, h: f32, pipeline_key: usize) -> VrResult<bool> {
    engine.set_state(EngineState::RenderPass)?;

    let positions: [[f32; 3]; 4] = [[x, y, 0.0], [x + w, y, 0.0], [x, y + h, 0.0], [x + w, y + h, 0.0]];
    let mut bytes = Vec::with_capacity(positions.len() * 12);
    for p in &positions {
        for c in p {
            bytes.extend_from_slice(&c.to_le_bytes());
        }
    }

    let mut buffer = TestBuffer::new(engine.ctx, bytes.len() as vk::DeviceSize, vk::BufferUsageFlags::VERTEX_BUFFER)?;
    buffer.write(0, &bytes);
    let vk_buffer = buffer.vk_buffer;
    engine.draw_rect_buffers.push(buffer);

    bind_ubo_descriptor_set(engine);
    if !bind_pipeline(engine, pipeline_key)? {
        return Ok(false);
    }

    unsafe {
        let device = engine.ctx.device();
        let command_buffer = engine.ctx.command_buffer();
        device.cmd_bind_vertex_buffers(command_buffer, 0, &[vk_buffer], &[0]);
        device.cmd_draw(command_buffer, 4, 1, 0, 0);
    }
    Ok(true)
}

#[allow(clippy::too_many_arguments)]
fn draw_arrays(
    engine: &mut TestEngine,
    topology: crate::script::Topology,
    indexed: bool,
    vertex_count: u32,
    instance_count: u32,
    first_vertex: u32,
    first_instance: u32,
    pipeline_key: usize,
) -> VrResult<bool> {
    let _ = topology;
    engine.set_state(EngineState::RenderPass)?;

    if engine.vbo_buffer.is_none() {
        let Some(vbo) = engine.script.vertex_data.as_ref() else {
            engine.diagnostics.push("draw arrays with no vertex data section".to_string());
            return Ok(false);
        };
        let mut buffer = TestBuffer::new(engine.ctx, vbo.raw_bytes.len() as vk::DeviceSize, vk::BufferUsageFlags::VERTEX_BUFFER)?;
        buffer.write(0, &vbo.raw_bytes);
        engine.vbo_buffer = Some(buffer);
    }

    if indexed && engine.index_buffer.is_none() {
        if engine.script.indices.is_empty() {
            engine.diagnostics.push("draw arrays indexed with no index data".to_string());
            return Ok(false);
        }
        let bytes: Vec<u8> = engine.script.indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let mut buffer = TestBuffer::new(engine.ctx, bytes.len() as vk::DeviceSize, vk::BufferUsageFlags::INDEX_BUFFER)?;
        buffer.write(0, &bytes);
        engine.index_buffer = Some(buffer);
    }

    bind_ubo_descriptor_set(engine);
    if !bind_pipeline(engine, pipeline_key)? {
        return Ok(false);
    }

    let device = engine.ctx.device();
    let command_buffer = engine.ctx.command_buffer();
    let vbo_buffer = engine.vbo_buffer.as_ref().unwrap().vk_buffer;
    unsafe { device.cmd_bind_vertex_buffers(command_buffer, 0, &[vbo_buffer], &[0]) };

    if indexed {
        let index_buffer = engine.index_buffer.as_ref().unwrap().vk_buffer;
        unsafe {
            device.cmd_bind_index_buffer(command_buffer, index_buffer, 0, vk::IndexType::UINT16);
            device.cmd_draw_indexed(command_buffer, vertex_count, instance_count, first_vertex, 0, first_instance);
        }
    } else {
        unsafe { device.cmd_draw(command_buffer, vertex_count, instance_count, first_vertex, first_instance) };
    }
    Ok(true)
}

fn dispatch_compute(engine: &mut TestEngine, x: u32, y: u32, z: u32, pipeline_key: usize) -> VrResult<bool> {
    engine.set_state(EngineState::CommandBuffer)?;
    bind_ubo_descriptor_set(engine);
    if !bind_pipeline(engine, pipeline_key)? {
        return Ok(false);
    }
    unsafe { engine.ctx.device().cmd_dispatch(engine.ctx.command_buffer(), x, y, z) };
    Ok(true)
}

/// Enters `CommandBuffer` only if currently `Idle`; never forces a state
/// already at or past `CommandBuffer` back down.
fn set_push_constant(engine: &mut TestEngine, offset: u32, data: &[u8]) -> VrResult<bool> {
    if engine.state == EngineState::Idle {
        engine.set_state(EngineState::CommandBuffer)?;
    }
    unsafe {
        engine
            .ctx
            .device()
            .cmd_push_constants(engine.ctx.command_buffer(), engine.pipeline.pipeline_layout, vk::ShaderStageFlags::ALL, offset, data);
    }
    Ok(true)
}

fn set_buffer_subdata(engine: &mut TestEngine, desc_set: u32, binding: u32, offset: u64, data: &[u8]) -> VrResult<bool> {
    match engine.find_buffer_mut(desc_set, binding) {
        Some(buffer) => {
            buffer.write(offset, data);
            Ok(true)
        }
        None => {
            engine.diagnostics.push(format!("no buffer bound at (desc_set={desc_set}, binding={binding})"));
            Ok(false)
        }
    }
}

fn clear(engine: &mut TestEngine, color: [f32; 4], depth: f32, stencil: u32) -> VrResult<bool> {
    engine.set_state(EngineState::RenderPass)?;

    let mut attachments = vec![vk::ClearAttachment { aspect_mask: vk::ImageAspectFlags::COLOR, color_attachment: 0, clear_value: vk::ClearValue { color: vk::ClearColorValue { float32: color } } }];

    let depth_stencil_aspect = engine.window.depth_stencil_aspect();
    if !depth_stencil_aspect.is_empty() {
        attachments.push(vk::ClearAttachment {
            aspect_mask: depth_stencil_aspect,
            color_attachment: 0,
            clear_value: vk::ClearValue { depth_stencil: vk::ClearDepthStencilValue { depth, stencil } },
        });
    }

    let rect = vk::ClearRect {
        rect: vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent: vk::Extent2D { width: engine.window.format.width, height: engine.window.format.height } },
        base_array_layer: 0,
        layer_count: 1,
    };

    unsafe { engine.ctx.device().cmd_clear_attachments(engine.ctx.command_buffer(), &attachments, &[rect]) };
    Ok(true)
}
