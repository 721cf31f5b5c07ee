//! Per-run test execution state machine: walks `Idle ⇄ CommandBuffer ⇄
//! RenderPass`, recording and submitting one command buffer per run, then
//! reads the rendered framebuffer back to the host for verification.

pub mod buffers;
pub mod commands;
pub mod probe;

use ash::vk;

use crate::config::RunnerConfig;
use crate::error::VrResult;
use crate::format::FormatTable;
use crate::script::{BufferType, Script};
use crate::vk::context::Context;
use crate::vk::flush;
use crate::vk::pipeline::PipelineResources;
use crate::vk::window::Window;

use buffers::TestBuffer;

/// Monotonically-walked execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    CommandBuffer,
    RenderPass,
}

impl EngineState {
    fn level(self) -> u8 {
        match self {
            EngineState::Idle => 0,
            EngineState::CommandBuffer => 1,
            EngineState::RenderPass => 2,
        }
    }
}

/// One storage/uniform buffer's contents, valid only for the duration of the
/// `inspect` callback passed to [`TestEngine::run`].
pub struct InspectBuffer<'a> {
    pub desc_set: u32,
    pub binding: u32,
    pub size: vk::DeviceSize,
    pub data: &'a [u8],
}

/// The final framebuffer contents, valid only for the duration of the
/// `inspect` callback.
pub struct InspectColorBuffer<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: vk::Format,
    pub data: &'a [u8],
}

pub struct InspectData<'a> {
    pub buffers: Vec<InspectBuffer<'a>>,
    pub color_buffer: InspectColorBuffer<'a>,
}

/// Outcome of a full script run: pass/fail plus every diagnostic line
/// accumulated along the way.
pub struct RunOutcome {
    pub passed: bool,
    pub diagnostics: Vec<String>,
}

/// Holds every piece of per-run state: transient buffers, descriptor/
/// pipeline bindings, and the `{Idle, CommandBuffer, RenderPass}` state
/// machine.
pub struct TestEngine<'a> {
    pub(crate) ctx: &'a Context,
    pub(crate) window: &'a Window,
    pub(crate) pipeline: &'a PipelineResources,
    pub(crate) script: &'a Script,
    pub(crate) config: &'a RunnerConfig,
    pub(crate) format_table: FormatTable,
    pub(crate) state: EngineState,
    pub(crate) first_render_pending: bool,
    pub(crate) bound_pipeline: Option<usize>,
    pub(crate) ubo_descriptor_set_bound: bool,
    pub(crate) buffers: Vec<TestBuffer>,
    pub(crate) vbo_buffer: Option<TestBuffer>,
    pub(crate) index_buffer: Option<TestBuffer>,
    /// Transient per-`DrawRect` vertex buffers, flushed and destroyed at the
    /// next command-buffer end.
    pub(crate) draw_rect_buffers: Vec<TestBuffer>,
    pub(crate) diagnostics: Vec<String>,
}

impl<'a> TestEngine<'a> {
    /// Allocate one [`TestBuffer`] per `script.buffers` entry and bind them
    /// into the pipeline's descriptor sets with `range = VK_WHOLE_SIZE`.
    pub fn new(ctx: &'a Context, window: &'a Window, pipeline: &'a PipelineResources, script: &'a Script, config: &'a RunnerConfig) -> VrResult<Self> {
        let mut buffers = Vec::with_capacity(script.buffers.len());
        for buffer in &script.buffers {
            let usage = match buffer.buffer_type {
                BufferType::Ubo => vk::BufferUsageFlags::UNIFORM_BUFFER,
                BufferType::Ssbo => vk::BufferUsageFlags::STORAGE_BUFFER,
            };
            match TestBuffer::new(ctx, buffer.size_bytes.max(1), usage) {
                Ok(tb) => buffers.push(tb),
                Err(e) => {
                    for tb in &mut buffers {
                        tb.destroy(ctx.device());
                    }
                    return Err(e);
                }
            }
        }

        if !buffers.is_empty() {
            let buffer_infos: Vec<vk::DescriptorBufferInfo> = buffers
                .iter()
                .map(|tb| vk::DescriptorBufferInfo { buffer: tb.vk_buffer, offset: 0, range: vk::WHOLE_SIZE })
                .collect();

            let writes: Vec<vk::WriteDescriptorSet> = script
                .buffers
                .iter()
                .zip(buffer_infos.iter())
                .map(|(buffer, info)| {
                    vk::WriteDescriptorSet::builder()
                        .dst_set(pipeline.descriptor_sets[buffer.desc_set as usize])
                        .dst_binding(buffer.binding)
                        .dst_array_element(0)
                        .descriptor_type(buffer.buffer_type.descriptor_type())
                        .buffer_info(std::slice::from_ref(info))
                        .build()
                })
                .collect();

            unsafe { ctx.device().update_descriptor_sets(&writes, &[]) };
        }

        Ok(Self {
            ctx,
            window,
            pipeline,
            script,
            config,
            format_table: FormatTable::standard(),
            state: EngineState::Idle,
            first_render_pending: true,
            bound_pipeline: None,
            ubo_descriptor_set_bound: false,
            buffers,
            vbo_buffer: None,
            index_buffer: None,
            draw_rect_buffers: Vec::new(),
            diagnostics: Vec::new(),
        })
    }

    /// Locate the engine-owned buffer a script declared at `(desc_set,
    /// binding)`, used by `SetBufferSubdata` and `ProbeSsbo`.
    pub(crate) fn find_buffer(&self, desc_set: u32, binding: u32) -> Option<&TestBuffer> {
        self.script.buffers.iter().position(|b| b.desc_set == desc_set && b.binding == binding).map(|i| &self.buffers[i])
    }

    pub(crate) fn find_buffer_mut(&mut self, desc_set: u32, binding: u32) -> Option<&mut TestBuffer> {
        let index = self.script.buffers.iter().position(|b| b.desc_set == desc_set && b.binding == binding)?;
        Some(&mut self.buffers[index])
    }

    /// Execute every command in the script, then force the state back to
    /// `Idle` and optionally hand the final buffers to `inspect`.
    pub fn run(&mut self, mut inspect: Option<&mut dyn FnMut(&InspectData)>) -> VrResult<RunOutcome> {
        let script = self.script;
        let mut ok = true;

        for cmd in &script.commands {
            let cmd_ok = match commands::execute(self, cmd) {
                Ok(cmd_ok) => cmd_ok,
                Err(e) => {
                    self.diagnostics.push(e.to_string());
                    false
                }
            };
            if !cmd_ok {
                ok = false;
                self.diagnostics.push(format!("Command failed at line {}", cmd.line_num()));
            }
        }

        self.set_state(EngineState::Idle)?;
        debug_assert!(self.buffers.iter().all(|b| !b.pending_write));

        if ok {
            log::debug!("run finished: pass ({} commands)", script.commands.len());
        } else {
            log::warn!("run finished: fail ({} diagnostic lines)", self.diagnostics.len());
        }

        if let Some(cb) = inspect.as_deref_mut() {
            let color_buffer = InspectColorBuffer {
                width: self.window.format.width,
                height: self.window.format.height,
                stride: self.window.linear_stride(),
                format: self.window.format.color_format,
                data: self.window.linear_memory_slice(),
            };
            let buffers = script
                .buffers
                .iter()
                .zip(self.buffers.iter())
                .map(|(b, tb)| InspectBuffer { desc_set: b.desc_set, binding: b.binding, size: tb.size, data: tb.as_slice() })
                .collect();
            cb(&InspectData { buffers, color_buffer });
        }

        Ok(RunOutcome { passed: ok, diagnostics: std::mem::take(&mut self.diagnostics) })
    }

    /// Walk the state machine up or down to `target`.
    pub(crate) fn set_state(&mut self, target: EngineState) -> VrResult<()> {
        while self.state.level() < target.level() {
            self.step_up()?;
        }
        while self.state.level() > target.level() {
            self.step_down()?;
        }
        Ok(())
    }

    fn step_up(&mut self) -> VrResult<()> {
        match self.state {
            EngineState::Idle => {
                self.ctx.begin_command_buffer()?;
                self.bound_pipeline = None;
                self.ubo_descriptor_set_bound = false;
                self.state = EngineState::CommandBuffer;
                log::debug!("engine state: Idle -> CommandBuffer");
            }
            EngineState::CommandBuffer => {
                self.begin_render_pass()?;
                self.state = EngineState::RenderPass;
                log::debug!("engine state: CommandBuffer -> RenderPass");
            }
            EngineState::RenderPass => {}
        }
        Ok(())
    }

    fn step_down(&mut self) -> VrResult<()> {
        match self.state {
            EngineState::RenderPass => {
                self.end_render_pass()?;
                self.state = EngineState::CommandBuffer;
                log::debug!("engine state: RenderPass -> CommandBuffer");
            }
            EngineState::CommandBuffer => {
                self.end_command_buffer()?;
                self.state = EngineState::Idle;
                log::debug!("engine state: CommandBuffer -> Idle");
            }
            EngineState::Idle => {}
        }
        Ok(())
    }

    fn begin_render_pass(&mut self) -> VrResult<()> {
        let is_first = self.first_render_pending;
        let render_pass = self.window.render_pass(is_first);
        let extent = vk::Extent2D { width: self.window.format.width, height: self.window.format.height };

        let mut clear_values = vec![vk::ClearValue::default()];
        if self.window.format.depth_stencil_format.is_some() {
            clear_values.push(vk::ClearValue::default());
        }

        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(self.window.framebuffer())
            .render_area(vk::Rect2D { offset: vk::Offset2D { x: 0, y: 0 }, extent })
            .clear_values(&clear_values);

        unsafe { self.ctx.device().cmd_begin_render_pass(self.ctx.command_buffer(), &begin_info, vk::SubpassContents::INLINE) };
        self.first_render_pending = false;
        Ok(())
    }

    /// Copies the rendered color attachment back to the host-visible linear buffer.
    fn end_render_pass(&mut self) -> VrResult<()> {
        let device = self.ctx.device();
        let command_buffer = self.ctx.command_buffer();

        unsafe { device.cmd_end_render_pass(command_buffer) };

        let subresource = vk::ImageSubresourceRange { aspect_mask: vk::ImageAspectFlags::COLOR, base_mip_level: 0, level_count: 1, base_array_layer: 0, layer_count: 1 };

        let to_transfer = vk::ImageMemoryBarrier::builder()
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::TRANSFER_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::COLOR_ATTACHMENT_READ)
            .image(self.window.color_image())
            .subresource_range(subresource)
            .build();
        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_transfer],
            )
        };

        let width = self.window.format.width;
        let height = self.window.format.height;
        let copy_region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(width)
            .buffer_image_height(height)
            .image_subresource(vk::ImageSubresourceLayers { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: 0, base_array_layer: 0, layer_count: 1 })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width, height, depth: 1 })
            .build();
        unsafe {
            device.cmd_copy_image_to_buffer(
                command_buffer,
                self.window.color_image(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                self.window.linear_buffer(),
                &[copy_region],
            )
        };

        let back_to_color = vk::ImageMemoryBarrier::builder()
            .old_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .src_access_mask(vk::AccessFlags::TRANSFER_READ)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .image(self.window.color_image())
            .subresource_range(subresource)
            .build();
        unsafe {
            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[back_to_color],
            )
        };

        let linear_barrier = vk::BufferMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(vk::AccessFlags::HOST_READ)
            .buffer(self.window.linear_buffer())
            .offset(0)
            .size(vk::WHOLE_SIZE)
            .build();
        unsafe {
            device.cmd_pipeline_barrier(command_buffer, vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::HOST, vk::DependencyFlags::empty(), &[], &[linear_barrier], &[])
        };

        Ok(())
    }

    /// Flushes pending writes, submits the command buffer, and waits for it to complete.
    fn end_command_buffer(&mut self) -> VrResult<()> {
        for (script_buffer, test_buffer) in self.script.buffers.iter().zip(self.buffers.iter_mut()) {
            if test_buffer.pending_write {
                let flags = self.ctx.memory_type_flags(test_buffer.memory_type_index);
                flush::flush(self.ctx.device(), self.config, flags, test_buffer.memory, 0, test_buffer.size)?;
                test_buffer.pending_write = false;
            }
            let _ = script_buffer;
        }
        for transient in [&mut self.vbo_buffer, &mut self.index_buffer].into_iter().flatten() {
            if transient.pending_write {
                let flags = self.ctx.memory_type_flags(transient.memory_type_index);
                flush::flush(self.ctx.device(), self.config, flags, transient.memory, 0, transient.size)?;
                transient.pending_write = false;
            }
        }
        for transient in &mut self.draw_rect_buffers {
            if transient.pending_write {
                let flags = self.ctx.memory_type_flags(transient.memory_type_index);
                flush::flush(self.ctx.device(), self.config, flags, transient.memory, 0, transient.size)?;
                transient.pending_write = false;
            }
        }

        let ssbo_barriers: Vec<vk::BufferMemoryBarrier> = self
            .script
            .buffers
            .iter()
            .zip(self.buffers.iter())
            .filter(|(b, _)| b.buffer_type == BufferType::Ssbo)
            .map(|(_, tb)| {
                vk::BufferMemoryBarrier::builder()
                    .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                    .dst_access_mask(vk::AccessFlags::HOST_READ)
                    .buffer(tb.vk_buffer)
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
                    .build()
            })
            .collect();
        if !ssbo_barriers.is_empty() {
            unsafe {
                self.ctx.device().cmd_pipeline_barrier(
                    self.ctx.command_buffer(),
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::PipelineStageFlags::HOST,
                    vk::DependencyFlags::empty(),
                    &[],
                    &ssbo_barriers,
                    &[],
                )
            };
        }

        self.ctx.submit_and_wait()?;

        for mut transient in self.draw_rect_buffers.drain(..) {
            transient.destroy(self.ctx.device());
        }

        if !self.window.linear_memory_is_coherent() {
            let stride = self.window.linear_stride();
            let size = (stride * self.window.format.height) as vk::DeviceSize;
            flush::invalidate(self.ctx.device(), vk::MemoryPropertyFlags::empty(), self.window.linear_memory(), 0, size)?;
        }
        for (script_buffer, test_buffer) in self.script.buffers.iter().zip(self.buffers.iter()) {
            if script_buffer.buffer_type == BufferType::Ssbo && !test_buffer.is_coherent(self.ctx) {
                flush::invalidate(self.ctx.device(), vk::MemoryPropertyFlags::empty(), test_buffer.memory, 0, test_buffer.size)?;
            }
        }

        Ok(())
    }
}

impl<'a> Drop for TestEngine<'a> {
    fn drop(&mut self) {
        let device = self.ctx.device();
        for buffer in &mut self.buffers {
            buffer.destroy(device);
        }
        if let Some(buffer) = &mut self.vbo_buffer {
            buffer.destroy(device);
        }
        if let Some(buffer) = &mut self.index_buffer {
            buffer.destroy(device);
        }
        for buffer in &mut self.draw_rect_buffers {
            buffer.destroy(device);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_levels_are_monotonic() {
        assert!(EngineState::Idle.level() < EngineState::CommandBuffer.level());
        assert!(EngineState::CommandBuffer.level() < EngineState::RenderPass.level());
    }
}
