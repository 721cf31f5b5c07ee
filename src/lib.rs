//! vkrunner — a shader-test execution engine.
//!
//! Takes a parsed [`script::Script`] (produced by an external parser; not
//! this crate's concern) and drives it against a Vulkan implementation: pick
//! a device satisfying the script's [`requirements::Requirements`], build
//! the pipelines and descriptor sets its commands reference, then walk the
//! `Idle ⇄ CommandBuffer ⇄ RenderPass` state machine in [`engine`] to record
//! and submit one command buffer per run, verifying `ProbeRect`/`ProbeSsbo`
//! assertions as it goes.
//!
//! ## Quick start
//!
//! ```no_run
//! use vkrunner::config::RunnerConfig;
//! use vkrunner::engine::TestEngine;
//! use vkrunner::script::Script;
//! use vkrunner::vk::context::Context;
//! use vkrunner::vk::pipeline::PipelineResources;
//! use vkrunner::vk::window::Window;
//!
//! fn run(script: &Script) -> vkrunner::error::VrResult<bool> {
//!     let config = RunnerConfig::from_env();
//!     let ctx = Context::new(&script.requirements)?;
//!     let color_format_size = 4;
//!     let window = Window::new(&ctx, script.window_format, color_format_size)?;
//!     let render_pass = window.render_pass(true);
//!     let pipeline = PipelineResources::build(ctx.device(), script, render_pass, &config)?;
//!     let mut engine = TestEngine::new(&ctx, &window, &pipeline, script, &config)?;
//!     let outcome = engine.run(None)?;
//!     for line in &outcome.diagnostics {
//!         eprintln!("{line}");
//!     }
//!     Ok(outcome.passed)
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod box_type;
pub mod config;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod requirements;
pub mod script;
pub mod vbo;
pub mod vk;
