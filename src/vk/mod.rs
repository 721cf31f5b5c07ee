//! Vulkan-facing modules: dispatch table, device context, framebuffer
//! resources, memory coherence, and pipeline construction.

pub mod context;
pub mod flush;
pub mod fns;
pub mod pipeline;
pub mod window;
