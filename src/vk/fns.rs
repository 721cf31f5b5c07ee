//! Per-context Vulkan dispatch table.
//!
//! `ash::Instance`/`ash::Device` already wrap the loaded entry points for
//! their own instance/device, so `VkFns` is a thin, explicitly-named bundle
//! of the three handles a `Context` needs to pass around together — no
//! process-wide mutable state.

use ash::{Device, Entry, Instance};

/// Bundles the loader entry point, instance, and logical device a `Context`
/// operates through. Cloning a `VkFns` clones the underlying `ash` handles
/// (cheap `Arc`-backed clones), never duplicates the Vulkan objects.
#[derive(Clone)]
pub struct VkFns {
    entry: Entry,
    instance: Instance,
    device: Device,
}

impl VkFns {
    pub(crate) fn new(entry: Entry, instance: Instance, device: Device) -> Self {
        Self {
            entry,
            instance,
            device,
        }
    }

    /// The Vulkan loader entry point.
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// The `VkInstance` wrapper.
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// The `VkDevice` wrapper.
    pub fn device(&self) -> &Device {
        &self.device
    }
}
