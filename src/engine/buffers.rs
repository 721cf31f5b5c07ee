//! Engine-owned Vulkan buffers, always-mapped and host-visible since every
//! `TestBuffer` lives for exactly one run and the engine reads/writes it
//! directly rather than through a typed wrapper.

use ash::vk;

use crate::error::VrResult;
use crate::vk::context::Context;

/// One engine-owned buffer: a UBO/SSBO, the transient draw-rect VBO, or the
/// transient index buffer. Mapped for its entire lifetime.
pub struct TestBuffer {
    pub vk_buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub memory_map: *mut u8,
    pub memory_type_index: u32,
    pub size: vk::DeviceSize,
    /// Set by a host write (`SetBufferSubdata`, or the engine's own transient
    /// vbo/index writes); cleared once flushed at command-buffer end.
    pub pending_write: bool,
}

// The mapped pointer is only ever touched from the single thread that owns
// the `Context` driving this run.
unsafe impl Send for TestBuffer {}

impl TestBuffer {
    pub fn new(ctx: &Context, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> VrResult<Self> {
        let device = ctx.device();
        let create_info = vk::BufferCreateInfo::builder().size(size).usage(usage).sharing_mode(vk::SharingMode::EXCLUSIVE);
        let vk_buffer = unsafe { device.create_buffer(&create_info, None)? };

        let requirements = unsafe { device.get_buffer_memory_requirements(vk_buffer) };
        let memory_type_index = match ctx.find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::HOST_VISIBLE) {
            Ok(index) => index,
            Err(e) => {
                unsafe { device.destroy_buffer(vk_buffer, None) };
                return Err(e);
            }
        };

        let alloc_info = vk::MemoryAllocateInfo::builder().allocation_size(requirements.size).memory_type_index(memory_type_index);
        let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
            Ok(m) => m,
            Err(e) => {
                unsafe { device.destroy_buffer(vk_buffer, None) };
                return Err(e.into());
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(vk_buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(vk_buffer, None);
                device.free_memory(memory, None);
            }
            return Err(e.into());
        }

        let memory_map = match unsafe { device.map_memory(memory, 0, size, vk::MemoryMapFlags::empty()) } {
            Ok(ptr) => ptr as *mut u8,
            Err(e) => {
                unsafe {
                    device.destroy_buffer(vk_buffer, None);
                    device.free_memory(memory, None);
                }
                return Err(e.into());
            }
        };

        Ok(Self { vk_buffer, memory, memory_map, memory_type_index, size, pending_write: false })
    }

    pub fn is_coherent(&self, ctx: &Context) -> bool {
        ctx.memory_type_flags(self.memory_type_index).contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    /// Copy `data` into the mapped buffer at `offset` and mark it pending a
    /// flush at command-buffer end.
    pub fn write(&mut self, offset: u64, data: &[u8]) {
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.memory_map.add(offset as usize), data.len());
        }
        self.pending_write = true;
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.memory_map, self.size as usize) }
    }

    pub fn destroy(&mut self, device: &ash::Device) {
        unsafe {
            device.unmap_memory(self.memory);
            device.destroy_buffer(self.vk_buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}
