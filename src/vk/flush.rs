//! Coherence helper: conditional `vkFlushMappedMemoryRanges`/invalidate for
//! memory types that aren't `HOST_COHERENT`.

use ash::vk;

use crate::config::RunnerConfig;
use crate::error::VrResult;

/// Flush `size` bytes at `offset` in `memory` if its memory type lacks
/// `HOST_COHERENT`, or if `config.always_flush_memory` forces it.
pub fn flush(device: &ash::Device, config: &RunnerConfig, memory_type_flags: vk::MemoryPropertyFlags, memory: vk::DeviceMemory, offset: vk::DeviceSize, size: vk::DeviceSize) -> VrResult<()> {
    if should_skip_flush(memory_type_flags, config.always_flush_memory) {
        return Ok(());
    }

    let range = vk::MappedMemoryRange::builder().memory(memory).offset(offset).size(size);
    unsafe { device.flush_mapped_memory_ranges(&[range.build()])? };
    Ok(())
}

fn should_skip_flush(memory_type_flags: vk::MemoryPropertyFlags, always_flush_memory: bool) -> bool {
    let is_coherent = memory_type_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT);
    is_coherent && !always_flush_memory
}

/// Invalidate `size` bytes at `offset` in `memory` if its memory type lacks
/// `HOST_COHERENT`.
pub fn invalidate(device: &ash::Device, memory_type_flags: vk::MemoryPropertyFlags, memory: vk::DeviceMemory, offset: vk::DeviceSize, size: vk::DeviceSize) -> VrResult<()> {
    if memory_type_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT) {
        return Ok(());
    }

    let range = vk::MappedMemoryRange::builder().memory(memory).offset(offset).size(size);
    unsafe { device.invalidate_mapped_memory_ranges(&[range.build()])? };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coherent_memory_skips_flush_unless_forced() {
        assert!(should_skip_flush(vk::MemoryPropertyFlags::HOST_COHERENT, false));
        assert!(!should_skip_flush(vk::MemoryPropertyFlags::HOST_COHERENT, true));
        assert!(!should_skip_flush(vk::MemoryPropertyFlags::empty(), false));
    }
}
