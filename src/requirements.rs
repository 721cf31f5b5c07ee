//! Device/feature/extension requirements a script places on the Vulkan
//! device the engine selects.

use ash::vk;

/// An opaque `pNext` feature-struct entry the script layer wants chained
/// onto device creation. vkrunner's core never interprets the bytes, only
/// forwards them — the script parser is responsible for producing a value
/// whose layout matches `structure_type`.
#[derive(Debug, Clone)]
pub struct ExtraFeatureChain {
    /// `sType` of the struct these bytes encode.
    pub structure_type: vk::StructureType,
    /// Raw bytes of the feature struct, including its `sType`/`pNext`
    /// header, ready to be cast to the appropriate `Vk*Features` type and
    /// linked into the `pNext` chain.
    pub bytes: Vec<u8>,
}

/// Everything a script requires of the Vulkan device and instance before a
/// run can proceed. Produced by the (external) script parser; consumed by
/// [`crate::vk::context::Context::new`].
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    /// Vulkan API version to request from the instance, `(major, minor,
    /// patch)`. `(0, 0, 0)` means "use the implementation default".
    pub version: (u32, u32, u32),
    /// Device extensions that must be enabled.
    pub extensions: Vec<String>,
    /// Core `VkPhysicalDeviceFeatures` that must be supported and enabled.
    pub features: vk::PhysicalDeviceFeatures,
    /// Extended feature structs chained via `pNext` on device creation.
    pub extra_feature_structs: Vec<ExtraFeatureChain>,
    /// If set, restrict device selection to this physical-device index.
    pub device_id: Option<usize>,
}

impl Requirements {
    /// Vulkan API version encoded via `vk::make_api_version`.
    pub fn api_version(&self) -> u32 {
        let (major, minor, patch) = self.version;
        vk::make_api_version(0, major, minor, patch)
    }

    /// Whether any `pNext` feature struct was requested — if so, Context
    /// needs `VK_KHR_get_physical_device_properties2` as an instance
    /// extension (skipped, not failed, when absent).
    pub fn needs_feature2(&self) -> bool {
        !self.extra_feature_structs.is_empty()
    }
}

/// A physical-device feature set is too large to derive `PartialEq` on
/// generically; callers compare the subset of fields the script requested.
pub fn features_satisfy(required: &vk::PhysicalDeviceFeatures, available: &vk::PhysicalDeviceFeatures) -> bool {
    macro_rules! implies {
        ($field:ident) => {
            required.$field == vk::FALSE || available.$field == vk::TRUE
        };
    }

    implies!(robust_buffer_access)
        && implies!(full_draw_index_uint32)
        && implies!(image_cube_array)
        && implies!(independent_blend)
        && implies!(geometry_shader)
        && implies!(tessellation_shader)
        && implies!(sample_rate_shading)
        && implies!(dual_src_blend)
        && implies!(logic_op)
        && implies!(multi_draw_indirect)
        && implies!(draw_indirect_first_instance)
        && implies!(depth_clamp)
        && implies!(depth_bias_clamp)
        && implies!(fill_mode_non_solid)
        && implies!(depth_bounds)
        && implies!(wide_lines)
        && implies!(large_points)
        && implies!(alpha_to_one)
        && implies!(multi_viewport)
        && implies!(sampler_anisotropy)
        && implies!(texture_compression_etc2)
        && implies!(texture_compression_astc_ldr)
        && implies!(texture_compression_bc)
        && implies!(occlusion_query_precise)
        && implies!(pipeline_statistics_query)
        && implies!(vertex_pipeline_stores_and_atomics)
        && implies!(fragment_stores_and_atomics)
        && implies!(shader_tessellation_and_geometry_point_size)
        && implies!(shader_image_gather_extended)
        && implies!(shader_storage_image_extended_formats)
        && implies!(shader_storage_image_multisample)
        && implies!(shader_storage_image_read_without_format)
        && implies!(shader_storage_image_write_without_format)
        && implies!(shader_uniform_buffer_array_dynamic_indexing)
        && implies!(shader_sampled_image_array_dynamic_indexing)
        && implies!(shader_storage_buffer_array_dynamic_indexing)
        && implies!(shader_storage_image_array_dynamic_indexing)
        && implies!(shader_clip_distance)
        && implies!(shader_cull_distance)
        && implies!(shader_float64)
        && implies!(shader_int64)
        && implies!(shader_int16)
        && implies!(shader_resource_residency)
        && implies!(shader_resource_min_lod)
        && implies!(sparse_binding)
        && implies!(sparse_residency_buffer)
        && implies!(sparse_residency_image2_d)
        && implies!(sparse_residency_image3_d)
        && implies!(sparse_residency2_samples)
        && implies!(sparse_residency4_samples)
        && implies!(sparse_residency8_samples)
        && implies!(sparse_residency16_samples)
        && implies!(sparse_residency_aliased)
        && implies!(variable_multisample_rate)
        && implies!(inherited_queries)
}
