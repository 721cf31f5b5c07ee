//! Framebuffer-side resources for one test run: color (and optional
//! depth/stencil) image, host-visible linear readback buffer, and two render
//! passes — one that clears the color attachment on the first render of a
//! run (`DONT_CARE` load), one that preserves prior contents for subsequent
//! renders (`LOAD`).

use ash::vk;

use crate::error::{VrError, VrResult};
use crate::script::WindowFormat;
use crate::vk::context::Context;

/// Owns the color (and optional depth/stencil) image, the host-visible
/// linear readback buffer, both render passes, and the framebuffer for one
/// run's target.
pub struct Window {
    device: ash::Device,
    color_image: vk::Image,
    color_memory: vk::DeviceMemory,
    color_view: vk::ImageView,
    depth_stencil: Option<DepthStencil>,
    linear_buffer: vk::Buffer,
    linear_memory: vk::DeviceMemory,
    linear_memory_map: *mut u8,
    linear_memory_is_coherent: bool,
    linear_stride: u32,
    render_pass_first: vk::RenderPass,
    render_pass_subsequent: vk::RenderPass,
    framebuffer: vk::Framebuffer,
    pub format: WindowFormat,
    color_format_size: u32,
}

struct DepthStencil {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    aspect_mask: vk::ImageAspectFlags,
}

// Raw mapped pointers aren't `Send`/`Sync` by default; the engine only ever
// touches the mapping from the single thread that owns the `Context`.
unsafe impl Send for Window {}

impl Window {
    pub fn new(ctx: &Context, format: WindowFormat, color_format_size: u32) -> VrResult<Self> {
        check_format_support(ctx, format.color_format, vk::FormatFeatureFlags::COLOR_ATTACHMENT | vk::FormatFeatureFlags::BLIT_SRC)?;
        if let Some(ds_format) = format.depth_stencil_format {
            check_format_support(ctx, ds_format, vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)?;
        }

        let device = ctx.device().clone();

        let (color_image, color_memory, color_view) = create_color_image(ctx, format)?;

        let depth_stencil = match format.depth_stencil_format {
            Some(ds_format) => Some(create_depth_stencil(ctx, format, ds_format)?),
            None => None,
        };

        let linear_stride = color_format_size * format.width;
        let linear_size = (linear_stride * format.height) as vk::DeviceSize;
        let (linear_buffer, linear_memory, linear_memory_is_coherent) = create_linear_buffer(ctx, linear_size)?;
        let linear_memory_map = unsafe { device.map_memory(linear_memory, 0, linear_size, vk::MemoryMapFlags::empty())? } as *mut u8;

        let render_pass_first = create_render_pass(&device, format, vk::AttachmentLoadOp::DONT_CARE, vk::ImageLayout::UNDEFINED)?;
        let render_pass_subsequent = match create_render_pass(&device, format, vk::AttachmentLoadOp::LOAD, vk::ImageLayout::TRANSFER_SRC_OPTIMAL) {
            Ok(rp) => rp,
            Err(e) => {
                unsafe { device.destroy_render_pass(render_pass_first, None) };
                return Err(e);
            }
        };

        let mut attachments = vec![color_view];
        if let Some(ds) = &depth_stencil {
            attachments.push(ds.view);
        }
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass_first)
            .attachments(&attachments)
            .width(format.width)
            .height(format.height)
            .layers(1);
        let framebuffer = unsafe { device.create_framebuffer(&framebuffer_create_info, None)? };

        Ok(Self {
            device,
            color_image,
            color_memory,
            color_view,
            depth_stencil,
            linear_buffer,
            linear_memory,
            linear_memory_map,
            linear_memory_is_coherent,
            linear_stride,
            render_pass_first,
            render_pass_subsequent,
            framebuffer,
            format,
            color_format_size,
        })
    }

    pub fn color_image(&self) -> vk::Image {
        self.color_image
    }

    pub fn framebuffer(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Render pass #0 (first render of the run) or #1 (subsequent).
    pub fn render_pass(&self, is_first: bool) -> vk::RenderPass {
        if is_first {
            self.render_pass_first
        } else {
            self.render_pass_subsequent
        }
    }

    pub fn linear_buffer(&self) -> vk::Buffer {
        self.linear_buffer
    }

    pub fn linear_memory(&self) -> vk::DeviceMemory {
        self.linear_memory
    }

    pub fn linear_stride(&self) -> u32 {
        self.linear_stride
    }

    pub fn linear_memory_is_coherent(&self) -> bool {
        self.linear_memory_is_coherent
    }

    /// Read-only view into the mapped linear readback buffer.
    pub fn linear_memory_slice(&self) -> &[u8] {
        let size = (self.linear_stride * self.format.height) as usize;
        unsafe { std::slice::from_raw_parts(self.linear_memory_map, size) }
    }

    /// Depth/stencil aspect flags present in this window's format, for
    /// `vkCmdClearAttachments`.
    pub fn depth_stencil_aspect(&self) -> vk::ImageAspectFlags {
        self.depth_stencil.as_ref().map(|d| d.aspect_mask).unwrap_or(vk::ImageAspectFlags::empty())
    }

    pub fn color_format_size(&self) -> u32 {
        self.color_format_size
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
            self.device.destroy_render_pass(self.render_pass_subsequent, None);
            self.device.destroy_render_pass(self.render_pass_first, None);
            self.device.unmap_memory(self.linear_memory);
            self.device.destroy_buffer(self.linear_buffer, None);
            self.device.free_memory(self.linear_memory, None);
            if let Some(ds) = &self.depth_stencil {
                self.device.destroy_image_view(ds.view, None);
                self.device.destroy_image(ds.image, None);
                self.device.free_memory(ds.memory, None);
            }
            self.device.destroy_image_view(self.color_view, None);
            self.device.destroy_image(self.color_image, None);
            self.device.free_memory(self.color_memory, None);
        }
    }
}

fn check_format_support(ctx: &Context, format: vk::Format, required: vk::FormatFeatureFlags) -> VrResult<()> {
    let properties = unsafe { ctx.fns().instance().get_physical_device_format_properties(ctx.physical_device(), format) };
    if properties.optimal_tiling_features.contains(required) {
        Ok(())
    } else {
        Err(VrError::DeviceSelection(format!("format {format:?} does not support required features {required:?}")))
    }
}

fn create_color_image(ctx: &Context, format: WindowFormat) -> VrResult<(vk::Image, vk::DeviceMemory, vk::ImageView)> {
    let device = ctx.device();
    let image_create_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format.color_format)
        .extent(vk::Extent3D { width: format.width, height: format.height, depth: 1 })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = unsafe { device.create_image(&image_create_info, None)? };

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory_type = match ctx.find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
        Ok(t) => t,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e);
        }
    };
    let alloc_info = vk::MemoryAllocateInfo::builder().allocation_size(requirements.size).memory_type_index(memory_type);
    let memory = match unsafe { device.allocate_memory(&alloc_info, None) } {
        Ok(m) => m,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e.into());
        }
    };
    if let Err(e) = unsafe { device.bind_image_memory(image, memory, 0) } {
        unsafe {
            device.destroy_image(image, None);
            device.free_memory(memory, None);
        }
        return Err(e.into());
    }

    let view_create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format.color_format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    let view = match unsafe { device.create_image_view(&view_create_info, None) } {
        Ok(v) => v,
        Err(e) => {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            return Err(e.into());
        }
    };

    Ok((image, memory, view))
}

fn create_depth_stencil(ctx: &Context, format: WindowFormat, ds_format: vk::Format) -> VrResult<DepthStencil> {
    let device = ctx.device();
    let aspect_mask = depth_stencil_aspect_mask(ds_format);

    let image_create_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(ds_format)
        .extent(vk::Extent3D { width: format.width, height: format.height, depth: 1 })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = unsafe { device.create_image(&image_create_info, None)? };

    let requirements = unsafe { device.get_image_memory_requirements(image) };
    let memory_type = ctx.find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?;
    let alloc_info = vk::MemoryAllocateInfo::builder().allocation_size(requirements.size).memory_type_index(memory_type);
    let memory = unsafe { device.allocate_memory(&alloc_info, None)? };
    unsafe { device.bind_image_memory(image, memory, 0)? };

    let view_create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(ds_format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    let view = unsafe { device.create_image_view(&view_create_info, None)? };

    Ok(DepthStencil { image, memory, view, aspect_mask })
}

fn depth_stencil_aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => vk::ImageAspectFlags::DEPTH,
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
    }
}

fn create_linear_buffer(ctx: &Context, size: vk::DeviceSize) -> VrResult<(vk::Buffer, vk::DeviceMemory, bool)> {
    let device = ctx.device();
    let buffer_create_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(vk::BufferUsageFlags::TRANSFER_DST)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = unsafe { device.create_buffer(&buffer_create_info, None)? };

    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
    let memory_type = ctx.find_memory_type(requirements.memory_type_bits, vk::MemoryPropertyFlags::HOST_VISIBLE)?;
    let is_coherent = ctx.memory_type_flags(memory_type).contains(vk::MemoryPropertyFlags::HOST_COHERENT);

    let alloc_info = vk::MemoryAllocateInfo::builder().allocation_size(requirements.size).memory_type_index(memory_type);
    let memory = unsafe { device.allocate_memory(&alloc_info, None)? };
    unsafe { device.bind_buffer_memory(buffer, memory, 0)? };

    Ok((buffer, memory, is_coherent))
}

fn create_render_pass(device: &ash::Device, format: WindowFormat, load_op: vk::AttachmentLoadOp, initial_layout: vk::ImageLayout) -> VrResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format.color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(load_op)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(initial_layout)
        .final_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .build();

    let color_ref = vk::AttachmentReference::builder().attachment(0).layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL).build();

    let mut attachments = vec![color_attachment];
    let depth_ref;
    let subpass = if let Some(ds_format) = format.depth_stencil_format {
        attachments.push(
            vk::AttachmentDescription::builder()
                .format(ds_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(load_op)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(load_op)
                .stencil_store_op(vk::AttachmentStoreOp::STORE)
                .initial_layout(if matches!(initial_layout, vk::ImageLayout::UNDEFINED) {
                    vk::ImageLayout::UNDEFINED
                } else {
                    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
                })
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .build(),
        );
        depth_ref = vk::AttachmentReference::builder().attachment(1).layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).build();
        vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_ref))
            .depth_stencil_attachment(&depth_ref)
            .build()
    } else {
        vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_ref))
            .build()
    };

    let subpasses = [subpass];
    let render_pass_create_info = vk::RenderPassCreateInfo::builder().attachments(&attachments).subpasses(&subpasses);

    let render_pass = unsafe { device.create_render_pass(&render_pass_create_info, None)? };
    Ok(render_pass)
}
