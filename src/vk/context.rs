//! Device/queue/command-pool ownership.
//!
//! Headless: no surface, swapchain, or presentation. Selects (or accepts a
//! caller-supplied) physical device satisfying a script's requirements, then
//! owns the logical device, queue, command pool, one primary command buffer,
//! and one fence for the lifetime of a single test run.

use std::ffi::{CStr, CString};

use ash::vk;

use crate::error::{VrError, VrResult};
use crate::requirements::{features_satisfy, Requirements};
use crate::vk::fns::VkFns;

const ENGINE_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"vkrunner\0") };

/// Caller-owned Vulkan handles for the "external device" mode: the embedder
/// already has an instance/device and hands them to vkrunner rather than
/// letting it create its own.
pub struct ExternalDevice {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family: u32,
}

/// Owns the instance, physical device, logical device, queue, command
/// pool, one primary command buffer, and one fence for a single test run.
pub struct Context {
    fns: VkFns,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_family: u32,
    queue: vk::Queue,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    /// `true` when this `Context` owns (and must destroy) the instance and
    /// device; `false` in external-device mode.
    owns_device: bool,
}

impl Context {
    /// Build a device that satisfies `requirements`.
    pub fn new(requirements: &Requirements) -> VrResult<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| VrError::DeviceSelection(format!("failed to load Vulkan loader: {e}")))?;

        let app_name = ENGINE_NAME;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(app_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(requirements.api_version());

        let needs_feature2 = requirements.needs_feature2();
        let instance_extensions = instance_extensions(&entry, needs_feature2)?;
        let extension_ptrs: Vec<*const i8> = instance_extensions.iter().map(|e| e.as_ptr()).collect();

        let instance_create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe { entry.create_instance(&instance_create_info, None)? };

        let selection = match select_physical_device(&instance, requirements) {
            Ok(selection) => selection,
            Err(e) => {
                log::warn!("device selection failed: {e}");
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };
        log::info!("selected device: {}", device_name(&instance, selection.physical_device));

        let device_result = create_logical_device(&instance, &selection, requirements);
        let device = match device_result {
            Ok(device) => device,
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                return Err(e);
            }
        };

        let queue = unsafe { device.get_device_queue(selection.queue_family, 0) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(selection.physical_device) };

        let (command_pool, command_buffer, fence) = match create_command_resources(&device, selection.queue_family) {
            Ok(resources) => resources,
            Err(e) => {
                unsafe {
                    device.destroy_device(None);
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        Ok(Self {
            fns: VkFns::new(entry, instance, device),
            physical_device: selection.physical_device,
            memory_properties,
            queue_family: selection.queue_family,
            queue,
            command_pool,
            command_buffer,
            fence,
            owns_device: true,
        })
    }

    /// Build a `Context` around handles the embedder already owns. Drop
    /// never destroys the instance/device in this mode.
    pub fn from_external(entry: ash::Entry, external: ExternalDevice) -> VrResult<Self> {
        let memory_properties = unsafe { external.instance.get_physical_device_memory_properties(external.physical_device) };
        let (command_pool, command_buffer, fence) = create_command_resources(&external.device, external.queue_family)?;
        let queue = unsafe { external.device.get_device_queue(external.queue_family, 0) };

        Ok(Self {
            fns: VkFns::new(entry, external.instance, external.device),
            physical_device: external.physical_device,
            memory_properties,
            queue_family: external.queue_family,
            queue,
            command_pool,
            command_buffer,
            fence,
            owns_device: false,
        })
    }

    pub fn fns(&self) -> &VkFns {
        &self.fns
    }

    pub fn device(&self) -> &ash::Device {
        self.fns.device()
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    pub fn fence(&self) -> vk::Fence {
        self.fence
    }

    /// Index of a memory type satisfying `type_filter` (the bitmask from
    /// `VkMemoryRequirements`) and `properties`.
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VrResult<u32> {
        for i in 0..self.memory_properties.memory_type_count {
            let supported = (type_filter & (1 << i)) != 0;
            let has_properties = self.memory_properties.memory_types[i as usize].property_flags.contains(properties);
            if supported && has_properties {
                return Ok(i);
            }
        }
        Err(VrError::DeviceSelection("no memory type satisfies the requested properties".to_string()))
    }

    /// Property flags of memory type `index`.
    pub fn memory_type_flags(&self, index: u32) -> vk::MemoryPropertyFlags {
        self.memory_properties.memory_types[index as usize].property_flags
    }

    /// Submit the command buffer, reset the fence first, and wait
    /// `UINT64_MAX` for completion.
    pub fn submit_and_wait(&self) -> VrResult<()> {
        unsafe {
            self.device().end_command_buffer(self.command_buffer)?;
            self.device().reset_fences(&[self.fence])?;

            let command_buffers = [self.command_buffer];
            let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
            self.device().queue_submit(self.queue, &[submit_info.build()], self.fence)?;
            self.device().wait_for_fences(&[self.fence], true, u64::MAX)?;
        }
        Ok(())
    }

    /// Begin recording `command_buffer` again after a submit, resetting it
    /// first (the pool was created with `RESET_COMMAND_BUFFER_BIT`).
    pub fn begin_command_buffer(&self) -> VrResult<()> {
        unsafe {
            self.device().reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;
            let begin_info = vk::CommandBufferBeginInfo::builder();
            self.device().begin_command_buffer(self.command_buffer, &begin_info)?;
        }
        Ok(())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device().device_wait_idle();
            self.device().destroy_fence(self.fence, None);
            self.device().destroy_command_pool(self.command_pool, None);
            if self.owns_device {
                self.device().destroy_device(None);
                self.fns.instance().destroy_instance(None);
            }
        }
    }
}

struct PhysicalDeviceSelection {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
}

fn instance_extensions(entry: &ash::Entry, needs_feature2: bool) -> VrResult<Vec<CString>> {
    if !needs_feature2 {
        return Ok(Vec::new());
    }

    let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
    let name = CString::new("VK_KHR_get_physical_device_properties2").unwrap();
    let supported = available.iter().any(|props| unsafe { CStr::from_ptr(props.extension_name.as_ptr()) == name.as_c_str() });

    // Absence is a skip, not a failure — just omit it.
    Ok(if supported { vec![name] } else { Vec::new() })
}

fn select_physical_device(instance: &ash::Instance, requirements: &Requirements) -> VrResult<PhysicalDeviceSelection> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if let Some(device_id) = requirements.device_id {
        let physical_device = *devices
            .get(device_id)
            .ok_or_else(|| VrError::DeviceSelection(format!("device index {device_id} out of range")))?;
        let queue_family = find_graphics_queue_family(instance, physical_device)
            .ok_or_else(|| VrError::DeviceSelection("selected device has no graphics queue family".to_string()))?;
        check_device_satisfies(instance, physical_device, requirements)?;
        return Ok(PhysicalDeviceSelection { physical_device, queue_family });
    }

    for physical_device in devices {
        if check_device_satisfies(instance, physical_device, requirements).is_err() {
            continue;
        }
        if let Some(queue_family) = find_graphics_queue_family(instance, physical_device) {
            return Ok(PhysicalDeviceSelection { physical_device, queue_family });
        }
    }

    Err(VrError::DeviceSelection("no physical device satisfies the script's requirements".to_string()))
}

fn device_name(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> String {
    let properties = unsafe { instance.get_physical_device_properties(physical_device) };
    unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy().into_owned()
}

fn find_graphics_queue_family(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Option<u32> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    families
        .iter()
        .enumerate()
        .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && family.queue_count >= 1)
        .map(|(index, _)| index as u32)
}

fn check_device_satisfies(instance: &ash::Instance, physical_device: vk::PhysicalDevice, requirements: &Requirements) -> VrResult<()> {
    let available_features = unsafe { instance.get_physical_device_features(physical_device) };
    if !features_satisfy(&requirements.features, &available_features) {
        return Err(VrError::DeviceSelection("device is missing a required feature".to_string()));
    }

    let available_extensions = unsafe { instance.enumerate_device_extension_properties(physical_device)? };
    for required in &requirements.extensions {
        let supported = available_extensions
            .iter()
            .any(|props| unsafe { CStr::from_ptr(props.extension_name.as_ptr()).to_string_lossy().as_ref() == required.as_str() });
        if !supported {
            return Err(VrError::DeviceSelection(format!("device is missing extension {required}")));
        }
    }

    Ok(())
}

fn create_logical_device(instance: &ash::Instance, selection: &PhysicalDeviceSelection, requirements: &Requirements) -> VrResult<ash::Device> {
    let queue_priorities = [1.0f32];
    let queue_create_info = vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(selection.queue_family)
        .queue_priorities(&queue_priorities)
        .build();

    let extension_names: Vec<CString> = requirements.extensions.iter().map(|e| CString::new(e.as_str()).unwrap()).collect();
    let extension_ptrs: Vec<*const i8> = extension_names.iter().map(|e| e.as_ptr()).collect();

    let mut create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&extension_ptrs)
        .enabled_features(&requirements.features)
        .build();

    // Chain any script-requested pNext feature structs.
    // Each entry's bytes already encode its own sType/pNext header; we only
    // need to link them together and onto the create-info chain.
    let raw_chain: Vec<*mut std::ffi::c_void> = requirements
        .extra_feature_structs
        .iter()
        .map(|extra| extra.bytes.as_ptr() as *mut std::ffi::c_void)
        .collect();
    if let Some(&first) = raw_chain.first() {
        create_info.p_next = first as *const std::ffi::c_void;
        for window in raw_chain.windows(2) {
            unsafe {
                // Each feature struct starts with VkBaseOutStructure { sType, pNext }.
                let header = window[0] as *mut vk::BaseOutStructure;
                (*header).p_next = window[1] as *mut vk::BaseOutStructure;
            }
        }
    }

    let device = unsafe { instance.create_device(selection.physical_device, &create_info, None)? };
    Ok(device)
}

fn create_command_resources(device: &ash::Device, queue_family: u32) -> VrResult<(vk::CommandPool, vk::CommandBuffer, vk::Fence)> {
    let pool_create_info = vk::CommandPoolCreateInfo::builder()
        .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
        .queue_family_index(queue_family);
    let command_pool = unsafe { device.create_command_pool(&pool_create_info, None)? };

    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);
    let command_buffer = match unsafe { device.allocate_command_buffers(&alloc_info) } {
        Ok(buffers) => buffers[0],
        Err(e) => {
            unsafe { device.destroy_command_pool(command_pool, None) };
            return Err(e.into());
        }
    };

    let fence_create_info = vk::FenceCreateInfo::builder();
    let fence = match unsafe { device.create_fence(&fence_create_info, None) } {
        Ok(fence) => fence,
        Err(e) => {
            unsafe { device.destroy_command_pool(command_pool, None) };
            return Err(e.into());
        }
    };

    Ok((command_pool, command_buffer, fence))
}
