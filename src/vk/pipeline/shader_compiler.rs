//! External shader-toolchain invocation: compiles GLSL or assembles SPIR-V
//! text into SPIR-V binary by shelling out to `glslangValidator`/`spirv-as`,
//! via temp files cleaned up by the `tempfile` crate on every exit path,
//! including a failed compile. Binary sources pass through unchanged.

use std::io::Write;
use std::process::Command;

use crate::config::RunnerConfig;
use crate::error::{VrError, VrResult};
use crate::script::ShaderSource;

/// Compile one shader stage's source into SPIR-V bytes.
pub fn compile(source: &ShaderSource, stage_flag: &str, api_version: (u32, u32), config: &RunnerConfig) -> VrResult<Vec<u8>> {
    match source {
        ShaderSource::Binary(bytes) => Ok(bytes.clone()),
        ShaderSource::Glsl(text) => compile_glsl(text, stage_flag, api_version, config),
        ShaderSource::SpirvAsm(text) => assemble(text, api_version, config),
    }
}

fn target_env(api_version: (u32, u32)) -> String {
    format!("vulkan{}.{}", api_version.0, api_version.1)
}

fn compile_glsl(text: &str, stage_flag: &str, api_version: (u32, u32), config: &RunnerConfig) -> VrResult<Vec<u8>> {
    let dir = tempfile::Builder::new()
        .prefix("vkrunner")
        .tempdir()
        .map_err(|e| VrError::ToolchainSubprocess { tool: config.glslang_validator_path.clone(), detail: format!("failed to create temp dir: {e}") })?;

    let src_path = dir.path().join("shader.glsl");
    let out_path = dir.path().join("shader.spv");
    write_temp_file(&src_path, text.as_bytes(), &config.glslang_validator_path)?;

    log::debug!("invoking {} -S {stage_flag} --target-env {}", config.glslang_validator_path, target_env(api_version));
    let output = Command::new(&config.glslang_validator_path)
        .arg("-V")
        .arg("--target-env")
        .arg(target_env(api_version))
        .arg("-S")
        .arg(stage_flag)
        .arg("-o")
        .arg(&out_path)
        .arg(&src_path)
        .output()
        .map_err(|e| VrError::ToolchainSubprocess { tool: config.glslang_validator_path.clone(), detail: format!("failed to spawn: {e}") })?;

    if !output.status.success() {
        log::warn!("{} failed with exit status {:?}", config.glslang_validator_path, output.status.code());
        return Err(VrError::ToolchainSubprocess {
            tool: config.glslang_validator_path.clone(),
            detail: format!("exit status {:?}: {}", output.status.code(), String::from_utf8_lossy(&output.stderr)),
        });
    }

    read_spirv(&out_path, &config.glslang_validator_path)
}

fn assemble(text: &str, api_version: (u32, u32), config: &RunnerConfig) -> VrResult<Vec<u8>> {
    let dir = tempfile::Builder::new()
        .prefix("vkrunner")
        .tempdir()
        .map_err(|e| VrError::ToolchainSubprocess { tool: config.spirv_as_path.clone(), detail: format!("failed to create temp dir: {e}") })?;

    let src_path = dir.path().join("shader.spvasm");
    let out_path = dir.path().join("shader.spv");
    write_temp_file(&src_path, text.as_bytes(), &config.spirv_as_path)?;

    log::debug!("invoking {} --target-env {}", config.spirv_as_path, target_env(api_version));
    let output = Command::new(&config.spirv_as_path)
        .arg("--target-env")
        .arg(target_env(api_version))
        .arg("-o")
        .arg(&out_path)
        .arg(&src_path)
        .output()
        .map_err(|e| VrError::ToolchainSubprocess { tool: config.spirv_as_path.clone(), detail: format!("failed to spawn: {e}") })?;

    if !output.status.success() {
        log::warn!("{} failed with exit status {:?}", config.spirv_as_path, output.status.code());
        return Err(VrError::ToolchainSubprocess {
            tool: config.spirv_as_path.clone(),
            detail: format!("exit status {:?}: {}", output.status.code(), String::from_utf8_lossy(&output.stderr)),
        });
    }

    read_spirv(&out_path, &config.spirv_as_path)
}

/// Disassemble `spirv` with `spirv-dis`, purely for diagnostic logging —
/// never on the critical path of producing a `VkShaderModule`.
pub fn disassemble(spirv: &[u8], config: &RunnerConfig) -> VrResult<String> {
    let dir = tempfile::Builder::new()
        .prefix("vkrunner")
        .tempdir()
        .map_err(|e| VrError::ToolchainSubprocess { tool: config.spirv_dis_path.clone(), detail: format!("failed to create temp dir: {e}") })?;
    let src_path = dir.path().join("shader.spv");
    write_temp_file(&src_path, spirv, &config.spirv_dis_path)?;

    log::debug!("invoking {} on {} bytes of SPIR-V", config.spirv_dis_path, spirv.len());
    let output = Command::new(&config.spirv_dis_path)
        .arg(&src_path)
        .output()
        .map_err(|e| VrError::ToolchainSubprocess { tool: config.spirv_dis_path.clone(), detail: format!("failed to spawn: {e}") })?;

    if !output.status.success() {
        log::warn!("{} failed with exit status {:?}", config.spirv_dis_path, output.status.code());
        return Err(VrError::ToolchainSubprocess {
            tool: config.spirv_dis_path.clone(),
            detail: format!("exit status {:?}: {}", output.status.code(), String::from_utf8_lossy(&output.stderr)),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn write_temp_file(path: &std::path::Path, bytes: &[u8], tool: &str) -> VrResult<()> {
    let mut file = std::fs::File::create(path).map_err(|e| VrError::ToolchainSubprocess { tool: tool.to_string(), detail: format!("failed to create temp source file: {e}") })?;
    file.write_all(bytes).map_err(|e| VrError::ToolchainSubprocess { tool: tool.to_string(), detail: format!("failed to write temp source file: {e}") })
}

fn read_spirv(path: &std::path::Path, tool: &str) -> VrResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| VrError::ToolchainSubprocess { tool: tool.to_string(), detail: format!("failed to read compiled SPIR-V: {e}") })
}

/// Maps a `VkShaderStageFlags`-shaped stage to `glslangValidator`'s `-S` flag.
pub fn stage_flag(stage: ash::vk::ShaderStageFlags) -> &'static str {
    match stage {
        ash::vk::ShaderStageFlags::VERTEX => "vert",
        ash::vk::ShaderStageFlags::FRAGMENT => "frag",
        ash::vk::ShaderStageFlags::COMPUTE => "comp",
        ash::vk::ShaderStageFlags::GEOMETRY => "geom",
        ash::vk::ShaderStageFlags::TESSELLATION_CONTROL => "tesc",
        ash::vk::ShaderStageFlags::TESSELLATION_EVALUATION => "tese",
        _ => "vert",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_source_passes_through_unchanged() {
        let config = RunnerConfig::default();
        let bytes = vec![0x03, 0x02, 0x23, 0x07];
        let result = compile(&ShaderSource::Binary(bytes.clone()), "vert", (1, 0), &config).unwrap();
        assert_eq!(result, bytes);
    }

    #[test]
    fn target_env_formats_as_vulkan_major_minor() {
        assert_eq!(target_env((1, 2)), "vulkan1.2");
    }
}
