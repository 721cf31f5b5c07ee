//! Environment-derived runner configuration: external toolchain paths and
//! memory-flush behavior, read from the process environment rather than a
//! config file.

use std::env;

/// Default binary name used when the corresponding env var is unset.
const DEFAULT_GLSLANG_VALIDATOR: &str = "glslangValidator";
const DEFAULT_SPIRV_AS: &str = "spirv-as";
const DEFAULT_SPIRV_DIS: &str = "spirv-dis";

/// Knobs the engine reads from the process environment.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Path to the `glslangValidator` binary (env `PIGLIT_GLSLANG_VALIDATOR_BINARY`).
    pub glslang_validator_path: String,
    /// Path to the `spirv-as` binary (env `PIGLIT_SPIRV_AS_BINARY`).
    pub spirv_as_path: String,
    /// Path to the `spirv-dis` binary (env `PIGLIT_SPIRV_DIS_BINARY`).
    pub spirv_dis_path: String,
    /// Force-flush mapped memory even when the memory type is
    /// `HOST_COHERENT` (env `VKRUNNER_ALWAYS_FLUSH_MEMORY`).
    pub always_flush_memory: bool,
    /// Disassemble each compiled shader stage with `spirv-dis` and log it at
    /// debug level (env `VKRUNNER_DISASSEMBLE_SHADERS`).
    pub disassemble_shaders: bool,
}

impl RunnerConfig {
    /// Build a config by reading the process environment, falling back to
    /// fixed defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            glslang_validator_path: env::var("PIGLIT_GLSLANG_VALIDATOR_BINARY")
                .unwrap_or_else(|_| DEFAULT_GLSLANG_VALIDATOR.to_string()),
            spirv_as_path: env::var("PIGLIT_SPIRV_AS_BINARY")
                .unwrap_or_else(|_| DEFAULT_SPIRV_AS.to_string()),
            spirv_dis_path: env::var("PIGLIT_SPIRV_DIS_BINARY")
                .unwrap_or_else(|_| DEFAULT_SPIRV_DIS.to_string()),
            always_flush_memory: parse_bool_env("VKRUNNER_ALWAYS_FLUSH_MEMORY"),
            disassemble_shaders: parse_bool_env("VKRUNNER_DISASSEMBLE_SHADERS"),
        }
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            glslang_validator_path: DEFAULT_GLSLANG_VALIDATOR.to_string(),
            spirv_as_path: DEFAULT_SPIRV_AS.to_string(),
            spirv_dis_path: DEFAULT_SPIRV_DIS.to_string(),
            always_flush_memory: false,
            disassemble_shaders: false,
        }
    }
}

/// Parses `0/1/true/false/yes/no` (case-insensitive), default false.
fn parse_bool_env(name: &str) -> bool {
    match env::var(name) {
        Ok(value) => matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_standard_toolchain_names() {
        let config = RunnerConfig::default();
        assert_eq!(config.glslang_validator_path, "glslangValidator");
        assert_eq!(config.spirv_as_path, "spirv-as");
        assert_eq!(config.spirv_dis_path, "spirv-dis");
        assert!(!config.always_flush_memory);
        assert!(!config.disassemble_shaders);
    }

    #[test]
    fn parse_bool_env_accepts_common_spellings() {
        env::set_var("VKRUNNER_TEST_BOOL_A", "YES");
        env::set_var("VKRUNNER_TEST_BOOL_B", "0");
        env::set_var("VKRUNNER_TEST_BOOL_C", "true");
        assert!(parse_bool_env("VKRUNNER_TEST_BOOL_A"));
        assert!(!parse_bool_env("VKRUNNER_TEST_BOOL_B"));
        assert!(parse_bool_env("VKRUNNER_TEST_BOOL_C"));
        env::remove_var("VKRUNNER_TEST_BOOL_A");
        env::remove_var("VKRUNNER_TEST_BOOL_B");
        env::remove_var("VKRUNNER_TEST_BOOL_C");
    }
}
