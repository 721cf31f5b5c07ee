//! Crate-wide error type.
//!
//! A thiserror enum wrapping `vk::Result` plus named failure shapes covering
//! device selection (maps to Skip at the call site, not Fail), external
//! toolchain failures, and command-level failures that don't abort the run.

use ash::vk;
use thiserror::Error;

/// Result type used throughout the engine.
pub type VrResult<T> = Result<T, VrError>;

/// Everything that can go wrong while building or running a test.
#[derive(Error, Debug)]
pub enum VrError {
    /// A Vulkan call returned anything other than `VK_SUCCESS`.
    #[error("Vulkan API error: {0:?}")]
    Vulkan(vk::Result),

    /// No physical device / queue family / extension set satisfied the
    /// script's `Requirements`. Callers map this to a Skip result, not Fail.
    #[error("no suitable Vulkan device: {0}")]
    DeviceSelection(String),

    /// An external shader toolchain binary (glslangValidator, spirv-as,
    /// spirv-dis) exited with a non-zero status or could not be launched.
    #[error("{tool} failed: {detail}")]
    ToolchainSubprocess {
        /// Path or name of the binary that was invoked.
        tool: String,
        /// Exit status / spawn error, plus any captured stderr.
        detail: String,
    },

    /// A script command's precondition failed (e.g. a draw with no vertex
    /// data section) or a probe comparison mismatched. The run continues;
    /// the aggregate result is Fail.
    #[error("Command failed at line {line}: {message}")]
    CommandFailed {
        /// Source line number of the offending command.
        line: u32,
        /// Human-readable diagnostic.
        message: String,
    },

    /// Invalid use of the engine API that indicates a programming error in
    /// the embedder (out-of-range descriptor set/binding, state machine
    /// misuse). Not a `Fatal` invariant violation — recoverable by the
    /// caller, but never expected in a well-formed script.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<vk::Result> for VrError {
    fn from(result: vk::Result) -> Self {
        VrError::Vulkan(result)
    }
}

/// Genuine programmer-error unreachables: a format-table entry with an
/// inconsistent bit size, a box-type lookup index out of range. These are
/// not propagated as `VrError` — call `vr_fatal!` to panic with context
/// rather than attempting recovery.
macro_rules! vr_fatal {
    ($($arg:tt)*) => {
        panic!("vkrunner: fatal internal error: {}", format!($($arg)*))
    };
}

pub(crate) use vr_fatal;
