//! Logging setup: a thin `init()` wrapping `env_logger::init()`. vkrunner's
//! engine logs through the `log` facade everywhere (state transitions,
//! pipeline builds, subprocess invocations); this just gives embedders an
//! opt-in way to wire up a default subscriber without forcing one on them.

/// Install `env_logger` as the global logger if one isn't already set.
///
/// Safe to call more than once; subsequent calls are no-ops (`env_logger`
/// itself tolerates double-init by returning an error we discard).
pub fn init_logging() {
    let _ = env_logger::try_init();
}
