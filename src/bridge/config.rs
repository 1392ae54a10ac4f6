//! Bridge configuration.

use crate::bridge::error::{BridgeError, Result};

/// Configuration for a [`crate::Bridge`].
///
/// Engine flags apply process-wide and only once: the first bridge (or an
/// explicit [`crate::initialize_platform_once`] call) fixes them for the
/// lifetime of the process. Heap limits apply per bridge.
#[derive(Debug, Clone, Default)]
pub struct BridgeConfig {
    /// V8 command-line-style flag string, e.g. `"--max-old-space-size=64"`.
    pub engine_flags: Option<String>,
    /// Maximum heap size in bytes for this bridge's isolate.
    pub max_heap_size: Option<usize>,
    /// Initial heap size in bytes. Requires `max_heap_size`.
    pub initial_heap_size: Option<usize>,
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine_flags(mut self, flags: impl Into<String>) -> Self {
        self.engine_flags = Some(flags.into());
        self
    }

    pub fn with_max_heap_size(mut self, bytes: usize) -> Self {
        self.max_heap_size = Some(bytes);
        self
    }

    pub fn with_initial_heap_size(mut self, bytes: usize) -> Self {
        self.initial_heap_size = Some(bytes);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        match (self.initial_heap_size, self.max_heap_size) {
            (Some(_), None) => Err(BridgeError::Config(
                "initial_heap_size requires max_heap_size".into(),
            )),
            (Some(initial), Some(max)) if initial > max => Err(BridgeError::Config(format!(
                "initial_heap_size ({initial}) exceeds max_heap_size ({max})"
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(BridgeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = BridgeConfig::new()
            .with_engine_flags("--max-old-space-size=64")
            .with_max_heap_size(64 << 20)
            .with_initial_heap_size(1 << 20);
        assert_eq!(config.engine_flags.as_deref(), Some("--max-old-space-size=64"));
        assert_eq!(config.max_heap_size, Some(64 << 20));
        assert_eq!(config.initial_heap_size, Some(1 << 20));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_initial_heap_requires_max() {
        let config = BridgeConfig::new().with_initial_heap_size(1 << 20);
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    }

    #[test]
    fn test_initial_heap_must_not_exceed_max() {
        let config = BridgeConfig::new()
            .with_max_heap_size(1 << 20)
            .with_initial_heap_size(2 << 20);
        assert!(matches!(config.validate(), Err(BridgeError::Config(_))));
    }
}
