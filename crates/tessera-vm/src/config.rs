//! Runtime configuration, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VmError;
use crate::gas_metering::HostFnWeights;
use crate::reentrancy::MAX_CALL_DEPTH;
use crate::storage::MAX_STORAGE_KEY_LEN;

/// Size of a WASM page in bytes.
pub const WASM_PAGE_SIZE: u64 = 64 * 1024;

/// Maximum contract code size (128 KB)
pub const MAX_CODE_SIZE: usize = 128 * 1024;

/// Bounds the host enforces on guest-supplied sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostLimits {
    pub max_storage_key_len: u32,
    /// Largest storage value, event payload or subject accepted from a guest.
    pub max_value_size: u32,
    pub max_event_topics: u32,
    pub max_call_depth: u32,
    /// Largest `random` subject.
    pub max_subject_len: u32,
    /// Total bytes of guest debug output kept per invocation.
    pub max_debug_buffer_len: u32,
    /// Whether `debug_message` records anything.
    pub debug_buffer_enabled: bool,
}

impl Default for HostLimits {
    fn default() -> Self {
        Self {
            max_storage_key_len: MAX_STORAGE_KEY_LEN,
            max_value_size: 16 * 1024,
            max_event_topics: 4,
            max_call_depth: MAX_CALL_DEPTH,
            max_subject_len: 32,
            max_debug_buffer_len: 2 * 1024 * 1024,
            debug_buffer_enabled: false,
        }
    }
}

/// WASM Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WasmRuntimeConfig {
    /// Upper bound for the guest's declared memory maximum.
    pub max_memory_pages: u32,
    pub max_code_size: usize,
    /// Engine fuel per invocation. Running out traps with `OutOfGas`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fuel: Option<u64>,
    /// Allow in-flight invocations to be cancelled through a `CancelHandle`.
    pub epoch_interruption: bool,
    pub limits: HostLimits,
    pub schedule: HostFnWeights,
}

impl Default for WasmRuntimeConfig {
    fn default() -> Self {
        Self {
            // 16 MB
            max_memory_pages: 256,
            max_code_size: MAX_CODE_SIZE,
            fuel: None,
            epoch_interruption: false,
            limits: HostLimits::default(),
            schedule: HostFnWeights::default(),
        }
    }
}

impl WasmRuntimeConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, VmError> {
        let config: Self = toml::from_str(s).map_err(|e| VmError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, VmError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| VmError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, VmError> {
        toml::to_string(self).map_err(|e| VmError::InvalidConfig(e.to_string()))
    }

    /// Maximum guest memory in bytes.
    pub fn max_memory_bytes(&self) -> u64 {
        u64::from(self.max_memory_pages) * WASM_PAGE_SIZE
    }

    pub fn validate(&self) -> Result<(), VmError> {
        if self.max_memory_pages == 0 || self.max_memory_pages > 65_536 {
            return Err(VmError::InvalidConfig(format!(
                "max_memory_pages must be in 1..=65536, got {}",
                self.max_memory_pages
            )));
        }
        if self.max_code_size == 0 {
            return Err(VmError::InvalidConfig("max_code_size must be positive".into()));
        }
        if self.limits.max_storage_key_len == 0 {
            return Err(VmError::InvalidConfig("max_storage_key_len must be positive".into()));
        }
        if self.limits.max_call_depth == 0 {
            return Err(VmError::InvalidConfig("max_call_depth must be positive".into()));
        }
        if u64::from(self.limits.max_value_size) > self.max_memory_bytes() {
            return Err(VmError::InvalidConfig(
                "max_value_size cannot exceed guest memory".into(),
            ));
        }
        Ok(())
    }
}
