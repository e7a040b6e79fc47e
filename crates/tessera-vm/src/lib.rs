//! Tessera VM - sandboxed host runtime for WASM smart contracts.
//!
//! This crate provides:
//! - WASM runtime using wasmtime
//! - Two-dimensional gas metering for host operations
//! - The versioned host function API (`seal0`, `seal1`, `seal2`)
//! - A per-invocation storage overlay producing the change set to commit
//! - Reentrancy and call depth protection for nested calls

pub mod chain;
pub mod config;
pub mod context;
pub mod error;
pub mod gas_metering;
pub mod host;
pub mod memory;
pub mod overlay;
pub mod primitives;
pub mod reentrancy;
pub mod storage;
pub mod wasm_runtime;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use chain::{Chain, ChainError, NoChain};
pub use config::{HostLimits, WasmRuntimeConfig};
pub use context::{Event, ExecutionContext, Origin, Phase};
pub use error::{HostError, TrapReason, VmError};
pub use gas_metering::{GasMeter, HostFnWeights, RuntimeCosts};
pub use host::HOST_FUNCTIONS;
pub use memory::SandboxMemory;
pub use overlay::{StateChanges, StorageOverlay};
pub use primitives::{CallFlags, ExecReturnValue, ReturnCode, ReturnFlags, SENTINEL};
pub use reentrancy::{CallFrame, CallStack, MAX_CALL_DEPTH};
pub use storage::{BackingStore, InMemoryStore, StateKey, StoreError, WriteOutcome};
pub use wasm_runtime::{CancelHandle, EntryPoint, ExecutionOutcome, PreparedContract, WasmRuntime};

/// VM version constant
pub const VM_VERSION: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_constants() {
        assert_eq!(VM_VERSION, 1);
        assert_eq!(MAX_CALL_DEPTH, 64);
        assert_eq!(SENTINEL, u32::MAX);
        assert_eq!(config::MAX_CODE_SIZE, 128 * 1024);
    }
}
