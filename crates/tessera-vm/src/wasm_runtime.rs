//! WASM runtime driver
//!
//! Prepares contract modules once and runs entry points against a fresh
//! [`ExecutionContext`] per invocation.

use std::sync::Arc;

use tessera_types::{Address, Hash, Weight};
use wasmtime::{Config, Engine, ExternType, Linker, Memory, MemoryType, Module, Store, Trap};

use crate::chain::Chain;
use crate::config::WasmRuntimeConfig;
use crate::context::{Event, ExecutionContext, Phase};
use crate::error::{HostError, TrapReason, VmError};
use crate::host::{define_host_functions, is_host_function};
use crate::overlay::StateChanges;
use crate::primitives::ExecReturnValue;
use crate::storage::BackingStore;

const WASM_MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6d];

/// Exported functions a contract may be entered through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPoint {
    Call,
    Deploy,
}

impl EntryPoint {
    pub fn export_name(&self) -> &'static str {
        match self {
            EntryPoint::Call => "call",
            EntryPoint::Deploy => "deploy",
        }
    }
}

/// A validated, compiled contract.
#[derive(Clone)]
pub struct PreparedContract {
    module: Module,
    code_hash: Hash,
    memory_type: MemoryType,
}

impl PreparedContract {
    pub fn code_hash(&self) -> &Hash {
        &self.code_hash
    }

    /// The memory the host provides as `env.memory`.
    pub fn memory_type(&self) -> &MemoryType {
        &self.memory_type
    }
}

impl std::fmt::Debug for PreparedContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedContract")
            .field("code_hash", &self.code_hash)
            .field("memory_type", &self.memory_type)
            .finish_non_exhaustive()
    }
}

/// How an invocation ended, together with everything it produced.
#[derive(Debug)]
pub struct ExecutionOutcome {
    result: Result<ExecReturnValue, HostError>,
    context: ExecutionContext,
}

impl ExecutionOutcome {
    /// The return data, or the reason the guest trapped.
    pub fn result(&self) -> &Result<ExecReturnValue, HostError> {
        &self.result
    }

    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(value) if !value.did_revert())
    }

    pub fn did_revert(&self) -> bool {
        matches!(&self.result, Ok(value) if value.did_revert())
    }

    pub fn is_trapped(&self) -> bool {
        self.result.is_err()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The change set. Trapped or reverted invocations must not be committed.
    pub fn changes(&self) -> StateChanges {
        self.context.changes()
    }

    pub fn events(&self) -> &[Event] {
        self.context.events()
    }

    pub fn debug_messages(&self) -> &[String] {
        self.context.debug_messages()
    }

    pub fn gas_consumed(&self) -> Weight {
        self.context.gas_meter().gas_consumed()
    }

    pub fn into_parts(self) -> (Result<ExecReturnValue, HostError>, ExecutionContext) {
        (self.result, self.context)
    }
}

/// Interrupts invocations running on a [`WasmRuntime`].
///
/// Cancelling affects every invocation in flight on the runtime at that moment.
#[derive(Clone)]
pub struct CancelHandle {
    engine: Engine,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.engine.increment_epoch();
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle").finish_non_exhaustive()
    }
}

/// WASM Runtime
pub struct WasmRuntime {
    engine: Engine,
    config: WasmRuntimeConfig,
}

impl WasmRuntime {
    pub fn new(config: WasmRuntimeConfig) -> Result<Self, VmError> {
        config.validate()?;

        let mut engine_config = Config::new();
        engine_config
            .consume_fuel(config.fuel.is_some())
            .epoch_interruption(config.epoch_interruption);
        let engine = Engine::new(&engine_config)
            .map_err(|e| VmError::InvalidConfig(format!("engine: {e}")))?;

        Ok(Self { engine, config })
    }

    pub fn config(&self) -> &WasmRuntimeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// A handle that interrupts running invocations.
    ///
    /// Only effective with `epoch_interruption` enabled.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            engine: self.engine.clone(),
        }
    }

    /// A context carrying this runtime's limits and price table.
    pub fn context(
        &self,
        caller: Address,
        contract_address: Address,
        gas_limit: Weight,
        store: Arc<dyn BackingStore>,
        chain: Arc<dyn Chain>,
    ) -> ExecutionContext {
        ExecutionContext::new(caller, contract_address, gas_limit, store, chain)
            .with_limits(self.config.limits)
            .with_schedule(self.config.schedule)
    }

    /// Validate and compile contract code.
    ///
    /// The module must import its memory as `env.memory`, import nothing but
    /// host functions, and export both entry points.
    pub fn prepare(&self, code: &[u8]) -> Result<PreparedContract, VmError> {
        if code.is_empty() {
            return Err(VmError::InvalidWasm("contract code is empty".into()));
        }
        if code.len() < WASM_MAGIC.len() || code[..WASM_MAGIC.len()] != WASM_MAGIC {
            return Err(VmError::InvalidWasm("missing WASM magic bytes".into()));
        }
        if code.len() > self.config.max_code_size {
            return Err(VmError::CodeSizeExceeded {
                size: code.len(),
                limit: self.config.max_code_size,
            });
        }

        let module =
            Module::new(&self.engine, code).map_err(|e| VmError::CompilationError(e.to_string()))?;

        let mut memory_type = None;
        for import in module.imports() {
            match import.ty() {
                ExternType::Memory(ty) if import.module() == "env" && import.name() == "memory" => {
                    memory_type = Some(self.host_memory_type(&ty)?);
                }
                ExternType::Func(_) if is_host_function(import.module(), import.name()) => {}
                _ => {
                    return Err(VmError::UnknownHostFunction(format!(
                        "{}::{}",
                        import.module(),
                        import.name()
                    )));
                }
            }
        }
        let memory_type = memory_type
            .ok_or_else(|| VmError::InvalidWasm("contract must import env.memory".into()))?;

        for entry in [EntryPoint::Call, EntryPoint::Deploy] {
            match module.get_export(entry.export_name()) {
                Some(ExternType::Func(ty)) if ty.params().len() == 0 && ty.results().len() == 0 => {}
                Some(_) => {
                    return Err(VmError::InvalidWasm(format!(
                        "export `{}` must be a function without parameters or results",
                        entry.export_name()
                    )));
                }
                None => return Err(VmError::FunctionNotFound(entry.export_name().into())),
            }
        }

        let code_hash = Hash::of_code(code);
        tracing::debug!(
            %code_hash,
            size = code.len(),
            min_pages = memory_type.minimum(),
            max_pages = ?memory_type.maximum(),
            "prepared contract"
        );

        Ok(PreparedContract {
            module,
            code_hash,
            memory_type,
        })
    }

    /// The memory to hand a guest that imports `requested`.
    fn host_memory_type(&self, requested: &MemoryType) -> Result<MemoryType, VmError> {
        if requested.is_64() || requested.is_shared() {
            return Err(VmError::InvalidWasm("env.memory must be a 32-bit unshared memory".into()));
        }
        let limit = u64::from(self.config.max_memory_pages);
        let maximum = requested.maximum().unwrap_or(limit);
        if maximum > limit {
            return Err(VmError::MemoryLimitExceeded {
                pages: maximum,
                limit,
            });
        }
        if requested.minimum() > maximum {
            return Err(VmError::MemoryLimitExceeded {
                pages: requested.minimum(),
                limit: maximum,
            });
        }
        // Both fit in u32: `maximum` is bounded by `max_memory_pages`.
        let minimum = u32::try_from(requested.minimum())
            .map_err(|_| VmError::InvalidWasm("env.memory minimum out of range".into()))?;
        let maximum = u32::try_from(maximum)
            .map_err(|_| VmError::InvalidWasm("env.memory maximum out of range".into()))?;
        Ok(MemoryType::new(minimum, Some(maximum)))
    }

    /// Run `entry` of `contract` against `ctx`.
    ///
    /// Guest failures are reported in the outcome; `VmError` means the
    /// invocation could not be set up.
    pub fn execute(
        &self,
        contract: &PreparedContract,
        ctx: ExecutionContext,
        entry: EntryPoint,
    ) -> Result<ExecutionOutcome, VmError> {
        let mut store = Store::new(&self.engine, ctx);
        if let Some(fuel) = self.config.fuel {
            store.set_fuel(fuel).map_err(|e| VmError::InvalidConfig(e.to_string()))?;
        }
        if self.config.epoch_interruption {
            store.set_epoch_deadline(1);
        }

        let memory = Memory::new(&mut store, contract.memory_type.clone())
            .map_err(|e| VmError::LinkerError(format!("env.memory: {e}")))?;
        let mut linker = Linker::new(&self.engine);
        linker
            .define(&store, "env", "memory", memory)
            .map_err(|e| VmError::LinkerError(e.to_string()))?;
        define_host_functions(&mut linker, memory)?;
        store.data_mut().set_phase(Phase::Bound);

        // A start function runs guest code during instantiation, so its
        // failures go through the same classification as the entry point's.
        store.data_mut().set_phase(Phase::Running);
        let completed = match linker.instantiate(&mut store, &contract.module) {
            Ok(instance) => {
                let func = instance
                    .get_typed_func::<(), ()>(&mut store, entry.export_name())
                    .map_err(|_| VmError::FunctionNotFound(entry.export_name().into()))?;
                func.call(&mut store, ())
            }
            Err(err) => Err(err),
        };

        let result = match completed {
            Ok(()) => Ok(ExecReturnValue::default()),
            Err(err) => match err.downcast::<TrapReason>() {
                Ok(TrapReason::Return(value)) => Ok(value),
                Ok(TrapReason::Termination) => Ok(ExecReturnValue::default()),
                Ok(TrapReason::Halt(err)) => Err(err),
                Err(err) => {
                    let reason = match err.downcast_ref::<Trap>() {
                        Some(Trap::OutOfFuel) => HostError::OutOfGas,
                        Some(Trap::Interrupt) => HostError::Cancelled,
                        _ => HostError::ContractTrapped(err.to_string()),
                    };
                    store.data_mut().record_trap(format!("engine trap: {reason}"));
                    Err(reason)
                }
            },
        };

        let mut ctx = store.into_data();
        match &result {
            Ok(value) => {
                ctx.set_phase(Phase::Returned);
                tracing::debug!(
                    contract = %ctx.contract_address(),
                    entry = entry.export_name(),
                    reverted = value.did_revert(),
                    output_len = value.data.len(),
                    gas_consumed = %ctx.gas_meter().gas_consumed(),
                    "execution returned"
                );
            }
            Err(err) => {
                ctx.set_phase(Phase::Trapped);
                tracing::debug!(
                    contract = %ctx.contract_address(),
                    entry = entry.export_name(),
                    error = %err,
                    gas_consumed = %ctx.gas_meter().gas_consumed(),
                    "execution trapped"
                );
            }
        }

        Ok(ExecutionOutcome {
            result,
            context: ctx,
        })
    }

    /// Run the `call` entry point.
    pub fn call(&self, contract: &PreparedContract, ctx: ExecutionContext) -> Result<ExecutionOutcome, VmError> {
        self.execute(contract, ctx, EntryPoint::Call)
    }

    /// Run the `deploy` entry point.
    pub fn deploy(&self, contract: &PreparedContract, ctx: ExecutionContext) -> Result<ExecutionOutcome, VmError> {
        self.execute(contract, ctx, EntryPoint::Deploy)
    }
}

impl std::fmt::Debug for WasmRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmRuntime")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::NoChain;
    use crate::storage::InMemoryStore;

    const MINIMAL: &str = r#"
        (module
            (import "env" "memory" (memory 1 1))
            (func (export "call"))
            (func (export "deploy")))
    "#;

    fn runtime() -> WasmRuntime {
        WasmRuntime::new(WasmRuntimeConfig::default()).unwrap()
    }

    fn context(runtime: &WasmRuntime) -> ExecutionContext {
        runtime.context(
            Address::from_bytes([1; 32]),
            Address::from_bytes([2; 32]),
            Weight::from_parts(1_000_000_000, 1_000_000),
            Arc::new(InMemoryStore::new()),
            Arc::new(NoChain),
        )
    }

    #[test]
    fn test_wasm_runtime_creation() {
        assert!(WasmRuntime::new(WasmRuntimeConfig::default()).is_ok());

        let config = WasmRuntimeConfig {
            max_memory_pages: 0,
            ..WasmRuntimeConfig::default()
        };
        assert!(matches!(WasmRuntime::new(config), Err(VmError::InvalidConfig(_))));
    }

    #[test]
    fn test_prepare_empty_code() {
        assert!(matches!(runtime().prepare(&[]), Err(VmError::InvalidWasm(_))));
    }

    #[test]
    fn test_prepare_invalid_magic() {
        assert!(matches!(runtime().prepare(&[1, 2, 3, 4]), Err(VmError::InvalidWasm(_))));
    }

    #[test]
    fn test_prepare_code_size_limit() {
        let runtime = WasmRuntime::new(WasmRuntimeConfig {
            max_code_size: 8,
            ..WasmRuntimeConfig::default()
        })
        .unwrap();
        let code = wat::parse_str(MINIMAL).unwrap();
        assert!(matches!(
            runtime.prepare(&code),
            Err(VmError::CodeSizeExceeded { limit: 8, .. })
        ));
    }

    #[test]
    fn test_prepare_requires_memory_import() {
        let code = wat::parse_str(r#"(module (func (export "call")) (func (export "deploy")))"#).unwrap();
        assert!(matches!(runtime().prepare(&code), Err(VmError::InvalidWasm(_))));
    }

    #[test]
    fn test_prepare_memory_limit() {
        let code = wat::parse_str(
            r#"(module
                (import "env" "memory" (memory 1 1000))
                (func (export "call"))
                (func (export "deploy")))"#,
        )
        .unwrap();
        assert!(matches!(
            runtime().prepare(&code),
            Err(VmError::MemoryLimitExceeded { pages: 1000, limit: 256 })
        ));
    }

    #[test]
    fn test_prepare_unbounded_memory_is_capped() {
        let code = wat::parse_str(
            r#"(module
                (import "env" "memory" (memory 1))
                (func (export "call"))
                (func (export "deploy")))"#,
        )
        .unwrap();
        let prepared = runtime().prepare(&code).unwrap();
        assert_eq!(prepared.memory_type().maximum(), Some(256));
    }

    #[test]
    fn test_prepare_requires_entry_points() {
        let code = wat::parse_str(
            r#"(module
                (import "env" "memory" (memory 1 1))
                (func (export "call")))"#,
        )
        .unwrap();
        assert_eq!(
            runtime().prepare(&code).unwrap_err(),
            VmError::FunctionNotFound("deploy".into())
        );
    }

    #[test]
    fn test_prepare_sets_code_hash() {
        let code = wat::parse_str(MINIMAL).unwrap();
        let prepared = runtime().prepare(&code).unwrap();
        assert_eq!(prepared.code_hash(), &Hash::of_code(&code));
    }

    #[test]
    fn test_execute_empty_entry_point() {
        let runtime = runtime();
        let prepared = runtime.prepare(&wat::parse_str(MINIMAL).unwrap()).unwrap();

        for entry in [EntryPoint::Call, EntryPoint::Deploy] {
            let outcome = runtime.execute(&prepared, context(&runtime), entry).unwrap();
            assert!(outcome.is_success());
            assert!(outcome.result().as_ref().unwrap().data.is_empty());
            assert_eq!(outcome.context().phase(), Phase::Returned);
            assert!(outcome.changes().is_empty());
        }
    }

    #[test]
    fn test_engine_trap_is_classified() {
        let runtime = runtime();
        let code = wat::parse_str(
            r#"(module
                (import "env" "memory" (memory 1 1))
                (func (export "call") unreachable)
                (func (export "deploy")))"#,
        )
        .unwrap();
        let prepared = runtime.prepare(&code).unwrap();
        let outcome = runtime.call(&prepared, context(&runtime)).unwrap();

        assert!(outcome.is_trapped());
        assert!(matches!(outcome.result(), Err(HostError::ContractTrapped(_))));
        assert_eq!(outcome.context().phase(), Phase::Trapped);
        assert_eq!(outcome.debug_messages().len(), 1);
    }

    #[test]
    fn test_fuel_exhaustion_is_out_of_gas() {
        let runtime = WasmRuntime::new(WasmRuntimeConfig {
            fuel: Some(10_000),
            ..WasmRuntimeConfig::default()
        })
        .unwrap();
        let code = wat::parse_str(
            r#"(module
                (import "env" "memory" (memory 1 1))
                (func (export "call") (loop $l (br $l)))
                (func (export "deploy")))"#,
        )
        .unwrap();
        let prepared = runtime.prepare(&code).unwrap();
        let outcome = runtime.call(&prepared, context(&runtime)).unwrap();
        assert_eq!(outcome.result(), &Err(HostError::OutOfGas));
    }

    #[test]
    fn test_entry_point_names() {
        assert_eq!(EntryPoint::Call.export_name(), "call");
        assert_eq!(EntryPoint::Deploy.export_name(), "deploy");
    }
}
