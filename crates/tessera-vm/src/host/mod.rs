//! Host functions exposed to contracts.
//!
//! Every import is registered by `(module, name)`. Older ABI revisions are thin
//! adapters over one canonical handler per operation, so a fix lands in all
//! revisions at once.

mod call;
mod crypto;
mod env;
mod storage;

use tessera_types::{Address, Balance, Hash};
use wasmtime::{Caller, Linker, Memory};

use crate::context::ExecutionContext;
use crate::error::{HostError, TrapReason, VmError};
use crate::gas_metering::{ChargedAmount, RuntimeCosts};
use crate::memory::SandboxMemory;

/// A host function's view of one invocation: its context and the guest memory.
pub struct Runtime<'a> {
    ctx: &'a mut ExecutionContext,
    memory: &'a mut [u8],
}

impl<'a> Runtime<'a> {
    pub fn new(ctx: &'a mut ExecutionContext, memory: &'a mut [u8]) -> Self {
        Self { ctx, memory }
    }

    pub fn context(&self) -> &ExecutionContext {
        self.ctx
    }

    pub fn context_mut(&mut self) -> &mut ExecutionContext {
        self.ctx
    }

    pub fn charge_gas(&mut self, cost: RuntimeCosts) -> Result<ChargedAmount, HostError> {
        self.ctx.gas_meter_mut().charge(cost)
    }

    pub fn adjust_gas(&mut self, charged: ChargedAmount, actual: RuntimeCosts) {
        self.ctx.gas_meter_mut().adjust(charged, actual)
    }

    pub fn read_sandbox_memory(&self, ptr: u32, len: u32) -> Result<Vec<u8>, HostError> {
        self.memory.read(ptr, len)
    }

    pub fn read_sandbox_memory_as<const N: usize>(&self, ptr: u32) -> Result<[u8; N], HostError> {
        self.memory.read_array(ptr)
    }

    pub fn read_address(&self, ptr: u32) -> Result<Address, HostError> {
        self.read_sandbox_memory_as(ptr).map(Address::from_bytes)
    }

    pub fn read_hash(&self, ptr: u32) -> Result<Hash, HostError> {
        self.read_sandbox_memory_as(ptr).map(Hash::from_bytes)
    }

    pub fn read_balance(&self, ptr: u32) -> Result<Balance, HostError> {
        self.read_sandbox_memory_as(ptr).map(Balance::from_le_bytes)
    }

    pub fn write_sandbox_memory(&mut self, ptr: u32, buf: &[u8]) -> Result<(), HostError> {
        self.memory.write(ptr, buf)
    }

    /// Write `buf` to a guest output buffer, charging `create_token(len)` first.
    ///
    /// Nothing is charged when the write is skipped.
    pub fn write_sandbox_output(
        &mut self,
        out_ptr: u32,
        out_len_ptr: u32,
        buf: &[u8],
        allow_skip: bool,
        create_token: impl FnOnce(u32) -> Option<RuntimeCosts>,
    ) -> Result<(), HostError> {
        if allow_skip && out_ptr == crate::primitives::SENTINEL {
            return Ok(());
        }
        let len = u32::try_from(buf.len()).map_err(|_| HostError::OutputBufferTooSmall)?;
        if let Some(cost) = create_token(len) {
            self.charge_gas(cost)?;
        }
        self.memory.write_output(out_ptr, out_len_ptr, buf, allow_skip)
    }

    /// Run a handler, recording why it trapped if it did.
    fn invoke<R>(
        mut self,
        name: &'static str,
        handler: impl FnOnce(&mut Self) -> Result<R, TrapReason>,
    ) -> wasmtime::Result<R> {
        match handler(&mut self) {
            Ok(value) => Ok(value),
            Err(TrapReason::Halt(err)) => {
                tracing::debug!(
                    host_fn = name,
                    contract = %self.ctx.contract_address(),
                    error = %err,
                    "host function trapped"
                );
                self.ctx.record_trap(format!("{name}: {err}"));
                Err(wasmtime::Error::new(TrapReason::Halt(err)))
            }
            Err(reason) => Err(wasmtime::Error::new(reason)),
        }
    }
}

/// Output already paid for by the handler's own charge.
fn already_charged(_: u32) -> Option<RuntimeCosts> {
    None
}

macro_rules! host_functions {
    ($($module:literal $name:literal => $handler:path [$($arg:ident: $ty:ty),*] -> $ret:ty;)*) => {
        /// Every `(module, name)` function import the host provides.
        pub const HOST_FUNCTIONS: &[(&str, &str)] = &[$(($module, $name)),*];

        /// Bind every host function into `linker`, operating on `memory`.
        pub(crate) fn define_host_functions(
            linker: &mut Linker<ExecutionContext>,
            memory: Memory,
        ) -> Result<(), VmError> {
            $(
                linker
                    .func_wrap(
                        $module,
                        $name,
                        move |mut caller: Caller<'_, ExecutionContext>, $($arg: $ty),*| -> wasmtime::Result<$ret> {
                            let (data, ctx) = memory.data_and_store_mut(&mut caller);
                            Runtime::new(ctx, data)
                                .invoke(concat!($module, "::", $name), |rt| $handler(rt, $($arg),*))
                                .map(Into::into)
                        },
                    )
                    .map_err(|e| VmError::LinkerError(e.to_string()))?;
            )*
            Ok(())
        }
    };
}

host_functions! {
    // Storage
    "seal0" "set_storage" => storage::set_storage_v0 [key_ptr: u32, value_ptr: u32, value_len: u32] -> ();
    "seal1" "set_storage" => storage::set_storage_v1 [key_ptr: u32, value_ptr: u32, value_len: u32] -> u32;
    "seal2" "set_storage" => storage::set_storage_v2 [key_ptr: u32, key_len: u32, value_ptr: u32, value_len: u32] -> u32;
    "seal0" "clear_storage" => storage::clear_storage_v0 [key_ptr: u32] -> ();
    "seal1" "clear_storage" => storage::clear_storage_v1 [key_ptr: u32, key_len: u32] -> u32;
    "seal0" "get_storage" => storage::get_storage_v0 [key_ptr: u32, out_ptr: u32, out_len_ptr: u32] -> u32;
    "seal1" "get_storage" => storage::get_storage_v1 [key_ptr: u32, key_len: u32, out_ptr: u32, out_len_ptr: u32] -> u32;
    "seal0" "contains_storage" => storage::contains_storage_v0 [key_ptr: u32] -> u32;
    "seal1" "contains_storage" => storage::contains_storage_v1 [key_ptr: u32, key_len: u32] -> u32;
    "seal0" "take_storage" => storage::take_storage [key_ptr: u32, key_len: u32, out_ptr: u32, out_len_ptr: u32] -> u32;

    // Value transfer and nested execution
    "seal0" "transfer" => call::transfer [account_ptr: u32, account_len: u32, value_ptr: u32, value_len: u32] -> u32;
    "seal0" "call" => call::call_v0 [
        callee_ptr: u32, callee_len: u32, gas: u64, value_ptr: u32, value_len: u32,
        input_data_ptr: u32, input_data_len: u32, output_ptr: u32, output_len_ptr: u32
    ] -> u32;
    "seal1" "call" => call::call_v1 [
        flags: u32, callee_ptr: u32, gas: u64, value_ptr: u32,
        input_data_ptr: u32, input_data_len: u32, output_ptr: u32, output_len_ptr: u32
    ] -> u32;
    "seal2" "call" => call::call_v2 [
        flags: u32, callee_ptr: u32, ref_time_limit: u64, proof_size_limit: u64, deposit_ptr: u32,
        value_ptr: u32, input_data_ptr: u32, input_data_len: u32, output_ptr: u32, output_len_ptr: u32
    ] -> u32;
    "seal0" "delegate_call" => call::delegate_call [
        flags: u32, code_hash_ptr: u32, input_data_ptr: u32, input_data_len: u32,
        output_ptr: u32, output_len_ptr: u32
    ] -> u32;
    "seal0" "instantiate" => call::instantiate_v0 [
        code_hash_ptr: u32, code_hash_len: u32, gas: u64, value_ptr: u32, value_len: u32,
        input_data_ptr: u32, input_data_len: u32, address_ptr: u32, address_len_ptr: u32,
        output_ptr: u32, output_len_ptr: u32, salt_ptr: u32, salt_len: u32
    ] -> u32;
    "seal1" "instantiate" => call::instantiate_v1 [
        code_hash_ptr: u32, gas: u64, value_ptr: u32, input_data_ptr: u32, input_data_len: u32,
        address_ptr: u32, address_len_ptr: u32, output_ptr: u32, output_len_ptr: u32,
        salt_ptr: u32, salt_len: u32
    ] -> u32;
    "seal2" "instantiate" => call::instantiate_v2 [
        code_hash_ptr: u32, ref_time_limit: u64, proof_size_limit: u64, deposit_ptr: u32,
        value_ptr: u32, input_data_ptr: u32, input_data_len: u32, address_ptr: u32,
        address_len_ptr: u32, output_ptr: u32, output_len_ptr: u32, salt_ptr: u32, salt_len: u32
    ] -> u32;
    "seal0" "terminate" => call::terminate_v0 [beneficiary_ptr: u32, beneficiary_len: u32] -> ();
    "seal1" "terminate" => call::terminate_v1 [beneficiary_ptr: u32] -> ();
    "seal0" "set_code_hash" => call::set_code_hash [code_hash_ptr: u32] -> u32;
    "seal0" "call_runtime" => call::call_runtime [call_ptr: u32, call_len: u32] -> u32;
    "seal0" "call_chain_extension" => call::call_chain_extension [
        id: u32, input_ptr: u32, input_len: u32, output_ptr: u32, output_len_ptr: u32
    ] -> u32;
    "seal0" "add_delegate_dependency" => call::add_delegate_dependency [code_hash_ptr: u32] -> ();
    "seal0" "remove_delegate_dependency" => call::remove_delegate_dependency [code_hash_ptr: u32] -> ();

    // Input and output
    "seal0" "input" => env::input [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "seal_return" => env::seal_return [flags: u32, data_ptr: u32, data_len: u32] -> ();

    // Introspection
    "seal0" "caller" => env::caller [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "is_contract" => env::is_contract [account_ptr: u32] -> u32;
    "seal0" "code_hash" => env::code_hash [account_ptr: u32, out_ptr: u32, out_len_ptr: u32] -> u32;
    "seal0" "own_code_hash" => env::own_code_hash [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "caller_is_origin" => env::caller_is_origin [] -> u32;
    "seal0" "caller_is_root" => env::caller_is_root [] -> u32;
    "seal0" "address" => env::address [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "weight_to_fee" => env::weight_to_fee_v0 [gas: u64, out_ptr: u32, out_len_ptr: u32] -> ();
    "seal1" "weight_to_fee" => env::weight_to_fee_v1 [ref_time_limit: u64, proof_size_limit: u64, out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "gas_left" => env::gas_left_v0 [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal1" "gas_left" => env::gas_left_v1 [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "balance" => env::balance [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "value_transferred" => env::value_transferred [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "random" => env::random_v0 [subject_ptr: u32, subject_len: u32, out_ptr: u32, out_len_ptr: u32] -> ();
    "seal1" "random" => env::random_v1 [subject_ptr: u32, subject_len: u32, out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "now" => env::now [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "minimum_balance" => env::minimum_balance [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "block_number" => env::block_number [out_ptr: u32, out_len_ptr: u32] -> ();
    "seal0" "reentrance_count" => env::reentrance_count [] -> u32;
    "seal0" "account_reentrance_count" => env::account_reentrance_count [account_ptr: u32] -> u32;
    "seal0" "instantiation_nonce" => env::instantiation_nonce [] -> u64;

    // Events and debugging
    "seal0" "deposit_event" => env::deposit_event [topics_ptr: u32, topics_len: u32, data_ptr: u32, data_len: u32] -> ();
    "seal0" "debug_message" => env::debug_message [str_ptr: u32, str_len: u32] -> u32;

    // Crypto
    "seal0" "hash_sha2_256" => crypto::hash_sha2_256 [input_ptr: u32, input_len: u32, output_ptr: u32] -> ();
    "seal0" "hash_keccak_256" => crypto::hash_keccak_256 [input_ptr: u32, input_len: u32, output_ptr: u32] -> ();
    "seal0" "hash_blake2_256" => crypto::hash_blake2_256 [input_ptr: u32, input_len: u32, output_ptr: u32] -> ();
    "seal0" "hash_blake2_128" => crypto::hash_blake2_128 [input_ptr: u32, input_len: u32, output_ptr: u32] -> ();
    "seal0" "ecdsa_recover" => crypto::ecdsa_recover [signature_ptr: u32, message_hash_ptr: u32, output_ptr: u32] -> u32;
    "seal0" "ecdsa_to_eth_address" => crypto::ecdsa_to_eth_address [key_ptr: u32, out_ptr: u32] -> u32;
    "seal0" "sr25519_verify" => crypto::sr25519_verify [signature_ptr: u32, pub_key_ptr: u32, message_len: u32, message_ptr: u32] -> u32;
}

/// Whether `(module, name)` is a function the host provides.
pub fn is_host_function(module: &str, name: &str) -> bool {
    HOST_FUNCTIONS.iter().any(|(m, n)| *m == module && *n == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_host_function_table_has_no_duplicates() {
        let unique: HashSet<_> = HOST_FUNCTIONS.iter().collect();
        assert_eq!(unique.len(), HOST_FUNCTIONS.len());
    }

    #[test]
    fn test_every_revision_is_registered() {
        for name in ["set_storage"] {
            for module in ["seal0", "seal1", "seal2"] {
                assert!(is_host_function(module, name), "{module}::{name}");
            }
        }
        for name in ["clear_storage", "get_storage", "contains_storage", "terminate", "random", "gas_left", "weight_to_fee"] {
            assert!(is_host_function("seal0", name), "seal0::{name}");
            assert!(is_host_function("seal1", name), "seal1::{name}");
        }
        for module in ["seal0", "seal1", "seal2"] {
            assert!(is_host_function(module, "call"));
            assert!(is_host_function(module, "instantiate"));
        }
        assert!(!is_host_function("seal3", "call"));
        assert!(!is_host_function("env", "memory"));
    }

    #[test]
    fn test_seal0_surface() {
        let seal0: HashSet<_> = HOST_FUNCTIONS
            .iter()
            .filter(|(m, _)| *m == "seal0")
            .map(|(_, n)| *n)
            .collect();
        assert_eq!(seal0.len(), 44);
    }
}
