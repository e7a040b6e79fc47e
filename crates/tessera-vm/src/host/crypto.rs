use tessera_crypto::ecdsa::{COMPRESSED_KEY_LEN, SIGNATURE_LEN};

use super::Runtime;
use crate::error::{HostError, TrapReason};
use crate::gas_metering::RuntimeCosts;
use crate::primitives::ReturnCode;

/// Hash guest memory and write exactly `N` bytes of digest back.
fn compute_hash<const N: usize>(
    rt: &mut Runtime<'_>,
    cost: fn(u32) -> RuntimeCosts,
    hash_fn: fn(&[u8]) -> [u8; N],
    input_ptr: u32,
    input_len: u32,
    output_ptr: u32,
) -> Result<(), TrapReason> {
    rt.charge_gas(cost(input_len))?;
    let input = rt.read_sandbox_memory(input_ptr, input_len)?;
    rt.write_sandbox_memory(output_ptr, &hash_fn(&input))?;
    Ok(())
}

pub fn hash_sha2_256(rt: &mut Runtime<'_>, input_ptr: u32, input_len: u32, output_ptr: u32) -> Result<(), TrapReason> {
    compute_hash(rt, RuntimeCosts::HashSha256, tessera_crypto::sha2_256, input_ptr, input_len, output_ptr)
}

pub fn hash_keccak_256(rt: &mut Runtime<'_>, input_ptr: u32, input_len: u32, output_ptr: u32) -> Result<(), TrapReason> {
    compute_hash(rt, RuntimeCosts::HashKeccak256, tessera_crypto::keccak_256, input_ptr, input_len, output_ptr)
}

pub fn hash_blake2_256(rt: &mut Runtime<'_>, input_ptr: u32, input_len: u32, output_ptr: u32) -> Result<(), TrapReason> {
    compute_hash(rt, RuntimeCosts::HashBlake256, tessera_crypto::blake2_256, input_ptr, input_len, output_ptr)
}

pub fn hash_blake2_128(rt: &mut Runtime<'_>, input_ptr: u32, input_len: u32, output_ptr: u32) -> Result<(), TrapReason> {
    compute_hash(rt, RuntimeCosts::HashBlake128, tessera_crypto::blake2_128, input_ptr, input_len, output_ptr)
}

/// Recover the compressed secp256k1 key from a 65-byte signature over a 32-byte hash.
pub fn ecdsa_recover(
    rt: &mut Runtime<'_>,
    signature_ptr: u32,
    message_hash_ptr: u32,
    output_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    rt.charge_gas(RuntimeCosts::EcdsaRecovery)?;
    let signature: [u8; SIGNATURE_LEN] = rt.read_sandbox_memory_as(signature_ptr)?;
    let message_hash: [u8; 32] = rt.read_sandbox_memory_as(message_hash_ptr)?;

    match tessera_crypto::ecdsa_recover(&signature, &message_hash) {
        Ok(public_key) => {
            rt.write_sandbox_memory(output_ptr, &public_key)?;
            Ok(ReturnCode::Success)
        }
        Err(_) => Ok(ReturnCode::EcdsaRecoverFailed),
    }
}

/// Derive the 20-byte Ethereum address of a compressed secp256k1 key.
pub fn ecdsa_to_eth_address(rt: &mut Runtime<'_>, key_ptr: u32, out_ptr: u32) -> Result<ReturnCode, TrapReason> {
    rt.charge_gas(RuntimeCosts::EcdsaToEthAddress)?;
    let compressed: [u8; COMPRESSED_KEY_LEN] = rt.read_sandbox_memory_as(key_ptr)?;
    match tessera_crypto::ecdsa_to_eth_address(&compressed) {
        Ok(address) => {
            rt.write_sandbox_memory(out_ptr, &address)?;
            Ok(ReturnCode::Success)
        }
        Err(_) => Ok(ReturnCode::EcdsaRecoverFailed),
    }
}

/// sr25519 is not available on this host: the arguments are metered and
/// validated, then the guest traps.
pub fn sr25519_verify(
    rt: &mut Runtime<'_>,
    signature_ptr: u32,
    pub_key_ptr: u32,
    message_len: u32,
    message_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    rt.charge_gas(RuntimeCosts::Sr25519Verify(message_len))?;
    let _signature: [u8; 64] = rt.read_sandbox_memory_as(signature_ptr)?;
    let _pub_key: [u8; 32] = rt.read_sandbox_memory_as(pub_key_ptr)?;
    let _message = rt.read_sandbox_memory(message_ptr, message_len)?;
    Err(HostError::Unsupported("sr25519_verify").into())
}
