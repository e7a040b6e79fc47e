use bytes::Bytes;
use tessera_types::{Hash, Weight};

use super::{already_charged, Runtime};
use crate::error::{HostError, TrapReason};
use crate::gas_metering::RuntimeCosts;
use crate::primitives::{ExecReturnValue, ReturnCode, ReturnFlags};

/// Copy the call input into the guest. Fails once the input was forwarded.
pub fn input(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    let input = rt.context().input().cloned().ok_or(HostError::InputForwarded)?;
    rt.write_sandbox_output(out_ptr, out_len_ptr, &input, false, |len| {
        Some(RuntimeCosts::CopyToContract(len))
    })?;
    Ok(())
}

/// Stop execution and return `data` to the caller. Never returns normally.
pub fn seal_return(rt: &mut Runtime<'_>, flags: u32, data_ptr: u32, data_len: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::CopyFromContract(data_len))?;
    let flags = ReturnFlags::from_bits(flags).ok_or(HostError::InvalidCallFlags)?;
    let data = rt.read_sandbox_memory(data_ptr, data_len)?;
    Err(TrapReason::Return(ExecReturnValue {
        flags,
        data: Bytes::from(data),
    }))
}

pub fn caller(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::Caller)?;
    let caller = *rt.context().caller();
    rt.write_sandbox_output(out_ptr, out_len_ptr, caller.as_bytes(), false, already_charged)?;
    Ok(())
}

pub fn is_contract(rt: &mut Runtime<'_>, account_ptr: u32) -> Result<u32, TrapReason> {
    rt.charge_gas(RuntimeCosts::IsContract)?;
    let account = rt.read_address(account_ptr)?;
    let is_contract = rt.context().chain().is_contract(&account)?;
    Ok(is_contract as u32)
}

pub fn code_hash(rt: &mut Runtime<'_>, account_ptr: u32, out_ptr: u32, out_len_ptr: u32) -> Result<ReturnCode, TrapReason> {
    rt.charge_gas(RuntimeCosts::CodeHash)?;
    let account = rt.read_address(account_ptr)?;
    match rt.context().chain().code_hash(&account)? {
        Some(hash) => {
            rt.write_sandbox_output(out_ptr, out_len_ptr, hash.as_bytes(), false, already_charged)?;
            Ok(ReturnCode::Success)
        }
        None => Ok(ReturnCode::KeyNotFound),
    }
}

pub fn own_code_hash(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::OwnCodeHash)?;
    let hash = *rt.context().code_hash();
    rt.write_sandbox_output(out_ptr, out_len_ptr, hash.as_bytes(), false, already_charged)?;
    Ok(())
}

pub fn caller_is_origin(rt: &mut Runtime<'_>) -> Result<u32, TrapReason> {
    rt.charge_gas(RuntimeCosts::CallerIsOrigin)?;
    Ok(rt.context().caller_is_origin() as u32)
}

pub fn caller_is_root(rt: &mut Runtime<'_>) -> Result<u32, TrapReason> {
    rt.charge_gas(RuntimeCosts::CallerIsRoot)?;
    Ok(rt.context().caller_is_root() as u32)
}

pub fn address(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::Address)?;
    let address = *rt.context().contract_address();
    rt.write_sandbox_output(out_ptr, out_len_ptr, address.as_bytes(), false, already_charged)?;
    Ok(())
}

fn weight_to_fee(rt: &mut Runtime<'_>, weight: Weight, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::WeightToFee)?;
    let fee = rt.context().chain().weight_to_fee(weight)?;
    rt.write_sandbox_output(out_ptr, out_len_ptr, &fee.to_le_bytes(), false, already_charged)?;
    Ok(())
}

pub fn weight_to_fee_v0(rt: &mut Runtime<'_>, gas: u64, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    weight_to_fee(rt, Weight::from_ref_time(gas), out_ptr, out_len_ptr)
}

pub fn weight_to_fee_v1(
    rt: &mut Runtime<'_>,
    ref_time_limit: u64,
    proof_size_limit: u64,
    out_ptr: u32,
    out_len_ptr: u32,
) -> Result<(), TrapReason> {
    weight_to_fee(rt, Weight::from_parts(ref_time_limit, proof_size_limit), out_ptr, out_len_ptr)
}

/// Remaining ref time as a little-endian u64.
pub fn gas_left_v0(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::GasLeft)?;
    let gas_left = rt.context().gas_meter().gas_left().ref_time();
    rt.write_sandbox_output(out_ptr, out_len_ptr, &gas_left.to_le_bytes(), false, already_charged)?;
    Ok(())
}

/// Remaining weight, both axes.
pub fn gas_left_v1(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::GasLeft)?;
    let gas_left = rt.context().gas_meter().gas_left();
    rt.write_sandbox_output(out_ptr, out_len_ptr, &gas_left.to_le_bytes(), false, already_charged)?;
    Ok(())
}

pub fn balance(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::Balance)?;
    let ctx = rt.context();
    let balance = ctx.chain().balance(ctx.contract_address())?;
    rt.write_sandbox_output(out_ptr, out_len_ptr, &balance.to_le_bytes(), false, already_charged)?;
    Ok(())
}

pub fn value_transferred(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::ValueTransferred)?;
    let value = rt.context().value_transferred();
    rt.write_sandbox_output(out_ptr, out_len_ptr, &value.to_le_bytes(), false, already_charged)?;
    Ok(())
}

fn random(rt: &mut Runtime<'_>, subject_ptr: u32, subject_len: u32) -> Result<(Hash, u64), TrapReason> {
    rt.charge_gas(RuntimeCosts::Random)?;
    if subject_len > rt.context().limits().max_subject_len {
        return Err(HostError::ValueTooLarge.into());
    }
    let subject = rt.read_sandbox_memory(subject_ptr, subject_len)?;
    Ok(rt.context().chain().random(&subject)?)
}

pub fn random_v0(
    rt: &mut Runtime<'_>,
    subject_ptr: u32,
    subject_len: u32,
    out_ptr: u32,
    out_len_ptr: u32,
) -> Result<(), TrapReason> {
    let (seed, _) = random(rt, subject_ptr, subject_len)?;
    rt.write_sandbox_output(out_ptr, out_len_ptr, seed.as_bytes(), false, already_charged)?;
    Ok(())
}

/// Seed followed by the block number it became known at.
pub fn random_v1(
    rt: &mut Runtime<'_>,
    subject_ptr: u32,
    subject_len: u32,
    out_ptr: u32,
    out_len_ptr: u32,
) -> Result<(), TrapReason> {
    let (seed, block) = random(rt, subject_ptr, subject_len)?;
    let mut out = [0u8; 40];
    out[..32].copy_from_slice(seed.as_bytes());
    out[32..].copy_from_slice(&block.to_le_bytes());
    rt.write_sandbox_output(out_ptr, out_len_ptr, &out, false, already_charged)?;
    Ok(())
}

pub fn now(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::Now)?;
    let now = rt.context().chain().now()?;
    rt.write_sandbox_output(out_ptr, out_len_ptr, &now.to_le_bytes(), false, already_charged)?;
    Ok(())
}

pub fn minimum_balance(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::MinimumBalance)?;
    let minimum = rt.context().chain().minimum_balance()?;
    rt.write_sandbox_output(out_ptr, out_len_ptr, &minimum.to_le_bytes(), false, already_charged)?;
    Ok(())
}

pub fn block_number(rt: &mut Runtime<'_>, out_ptr: u32, out_len_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::BlockNumber)?;
    let number = rt.context().chain().block_number()?;
    rt.write_sandbox_output(out_ptr, out_len_ptr, &number.to_le_bytes(), false, already_charged)?;
    Ok(())
}

pub fn reentrance_count(rt: &mut Runtime<'_>) -> Result<u32, TrapReason> {
    rt.charge_gas(RuntimeCosts::ReentranceCount)?;
    Ok(rt.context().reentrance_count())
}

pub fn account_reentrance_count(rt: &mut Runtime<'_>, account_ptr: u32) -> Result<u32, TrapReason> {
    rt.charge_gas(RuntimeCosts::AccountReentranceCount)?;
    let account = rt.read_address(account_ptr)?;
    Ok(rt.context().account_reentrance_count(&account))
}

pub fn instantiation_nonce(rt: &mut Runtime<'_>) -> Result<u64, TrapReason> {
    rt.charge_gas(RuntimeCosts::InstantiationNonce)?;
    Ok(rt.context().chain().nonce()?)
}

/// Emit an event. Topics are a packed array of 32-byte hashes.
pub fn deposit_event(
    rt: &mut Runtime<'_>,
    topics_ptr: u32,
    topics_len: u32,
    data_ptr: u32,
    data_len: u32,
) -> Result<(), TrapReason> {
    if topics_len % Hash::LEN as u32 != 0 {
        return Err(HostError::DecodingFailed.into());
    }
    let num_topic = topics_len / Hash::LEN as u32;
    rt.charge_gas(RuntimeCosts::DepositEvent { num_topic, len: data_len })?;

    let limits = *rt.context().limits();
    if data_len > limits.max_value_size {
        return Err(HostError::ValueTooLarge.into());
    }
    if num_topic > limits.max_event_topics {
        return Err(HostError::TooManyTopics.into());
    }

    let topics = rt
        .read_sandbox_memory(topics_ptr, topics_len)?
        .chunks_exact(Hash::LEN)
        .map(|chunk| {
            let mut topic = [0u8; 32];
            topic.copy_from_slice(chunk);
            Hash::from_bytes(topic)
        })
        .collect();
    let data = rt.read_sandbox_memory(data_ptr, data_len)?;
    rt.context_mut().deposit_event(topics, Bytes::from(data));
    Ok(())
}

/// Append a UTF-8 message to the debug buffer.
pub fn debug_message(rt: &mut Runtime<'_>, str_ptr: u32, str_len: u32) -> Result<ReturnCode, TrapReason> {
    let limits = *rt.context().limits();
    rt.charge_gas(RuntimeCosts::DebugMessage(str_len.min(limits.max_debug_buffer_len)))?;
    if !limits.debug_buffer_enabled {
        return Ok(ReturnCode::LoggingDisabled);
    }
    // Never decoded, so a cut cannot split a character.
    if str_len > limits.max_debug_buffer_len {
        tracing::debug!(contract = %rt.context().contract_address(), len = str_len, "debug message too long, dropped");
        return Ok(ReturnCode::Success);
    }
    let data = rt.read_sandbox_memory(str_ptr, str_len)?;
    let message = String::from_utf8(data).map_err(|_| HostError::DebugMessageInvalidUtf8)?;
    tracing::trace!(contract = %rt.context().contract_address(), %message, "debug message");
    rt.context_mut().append_debug_message(message);
    Ok(ReturnCode::Success)
}
