use super::{already_charged, Runtime};
use crate::error::{HostError, TrapReason};
use crate::gas_metering::RuntimeCosts;
use crate::primitives::ReturnCode;
use crate::storage::{KeyType, WriteOutcome};

fn decode_key(rt: &Runtime<'_>, key_type: KeyType, key_ptr: u32) -> Result<Vec<u8>, HostError> {
    if let KeyType::Variable(len) = key_type {
        if len > rt.context().limits().max_storage_key_len {
            return Err(HostError::DecodingFailed);
        }
    }
    rt.read_sandbox_memory(key_ptr, key_type.len())
}

/// Returns the prior value's length, [`SENTINEL`](crate::primitives::SENTINEL) if there was none.
fn set_storage(
    rt: &mut Runtime<'_>,
    key_type: KeyType,
    key_ptr: u32,
    value_ptr: u32,
    value_len: u32,
) -> Result<u32, TrapReason> {
    let max_size = rt.context().limits().max_value_size;
    let charged = rt.charge_gas(RuntimeCosts::SetStorage {
        new_bytes: value_len,
        old_bytes: max_size,
    })?;
    if value_len > max_size {
        return Err(HostError::ValueTooLarge.into());
    }
    let key = decode_key(rt, key_type, key_ptr)?;
    let value = rt.read_sandbox_memory(value_ptr, value_len)?;
    let outcome = rt.context_mut().overlay_mut().set_storage(&key, Some(value), false);
    rt.adjust_gas(
        charged,
        RuntimeCosts::SetStorage {
            new_bytes: value_len,
            old_bytes: outcome.old_len(),
        },
    );
    Ok(outcome.old_len_with_sentinel())
}

fn clear_storage(rt: &mut Runtime<'_>, key_type: KeyType, key_ptr: u32) -> Result<u32, TrapReason> {
    let max_size = rt.context().limits().max_value_size;
    let charged = rt.charge_gas(RuntimeCosts::ClearStorage(max_size))?;
    let key = decode_key(rt, key_type, key_ptr)?;
    let outcome = rt.context_mut().overlay_mut().clear_storage(&key);
    rt.adjust_gas(charged, RuntimeCosts::ClearStorage(outcome.old_len()));
    Ok(outcome.old_len_with_sentinel())
}

fn get_storage(
    rt: &mut Runtime<'_>,
    key_type: KeyType,
    key_ptr: u32,
    out_ptr: u32,
    out_len_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    let max_size = rt.context().limits().max_value_size;
    let charged = rt.charge_gas(RuntimeCosts::GetStorage(max_size))?;
    let key = decode_key(rt, key_type, key_ptr)?;
    match rt.context_mut().overlay_mut().get_storage(&key)? {
        Some(value) => {
            rt.adjust_gas(charged, RuntimeCosts::GetStorage(value.len() as u32));
            rt.write_sandbox_output(out_ptr, out_len_ptr, &value, false, already_charged)?;
            Ok(ReturnCode::Success)
        }
        None => {
            rt.adjust_gas(charged, RuntimeCosts::GetStorage(0));
            Ok(ReturnCode::KeyNotFound)
        }
    }
}

fn contains_storage(rt: &mut Runtime<'_>, key_type: KeyType, key_ptr: u32) -> Result<u32, TrapReason> {
    let max_size = rt.context().limits().max_value_size;
    let charged = rt.charge_gas(RuntimeCosts::ContainsStorage(max_size))?;
    let key = decode_key(rt, key_type, key_ptr)?;
    let len = rt.context_mut().overlay_mut().contains_storage(&key)?;
    let actual = if len == crate::primitives::SENTINEL { 0 } else { len };
    rt.adjust_gas(charged, RuntimeCosts::ContainsStorage(actual));
    Ok(len)
}

pub fn set_storage_v0(rt: &mut Runtime<'_>, key_ptr: u32, value_ptr: u32, value_len: u32) -> Result<(), TrapReason> {
    set_storage(rt, KeyType::Fixed, key_ptr, value_ptr, value_len).map(|_| ())
}

pub fn set_storage_v1(rt: &mut Runtime<'_>, key_ptr: u32, value_ptr: u32, value_len: u32) -> Result<u32, TrapReason> {
    set_storage(rt, KeyType::Fixed, key_ptr, value_ptr, value_len)
}

pub fn set_storage_v2(
    rt: &mut Runtime<'_>,
    key_ptr: u32,
    key_len: u32,
    value_ptr: u32,
    value_len: u32,
) -> Result<u32, TrapReason> {
    set_storage(rt, KeyType::Variable(key_len), key_ptr, value_ptr, value_len)
}

pub fn clear_storage_v0(rt: &mut Runtime<'_>, key_ptr: u32) -> Result<(), TrapReason> {
    clear_storage(rt, KeyType::Fixed, key_ptr).map(|_| ())
}

pub fn clear_storage_v1(rt: &mut Runtime<'_>, key_ptr: u32, key_len: u32) -> Result<u32, TrapReason> {
    clear_storage(rt, KeyType::Variable(key_len), key_ptr)
}

pub fn get_storage_v0(rt: &mut Runtime<'_>, key_ptr: u32, out_ptr: u32, out_len_ptr: u32) -> Result<ReturnCode, TrapReason> {
    get_storage(rt, KeyType::Fixed, key_ptr, out_ptr, out_len_ptr)
}

pub fn get_storage_v1(
    rt: &mut Runtime<'_>,
    key_ptr: u32,
    key_len: u32,
    out_ptr: u32,
    out_len_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    get_storage(rt, KeyType::Variable(key_len), key_ptr, out_ptr, out_len_ptr)
}

pub fn contains_storage_v0(rt: &mut Runtime<'_>, key_ptr: u32) -> Result<u32, TrapReason> {
    contains_storage(rt, KeyType::Fixed, key_ptr)
}

pub fn contains_storage_v1(rt: &mut Runtime<'_>, key_ptr: u32, key_len: u32) -> Result<u32, TrapReason> {
    contains_storage(rt, KeyType::Variable(key_len), key_ptr)
}

/// Remove a value and hand it to the guest.
pub fn take_storage(
    rt: &mut Runtime<'_>,
    key_ptr: u32,
    key_len: u32,
    out_ptr: u32,
    out_len_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    let max_size = rt.context().limits().max_value_size;
    let charged = rt.charge_gas(RuntimeCosts::TakeStorage(max_size))?;
    let key = decode_key(rt, KeyType::Variable(key_len), key_ptr)?;
    match rt.context_mut().overlay_mut().take_storage(&key)? {
        WriteOutcome::Taken(value) => {
            rt.adjust_gas(charged, RuntimeCosts::TakeStorage(value.len() as u32));
            rt.write_sandbox_output(out_ptr, out_len_ptr, &value, false, already_charged)?;
            Ok(ReturnCode::Success)
        }
        _ => {
            rt.adjust_gas(charged, RuntimeCosts::TakeStorage(0));
            Ok(ReturnCode::KeyNotFound)
        }
    }
}
