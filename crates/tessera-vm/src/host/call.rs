use bytes::Bytes;
use tessera_types::{Balance, Weight};

use super::{already_charged, Runtime};
use crate::chain::{CallOutcome, CallRequest, ChainError, DelegateCallRequest, InstantiateRequest};
use crate::error::{HostError, TrapReason};
use crate::gas_metering::RuntimeCosts;
use crate::primitives::{CallFlags, ExecReturnValue, ReturnCode, SENTINEL};

enum CallType {
    Call {
        callee_ptr: u32,
        value_ptr: u32,
        deposit_ptr: u32,
        weight: Weight,
    },
    DelegateCall {
        code_hash_ptr: u32,
    },
}

impl CallType {
    fn cost(&self) -> RuntimeCosts {
        match self {
            CallType::Call { .. } => RuntimeCosts::CallBase,
            CallType::DelegateCall { .. } => RuntimeCosts::DelegateCallBase,
        }
    }
}

fn decode_flags(flags: u32) -> Result<CallFlags, HostError> {
    CallFlags::from_bits(flags).ok_or(HostError::InvalidCallFlags)
}

fn read_deposit_limit(rt: &Runtime<'_>, deposit_ptr: u32) -> Result<Option<Balance>, HostError> {
    if deposit_ptr == SENTINEL {
        Ok(None)
    } else {
        rt.read_balance(deposit_ptr).map(Some)
    }
}

fn exec_into_return_code(result: Result<ExecReturnValue, ChainError>) -> Result<ReturnCode, HostError> {
    match result {
        Ok(value) => Ok(ReturnCode::from(&value)),
        Err(err) => err.into_return_code(),
    }
}

/// Charge what a nested execution consumed, capped at the budget it was given.
fn charge_nested(rt: &mut Runtime<'_>, consumed: Weight, budget: Weight) -> Result<(), HostError> {
    rt.context_mut().gas_meter_mut().charge_weight(consumed.min(budget))
}

fn call(
    rt: &mut Runtime<'_>,
    flags: CallFlags,
    call_type: CallType,
    input_data_ptr: u32,
    input_data_len: u32,
    output_ptr: u32,
    output_len_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    rt.charge_gas(call_type.cost())?;

    let input = if flags.contains(CallFlags::CLONE_INPUT) {
        let input = rt.context().input().cloned().ok_or(HostError::InputForwarded)?;
        rt.charge_gas(RuntimeCosts::CallInputCloned(input.len() as u32))?;
        input
    } else if flags.contains(CallFlags::FORWARD_INPUT) {
        rt.context_mut().take_input().ok_or(HostError::InputForwarded)?
    } else {
        rt.charge_gas(RuntimeCosts::CopyFromContract(input_data_len))?;
        Bytes::from(rt.read_sandbox_memory(input_data_ptr, input_data_len)?)
    };

    let (budget, outcome) = match call_type {
        CallType::Call {
            callee_ptr,
            value_ptr,
            deposit_ptr,
            weight,
        } => {
            let callee = rt.read_address(callee_ptr)?;
            let deposit_limit = read_deposit_limit(rt, deposit_ptr)?;
            let value = rt.read_balance(value_ptr)?;
            if value > 0 {
                rt.charge_gas(RuntimeCosts::CallTransferSurcharge)?;
            }

            let ctx = rt.context();
            let allow_reentry = flags.contains(CallFlags::ALLOW_REENTRY);
            let call_stack = ctx.call_stack().enter(
                ctx.frame(),
                Some(&callee),
                allow_reentry,
                ctx.limits().max_call_depth,
            )?;
            let gas_limit = ctx.gas_meter().nested_limit(weight);
            tracing::debug!(
                caller = %ctx.contract_address(),
                %callee,
                value = %value,
                depth = call_stack.depth(),
                "nested call"
            );
            let outcome = ctx.chain().call(CallRequest {
                caller: *ctx.contract_address(),
                callee,
                value,
                input,
                gas_limit,
                deposit_limit,
                allow_reentry,
                call_stack,
            });
            (gas_limit, outcome)
        }
        CallType::DelegateCall { code_hash_ptr } => {
            if flags.contains(CallFlags::ALLOW_REENTRY) {
                return Err(HostError::InvalidCallFlags.into());
            }
            let code_hash = rt.read_hash(code_hash_ptr)?;

            let ctx = rt.context();
            let call_stack = ctx.call_stack().enter(
                ctx.frame(),
                None,
                true,
                ctx.limits().max_call_depth,
            )?;
            let gas_limit = ctx.gas_meter().nested_limit(Weight::ZERO);
            tracing::debug!(contract = %ctx.contract_address(), %code_hash, "delegate call");
            let outcome = ctx.chain().delegate_call(DelegateCallRequest {
                contract: *ctx.contract_address(),
                caller: *ctx.caller(),
                code_hash,
                value: ctx.value_transferred(),
                input,
                gas_limit,
                call_stack,
            });
            (gas_limit, outcome)
        }
    };

    let CallOutcome { gas_consumed, result } = outcome;
    charge_nested(rt, gas_consumed, budget)?;

    let result = match result {
        Ok(value) if flags.contains(CallFlags::TAIL_CALL) => return Err(TrapReason::Return(value)),
        other => other,
    };

    if let Ok(output) = &result {
        rt.write_sandbox_output(output_ptr, output_len_ptr, &output.data, true, |len| {
            Some(RuntimeCosts::CopyToContract(len))
        })?;
    }

    Ok(exec_into_return_code(result)?)
}

pub fn call_v0(
    rt: &mut Runtime<'_>,
    callee_ptr: u32,
    _callee_len: u32,
    gas: u64,
    value_ptr: u32,
    _value_len: u32,
    input_data_ptr: u32,
    input_data_len: u32,
    output_ptr: u32,
    output_len_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    call(
        rt,
        CallFlags::ALLOW_REENTRY,
        CallType::Call {
            callee_ptr,
            value_ptr,
            deposit_ptr: SENTINEL,
            weight: Weight::from_ref_time(gas),
        },
        input_data_ptr,
        input_data_len,
        output_ptr,
        output_len_ptr,
    )
}

pub fn call_v1(
    rt: &mut Runtime<'_>,
    flags: u32,
    callee_ptr: u32,
    gas: u64,
    value_ptr: u32,
    input_data_ptr: u32,
    input_data_len: u32,
    output_ptr: u32,
    output_len_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    call(
        rt,
        decode_flags(flags)?,
        CallType::Call {
            callee_ptr,
            value_ptr,
            deposit_ptr: SENTINEL,
            weight: Weight::from_ref_time(gas),
        },
        input_data_ptr,
        input_data_len,
        output_ptr,
        output_len_ptr,
    )
}

pub fn call_v2(
    rt: &mut Runtime<'_>,
    flags: u32,
    callee_ptr: u32,
    ref_time_limit: u64,
    proof_size_limit: u64,
    deposit_ptr: u32,
    value_ptr: u32,
    input_data_ptr: u32,
    input_data_len: u32,
    output_ptr: u32,
    output_len_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    call(
        rt,
        decode_flags(flags)?,
        CallType::Call {
            callee_ptr,
            value_ptr,
            deposit_ptr,
            weight: Weight::from_parts(ref_time_limit, proof_size_limit),
        },
        input_data_ptr,
        input_data_len,
        output_ptr,
        output_len_ptr,
    )
}

/// Run another contract's code against this contract's storage.
pub fn delegate_call(
    rt: &mut Runtime<'_>,
    flags: u32,
    code_hash_ptr: u32,
    input_data_ptr: u32,
    input_data_len: u32,
    output_ptr: u32,
    output_len_ptr: u32,
) -> Result<ReturnCode, TrapReason> {
    call(
        rt,
        decode_flags(flags)?,
        CallType::DelegateCall { code_hash_ptr },
        input_data_ptr,
        input_data_len,
        output_ptr,
        output_len_ptr,
    )
}

struct InstantiateArgs {
    code_hash_ptr: u32,
    weight: Weight,
    deposit_ptr: u32,
    value_ptr: u32,
    input_data_ptr: u32,
    input_data_len: u32,
    address_ptr: u32,
    address_len_ptr: u32,
    output_ptr: u32,
    output_len_ptr: u32,
    salt_ptr: u32,
    salt_len: u32,
}

fn instantiate(rt: &mut Runtime<'_>, args: InstantiateArgs) -> Result<ReturnCode, TrapReason> {
    rt.charge_gas(RuntimeCosts::Instantiate {
        input_data_len: args.input_data_len,
        salt_len: args.salt_len,
    })?;
    let deposit_limit = read_deposit_limit(rt, args.deposit_ptr)?;
    let value = rt.read_balance(args.value_ptr)?;
    let code_hash = rt.read_hash(args.code_hash_ptr)?;
    let input = Bytes::from(rt.read_sandbox_memory(args.input_data_ptr, args.input_data_len)?);
    let salt = rt.read_sandbox_memory(args.salt_ptr, args.salt_len)?;

    let ctx = rt.context();
    let call_stack = ctx.call_stack().enter(ctx.frame(), None, true, ctx.limits().max_call_depth)?;
    let gas_limit = ctx.gas_meter().nested_limit(args.weight);
    tracing::debug!(deployer = %ctx.contract_address(), %code_hash, value = %value, "instantiate");
    let outcome = ctx.chain().instantiate(InstantiateRequest {
        deployer: *ctx.contract_address(),
        code_hash,
        value,
        input,
        salt,
        gas_limit,
        deposit_limit,
        call_stack,
    });

    charge_nested(rt, outcome.gas_consumed, gas_limit)?;

    if let Ok((address, output)) = &outcome.result {
        if !output.did_revert() {
            rt.write_sandbox_output(
                args.address_ptr,
                args.address_len_ptr,
                address.as_bytes(),
                true,
                already_charged,
            )?;
        }
        rt.write_sandbox_output(args.output_ptr, args.output_len_ptr, &output.data, true, |len| {
            Some(RuntimeCosts::CopyToContract(len))
        })?;
    }

    Ok(exec_into_return_code(outcome.result.map(|(_, output)| output))?)
}

pub fn instantiate_v0(
    rt: &mut Runtime<'_>,
    code_hash_ptr: u32,
    _code_hash_len: u32,
    gas: u64,
    value_ptr: u32,
    _value_len: u32,
    input_data_ptr: u32,
    input_data_len: u32,
    address_ptr: u32,
    address_len_ptr: u32,
    output_ptr: u32,
    output_len_ptr: u32,
    salt_ptr: u32,
    salt_len: u32,
) -> Result<ReturnCode, TrapReason> {
    instantiate(
        rt,
        InstantiateArgs {
            code_hash_ptr,
            weight: Weight::from_ref_time(gas),
            deposit_ptr: SENTINEL,
            value_ptr,
            input_data_ptr,
            input_data_len,
            address_ptr,
            address_len_ptr,
            output_ptr,
            output_len_ptr,
            salt_ptr,
            salt_len,
        },
    )
}

pub fn instantiate_v1(
    rt: &mut Runtime<'_>,
    code_hash_ptr: u32,
    gas: u64,
    value_ptr: u32,
    input_data_ptr: u32,
    input_data_len: u32,
    address_ptr: u32,
    address_len_ptr: u32,
    output_ptr: u32,
    output_len_ptr: u32,
    salt_ptr: u32,
    salt_len: u32,
) -> Result<ReturnCode, TrapReason> {
    instantiate(
        rt,
        InstantiateArgs {
            code_hash_ptr,
            weight: Weight::from_ref_time(gas),
            deposit_ptr: SENTINEL,
            value_ptr,
            input_data_ptr,
            input_data_len,
            address_ptr,
            address_len_ptr,
            output_ptr,
            output_len_ptr,
            salt_ptr,
            salt_len,
        },
    )
}

pub fn instantiate_v2(
    rt: &mut Runtime<'_>,
    code_hash_ptr: u32,
    ref_time_limit: u64,
    proof_size_limit: u64,
    deposit_ptr: u32,
    value_ptr: u32,
    input_data_ptr: u32,
    input_data_len: u32,
    address_ptr: u32,
    address_len_ptr: u32,
    output_ptr: u32,
    output_len_ptr: u32,
    salt_ptr: u32,
    salt_len: u32,
) -> Result<ReturnCode, TrapReason> {
    instantiate(
        rt,
        InstantiateArgs {
            code_hash_ptr,
            weight: Weight::from_parts(ref_time_limit, proof_size_limit),
            deposit_ptr,
            value_ptr,
            input_data_ptr,
            input_data_len,
            address_ptr,
            address_len_ptr,
            output_ptr,
            output_len_ptr,
            salt_ptr,
            salt_len,
        },
    )
}

fn terminate(rt: &mut Runtime<'_>, beneficiary_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::Terminate)?;
    if rt.context().reentrance_count() > 0 {
        return Err(HostError::TerminatedWhileReentrant.into());
    }
    let beneficiary = rt.read_address(beneficiary_ptr)?;
    let ctx = rt.context();
    ctx.chain().terminate(ctx.contract_address(), &beneficiary)?;
    tracing::debug!(contract = %ctx.contract_address(), %beneficiary, "contract terminated");
    Err(TrapReason::Termination)
}

pub fn terminate_v0(rt: &mut Runtime<'_>, beneficiary_ptr: u32, _beneficiary_len: u32) -> Result<(), TrapReason> {
    terminate(rt, beneficiary_ptr)
}

pub fn terminate_v1(rt: &mut Runtime<'_>, beneficiary_ptr: u32) -> Result<(), TrapReason> {
    terminate(rt, beneficiary_ptr)
}

pub fn transfer(
    rt: &mut Runtime<'_>,
    account_ptr: u32,
    account_len: u32,
    value_ptr: u32,
    value_len: u32,
) -> Result<ReturnCode, TrapReason> {
    rt.charge_gas(RuntimeCosts::Transfer)?;
    if account_len != 32 || value_len != 16 {
        return Err(HostError::DecodingFailed.into());
    }
    let to = rt.read_address(account_ptr)?;
    let value = rt.read_balance(value_ptr)?;
    let ctx = rt.context();
    match ctx.chain().transfer(ctx.contract_address(), &to, value) {
        Ok(()) => Ok(ReturnCode::Success),
        Err(err) => Ok(err.into_return_code()?),
    }
}

pub fn set_code_hash(rt: &mut Runtime<'_>, code_hash_ptr: u32) -> Result<ReturnCode, TrapReason> {
    rt.charge_gas(RuntimeCosts::SetCodeHash)?;
    let code_hash = rt.read_hash(code_hash_ptr)?;
    let ctx = rt.context();
    match ctx.chain().set_code_hash(ctx.contract_address(), &code_hash) {
        Ok(()) => Ok(ReturnCode::Success),
        Err(err) => Ok(err.into_return_code()?),
    }
}

/// Dispatch an encoded runtime call with this contract as origin.
pub fn call_runtime(rt: &mut Runtime<'_>, call_ptr: u32, call_len: u32) -> Result<ReturnCode, TrapReason> {
    rt.charge_gas(RuntimeCosts::CopyFromContract(call_len))?;
    let call = rt.read_sandbox_memory(call_ptr, call_len)?;
    let ctx = rt.context();
    match ctx.chain().call_runtime(ctx.contract_address(), &call) {
        Ok(weight) => {
            rt.charge_gas(RuntimeCosts::Dispatched(weight))?;
            Ok(ReturnCode::Success)
        }
        Err(ChainError::Unsupported(op)) => Err(HostError::Unsupported(op).into()),
        Err(err) => {
            let message = format!("call_runtime failed: {err}");
            rt.context_mut().append_debug_message(message);
            Ok(ReturnCode::CallRuntimeFailed)
        }
    }
}

pub fn call_chain_extension(
    rt: &mut Runtime<'_>,
    id: u32,
    input_ptr: u32,
    input_len: u32,
    output_ptr: u32,
    output_len_ptr: u32,
) -> Result<u32, TrapReason> {
    rt.charge_gas(RuntimeCosts::CopyFromContract(input_len))?;
    let input = rt.read_sandbox_memory(input_ptr, input_len)?;
    let ctx = rt.context();
    let output = match ctx.chain().call_chain_extension(ctx.contract_address(), id, &input) {
        Ok(output) => output,
        Err(ChainError::Unsupported(_)) => return Err(HostError::NoChainExtension.into()),
        Err(err) => return Err(err.into()),
    };
    rt.charge_gas(RuntimeCosts::Dispatched(output.weight))?;
    rt.write_sandbox_output(output_ptr, output_len_ptr, &output.output, true, |len| {
        Some(RuntimeCosts::CopyToContract(len))
    })?;
    Ok(output.ret_val)
}

pub fn add_delegate_dependency(rt: &mut Runtime<'_>, code_hash_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::AddDelegateDependency)?;
    let code_hash = rt.read_hash(code_hash_ptr)?;
    let ctx = rt.context();
    ctx.chain().add_delegate_dependency(ctx.contract_address(), &code_hash)?;
    Ok(())
}

pub fn remove_delegate_dependency(rt: &mut Runtime<'_>, code_hash_ptr: u32) -> Result<(), TrapReason> {
    rt.charge_gas(RuntimeCosts::RemoveDelegateDependency)?;
    let code_hash = rt.read_hash(code_hash_ptr)?;
    let ctx = rt.context();
    ctx.chain().remove_delegate_dependency(ctx.contract_address(), &code_hash)?;
    Ok(())
}
