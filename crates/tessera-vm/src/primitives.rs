//! Values that cross the host/guest ABI as plain integers.

use bitflags::bitflags;
use bytes::Bytes;

/// Reserved pointer/length meaning "skip" on input and "no prior value" on output.
pub const SENTINEL: u32 = u32::MAX;

/// Expected failures reported to the guest instead of trapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ReturnCode {
    Success = 0,
    CalleeTrapped = 1,
    CalleeReverted = 2,
    KeyNotFound = 3,
    TransferFailed = 5,
    CodeNotFound = 7,
    NotCallable = 8,
    LoggingDisabled = 9,
    CallRuntimeFailed = 10,
    EcdsaRecoverFailed = 11,
    Sr25519VerifyFailed = 12,
}

impl From<ReturnCode> for u32 {
    fn from(code: ReturnCode) -> u32 {
        code as u32
    }
}

impl From<&ExecReturnValue> for ReturnCode {
    fn from(value: &ExecReturnValue) -> Self {
        if value.did_revert() {
            ReturnCode::CalleeReverted
        } else {
            ReturnCode::Success
        }
    }
}

bitflags! {
    /// Flags passed to `seal_return`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReturnFlags: u32 {
        /// Roll back the callee's changes and report `CalleeReverted` to the caller.
        const REVERT = 0x0000_0001;
    }
}

bitflags! {
    /// Flags accepted by the `call` family of host functions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CallFlags: u32 {
        /// Hand this invocation's input to the callee. The input is gone afterwards.
        const FORWARD_INPUT = 0x0000_0001;
        /// Copy this invocation's input to the callee.
        const CLONE_INPUT = 0x0000_0002;
        /// Return the callee's output as our own and stop.
        const TAIL_CALL = 0x0000_0004;
        /// Allow the callee to already be on the call stack.
        const ALLOW_REENTRY = 0x0000_0008;
    }
}

/// What a contract hands back when its invocation finishes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecReturnValue {
    pub flags: ReturnFlags,
    pub data: Bytes,
}

impl ExecReturnValue {
    pub fn new(flags: ReturnFlags, data: impl Into<Bytes>) -> Self {
        Self { flags, data: data.into() }
    }

    pub fn did_revert(&self) -> bool {
        self.flags.contains(ReturnFlags::REVERT)
    }
}
