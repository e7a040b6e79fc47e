//! The embedder-supplied view of the chain.
//!
//! Balances, block data, randomness and nested execution live outside the
//! host runtime. Host functions reach them through [`Chain`]; every method
//! defaults to [`ChainError::Unsupported`], which traps the guest.

use bytes::Bytes;
use tessera_types::{Address, Balance, BlockNumber, Hash, Moment, Weight};
use thiserror::Error;

use crate::error::{HostError, TrapReason};
use crate::primitives::{ExecReturnValue, ReturnCode};
use crate::reentrancy::CallStack;

/// Failures reported by a [`Chain`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("operation not supported by this chain: {0}")]
    Unsupported(&'static str),

    #[error("transfer failed")]
    TransferFailed,

    #[error("code not found")]
    CodeNotFound,

    #[error("account is not a contract")]
    NotCallable,

    #[error("callee trapped: {0}")]
    CalleeTrapped(String),

    #[error("{0}")]
    Other(String),
}

impl ChainError {
    /// The return code reported to the guest, or the trap for failures that
    /// have none.
    pub fn into_return_code(self) -> Result<ReturnCode, HostError> {
        match self {
            ChainError::TransferFailed => Ok(ReturnCode::TransferFailed),
            ChainError::CodeNotFound => Ok(ReturnCode::CodeNotFound),
            ChainError::NotCallable => Ok(ReturnCode::NotCallable),
            ChainError::CalleeTrapped(_) => Ok(ReturnCode::CalleeTrapped),
            other => Err(other.into()),
        }
    }
}

impl From<ChainError> for HostError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::Unsupported(op) => HostError::Unsupported(op),
            other => HostError::Chain(other.to_string()),
        }
    }
}

impl From<ChainError> for TrapReason {
    fn from(err: ChainError) -> Self {
        TrapReason::Halt(err.into())
    }
}

/// A call to another contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub caller: Address,
    pub callee: Address,
    pub value: Balance,
    pub input: Bytes,
    pub gas_limit: Weight,
    /// `None` means no limit beyond the caller's own.
    pub deposit_limit: Option<Balance>,
    pub allow_reentry: bool,
    /// Frames the callee runs under, ending with the caller.
    pub call_stack: CallStack,
}

/// Run `code_hash` against the calling contract's storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateCallRequest {
    /// Contract whose storage and balance the code runs against.
    pub contract: Address,
    /// The caller of that contract, preserved for the delegated code.
    pub caller: Address,
    pub code_hash: Hash,
    pub value: Balance,
    pub input: Bytes,
    pub gas_limit: Weight,
    pub call_stack: CallStack,
}

/// Deploy a new contract from uploaded code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiateRequest {
    pub deployer: Address,
    pub code_hash: Hash,
    pub value: Balance,
    pub input: Bytes,
    pub salt: Vec<u8>,
    pub gas_limit: Weight,
    pub deposit_limit: Option<Balance>,
    pub call_stack: CallStack,
}

/// Result of a nested call. `gas_consumed` is charged to the caller either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub gas_consumed: Weight,
    pub result: Result<ExecReturnValue, ChainError>,
}

impl CallOutcome {
    pub fn unsupported(op: &'static str) -> Self {
        Self {
            gas_consumed: Weight::ZERO,
            result: Err(ChainError::Unsupported(op)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstantiateOutcome {
    pub gas_consumed: Weight,
    pub result: Result<(Address, ExecReturnValue), ChainError>,
}

/// What a chain extension returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainExtensionOutput {
    /// Passed through to the guest as the host function's return value.
    pub ret_val: u32,
    pub output: Vec<u8>,
    pub weight: Weight,
}

/// Chain state and nested execution, as seen by one contract invocation.
pub trait Chain: Send + Sync {
    fn block_number(&self) -> Result<BlockNumber, ChainError> {
        Err(ChainError::Unsupported("block_number"))
    }

    /// Timestamp of the current block.
    fn now(&self) -> Result<Moment, ChainError> {
        Err(ChainError::Unsupported("now"))
    }

    fn minimum_balance(&self) -> Result<Balance, ChainError> {
        Err(ChainError::Unsupported("minimum_balance"))
    }

    fn balance(&self, _account: &Address) -> Result<Balance, ChainError> {
        Err(ChainError::Unsupported("balance"))
    }

    fn transfer(&self, _from: &Address, _to: &Address, _value: Balance) -> Result<(), ChainError> {
        Err(ChainError::Unsupported("transfer"))
    }

    fn is_contract(&self, _account: &Address) -> Result<bool, ChainError> {
        Err(ChainError::Unsupported("is_contract"))
    }

    /// Code hash of `account`, `None` when it is not a contract.
    fn code_hash(&self, _account: &Address) -> Result<Option<Hash>, ChainError> {
        Err(ChainError::Unsupported("code_hash"))
    }

    fn set_code_hash(&self, _contract: &Address, _code_hash: &Hash) -> Result<(), ChainError> {
        Err(ChainError::Unsupported("set_code_hash"))
    }

    /// A random seed for `subject` and the block it became known at.
    fn random(&self, _subject: &[u8]) -> Result<(Hash, BlockNumber), ChainError> {
        Err(ChainError::Unsupported("random"))
    }

    fn weight_to_fee(&self, _weight: Weight) -> Result<Balance, ChainError> {
        Err(ChainError::Unsupported("weight_to_fee"))
    }

    fn call(&self, _request: CallRequest) -> CallOutcome {
        CallOutcome::unsupported("call")
    }

    fn delegate_call(&self, _request: DelegateCallRequest) -> CallOutcome {
        CallOutcome::unsupported("delegate_call")
    }

    fn instantiate(&self, _request: InstantiateRequest) -> InstantiateOutcome {
        InstantiateOutcome {
            gas_consumed: Weight::ZERO,
            result: Err(ChainError::Unsupported("instantiate")),
        }
    }

    /// Remove `contract` and send its balance to `beneficiary`.
    fn terminate(&self, _contract: &Address, _beneficiary: &Address) -> Result<(), ChainError> {
        Err(ChainError::Unsupported("terminate"))
    }

    /// Dispatch an encoded runtime call on behalf of `origin`. Returns the weight it used.
    fn call_runtime(&self, _origin: &Address, _call: &[u8]) -> Result<Weight, ChainError> {
        Err(ChainError::Unsupported("call_runtime"))
    }

    fn call_chain_extension(
        &self,
        _contract: &Address,
        _id: u32,
        _input: &[u8],
    ) -> Result<ChainExtensionOutput, ChainError> {
        Err(ChainError::Unsupported("call_chain_extension"))
    }

    /// Number of contracts instantiated so far.
    fn nonce(&self) -> Result<u64, ChainError> {
        Err(ChainError::Unsupported("instantiation_nonce"))
    }

    fn add_delegate_dependency(&self, _contract: &Address, _code_hash: &Hash) -> Result<(), ChainError> {
        Err(ChainError::Unsupported("add_delegate_dependency"))
    }

    fn remove_delegate_dependency(&self, _contract: &Address, _code_hash: &Hash) -> Result<(), ChainError> {
        Err(ChainError::Unsupported("remove_delegate_dependency"))
    }
}

/// A chain that supports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoChain;

impl Chain for NoChain {}
