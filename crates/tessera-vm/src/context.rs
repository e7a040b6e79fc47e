//! Per-invocation host environment.

use std::sync::Arc;

use bytes::Bytes;
use tessera_types::{Address, Balance, Hash, Weight};

use crate::chain::Chain;
use crate::config::HostLimits;
use crate::gas_metering::{GasMeter, HostFnWeights};
use crate::overlay::{StateChanges, StorageOverlay};
use crate::reentrancy::{CallFrame, CallStack};
use crate::storage::BackingStore;

/// Who signed the transaction that started the call stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Root,
    Signed(Address),
}

/// Lifecycle of an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Built, not yet attached to an engine store.
    Created,
    /// Host functions are linked against this context.
    Bound,
    /// The guest entry point is executing.
    Running,
    /// The guest finished, returned or terminated.
    Returned,
    /// The guest or a host function trapped.
    Trapped,
}

/// An event emitted by `deposit_event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub topics: Vec<Hash>,
    pub data: Bytes,
}

impl Event {
    /// Topics as the contiguous byte string the guest supplied.
    pub fn topic_bytes(&self) -> Vec<u8> {
        self.topics.iter().flat_map(|t| t.as_bytes().iter().copied()).collect()
    }
}

/// Everything one contract invocation can see and change.
///
/// Built before execution and moved into the engine store; host functions
/// mutate it while the guest runs and the runtime hands it back afterwards.
pub struct ExecutionContext {
    caller: Address,
    contract_address: Address,
    origin: Origin,
    code_hash: Hash,
    value_transferred: Balance,
    /// `None` once forwarded to a callee.
    input: Option<Bytes>,
    call_stack: CallStack,
    delegated: bool,
    gas_meter: GasMeter,
    overlay: StorageOverlay,
    events: Vec<Event>,
    debug_messages: Vec<String>,
    debug_buffer_len: usize,
    chain: Arc<dyn Chain>,
    limits: HostLimits,
    phase: Phase,
}

impl ExecutionContext {
    pub fn new(
        caller: Address,
        contract_address: Address,
        gas_limit: Weight,
        store: Arc<dyn BackingStore>,
        chain: Arc<dyn Chain>,
    ) -> Self {
        let limits = HostLimits::default();
        Self {
            caller,
            contract_address,
            origin: Origin::Signed(caller),
            code_hash: Hash::ZERO,
            value_transferred: 0,
            input: Some(Bytes::new()),
            call_stack: CallStack::new(),
            delegated: false,
            gas_meter: GasMeter::with_default_schedule(gas_limit),
            overlay: StorageOverlay::new(contract_address, store)
                .with_max_key_len(limits.max_storage_key_len),
            events: Vec::new(),
            debug_messages: Vec::new(),
            debug_buffer_len: 0,
            chain,
            limits,
            phase: Phase::Created,
        }
    }

    pub fn with_input(mut self, input: impl Into<Bytes>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_value(mut self, value: Balance) -> Self {
        self.value_transferred = value;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_code_hash(mut self, code_hash: Hash) -> Self {
        self.code_hash = code_hash;
        self
    }

    /// Frames of the contracts above this one.
    pub fn with_call_stack(mut self, call_stack: CallStack) -> Self {
        self.call_stack = call_stack;
        self
    }

    /// Mark the invocation as running borrowed code via `delegate_call`.
    pub fn delegated(mut self) -> Self {
        self.delegated = true;
        self
    }

    pub fn with_schedule(mut self, schedule: HostFnWeights) -> Self {
        self.gas_meter = GasMeter::new(self.gas_meter.gas_limit(), schedule);
        self
    }

    pub fn with_limits(mut self, limits: HostLimits) -> Self {
        self.overlay = self.overlay.with_max_key_len(limits.max_storage_key_len);
        self.limits = limits;
        self
    }

    pub fn caller(&self) -> &Address {
        &self.caller
    }

    pub fn contract_address(&self) -> &Address {
        &self.contract_address
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn code_hash(&self) -> &Hash {
        &self.code_hash
    }

    pub fn value_transferred(&self) -> Balance {
        self.value_transferred
    }

    /// The call input, `None` after it was forwarded.
    pub fn input(&self) -> Option<&Bytes> {
        self.input.as_ref()
    }

    pub(crate) fn take_input(&mut self) -> Option<Bytes> {
        self.input.take()
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.call_stack
    }

    /// This invocation's own frame.
    pub fn frame(&self) -> CallFrame {
        CallFrame {
            account: self.contract_address,
            delegated: self.delegated,
            allows_reentry: true,
        }
    }

    pub fn gas_meter(&self) -> &GasMeter {
        &self.gas_meter
    }

    pub fn gas_meter_mut(&mut self) -> &mut GasMeter {
        &mut self.gas_meter
    }

    pub fn overlay(&self) -> &StorageOverlay {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut StorageOverlay {
        &mut self.overlay
    }

    pub fn chain(&self) -> &dyn Chain {
        self.chain.as_ref()
    }

    pub fn limits(&self) -> &HostLimits {
        &self.limits
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        tracing::trace!(from = ?self.phase, to = ?phase, contract = %self.contract_address, "phase change");
        self.phase = phase;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn debug_messages(&self) -> &[String] {
        &self.debug_messages
    }

    /// Whether the caller is the account that signed the transaction.
    pub fn caller_is_origin(&self) -> bool {
        matches!(self.origin, Origin::Signed(origin) if origin == self.caller)
    }

    /// Whether this is the outermost call of a root-dispatched stack.
    pub fn caller_is_root(&self) -> bool {
        self.origin == Origin::Root && self.call_stack.is_empty()
    }

    /// How many times this contract is already executing below us.
    pub fn reentrance_count(&self) -> u32 {
        self.call_stack.count(&self.contract_address)
    }

    /// How many frames, including our own, execute as `account`.
    pub fn account_reentrance_count(&self, account: &Address) -> u32 {
        let own = !self.delegated && self.contract_address == *account;
        self.call_stack.count(account) + u32::from(own)
    }

    pub(crate) fn deposit_event(&mut self, topics: Vec<Hash>, data: Bytes) {
        self.events.push(Event { topics, data });
    }

    /// Record a message from the guest.
    ///
    /// Returns `false` when debug output is disabled. Output past the buffer
    /// limit is dropped.
    pub(crate) fn append_debug_message(&mut self, message: String) -> bool {
        if !self.limits.debug_buffer_enabled {
            return false;
        }
        let limit = self.limits.max_debug_buffer_len as usize;
        if self.debug_buffer_len + message.len() > limit {
            tracing::debug!(contract = %self.contract_address, "debug buffer full, message dropped");
            return true;
        }
        self.debug_buffer_len += message.len();
        self.debug_messages.push(message);
        true
    }

    /// Record why the invocation trapped. Always kept.
    pub(crate) fn record_trap(&mut self, message: String) {
        self.debug_messages.push(message);
    }

    /// The change set for the commit layer.
    pub fn changes(&self) -> StateChanges {
        self.overlay.changes()
    }

    pub fn into_changes(self) -> StateChanges {
        self.overlay.into_changes()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("caller", &self.caller)
            .field("contract_address", &self.contract_address)
            .field("origin", &self.origin)
            .field("value_transferred", &self.value_transferred)
            .field("gas_left", &self.gas_meter.gas_left())
            .field("overlay", &self.overlay)
            .field("events", &self.events.len())
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}
