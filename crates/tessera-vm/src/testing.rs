//! In-memory [`Chain`] for tests.

use std::collections::{HashMap, HashSet, VecDeque};

use parking_lot::RwLock;
use tessera_types::{Address, Balance, BlockNumber, Hash, Moment, Weight};

use crate::chain::{
    CallOutcome, CallRequest, Chain, ChainError, ChainExtensionOutput, DelegateCallRequest,
    InstantiateOutcome, InstantiateRequest,
};
use crate::primitives::ExecReturnValue;

/// Weight reported for every dispatched runtime call or chain extension.
pub const MOCK_DISPATCH_WEIGHT: Weight = Weight::from_parts(1_000, 10);

#[derive(Debug, Default)]
struct MockState {
    balances: HashMap<Address, Balance>,
    contracts: HashMap<Address, Hash>,
    codes: HashSet<Hash>,
    block_number: BlockNumber,
    now: Moment,
    minimum_balance: Balance,
    fee_per_ref_time: Balance,
    nonce: u64,
    chain_extension: bool,
    delegate_dependencies: HashSet<(Address, Hash)>,
    call_results: VecDeque<CallOutcome>,
    instantiate_results: VecDeque<InstantiateOutcome>,
    calls: Vec<CallRequest>,
    delegate_calls: Vec<DelegateCallRequest>,
    instantiations: Vec<InstantiateRequest>,
    terminations: Vec<(Address, Address)>,
    runtime_calls: Vec<Vec<u8>>,
}

/// A chain backed by plain maps.
///
/// Nested calls return queued outcomes, or an empty success when the queue is
/// empty. Every request is recorded for inspection.
#[derive(Debug, Default)]
pub struct MockChain {
    state: RwLock<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, account: Address, balance: Balance) -> Self {
        self.state.write().balances.insert(account, balance);
        self
    }

    pub fn with_contract(self, account: Address, code_hash: Hash) -> Self {
        {
            let mut state = self.state.write();
            state.codes.insert(code_hash);
            state.contracts.insert(account, code_hash);
        }
        self
    }

    /// Make `code_hash` available to `instantiate` and `set_code_hash`.
    pub fn with_code(self, code_hash: Hash) -> Self {
        self.state.write().codes.insert(code_hash);
        self
    }

    pub fn with_block(self, number: BlockNumber, now: Moment) -> Self {
        {
            let mut state = self.state.write();
            state.block_number = number;
            state.now = now;
        }
        self
    }

    pub fn with_minimum_balance(self, minimum_balance: Balance) -> Self {
        self.state.write().minimum_balance = minimum_balance;
        self
    }

    pub fn with_fee_per_ref_time(self, fee: Balance) -> Self {
        self.state.write().fee_per_ref_time = fee;
        self
    }

    /// Echo chain extension: returns the input as output and the id as return value.
    pub fn with_chain_extension(self) -> Self {
        self.state.write().chain_extension = true;
        self
    }

    /// Queue the outcome of the next `call` or `delegate_call`.
    pub fn push_call_outcome(&self, outcome: CallOutcome) {
        self.state.write().call_results.push_back(outcome);
    }

    pub fn push_instantiate_outcome(&self, outcome: InstantiateOutcome) {
        self.state.write().instantiate_results.push_back(outcome);
    }

    pub fn balance_of(&self, account: &Address) -> Balance {
        self.state.read().balances.get(account).copied().unwrap_or_default()
    }

    pub fn contract_code(&self, account: &Address) -> Option<Hash> {
        self.state.read().contracts.get(account).copied()
    }

    pub fn calls(&self) -> Vec<CallRequest> {
        self.state.read().calls.clone()
    }

    pub fn delegate_calls(&self) -> Vec<DelegateCallRequest> {
        self.state.read().delegate_calls.clone()
    }

    pub fn instantiations(&self) -> Vec<InstantiateRequest> {
        self.state.read().instantiations.clone()
    }

    /// `(contract, beneficiary)` pairs.
    pub fn terminations(&self) -> Vec<(Address, Address)> {
        self.state.read().terminations.clone()
    }

    pub fn runtime_calls(&self) -> Vec<Vec<u8>> {
        self.state.read().runtime_calls.clone()
    }

    pub fn has_delegate_dependency(&self, contract: &Address, code_hash: &Hash) -> bool {
        self.state.read().delegate_dependencies.contains(&(*contract, *code_hash))
    }

    /// Address of a contract instantiated by `deployer` from `code_hash` with `salt`.
    pub fn contract_address(deployer: &Address, code_hash: &Hash, salt: &[u8]) -> Address {
        let mut preimage = Vec::with_capacity(64 + salt.len());
        preimage.extend_from_slice(deployer.as_bytes());
        preimage.extend_from_slice(code_hash.as_bytes());
        preimage.extend_from_slice(salt);
        Address::from_bytes(tessera_crypto::blake2_256(&preimage))
    }
}

fn move_balance(state: &mut MockState, from: &Address, to: &Address, value: Balance) -> Result<(), ChainError> {
    if value == 0 {
        return Ok(());
    }
    let from_balance = state.balances.get(from).copied().unwrap_or_default();
    let remaining = from_balance.checked_sub(value).ok_or(ChainError::TransferFailed)?;
    let to_balance = state.balances.get(to).copied().unwrap_or_default();
    let credited = to_balance.checked_add(value).ok_or(ChainError::TransferFailed)?;
    state.balances.insert(*from, remaining);
    state.balances.insert(*to, credited);
    Ok(())
}

impl Chain for MockChain {
    fn block_number(&self) -> Result<BlockNumber, ChainError> {
        Ok(self.state.read().block_number)
    }

    fn now(&self) -> Result<Moment, ChainError> {
        Ok(self.state.read().now)
    }

    fn minimum_balance(&self) -> Result<Balance, ChainError> {
        Ok(self.state.read().minimum_balance)
    }

    fn balance(&self, account: &Address) -> Result<Balance, ChainError> {
        Ok(self.balance_of(account))
    }

    fn transfer(&self, from: &Address, to: &Address, value: Balance) -> Result<(), ChainError> {
        move_balance(&mut self.state.write(), from, to, value)
    }

    fn is_contract(&self, account: &Address) -> Result<bool, ChainError> {
        Ok(self.state.read().contracts.contains_key(account))
    }

    fn code_hash(&self, account: &Address) -> Result<Option<Hash>, ChainError> {
        Ok(self.contract_code(account))
    }

    fn set_code_hash(&self, contract: &Address, code_hash: &Hash) -> Result<(), ChainError> {
        let mut state = self.state.write();
        if !state.codes.contains(code_hash) {
            return Err(ChainError::CodeNotFound);
        }
        state.contracts.insert(*contract, *code_hash);
        Ok(())
    }

    fn random(&self, subject: &[u8]) -> Result<(Hash, BlockNumber), ChainError> {
        let block_number = self.state.read().block_number;
        let mut seed = block_number.to_le_bytes().to_vec();
        seed.extend_from_slice(subject);
        Ok((Hash::from_bytes(tessera_crypto::blake2_256(&seed)), block_number))
    }

    fn weight_to_fee(&self, weight: Weight) -> Result<Balance, ChainError> {
        let fee = self.state.read().fee_per_ref_time;
        Ok(Balance::from(weight.ref_time()).saturating_mul(fee))
    }

    fn call(&self, request: CallRequest) -> CallOutcome {
        let mut state = self.state.write();
        state.calls.push(request.clone());
        if let Some(outcome) = state.call_results.pop_front() {
            return outcome;
        }
        if !state.contracts.contains_key(&request.callee) {
            return CallOutcome {
                gas_consumed: Weight::ZERO,
                result: Err(ChainError::NotCallable),
            };
        }
        let result = move_balance(&mut state, &request.caller, &request.callee, request.value)
            .map(|()| ExecReturnValue::default());
        CallOutcome {
            gas_consumed: Weight::ZERO,
            result,
        }
    }

    fn delegate_call(&self, request: DelegateCallRequest) -> CallOutcome {
        let mut state = self.state.write();
        let known = state.codes.contains(&request.code_hash);
        state.delegate_calls.push(request);
        if let Some(outcome) = state.call_results.pop_front() {
            return outcome;
        }
        CallOutcome {
            gas_consumed: Weight::ZERO,
            result: if known {
                Ok(ExecReturnValue::default())
            } else {
                Err(ChainError::CodeNotFound)
            },
        }
    }

    fn instantiate(&self, request: InstantiateRequest) -> InstantiateOutcome {
        let mut state = self.state.write();
        state.instantiations.push(request.clone());
        if let Some(outcome) = state.instantiate_results.pop_front() {
            return outcome;
        }
        if !state.codes.contains(&request.code_hash) {
            return InstantiateOutcome {
                gas_consumed: Weight::ZERO,
                result: Err(ChainError::CodeNotFound),
            };
        }
        let address = Self::contract_address(&request.deployer, &request.code_hash, &request.salt);
        let result = move_balance(&mut state, &request.deployer, &address, request.value).map(|()| {
            state.contracts.insert(address, request.code_hash);
            state.nonce += 1;
            (address, ExecReturnValue::default())
        });
        InstantiateOutcome {
            gas_consumed: Weight::ZERO,
            result,
        }
    }

    fn terminate(&self, contract: &Address, beneficiary: &Address) -> Result<(), ChainError> {
        let mut state = self.state.write();
        let balance = state.balances.remove(contract).unwrap_or_default();
        *state.balances.entry(*beneficiary).or_default() += balance;
        state.contracts.remove(contract);
        state.terminations.push((*contract, *beneficiary));
        Ok(())
    }

    fn call_runtime(&self, _origin: &Address, call: &[u8]) -> Result<Weight, ChainError> {
        if call.is_empty() {
            return Err(ChainError::Other("empty runtime call".into()));
        }
        self.state.write().runtime_calls.push(call.to_vec());
        Ok(MOCK_DISPATCH_WEIGHT)
    }

    fn call_chain_extension(
        &self,
        _contract: &Address,
        id: u32,
        input: &[u8],
    ) -> Result<ChainExtensionOutput, ChainError> {
        if !self.state.read().chain_extension {
            return Err(ChainError::Unsupported("call_chain_extension"));
        }
        Ok(ChainExtensionOutput {
            ret_val: id,
            output: input.to_vec(),
            weight: MOCK_DISPATCH_WEIGHT,
        })
    }

    fn nonce(&self) -> Result<u64, ChainError> {
        Ok(self.state.read().nonce)
    }

    fn add_delegate_dependency(&self, contract: &Address, code_hash: &Hash) -> Result<(), ChainError> {
        let mut state = self.state.write();
        if !state.codes.contains(code_hash) {
            return Err(ChainError::CodeNotFound);
        }
        state.delegate_dependencies.insert((*contract, *code_hash));
        Ok(())
    }

    fn remove_delegate_dependency(&self, contract: &Address, code_hash: &Hash) -> Result<(), ChainError> {
        if self.state.write().delegate_dependencies.remove(&(*contract, *code_hash)) {
            Ok(())
        } else {
            Err(ChainError::Other("no such delegate dependency".into()))
        }
    }
}
