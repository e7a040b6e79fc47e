use serde::{Deserialize, Serialize};
use tessera_types::Weight;

use crate::error::HostError;

/// Price table for host functions.
///
/// Each operation has a base weight and, where the work depends on an
/// attacker-controlled size, a per-byte (or per-item) weight. The defaults are
/// placeholders; embedders load benchmarked values through the runtime config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostFnWeights {
    // Introspection
    pub caller: Weight,
    pub is_contract: Weight,
    pub code_hash: Weight,
    pub own_code_hash: Weight,
    pub caller_is_origin: Weight,
    pub caller_is_root: Weight,
    pub address: Weight,
    pub gas_left: Weight,
    pub balance: Weight,
    pub value_transferred: Weight,
    pub minimum_balance: Weight,
    pub block_number: Weight,
    pub now: Weight,
    pub weight_to_fee: Weight,
    pub random: Weight,

    // Memory copies
    pub copy_from_contract_per_byte: Weight,
    pub copy_to_contract_per_byte: Weight,

    // Storage
    pub set_storage: Weight,
    pub set_storage_per_new_byte: Weight,
    pub set_storage_per_old_byte: Weight,
    pub clear_storage: Weight,
    pub clear_storage_per_byte: Weight,
    pub contains_storage: Weight,
    pub contains_storage_per_byte: Weight,
    pub get_storage: Weight,
    pub get_storage_per_byte: Weight,
    pub take_storage: Weight,
    pub take_storage_per_byte: Weight,

    // Calls
    pub transfer: Weight,
    pub call: Weight,
    pub call_transfer_surcharge: Weight,
    pub call_per_cloned_byte: Weight,
    pub delegate_call: Weight,
    pub instantiate: Weight,
    pub instantiate_per_input_byte: Weight,
    pub instantiate_per_salt_byte: Weight,
    pub terminate: Weight,
    pub set_code_hash: Weight,

    // Events & debugging
    pub deposit_event: Weight,
    pub deposit_event_per_topic: Weight,
    pub deposit_event_per_byte: Weight,
    pub debug_message_per_byte: Weight,

    // Crypto
    pub hash_sha2_256: Weight,
    pub hash_sha2_256_per_byte: Weight,
    pub hash_keccak_256: Weight,
    pub hash_keccak_256_per_byte: Weight,
    pub hash_blake2_256: Weight,
    pub hash_blake2_256_per_byte: Weight,
    pub hash_blake2_128: Weight,
    pub hash_blake2_128_per_byte: Weight,
    pub ecdsa_recover: Weight,
    pub ecdsa_to_eth_address: Weight,
    pub sr25519_verify: Weight,
    pub sr25519_verify_per_byte: Weight,

    // Call stack & dependencies
    pub reentrance_count: Weight,
    pub account_reentrance_count: Weight,
    pub instantiation_nonce: Weight,
    pub add_delegate_dependency: Weight,
    pub remove_delegate_dependency: Weight,
}

impl Default for HostFnWeights {
    fn default() -> Self {
        const HOST_FN: Weight = Weight::from_ref_time(10_000);
        const PER_BYTE: Weight = Weight::from_ref_time(100);
        // Storage touches the trie, so it also costs proof size.
        const STORAGE: Weight = Weight::from_parts(100_000, 200);
        const STORAGE_PER_BYTE: Weight = Weight::from_parts(100, 1);
        const HASH_PER_BYTE: Weight = Weight::from_ref_time(200);

        Self {
            // Introspection
            caller: HOST_FN,
            is_contract: Weight::from_parts(50_000, 100),
            code_hash: Weight::from_parts(50_000, 100),
            own_code_hash: HOST_FN,
            caller_is_origin: HOST_FN,
            caller_is_root: HOST_FN,
            address: HOST_FN,
            gas_left: HOST_FN,
            balance: Weight::from_parts(50_000, 100),
            value_transferred: HOST_FN,
            minimum_balance: HOST_FN,
            block_number: HOST_FN,
            now: HOST_FN,
            weight_to_fee: HOST_FN,
            random: Weight::from_ref_time(20_000),

            // Memory copies
            copy_from_contract_per_byte: PER_BYTE,
            copy_to_contract_per_byte: PER_BYTE,

            // Storage
            set_storage: STORAGE,
            set_storage_per_new_byte: STORAGE_PER_BYTE,
            set_storage_per_old_byte: STORAGE_PER_BYTE,
            clear_storage: STORAGE,
            clear_storage_per_byte: STORAGE_PER_BYTE,
            contains_storage: STORAGE,
            contains_storage_per_byte: STORAGE_PER_BYTE,
            get_storage: STORAGE,
            get_storage_per_byte: STORAGE_PER_BYTE,
            take_storage: STORAGE,
            take_storage_per_byte: STORAGE_PER_BYTE,

            // Calls
            transfer: Weight::from_parts(200_000, 300),
            call: Weight::from_parts(500_000, 500),
            call_transfer_surcharge: Weight::from_parts(200_000, 300),
            call_per_cloned_byte: PER_BYTE,
            delegate_call: Weight::from_parts(400_000, 500),
            instantiate: Weight::from_parts(1_000_000, 1_000),
            instantiate_per_input_byte: PER_BYTE,
            instantiate_per_salt_byte: PER_BYTE,
            terminate: Weight::from_parts(500_000, 500),
            set_code_hash: Weight::from_parts(200_000, 300),

            // Events & debugging
            deposit_event: Weight::from_ref_time(20_000),
            deposit_event_per_topic: Weight::from_ref_time(5_000),
            deposit_event_per_byte: PER_BYTE,
            debug_message_per_byte: Weight::from_ref_time(10),

            // Crypto
            hash_sha2_256: HOST_FN,
            hash_sha2_256_per_byte: HASH_PER_BYTE,
            hash_keccak_256: HOST_FN,
            hash_keccak_256_per_byte: HASH_PER_BYTE,
            hash_blake2_256: HOST_FN,
            hash_blake2_256_per_byte: PER_BYTE,
            hash_blake2_128: HOST_FN,
            hash_blake2_128_per_byte: PER_BYTE,
            ecdsa_recover: Weight::from_ref_time(3_000_000),
            ecdsa_to_eth_address: Weight::from_ref_time(500_000),
            sr25519_verify: Weight::from_ref_time(3_000_000),
            sr25519_verify_per_byte: PER_BYTE,

            // Call stack & dependencies
            reentrance_count: HOST_FN,
            account_reentrance_count: HOST_FN,
            instantiation_nonce: HOST_FN,
            add_delegate_dependency: Weight::from_parts(100_000, 200),
            remove_delegate_dependency: Weight::from_parts(100_000, 200),
        }
    }
}

/// A host operation and the size it works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeCosts {
    /// Copying `n` bytes out of guest memory.
    CopyFromContract(u32),
    /// Copying `n` bytes into guest memory.
    CopyToContract(u32),
    Caller,
    IsContract,
    CodeHash,
    OwnCodeHash,
    CallerIsOrigin,
    CallerIsRoot,
    Address,
    GasLeft,
    Balance,
    ValueTransferred,
    MinimumBalance,
    BlockNumber,
    Now,
    WeightToFee,
    Random,
    DepositEvent { num_topic: u32, len: u32 },
    DebugMessage(u32),
    SetStorage { old_bytes: u32, new_bytes: u32 },
    ClearStorage(u32),
    ContainsStorage(u32),
    GetStorage(u32),
    TakeStorage(u32),
    Transfer,
    CallBase,
    /// Extra charge when a call moves value.
    CallTransferSurcharge,
    CallInputCloned(u32),
    DelegateCallBase,
    Instantiate { input_data_len: u32, salt_len: u32 },
    Terminate,
    HashSha256(u32),
    HashKeccak256(u32),
    HashBlake256(u32),
    HashBlake128(u32),
    EcdsaRecovery,
    EcdsaToEthAddress,
    Sr25519Verify(u32),
    SetCodeHash,
    ReentranceCount,
    AccountReentranceCount,
    InstantiationNonce,
    AddDelegateDependency,
    RemoveDelegateDependency,
    /// Weight reported by a chain extension or a dispatched runtime call.
    Dispatched(Weight),
}

impl RuntimeCosts {
    /// Weight of this operation under `s`.
    pub fn weight(&self, s: &HostFnWeights) -> Weight {
        use RuntimeCosts::*;
        match *self {
            CopyFromContract(len) => s.copy_from_contract_per_byte.saturating_mul(len.into()),
            CopyToContract(len) => s.copy_to_contract_per_byte.saturating_mul(len.into()),
            Caller => s.caller,
            IsContract => s.is_contract,
            CodeHash => s.code_hash,
            OwnCodeHash => s.own_code_hash,
            CallerIsOrigin => s.caller_is_origin,
            CallerIsRoot => s.caller_is_root,
            Address => s.address,
            GasLeft => s.gas_left,
            Balance => s.balance,
            ValueTransferred => s.value_transferred,
            MinimumBalance => s.minimum_balance,
            BlockNumber => s.block_number,
            Now => s.now,
            WeightToFee => s.weight_to_fee,
            Random => s.random,
            DepositEvent { num_topic, len } => s
                .deposit_event
                .saturating_add(s.deposit_event_per_topic.saturating_mul(num_topic.into()))
                .saturating_add(s.deposit_event_per_byte.saturating_mul(len.into())),
            DebugMessage(len) => s.debug_message_per_byte.saturating_mul(len.into()),
            SetStorage { old_bytes, new_bytes } => s
                .set_storage
                .saturating_add(s.set_storage_per_new_byte.saturating_mul(new_bytes.into()))
                .saturating_add(s.set_storage_per_old_byte.saturating_mul(old_bytes.into())),
            ClearStorage(len) => per_byte(s.clear_storage, s.clear_storage_per_byte, len),
            ContainsStorage(len) => per_byte(s.contains_storage, s.contains_storage_per_byte, len),
            GetStorage(len) => per_byte(s.get_storage, s.get_storage_per_byte, len),
            TakeStorage(len) => per_byte(s.take_storage, s.take_storage_per_byte, len),
            Transfer => s.transfer,
            CallBase => s.call,
            CallTransferSurcharge => s.call_transfer_surcharge,
            CallInputCloned(len) => s.call_per_cloned_byte.saturating_mul(len.into()),
            DelegateCallBase => s.delegate_call,
            Instantiate { input_data_len, salt_len } => s
                .instantiate
                .saturating_add(s.instantiate_per_input_byte.saturating_mul(input_data_len.into()))
                .saturating_add(s.instantiate_per_salt_byte.saturating_mul(salt_len.into())),
            Terminate => s.terminate,
            HashSha256(len) => per_byte(s.hash_sha2_256, s.hash_sha2_256_per_byte, len),
            HashKeccak256(len) => per_byte(s.hash_keccak_256, s.hash_keccak_256_per_byte, len),
            HashBlake256(len) => per_byte(s.hash_blake2_256, s.hash_blake2_256_per_byte, len),
            HashBlake128(len) => per_byte(s.hash_blake2_128, s.hash_blake2_128_per_byte, len),
            EcdsaRecovery => s.ecdsa_recover,
            EcdsaToEthAddress => s.ecdsa_to_eth_address,
            Sr25519Verify(len) => per_byte(s.sr25519_verify, s.sr25519_verify_per_byte, len),
            SetCodeHash => s.set_code_hash,
            ReentranceCount => s.reentrance_count,
            AccountReentranceCount => s.account_reentrance_count,
            InstantiationNonce => s.instantiation_nonce,
            AddDelegateDependency => s.add_delegate_dependency,
            RemoveDelegateDependency => s.remove_delegate_dependency,
            Dispatched(weight) => weight,
        }
    }
}

fn per_byte(base: Weight, per_byte: Weight, len: u32) -> Weight {
    base.saturating_add(per_byte.saturating_mul(len.into()))
}

/// Receipt for a charge, used to refund a worst-case pre-charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargedAmount(Weight);

impl ChargedAmount {
    pub fn amount(&self) -> Weight {
        self.0
    }
}

/// Tracks the gas left for one invocation.
#[derive(Debug, Clone)]
pub struct GasMeter {
    /// Gas limit for this execution
    gas_limit: Weight,
    /// Gas still available
    gas_left: Weight,
    /// Set by the first failed charge
    exhausted: bool,
    /// Price table
    schedule: HostFnWeights,
}

impl GasMeter {
    /// Create a new gas meter.
    pub fn new(gas_limit: Weight, schedule: HostFnWeights) -> Self {
        Self {
            gas_limit,
            gas_left: gas_limit,
            exhausted: false,
            schedule,
        }
    }

    /// Create with default schedule.
    pub fn with_default_schedule(gas_limit: Weight) -> Self {
        Self::new(gas_limit, HostFnWeights::default())
    }

    pub fn gas_limit(&self) -> Weight {
        self.gas_limit
    }

    pub fn gas_left(&self) -> Weight {
        self.gas_left
    }

    pub fn gas_consumed(&self) -> Weight {
        self.gas_limit.saturating_sub(self.gas_left)
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn schedule(&self) -> &HostFnWeights {
        &self.schedule
    }

    /// Charge for `cost`.
    ///
    /// On failure `gas_left` is unchanged and the meter is exhausted: every
    /// later charge fails as well.
    pub fn charge(&mut self, cost: RuntimeCosts) -> Result<ChargedAmount, HostError> {
        let amount = cost.weight(&self.schedule);
        self.charge_weight(amount)?;
        Ok(ChargedAmount(amount))
    }

    /// Charge a raw weight, e.g. what a nested call consumed.
    pub fn charge_weight(&mut self, amount: Weight) -> Result<(), HostError> {
        if self.exhausted {
            return Err(HostError::OutOfGas);
        }
        match self.gas_left.checked_sub(&amount) {
            Some(left) => {
                self.gas_left = left;
                Ok(())
            }
            None => {
                self.exhausted = true;
                tracing::debug!(
                    requested = %amount,
                    left = %self.gas_left,
                    "gas meter exhausted"
                );
                Err(HostError::OutOfGas)
            }
        }
    }

    /// Replace an earlier pre-charge with the cost that actually applied.
    ///
    /// Only refunds: an `actual` cost above the pre-charge is ignored.
    pub fn adjust(&mut self, charged: ChargedAmount, actual: RuntimeCosts) {
        let refund = charged.0.saturating_sub(actual.weight(&self.schedule));
        self.gas_left = self.gas_left.saturating_add(refund).min(self.gas_limit);
    }

    /// Budget for a nested call. A zero axis in `requested` means "all that is left".
    pub fn nested_limit(&self, requested: Weight) -> Weight {
        let ref_time = match requested.ref_time() {
            0 => self.gas_left.ref_time(),
            n => n.min(self.gas_left.ref_time()),
        };
        let proof_size = match requested.proof_size() {
            0 => self.gas_left.proof_size(),
            n => n.min(self.gas_left.proof_size()),
        };
        Weight::from_parts(ref_time, proof_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_gas_meter() {
        let mut meter = GasMeter::with_default_schedule(Weight::from_parts(1_000_000, 1_000));
        assert_eq!(meter.gas_left(), meter.gas_limit());

        let charged = meter.charge(RuntimeCosts::Caller).unwrap();
        assert_eq!(charged.amount(), meter.schedule().caller);
        assert_eq!(meter.gas_consumed(), meter.schedule().caller);
    }

    #[test]
    fn test_out_of_gas_on_either_axis() {
        // Plenty of ref_time but no proof_size budget.
        let mut meter = GasMeter::with_default_schedule(Weight::from_parts(u64::MAX, 0));
        assert_eq!(meter.charge(RuntimeCosts::GetStorage(0)), Err(HostError::OutOfGas));
        assert_eq!(meter.gas_left(), Weight::from_parts(u64::MAX, 0));
    }

    #[test]
    fn test_exhausted_meter_fails_closed() {
        let mut meter = GasMeter::with_default_schedule(Weight::from_parts(15_000, 0));
        meter.charge(RuntimeCosts::Caller).unwrap();
        assert!(meter.charge(RuntimeCosts::Caller).is_err());
        assert!(meter.is_exhausted());
        // Even a free operation now fails.
        assert_eq!(meter.charge(RuntimeCosts::CopyToContract(0)), Err(HostError::OutOfGas));
        assert_eq!(meter.gas_left(), Weight::from_parts(5_000, 0));
    }

    #[test]
    fn test_adjust_refunds_precharge() {
        let mut meter = GasMeter::with_default_schedule(Weight::from_parts(10_000_000, 100_000));
        let charged = meter.charge(RuntimeCosts::GetStorage(16 * 1024)).unwrap();
        meter.adjust(charged, RuntimeCosts::GetStorage(10));
        let expected = RuntimeCosts::GetStorage(10).weight(meter.schedule());
        assert_eq!(meter.gas_consumed(), expected);

        // Adjusting upwards is a no-op.
        let before = meter.gas_left();
        let charged = meter.charge(RuntimeCosts::GetStorage(0)).unwrap();
        meter.adjust(charged, RuntimeCosts::GetStorage(100));
        assert_eq!(before.saturating_sub(meter.gas_left()), charged.amount());
    }

    #[test]
    fn test_nested_limit() {
        let mut meter = GasMeter::with_default_schedule(Weight::from_parts(1_000, 100));
        meter.charge_weight(Weight::from_parts(400, 0)).unwrap();
        assert_eq!(meter.nested_limit(Weight::ZERO), Weight::from_parts(600, 100));
        assert_eq!(meter.nested_limit(Weight::from_parts(50, 0)), Weight::from_parts(50, 100));
        assert_eq!(
            meter.nested_limit(Weight::from_parts(10_000, 10)),
            Weight::from_parts(600, 10)
        );
    }

    #[test]
    fn test_schedule_from_toml() {
        let schedule: HostFnWeights = toml::from_str(
            r#"
            [caller]
            ref_time = 7
            proof_size = 1
            "#,
        )
        .unwrap();
        assert_eq!(schedule.caller, Weight::from_parts(7, 1));
        assert_eq!(schedule.address, HostFnWeights::default().address);
    }

    fn cost() -> impl Strategy<Value = RuntimeCosts> {
        prop_oneof![
            (0u32..20_000).prop_map(RuntimeCosts::GetStorage),
            (0u32..20_000, 0u32..20_000)
                .prop_map(|(old_bytes, new_bytes)| RuntimeCosts::SetStorage { old_bytes, new_bytes }),
            (0u32..4, 0u32..512).prop_map(|(num_topic, len)| RuntimeCosts::DepositEvent { num_topic, len }),
            Just(RuntimeCosts::Caller),
            Just(RuntimeCosts::CallBase),
        ]
    }

    proptest! {
        #[test]
        fn prop_gas_left_never_increases_and_never_underflows(
            limit_rt in 0u64..2_000_000,
            limit_ps in 0u64..2_000,
            costs in proptest::collection::vec(cost(), 0..32),
        ) {
            let limit = Weight::from_parts(limit_rt, limit_ps);
            let mut meter = GasMeter::with_default_schedule(limit);
            let mut previous = meter.gas_left();
            let mut charged = Weight::ZERO;
            let mut failed = false;

            for cost in costs {
                let weight = cost.weight(meter.schedule());
                let result = meter.charge(cost);
                let left = meter.gas_left();
                prop_assert!(!left.any_gt(&previous));
                prop_assert!(!left.any_gt(&limit));
                if failed {
                    prop_assert!(result.is_err());
                }
                match result {
                    Ok(_) => charged = charged.saturating_add(weight),
                    Err(_) => {
                        prop_assert_eq!(left, previous);
                        failed = true;
                    }
                }
                previous = left;
            }

            prop_assert_eq!(meter.gas_consumed(), charged);
            prop_assert_eq!(meter.gas_left().saturating_add(charged), limit);
        }
    }
}
