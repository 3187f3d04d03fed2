// Validation State
// ================
//
// A validation pass records its verdict in a `ValidationState`. The state
// starts out valid and can only move away from valid: a rule violation marks
// it invalid (the input is at fault), an internal error marks it errored
// (this node is at fault). Errored is sticky.
//
// Along with the verdict the state carries the activation flags resolved for
// the pass, the balance accumulators and the key images seen so far.

use std::collections::BTreeSet;
use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::amount::{money_range, Amount};
use crate::params::{ConsensusParams, TimeGate};

/// Blocks before this time carry anon transactions whose ids do not match
/// their rct data. They are already part of the chain, so the equality check
/// is skipped for them.
pub const RCT_TXID_CHECK_CUTOFF_TIME: i64 = 1_632_177_542;

/// Behaviour shared by the transaction and block outcome enums.
pub trait ValidationResult: Copy + Default + Eq + fmt::Debug + fmt::Display {
    /// Invalid by consensus rules.
    const CONSENSUS: Self;
    /// Most severe misbehavior tag.
    const DOS_100: Self;

    fn as_str(self) -> &'static str;

    /// Score of the graduated misbehavior tags, `None` for every other outcome.
    fn misbehavior_score(self) -> Option<u32>;
}

/// A reason why a transaction was invalid, suitable for deciding whether
/// its provider should be banned, ignored or disconnected.
#[derive(
    Serialize, Deserialize, BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum TxValidationResult {
    /// Initial value. Tx has not yet been rejected
    #[default]
    Unset = 0,
    /// Invalid by consensus rules
    Consensus = 1,
    /// Invalid by a rule change more recent than segwit. Currently unused.
    RecentConsensusChange = 2,
    /// Inputs (covered by txid) failed policy rules
    InputsNotStandard = 3,
    /// Otherwise didn't meet our local policy rules
    NotStandard = 4,
    /// Transaction was missing some of its inputs
    MissingInputs = 5,
    /// Spends a coinbase too early, or violates locktime/sequence locks
    PrematureSpend = 6,
    /// Has a witness before segwit activation, or the witness was malleated
    WitnessMutated = 7,
    /// Transaction is missing a witness
    WitnessStripped = 8,
    /// Already in the mempool or conflicts with a tx in the chain
    Conflict = 9,
    /// Violated mempool fee/size/descendant/RBF limits
    MempoolPolicy = 10,
    /// This node has no mempool so can't validate the transaction
    NoMempool = 11,
    Dos100 = 12,
    Dos50 = 13,
    Dos20 = 14,
    Dos5 = 15,
    Dos1 = 16,
}

/// A reason why a block was invalid, suitable for deciding whether its
/// provider should be banned, ignored or disconnected.
#[derive(
    Serialize, Deserialize, BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash,
)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum BlockValidationResult {
    /// Initial value. Block has not yet been rejected
    #[default]
    Unset = 0,
    /// Invalid by consensus rules (excluding any below reasons)
    Consensus = 1,
    /// Invalid by a rule change more recent than segwit. Currently unused.
    RecentConsensusChange = 2,
    /// Cached as invalid and the reason was not stored
    CachedInvalid = 3,
    /// Invalid proof of work or time too old
    InvalidHeader = 4,
    /// The block's data didn't match the data committed to by the PoW
    Mutated = 5,
    /// We don't have the previous block the checked one is built on
    MissingPrev = 6,
    /// A block this one builds on is invalid
    InvalidPrev = 7,
    /// Block timestamp was too far in the future (or our clock is bad)
    TimeFuture = 8,
    /// The block failed to meet one of our checkpoints
    Checkpoint = 9,
    /// The block header may be on a too-little-work chain
    HeaderLowWork = 10,
    Dos100 = 11,
    Dos50 = 12,
    Dos20 = 13,
    Dos5 = 14,
    Dos1 = 15,
}

impl ValidationResult for TxValidationResult {
    const CONSENSUS: Self = TxValidationResult::Consensus;
    const DOS_100: Self = TxValidationResult::Dos100;

    fn as_str(self) -> &'static str {
        match self {
            TxValidationResult::Unset => "TX_RESULT_UNSET",
            TxValidationResult::Consensus => "TX_CONSENSUS",
            TxValidationResult::RecentConsensusChange => "TX_RECENT_CONSENSUS_CHANGE",
            TxValidationResult::InputsNotStandard => "TX_INPUTS_NOT_STANDARD",
            TxValidationResult::NotStandard => "TX_NOT_STANDARD",
            TxValidationResult::MissingInputs => "TX_MISSING_INPUTS",
            TxValidationResult::PrematureSpend => "TX_PREMATURE_SPEND",
            TxValidationResult::WitnessMutated => "TX_WITNESS_MUTATED",
            TxValidationResult::WitnessStripped => "TX_WITNESS_STRIPPED",
            TxValidationResult::Conflict => "TX_CONFLICT",
            TxValidationResult::MempoolPolicy => "TX_MEMPOOL_POLICY",
            TxValidationResult::NoMempool => "TX_NO_MEMPOOL",
            TxValidationResult::Dos100 => "DOS_100",
            TxValidationResult::Dos50 => "DOS_50",
            TxValidationResult::Dos20 => "DOS_20",
            TxValidationResult::Dos5 => "DOS_5",
            TxValidationResult::Dos1 => "DOS_1",
        }
    }

    fn misbehavior_score(self) -> Option<u32> {
        match self {
            TxValidationResult::Dos100 => Some(100),
            TxValidationResult::Dos50 => Some(50),
            TxValidationResult::Dos20 => Some(20),
            TxValidationResult::Dos5 => Some(5),
            TxValidationResult::Dos1 => Some(1),
            _ => None,
        }
    }
}

impl ValidationResult for BlockValidationResult {
    const CONSENSUS: Self = BlockValidationResult::Consensus;
    const DOS_100: Self = BlockValidationResult::Dos100;

    fn as_str(self) -> &'static str {
        match self {
            BlockValidationResult::Unset => "BLOCK_RESULT_UNSET",
            BlockValidationResult::Consensus => "BLOCK_CONSENSUS",
            BlockValidationResult::RecentConsensusChange => "BLOCK_RECENT_CONSENSUS_CHANGE",
            BlockValidationResult::CachedInvalid => "BLOCK_CACHED_INVALID",
            BlockValidationResult::InvalidHeader => "BLOCK_INVALID_HEADER",
            BlockValidationResult::Mutated => "BLOCK_MUTATED",
            BlockValidationResult::MissingPrev => "BLOCK_MISSING_PREV",
            BlockValidationResult::InvalidPrev => "BLOCK_INVALID_PREV",
            BlockValidationResult::TimeFuture => "BLOCK_TIME_FUTURE",
            BlockValidationResult::Checkpoint => "BLOCK_CHECKPOINT",
            BlockValidationResult::HeaderLowWork => "BLOCK_HEADER_LOW_WORK",
            BlockValidationResult::Dos100 => "DOS_100",
            BlockValidationResult::Dos50 => "DOS_50",
            BlockValidationResult::Dos20 => "DOS_20",
            BlockValidationResult::Dos5 => "DOS_5",
            BlockValidationResult::Dos1 => "DOS_1",
        }
    }

    fn misbehavior_score(self) -> Option<u32> {
        match self {
            BlockValidationResult::Dos100 => Some(100),
            BlockValidationResult::Dos50 => Some(50),
            BlockValidationResult::Dos20 => Some(20),
            BlockValidationResult::Dos5 => Some(5),
            BlockValidationResult::Dos1 => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for TxValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for BlockValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Serialize, Deserialize, BorshSerialize, BorshDeserialize, Clone, Copy, Debug, Default, PartialEq, Eq, Hash,
)]
pub enum ValidationMode {
    /// Everything ok
    #[default]
    Valid,
    /// Network rule violation
    Invalid,
    /// Run-time error
    Error,
}

/// Outcome of a finished pass, in a form that can be written to a result log.
#[derive(Serialize, Deserialize, BorshSerialize, BorshDeserialize, Clone, Debug, PartialEq, Eq)]
pub struct ValidationVerdict<R> {
    pub mode: ValidationMode,
    pub result: R,
    pub reject_reason: String,
    pub debug_message: String,
}

/// Read-only view of the chain a pass validates against.
pub trait ChainView: Send + Sync {
    fn tip_height(&self) -> Option<u32>;
    fn median_time_past(&self) -> i64;
}

/// Mode flags handed to `set_state_info`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassFlags {
    pub globe_mode: bool,
    pub skip_rangeproof: bool,
    /// The pass checks a transaction as part of a block.
    pub in_block: bool,
}

/// Activation flags resolved once per pass.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActivationSnapshot {
    pub time: i64,
    pub spend_height: u32,
    pub in_block: bool,
    pub globe_mode: bool,
    pub skip_rangeproof: bool,
    pub enforce_smsg_fees: bool,
    pub bulletproofs_active: bool,
    pub rct_active: bool,
    pub clamp_tx_version: bool,
    pub exploit_fix_1: bool,
    pub exploit_fix_2: bool,
    pub check_equal_rct_txid: bool,
    pub punish_for_duplicates: bool,
}

impl Default for ActivationSnapshot {
    fn default() -> Self {
        Self {
            time: 0,
            spend_height: 0,
            in_block: false,
            globe_mode: false,
            skip_rangeproof: false,
            enforce_smsg_fees: false,
            bulletproofs_active: false,
            rct_active: false,
            clamp_tx_version: false,
            exploit_fix_1: false,
            exploit_fix_2: false,
            check_equal_rct_txid: true,
            punish_for_duplicates: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueCategory {
    Plain,
    Blind,
    Anon,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flow {
    In,
    Out,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("amount {0} is outside the money range")]
    OutOfRange(Amount),
    #[error("{category:?} {flow:?} total overflows the money range")]
    Overflow { category: ValueCategory, flow: Flow },
}

/// Running value totals of one pass, per value category and direction.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceLedger {
    totals: [Amount; 6],
}

impl BalanceLedger {
    fn slot(category: ValueCategory, flow: Flow) -> usize {
        let base = match category {
            ValueCategory::Plain => 0,
            ValueCategory::Blind => 1,
            ValueCategory::Anon => 2,
        };
        match flow {
            Flow::In => base,
            Flow::Out => base + 3,
        }
    }

    pub fn add(&mut self, category: ValueCategory, flow: Flow, amount: Amount) -> Result<(), BalanceError> {
        if !money_range(amount) {
            return Err(BalanceError::OutOfRange(amount));
        }
        let slot = Self::slot(category, flow);
        self.totals[slot] = self.totals[slot]
            .checked_add(amount)
            .filter(|total| money_range(*total))
            .ok_or(BalanceError::Overflow { category, flow })?;
        Ok(())
    }

    pub fn total(&self, category: ValueCategory, flow: Flow) -> Amount {
        self.totals[Self::slot(category, flow)]
    }

    /// Inputs minus outputs.
    pub fn net(&self, category: ValueCategory) -> Amount {
        self.total(category, Flow::In) - self.total(category, Flow::Out)
    }

    /// Inputs plus newly created coins equal outputs exactly.
    pub fn is_balanced(&self, category: ValueCategory, new_coins: Amount) -> bool {
        self.total(category, Flow::In).checked_add(new_coins) == Some(self.total(category, Flow::Out))
    }
}

/// A ring signature key image, a compressed curve point.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyImage(#[serde(with = "hex_bytes")] pub [u8; 33]);

impl From<[u8; 33]> for KeyImage {
    fn from(bytes: [u8; 33]) -> Self {
        KeyImage(bytes)
    }
}

impl fmt::Display for KeyImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 33], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 33], D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s).map_err(D::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| D::Error::custom("key image must be 33 bytes"))
    }
}

/// Verdict and context of one transaction or block validation pass.
pub struct ValidationState<'a, R: ValidationResult> {
    mode: ValidationMode,
    result: R,
    reject_reason: String,
    debug_message: String,

    consensus_params: Option<&'a ConsensusParams>,
    chain: Option<&'a dyn ChainView>,
    info: ActivationSnapshot,

    /// Peer the data came from
    pub node_id: Option<i64>,
    /// Script verification flags
    pub flags: u32,
    /// Don't clear the error while activating the best chain (debug)
    pub preserve_state: bool,

    pub funds_smsg: bool,
    pub has_anon_output: bool,
    pub has_anon_input: bool,
    pub spends_frozen_blinded: bool,
    pub balances: BalanceLedger,
    key_images: BTreeSet<KeyImage>,
}

pub type TxValidationState<'a> = ValidationState<'a, TxValidationResult>;
pub type BlockValidationState<'a> = ValidationState<'a, BlockValidationResult>;

impl<'a, R: ValidationResult> Default for ValidationState<'a, R> {
    fn default() -> Self {
        Self {
            mode: ValidationMode::Valid,
            result: R::default(),
            reject_reason: String::new(),
            debug_message: String::new(),
            consensus_params: None,
            chain: None,
            info: ActivationSnapshot::default(),
            node_id: None,
            flags: 0,
            preserve_state: false,
            funds_smsg: false,
            has_anon_output: false,
            has_anon_input: false,
            spends_frozen_blinded: false,
            balances: BalanceLedger::default(),
            key_images: BTreeSet::new(),
        }
    }
}

impl<'a, R: ValidationResult> ValidationState<'a, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a rule violation. Returns false so callers can `return state.invalid(..)`.
    ///
    /// An errored state stays errored, but the result and reason are still updated.
    pub fn invalid(
        &mut self,
        result: R,
        reject_reason: impl Into<String>,
        debug_message: impl Into<String>,
    ) -> bool {
        self.result = result;
        self.reject_reason = reject_reason.into();
        self.debug_message = debug_message.into();
        if self.mode != ValidationMode::Error {
            self.mode = ValidationMode::Invalid;
        }
        debug!(
            result = %self.result,
            reason = %self.reject_reason,
            debug_message = %self.debug_message,
            "validation rule violated"
        );
        false
    }

    /// Records an internal error. The reason is only kept if none was recorded before.
    pub fn error(&mut self, reject_reason: impl Into<String>) -> bool {
        if self.mode == ValidationMode::Valid {
            self.reject_reason = reject_reason.into();
        }
        self.mode = ValidationMode::Error;
        warn!(reason = %self.reject_reason, "validation internal error");
        false
    }

    pub fn is_valid(&self) -> bool {
        self.mode == ValidationMode::Valid
    }

    pub fn is_invalid(&self) -> bool {
        self.mode == ValidationMode::Invalid
    }

    pub fn is_error(&self) -> bool {
        self.mode == ValidationMode::Error
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn result(&self) -> R {
        self.result
    }

    pub fn reject_reason(&self) -> &str {
        &self.reject_reason
    }

    pub fn debug_message(&self) -> &str {
        &self.debug_message
    }

    pub fn verdict(&self) -> ValidationVerdict<R> {
        ValidationVerdict {
            mode: self.mode,
            result: self.result,
            reject_reason: self.reject_reason.clone(),
            debug_message: self.debug_message.clone(),
        }
    }

    /// Resolves the activation flags for this pass. Called once, before any rule is checked.
    ///
    /// A `spend_height` of `None` keeps the height already recorded, so block
    /// building can defer it.
    pub fn set_state_info(
        &mut self,
        time: i64,
        spend_height: Option<u32>,
        params: &'a ConsensusParams,
        flags: PassFlags,
    ) {
        self.consensus_params = Some(params);
        let info = &mut self.info;
        info.time = time;
        info.in_block = flags.in_block;
        info.enforce_smsg_fees = params.is_time_gate_active(TimeGate::PaidSmsg, time);
        info.bulletproofs_active = params.is_time_gate_active(TimeGate::Bulletproof, time);
        info.rct_active = params.is_time_gate_active(TimeGate::Rct, time);
        if let Some(height) = spend_height {
            info.spend_height = height;
        }
        info.globe_mode = flags.globe_mode;
        info.skip_rangeproof = flags.skip_rangeproof;

        info.clamp_tx_version = params.is_time_gate_active(TimeGate::ClampTxVersion, time);
        info.exploit_fix_1 = params.is_time_gate_active(TimeGate::ExploitFix1, time);
        info.exploit_fix_2 = params.is_time_gate_active(TimeGate::ExploitFix2, time);
        if info.in_block && time < RCT_TXID_CHECK_CUTOFF_TIME {
            info.check_equal_rct_txid = false;
        }
        debug!(network = %params.network, snapshot = ?self.info, "resolved validation state info");
    }

    /// Copies the activation context of another pass, never its verdict.
    pub fn copy_state_info<S: ValidationResult>(&mut self, from: &ValidationState<'a, S>) {
        self.consensus_params = from.consensus_params;
        self.chain = from.chain;
        self.info = from.info;
    }

    pub fn consensus_params(&self) -> Option<&'a ConsensusParams> {
        self.consensus_params
    }

    pub fn chain(&self) -> Option<&'a dyn ChainView> {
        self.chain
    }

    pub fn set_chain(&mut self, chain: &'a dyn ChainView) {
        self.chain = Some(chain);
    }

    pub fn info(&self) -> &ActivationSnapshot {
        &self.info
    }

    pub fn time(&self) -> i64 {
        self.info.time
    }

    pub fn spend_height(&self) -> u32 {
        self.info.spend_height
    }

    pub fn in_block(&self) -> bool {
        self.info.in_block
    }

    pub fn bulletproofs_active(&self) -> bool {
        self.info.bulletproofs_active
    }

    pub fn rct_active(&self) -> bool {
        self.info.rct_active
    }

    pub fn enforce_smsg_fees(&self) -> bool {
        self.info.enforce_smsg_fees
    }

    pub fn clamp_tx_version(&self) -> bool {
        self.info.clamp_tx_version
    }

    pub fn exploit_fix_1(&self) -> bool {
        self.info.exploit_fix_1
    }

    pub fn exploit_fix_2(&self) -> bool {
        self.info.exploit_fix_2
    }

    pub fn check_equal_rct_txid(&self) -> bool {
        self.info.check_equal_rct_txid
    }

    pub fn set_punish_for_duplicates(&mut self, punish: bool) {
        self.info.punish_for_duplicates = punish;
    }

    /// Minimum ring size for this pass, stricter once the second exploit fix is active.
    pub fn min_ringsize(&self) -> Option<usize> {
        self.consensus_params
            .map(|params| params.min_ringsize(self.info.exploit_fix_2))
    }

    /// Records a key image seen in this pass. A duplicate marks the state
    /// invalid and returns false.
    pub fn note_key_image(&mut self, key_image: KeyImage) -> bool {
        if self.key_images.insert(key_image) {
            return true;
        }
        let result = if self.info.punish_for_duplicates {
            R::DOS_100
        } else {
            R::CONSENSUS
        };
        self.invalid(result, "bad-anonin-dup-ki", key_image.to_string())
    }

    pub fn has_key_image(&self, key_image: &KeyImage) -> bool {
        self.key_images.contains(key_image)
    }

    pub fn key_image_count(&self) -> usize {
        self.key_images.len()
    }
}

impl<'a, R: ValidationResult> fmt::Display for ValidationState<'a, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            return f.write_str("Valid");
        }
        if !self.debug_message.is_empty() {
            return write!(f, "{}, {}", self.reject_reason, self.debug_message);
        }
        f.write_str(&self.reject_reason)
    }
}

impl<'a, R: ValidationResult> fmt::Debug for ValidationState<'a, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationState")
            .field("mode", &self.mode)
            .field("result", &self.result)
            .field("reject_reason", &self.reject_reason)
            .field("debug_message", &self.debug_message)
            .field("info", &self.info)
            .field("node_id", &self.node_id)
            .field("balances", &self.balances)
            .field("key_images", &self.key_images.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::{COIN, MAX_MONEY};
    use crate::params::Network;

    struct FixedChain {
        height: u32,
        mtp: i64,
    }

    impl ChainView for FixedChain {
        fn tip_height(&self) -> Option<u32> {
            Some(self.height)
        }

        fn median_time_past(&self) -> i64 {
            self.mtp
        }
    }

    #[test]
    fn test_new_state_is_valid() {
        let state = TxValidationState::new();
        assert!(state.is_valid());
        assert!(!state.is_invalid());
        assert!(!state.is_error());
        assert_eq!(state.result(), TxValidationResult::Unset);
        assert_eq!(state.to_string(), "Valid");
    }

    #[test]
    fn test_invalid_returns_false_and_records() {
        let mut state = BlockValidationState::new();
        assert!(!state.invalid(BlockValidationResult::Mutated, "bad-txnmrklroot", "hashMerkleRoot mismatch"));
        assert!(state.is_invalid());
        assert_eq!(state.result(), BlockValidationResult::Mutated);
        assert_eq!(state.reject_reason(), "bad-txnmrklroot");
        assert_eq!(state.to_string(), "bad-txnmrklroot, hashMerkleRoot mismatch");
    }

    #[test]
    fn test_to_string_without_debug_message() {
        let mut state = TxValidationState::new();
        state.invalid(TxValidationResult::Consensus, "bad-txns-vin-empty", "");
        assert_eq!(state.to_string(), "bad-txns-vin-empty");
    }

    #[test]
    fn test_second_invalid_stays_invalid() {
        let mut state = TxValidationState::new();
        state.invalid(TxValidationResult::MissingInputs, "bad-txns-inputs-missingorspent", "");
        state.invalid(TxValidationResult::Conflict, "txn-already-known", "");
        assert!(state.is_invalid());
        assert_eq!(state.result(), TxValidationResult::Conflict);
        assert_eq!(state.reject_reason(), "txn-already-known");
    }

    #[test]
    fn test_error_is_sticky() {
        let mut state = TxValidationState::new();
        assert!(!state.error("coins-db-read-failed"));
        assert!(state.is_error());

        state.invalid(TxValidationResult::Consensus, "bad-txns-in-belowout", "value in < value out");
        assert!(state.is_error());
        assert!(!state.is_invalid());
        // diagnostics are still refined
        assert_eq!(state.reject_reason(), "bad-txns-in-belowout");
        assert_eq!(state.result(), TxValidationResult::Consensus);
    }

    #[test]
    fn test_error_keeps_earlier_reason() {
        let mut state = BlockValidationState::new();
        state.invalid(BlockValidationResult::Consensus, "bad-cb-amount", "");
        state.error("disk-failure");
        assert!(state.is_error());
        assert_eq!(state.reject_reason(), "bad-cb-amount");

        let mut state = BlockValidationState::new();
        state.error("first");
        state.error("second");
        assert_eq!(state.reject_reason(), "first");
    }

    #[test]
    fn test_modes_are_exclusive() {
        let mut state = TxValidationState::new();
        let modes = |s: &TxValidationState| [s.is_valid(), s.is_invalid(), s.is_error()];
        assert_eq!(modes(&state).iter().filter(|m| **m).count(), 1);
        state.invalid(TxValidationResult::NotStandard, "dust", "");
        assert_eq!(modes(&state).iter().filter(|m| **m).count(), 1);
        state.error("oops");
        assert_eq!(modes(&state).iter().filter(|m| **m).count(), 1);
    }

    #[test]
    fn test_bulletproof_boundary_is_inclusive() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let t = i64::from(params.bulletproof_time);

        let mut state = TxValidationState::new();
        state.set_state_info(t, Some(10), &params, PassFlags::default());
        assert!(state.bulletproofs_active());

        let mut state = TxValidationState::new();
        state.set_state_info(t - 1, Some(10), &params, PassFlags::default());
        assert!(!state.bulletproofs_active());
    }

    #[test]
    fn test_set_state_info_resolves_time_gates() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let mut state = TxValidationState::new();
        let t = i64::from(params.exploit_fix_2_time);
        state.set_state_info(
            t,
            Some(1_000_000),
            &params,
            PassFlags {
                globe_mode: true,
                skip_rangeproof: true,
                in_block: false,
            },
        );
        let info = state.info();
        assert_eq!(info.time, t);
        assert_eq!(info.spend_height, 1_000_000);
        assert!(info.globe_mode && info.skip_rangeproof && !info.in_block);
        assert!(info.enforce_smsg_fees);
        assert!(info.rct_active);
        assert!(info.exploit_fix_1);
        assert!(info.exploit_fix_2);
        assert!(!info.clamp_tx_version);
        assert_eq!(state.min_ringsize(), Some(params.min_ringsize_post_hf2));
        assert!(std::ptr::eq(state.consensus_params().unwrap(), &params));
    }

    #[test]
    fn test_deferred_spend_height_is_kept() {
        let params = ConsensusParams::for_network(Network::Regtest);
        let mut state = BlockValidationState::new();
        state.set_state_info(100, Some(42), &params, PassFlags::default());
        state.set_state_info(200, None, &params, PassFlags::default());
        assert_eq!(state.spend_height(), 42);
        assert_eq!(state.time(), 200);
    }

    #[test]
    fn test_rct_txid_check_disabled_for_old_blocks() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let in_block = PassFlags {
            in_block: true,
            ..PassFlags::default()
        };

        let mut state = BlockValidationState::new();
        state.set_state_info(RCT_TXID_CHECK_CUTOFF_TIME - 1, None, &params, in_block);
        assert!(!state.check_equal_rct_txid());

        let mut state = BlockValidationState::new();
        state.set_state_info(RCT_TXID_CHECK_CUTOFF_TIME, None, &params, in_block);
        assert!(state.check_equal_rct_txid());

        let mut state = TxValidationState::new();
        state.set_state_info(RCT_TXID_CHECK_CUTOFF_TIME - 1, None, &params, PassFlags::default());
        assert!(state.check_equal_rct_txid());
    }

    #[test]
    fn test_copy_state_info_keeps_context_not_verdict() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let chain = FixedChain {
            height: 900_000,
            mtp: 1_650_000_000,
        };

        let mut block_state = BlockValidationState::new();
        block_state.set_chain(&chain);
        block_state.set_state_info(
            chain.median_time_past(),
            Some(900_001),
            &params,
            PassFlags {
                globe_mode: true,
                skip_rangeproof: false,
                in_block: true,
            },
        );
        block_state.set_punish_for_duplicates(true);
        block_state.node_id = Some(7);
        block_state.balances.add(ValueCategory::Plain, Flow::In, COIN).unwrap();
        block_state.invalid(BlockValidationResult::Consensus, "bad-blk-weight", "");

        let mut tx_state = TxValidationState::new();
        tx_state.copy_state_info(&block_state);

        assert!(tx_state.is_valid());
        assert_eq!(tx_state.result(), TxValidationResult::Unset);
        assert_eq!(tx_state.reject_reason(), "");
        assert_eq!(tx_state.info(), block_state.info());
        assert!(tx_state.info().punish_for_duplicates);
        assert!(std::ptr::eq(tx_state.consensus_params().unwrap(), &params));
        assert_eq!(tx_state.chain().and_then(|c| c.tip_height()), Some(900_000));
        assert_eq!(tx_state.node_id, None);
        assert_eq!(tx_state.balances, BalanceLedger::default());
    }

    #[test]
    fn test_balances() {
        let mut ledger = BalanceLedger::default();
        ledger.add(ValueCategory::Plain, Flow::In, 10 * COIN).unwrap();
        ledger.add(ValueCategory::Plain, Flow::Out, 9 * COIN).unwrap();
        ledger.add(ValueCategory::Plain, Flow::Out, 2 * COIN).unwrap();
        assert_eq!(ledger.net(ValueCategory::Plain), -COIN);
        assert!(!ledger.is_balanced(ValueCategory::Plain, 0));
        assert!(ledger.is_balanced(ValueCategory::Plain, COIN));

        ledger.add(ValueCategory::Anon, Flow::In, 5).unwrap();
        assert!(!ledger.is_balanced(ValueCategory::Anon, 0));
        assert!(ledger.is_balanced(ValueCategory::Blind, 0));
        assert_eq!(ledger.total(ValueCategory::Anon, Flow::In), 5);
        assert_eq!(ledger.total(ValueCategory::Anon, Flow::Out), 0);
    }

    #[test]
    fn test_balance_range_checks() {
        let mut ledger = BalanceLedger::default();
        assert_eq!(
            ledger.add(ValueCategory::Blind, Flow::Out, -1),
            Err(BalanceError::OutOfRange(-1))
        );
        ledger.add(ValueCategory::Blind, Flow::Out, MAX_MONEY).unwrap();
        assert_eq!(
            ledger.add(ValueCategory::Blind, Flow::Out, 1),
            Err(BalanceError::Overflow {
                category: ValueCategory::Blind,
                flow: Flow::Out
            })
        );
        assert_eq!(ledger.total(ValueCategory::Blind, Flow::Out), MAX_MONEY);
    }

    #[test]
    fn test_duplicate_key_image() {
        let mut state = TxValidationState::new();
        let ki = KeyImage([2; 33]);
        assert!(state.note_key_image(ki));
        assert!(state.note_key_image(KeyImage([3; 33])));
        assert!(state.is_valid());
        assert!(!state.note_key_image(ki));
        assert!(state.is_invalid());
        assert_eq!(state.result(), TxValidationResult::Consensus);
        assert_eq!(state.reject_reason(), "bad-anonin-dup-ki");
        assert_eq!(state.debug_message(), ki.to_string());
        assert_eq!(state.key_image_count(), 2);
    }

    #[test]
    fn test_duplicate_key_image_punished() {
        let mut state = BlockValidationState::new();
        state.set_punish_for_duplicates(true);
        let ki = KeyImage([9; 33]);
        state.note_key_image(ki);
        state.note_key_image(ki);
        assert_eq!(state.result(), BlockValidationResult::Dos100);
        assert_eq!(state.result().misbehavior_score(), Some(100));
        assert!(state.has_key_image(&ki));
    }

    #[test]
    fn test_misbehavior_scores() {
        assert_eq!(TxValidationResult::Dos50.misbehavior_score(), Some(50));
        assert_eq!(TxValidationResult::Dos1.misbehavior_score(), Some(1));
        assert_eq!(TxValidationResult::MempoolPolicy.misbehavior_score(), None);
        assert_eq!(BlockValidationResult::Dos20.misbehavior_score(), Some(20));
        assert_eq!(BlockValidationResult::Dos5.misbehavior_score(), Some(5));
        assert_eq!(BlockValidationResult::TimeFuture.misbehavior_score(), None);
        assert_eq!(BlockValidationResult::HeaderLowWork.to_string(), "BLOCK_HEADER_LOW_WORK");
    }

    #[test]
    fn test_verdict_borsh_uses_discriminants() {
        let mut state = BlockValidationState::new();
        state.invalid(BlockValidationResult::Checkpoint, "checkpoint mismatch", "");
        let bytes = borsh::to_vec(&state.verdict()).unwrap();
        // mode tag, then the result discriminant
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], BlockValidationResult::Checkpoint as u8);
        let verdict: ValidationVerdict<BlockValidationResult> = borsh::from_slice(&bytes).unwrap();
        assert_eq!(verdict, state.verdict());
    }

    #[test]
    fn test_verdict_json() {
        let mut state = TxValidationState::new();
        state.error("cannot read coins");
        let json = serde_json::to_value(state.verdict()).unwrap();
        assert_eq!(json["mode"], "Error");
        assert_eq!(json["result"], "Unset");
        assert_eq!(json["reject_reason"], "cannot read coins");
    }

    #[test]
    fn test_key_image_hex_serde() {
        let ki = KeyImage([0xab; 33]);
        let json = serde_json::to_string(&ki).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(33)));
        let back: KeyImage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ki);
    }

    #[test]
    fn test_states_share_params_across_threads() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let t = i64::from(params.bulletproof_time);
        let flags: Vec<bool> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let params = &params;
                    scope.spawn(move || {
                        let mut state = TxValidationState::new();
                        state.set_state_info(t - 2 + i, Some(1), params, PassFlags::default());
                        state.bulletproofs_active()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(flags, vec![false, false, true, true]);
    }
}
