// Globe Network Parameters
// ========================
//
// This module defines parameters specific to the different Globe networks
// (mainnet, testnet, regtest). One parameter set is built per network when
// the process starts and is read-only afterwards, so it can be shared by
// reference across any number of concurrent validation passes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bitcoin::hashes::Hash;
use bitcoin::BlockHash;
use crypto_bigint::U256;
use hex_literal::hex;
use lazy_static::lazy_static;
use thiserror::Error;
use tracing::debug;

use crate::amount::{Amount, COIN};
use crate::deployments::{
    Bip9Deployment, BuriedDeployment, DeploymentPos, MAX_VERSION_BITS_DEPLOYMENTS,
};

/// Errors found while checking a parameter set at load time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("deployment {deployment}: bit {bit} is outside the version bits range")]
    DeploymentBitOutOfRange { deployment: &'static str, bit: u8 },
    #[error("deployment {deployment}: start time {start_time} is neither a sentinel nor a median time")]
    DeploymentBadStart {
        deployment: &'static str,
        start_time: i64,
    },
    #[error("deployment {deployment}: timeout {timeout} is not after start time {start_time}")]
    DeploymentTimeoutBeforeStart {
        deployment: &'static str,
        start_time: i64,
        timeout: i64,
    },
    #[error("height gate {earlier} must not activate after {later}")]
    GateOrder {
        earlier: &'static str,
        later: &'static str,
    },
    #[error("ring size bounds are inconsistent: min {min}, max {max}")]
    RingSizeBounds { min: usize, max: usize },
    #[error("activation threshold {threshold} exceeds confirmation window {window}")]
    ActivationThreshold { threshold: u32, window: u32 },
    #[error("parameter {0} must be non-zero")]
    ZeroValue(&'static str),
}

/// Unknown network name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown network '{0}', expected one of mainnet, testnet, regtest")]
pub struct NetworkParseError(pub String);

/// The Globe networks a parameter set can be built for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub const fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = NetworkParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(NetworkParseError(s.to_string())),
        }
    }
}

/// The network the crate was built for
///
/// Determined at compile time from the `GLOBE_NETWORK` environment variable,
/// defaulting to mainnet. Valid values are "mainnet", "testnet" and "regtest".
pub const NETWORK_TYPE: Network = {
    match option_env!("GLOBE_NETWORK") {
        Some(network) if matches!(network.as_bytes(), b"mainnet") => Network::Mainnet,
        Some(network) if matches!(network.as_bytes(), b"testnet") => Network::Testnet,
        Some(network) if matches!(network.as_bytes(), b"regtest") => Network::Regtest,
        None => Network::Mainnet,
        _ => panic!("Invalid network type"),
    }
};

lazy_static! {
    /// Parameters for the network selected at compile time.
    pub static ref NETWORK_PARAMS: ConsensusParams = ConsensusParams::for_network(NETWORK_TYPE);
}

/// A value that switches once, at a fork height
///
/// Below the fork height the legacy value applies, at and above it the
/// upgraded one. The switch is a step function of height and never goes back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForkGated<T> {
    pub legacy: T,
    pub upgraded: T,
}

impl<T: Copy> ForkGated<T> {
    pub const fn new(legacy: T, upgraded: T) -> Self {
        Self { legacy, upgraded }
    }

    pub fn at(&self, height: u32, fork_height: u32) -> T {
        if height < fork_height {
            self.legacy
        } else {
            self.upgraded
        }
    }
}

impl<T: Copy + Ord> ForkGated<T> {
    /// The larger of the two values, whichever era it belongs to.
    pub fn max_value(&self) -> T {
        self.legacy.max(self.upgraded)
    }
}

/// Protocol upgrades that switch on at a block height.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HeightGate {
    Bip34,
    Bip65,
    Bip66,
    Csv,
    Segwit,
    /// Don't warn about unknown BIP-9 activations below this height.
    MinBip9Warning,
    Qip5,
    Qip6,
    Qip7,
    Qip9,
    ReduceBlocktime,
    MuirGlacier,
    London,
    FirstMpos,
    FixUtxoCacheHf,
    EnableHeaderSignature,
    ExploitFix2,
}

impl HeightGate {
    pub const ALL: [HeightGate; 17] = [
        HeightGate::Bip34,
        HeightGate::Bip65,
        HeightGate::Bip66,
        HeightGate::Csv,
        HeightGate::Segwit,
        HeightGate::MinBip9Warning,
        HeightGate::Qip5,
        HeightGate::Qip6,
        HeightGate::Qip7,
        HeightGate::Qip9,
        HeightGate::ReduceBlocktime,
        HeightGate::MuirGlacier,
        HeightGate::London,
        HeightGate::FirstMpos,
        HeightGate::FixUtxoCacheHf,
        HeightGate::EnableHeaderSignature,
        HeightGate::ExploitFix2,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            HeightGate::Bip34 => "bip34",
            HeightGate::Bip65 => "bip65",
            HeightGate::Bip66 => "bip66",
            HeightGate::Csv => "csv",
            HeightGate::Segwit => "segwit",
            HeightGate::MinBip9Warning => "min_bip9_warning",
            HeightGate::Qip5 => "qip5",
            HeightGate::Qip6 => "qip6",
            HeightGate::Qip7 => "qip7",
            HeightGate::Qip9 => "qip9",
            HeightGate::ReduceBlocktime => "reduce_blocktime",
            HeightGate::MuirGlacier => "muir_glacier",
            HeightGate::London => "london",
            HeightGate::FirstMpos => "first_mpos",
            HeightGate::FixUtxoCacheHf => "fix_utxo_cache_hf",
            HeightGate::EnableHeaderSignature => "enable_header_signature",
            HeightGate::ExploitFix2 => "exploit_fix_2",
        }
    }
}

/// Protocol upgrades that switch on at a median time past.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimeGate {
    OpIsCoinstake,
    PaidSmsg,
    SmsgFee,
    Bulletproof,
    Rct,
    SmsgDifficulty,
    ClampTxVersion,
    ExploitFix1,
    ExploitFix2,
    ExploitFix3,
    Taproot,
}

impl TimeGate {
    pub const ALL: [TimeGate; 11] = [
        TimeGate::OpIsCoinstake,
        TimeGate::PaidSmsg,
        TimeGate::SmsgFee,
        TimeGate::Bulletproof,
        TimeGate::Rct,
        TimeGate::SmsgDifficulty,
        TimeGate::ClampTxVersion,
        TimeGate::ExploitFix1,
        TimeGate::ExploitFix2,
        TimeGate::ExploitFix3,
        TimeGate::Taproot,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            TimeGate::OpIsCoinstake => "op_is_coinstake",
            TimeGate::PaidSmsg => "paid_smsg",
            TimeGate::SmsgFee => "smsg_fee",
            TimeGate::Bulletproof => "bulletproof",
            TimeGate::Rct => "rct",
            TimeGate::SmsgDifficulty => "smsg_difficulty",
            TimeGate::ClampTxVersion => "clamp_tx_version",
            TimeGate::ExploitFix1 => "exploit_fix_1",
            TimeGate::ExploitFix2 => "exploit_fix_2",
            TimeGate::ExploitFix3 => "exploit_fix_3",
            TimeGate::Taproot => "taproot",
        }
    }
}

/// Fee and difficulty parameters of paid message relay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmsgFeeParams {
    /// Blocks between fee rate adjustments
    pub fee_period: u32,
    pub fee_funding_tx_per_k: Amount,
    pub fee_msg_per_day_per_k: Amount,
    /// Divided by 1000000
    pub fee_max_delta_percent: i64,
    pub min_difficulty: u32,
    pub difficulty_max_delta: u32,
}

/// Parameters that influence chain consensus
///
/// Dual-valued rules switch at `reduce_blocktime_height`; the target timespan
/// additionally switches earlier, at `qip9_height`.
#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    /// Hash of the genesis block
    pub genesis_hash: BlockHash,

    /// Blocks between block subsidy halvings, before and after the block time fork
    pub subsidy_halving_interval: ForkGated<u32>,

    /// Hashes of blocks that are known to be consensus valid and buried in
    /// the chain, but fail if the default script verify flags are applied.
    pub script_flag_exceptions: BTreeMap<BlockHash, u32>,

    /// Block height and hash at which BIP-34 becomes active
    pub bip34_height: u32,
    pub bip34_hash: BlockHash,
    /// Block height at which BIP-65 becomes active
    pub bip65_height: u32,
    /// Block height at which BIP-66 becomes active
    pub bip66_height: u32,
    /// Block height at which CSV (BIP-68, BIP-112 and BIP-113) becomes active
    pub csv_height: u32,
    /// Block height at which segwit (BIP-141, BIP-143 and BIP-147) becomes active
    pub segwit_height: u32,
    /// Don't warn about unknown BIP-9 activations below this height
    pub min_bip9_warning_height: u32,
    /// Block height at which QIP-5 becomes active
    pub qip5_height: u32,
    /// Block height at which QIP-6 becomes active
    pub qip6_height: u32,
    /// Block height at which QIP-7 becomes active
    pub qip7_height: u32,
    /// Block height at which QIP-9 becomes active.
    /// The target timespan switches here.
    pub qip9_height: u32,
    /// The block time speedup fork. Every dual-valued rule switches here.
    pub reduce_blocktime_height: u32,
    /// EVM Muir Glacier fork
    pub muir_glacier_height: u32,
    /// EVM London fork
    pub london_height: u32,

    /// Time from which OP_ISCOINSTAKE is valid in scripts
    pub op_is_coinstake_time: i64,
    pub allow_op_is_coinstake_with_p2pkh: bool,
    /// Time from which paid messages are accepted
    pub paid_smsg_time: u32,
    /// Time from which the message fee is variable
    pub smsg_fee_time: u32,
    /// Time from which range proofs use bulletproofs
    pub bulletproof_time: u32,
    /// Time from which anon (ring signature) transactions are accepted
    pub rct_time: u32,
    /// Time from which message difficulty tokens are enforced
    pub smsg_difficulty_time: u32,
    /// Clamp tx version, fix money supply and allow more data outputs for blind and anon txns
    pub clamp_tx_version_time: u32,
    /// First exploit fix
    pub exploit_fix_1_time: u32,
    /// New coin rewards
    pub exploit_fix_2_time: u32,
    pub exploit_fix_2_height: u32,
    pub exploit_fix_3_time: u32,
    /// Time from which taproot outputs are accepted
    pub taproot_time: u32,

    /// Last prefork anon output index
    pub frozen_anon_index: i64,
    /// Last block height of prefork blinded txns
    pub frozen_blinded_height: u32,
    /// Maximum value of a tainted blinded output that can be spent without being allow-listed
    pub max_tainted_value_out: Amount,

    /// Minimum ring size once exploit fix 2 is active
    pub min_ringsize_post_hf2: usize,
    pub min_ringsize: usize,
    pub max_ringsize: usize,
    /// Maximum number of anon inputs in one transaction
    pub max_anon_inputs: usize,

    /// Message relay fee and difficulty parameters
    pub smsg: SmsgFeeParams,

    /// Minimum blocks including miner confirmation of the total blocks in a
    /// confirmation window. Examples: 1916 for 95%, 1512 for testchains.
    pub rule_change_activation_threshold: u32,
    /// Blocks in one version bits signalling window
    pub miner_confirmation_window: u32,
    pub deployments: [Bip9Deployment; MAX_VERSION_BITS_DEPLOYMENTS],

    /// Proof of work limit
    pub pow_limit: U256,
    /// Proof of stake limit from QIP-9 until the block time fork
    pub qip9_pos_limit: U256,
    /// Proof of stake limit after the block time fork
    pub rbt_pos_limit: U256,
    pub pow_allow_min_difficulty_blocks: bool,
    pub pow_no_retargeting: bool,
    /// Seconds between blocks
    pub target_spacing: ForkGated<i64>,
    /// Difficulty retarget timespan in seconds before QIP-9
    pub target_timespan: i64,
    /// Difficulty retarget timespan from QIP-9 until the block time fork
    pub target_timespan_v2: i64,
    /// Difficulty retarget timespan after the block time fork
    pub rbt_target_timespan: i64,

    /// The best chain should have at least this much work
    pub minimum_chain_work: U256,
    /// By default assume that the signatures in ancestors of this block are valid
    pub default_assume_valid: BlockHash,

    /// Minimum depth an anon output is spendable at
    pub min_rct_output_depth: u32,

    /// Witness commitments carry a solution to the signet challenge (BIP-325)
    pub signet_blocks: bool,
    pub signet_challenge: Vec<u8>,

    /// Last block that can be mined with proof of work
    pub last_pow_block: u32,
    /// First block whose reward is shared between several stakers (MPoS)
    pub first_mpos_block: u32,
    /// Number of stakers sharing an MPoS block reward
    pub mpos_reward_recipients: u32,
    pub fix_utxo_cache_hf_height: u32,
    /// Block height from which headers carry a staker signature
    pub enable_header_signature_height: u32,
    /// Reorganizations deeper than this are rejected
    pub checkpoint_span: ForkGated<u32>,
    /// Address of the stake delegation contract
    pub delegations_address: [u8; 20],
    /// Last block paying the initial large reward
    pub last_big_reward: u32,
    /// Mask applied to coinstake timestamps
    pub stake_timestamp_mask: ForkGated<u32>,
    /// How many times faster blocks come after the block time fork
    pub blocktime_downscale_factor: u32,
    /// Confirmations before a coinbase or coinstake output can be spent
    pub coinbase_maturity: ForkGated<u32>,
}

/// Builds a hash from its display (big-endian) hex form.
fn display_hash(mut bytes: [u8; 32]) -> BlockHash {
    bytes.reverse();
    BlockHash::from_byte_array(bytes)
}

impl ConsensusParams {
    pub fn for_network(network: Network) -> Self {
        debug!(%network, "building consensus parameters");
        match network {
            Network::Mainnet => Self::mainnet(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    fn mainnet() -> Self {
        let genesis_hash = display_hash(hex!(
            "000075aef83cf2853580f8ae8ce6f8c3096cfa21d98334d6e3f95e5582ed986c"
        ));
        Self {
            network: Network::Mainnet,
            genesis_hash,
            subsidy_halving_interval: ForkGated::new(985_500, 3_942_000),
            script_flag_exceptions: BTreeMap::new(),
            bip34_height: 0,
            bip34_hash: genesis_hash,
            bip65_height: 0,
            bip66_height: 0,
            csv_height: 6048,
            segwit_height: 6048,
            min_bip9_warning_height: 8064,
            qip5_height: 466_600,
            qip6_height: 466_600,
            qip7_height: 466_600,
            qip9_height: 466_600,
            reduce_blocktime_height: 845_000,
            muir_glacier_height: 845_000,
            london_height: 2_080_512,
            op_is_coinstake_time: 1_510_272_000,
            allow_op_is_coinstake_with_p2pkh: false,
            paid_smsg_time: 1_522_540_800,
            smsg_fee_time: 1_561_939_200,
            bulletproof_time: 1_561_939_200,
            rct_time: 1_561_939_200,
            smsg_difficulty_time: 1_561_939_200,
            clamp_tx_version_time: 1_643_734_800,
            exploit_fix_1_time: 1_614_268_800,
            exploit_fix_2_time: 1_626_109_200,
            exploit_fix_2_height: 1_052_080,
            exploit_fix_3_time: 1_643_734_800,
            taproot_time: 1_643_734_800,
            frozen_anon_index: 27_340,
            frozen_blinded_height: 884_433,
            max_tainted_value_out: 200 * COIN,
            min_ringsize_post_hf2: 3,
            min_ringsize: 1,
            max_ringsize: 32,
            max_anon_inputs: 32,
            smsg: SmsgFeeParams {
                fee_period: 5040,
                fee_funding_tx_per_k: 200_000,
                fee_msg_per_day_per_k: 50_000,
                fee_max_delta_percent: 43,
                min_difficulty: 0x1eff_ffff,
                difficulty_max_delta: 0xffff,
            },
            rule_change_activation_threshold: 1916,
            miner_confirmation_window: 2016,
            deployments: [
                Bip9Deployment::never_active(28),
                Bip9Deployment::signalled(2, 1_629_936_000, 1_661_472_000, 0),
            ],
            pow_limit: U256::from_be_hex(
                "0000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
            ),
            qip9_pos_limit: U256::from_be_hex(
                "0000000000001fffffffffffffffffffffffffffffffffffffffffffffffffff",
            ),
            rbt_pos_limit: U256::from_be_hex(
                "0000000000003fffffffffffffffffffffffffffffffffffffffffffffffffff",
            ),
            pow_allow_min_difficulty_blocks: false,
            pow_no_retargeting: true,
            target_spacing: ForkGated::new(128, 32),
            target_timespan: 16 * 60,
            target_timespan_v2: 4000,
            rbt_target_timespan: 1000,
            minimum_chain_work: U256::ZERO,
            default_assume_valid: BlockHash::all_zeros(),
            min_rct_output_depth: 12,
            signet_blocks: false,
            signet_challenge: Vec::new(),
            last_pow_block: 5000,
            first_mpos_block: 5000,
            mpos_reward_recipients: 10,
            fix_utxo_cache_hf_height: 100_000,
            enable_header_signature_height: 399_100,
            checkpoint_span: ForkGated::new(500, 2000),
            delegations_address: hex!("0000000000000000000000000000000000000086"),
            last_big_reward: 5000,
            stake_timestamp_mask: ForkGated::new(15, 3),
            blocktime_downscale_factor: 4,
            coinbase_maturity: ForkGated::new(500, 2000),
        }
    }

    fn testnet() -> Self {
        let genesis_hash = display_hash(hex!(
            "0000e803ee215c0684ca0d2f9220594d3f828617972aad66feb2ba51f5e14222"
        ));
        Self {
            network: Network::Testnet,
            genesis_hash,
            bip34_hash: genesis_hash,
            csv_height: 6048,
            segwit_height: 6048,
            min_bip9_warning_height: 8064,
            qip5_height: 446_320,
            qip6_height: 446_320,
            qip7_height: 446_320,
            qip9_height: 446_320,
            reduce_blocktime_height: 806_600,
            muir_glacier_height: 806_600,
            london_height: 1_967_616,
            paid_smsg_time: 1_519_084_800,
            smsg_fee_time: 1_560_211_200,
            bulletproof_time: 1_539_129_600,
            rct_time: 1_539_129_600,
            smsg_difficulty_time: 1_560_211_200,
            clamp_tx_version_time: 1_641_990_600,
            exploit_fix_1_time: 1_614_268_800,
            exploit_fix_2_time: 1_625_097_600,
            exploit_fix_2_height: 923_000,
            exploit_fix_3_time: 1_641_990_600,
            taproot_time: 1_641_990_600,
            frozen_anon_index: 1_000,
            frozen_blinded_height: 785_000,
            min_rct_output_depth: 2,
            rule_change_activation_threshold: 1512,
            miner_confirmation_window: 2016,
            deployments: [
                Bip9Deployment::never_active(28),
                Bip9Deployment::signalled(2, 1_626_652_800, 1_658_188_800, 0),
            ],
            pow_allow_min_difficulty_blocks: false,
            pow_no_retargeting: true,
            ..Self::mainnet()
        }
    }

    fn regtest() -> Self {
        let genesis_hash = display_hash(hex!(
            "665ed5b402ac0b44efc37d8926332994363e8a7278b7ee9a58fb972efadae943"
        ));
        Self {
            network: Network::Regtest,
            genesis_hash,
            subsidy_halving_interval: ForkGated::new(150, 600),
            bip34_height: 0,
            bip34_hash: genesis_hash,
            bip65_height: 0,
            bip66_height: 0,
            csv_height: 432,
            segwit_height: 0,
            min_bip9_warning_height: 0,
            qip5_height: 0,
            qip6_height: 0,
            qip7_height: 0,
            qip9_height: 0,
            reduce_blocktime_height: 0,
            muir_glacier_height: 0,
            london_height: 0,
            op_is_coinstake_time: 0,
            paid_smsg_time: 0,
            smsg_fee_time: 0,
            bulletproof_time: 0,
            rct_time: 0,
            smsg_difficulty_time: 0,
            clamp_tx_version_time: 0,
            exploit_fix_1_time: 0,
            exploit_fix_2_time: 0,
            exploit_fix_2_height: 0,
            exploit_fix_3_time: 0,
            taproot_time: 0,
            frozen_anon_index: 0,
            frozen_blinded_height: 0,
            min_rct_output_depth: 2,
            rule_change_activation_threshold: 108,
            miner_confirmation_window: 144,
            deployments: [
                Bip9Deployment::signalled(28, 0, Bip9Deployment::NO_TIMEOUT, 0),
                Bip9Deployment::always_active(2),
            ],
            pow_limit: U256::from_be_hex(
                "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
            ),
            qip9_pos_limit: U256::from_be_hex(
                "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
            ),
            rbt_pos_limit: U256::from_be_hex(
                "7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
            ),
            pow_allow_min_difficulty_blocks: true,
            pow_no_retargeting: true,
            minimum_chain_work: U256::ZERO,
            default_assume_valid: BlockHash::all_zeros(),
            last_pow_block: 0x7fff_ffff,
            fix_utxo_cache_hf_height: 0,
            enable_header_signature_height: 0,
            ..Self::mainnet()
        }
    }

    /// Checks the invariants a parameter set must hold before it is used.
    pub fn validate(&self) -> Result<(), ParamsError> {
        for pos in DeploymentPos::ALL {
            self.deployment(pos).validate(pos)?;
        }
        if self.qip9_height > self.reduce_blocktime_height {
            return Err(ParamsError::GateOrder {
                earlier: HeightGate::Qip9.name(),
                later: HeightGate::ReduceBlocktime.name(),
            });
        }
        if self.min_ringsize == 0
            || self.min_ringsize > self.max_ringsize
            || self.min_ringsize_post_hf2 > self.max_ringsize
        {
            return Err(ParamsError::RingSizeBounds {
                min: self.min_ringsize.max(self.min_ringsize_post_hf2),
                max: self.max_ringsize,
            });
        }
        if self.miner_confirmation_window == 0 {
            return Err(ParamsError::ZeroValue("miner_confirmation_window"));
        }
        if self.rule_change_activation_threshold > self.miner_confirmation_window {
            return Err(ParamsError::ActivationThreshold {
                threshold: self.rule_change_activation_threshold,
                window: self.miner_confirmation_window,
            });
        }
        if self.target_spacing.legacy <= 0 || self.target_spacing.upgraded <= 0 {
            return Err(ParamsError::ZeroValue("target_spacing"));
        }
        if self.blocktime_downscale_factor == 0 {
            return Err(ParamsError::ZeroValue("blocktime_downscale_factor"));
        }
        Ok(())
    }

    pub fn stake_timestamp_mask(&self, height: u32) -> u32 {
        self.stake_timestamp_mask.at(height, self.reduce_blocktime_height)
    }

    pub fn subsidy_halving_interval(&self, height: u32) -> u32 {
        self.subsidy_halving_interval
            .at(height, self.reduce_blocktime_height)
    }

    pub fn blocktime_downscale_factor(&self, height: u32) -> u32 {
        ForkGated::new(1, self.blocktime_downscale_factor).at(height, self.reduce_blocktime_height)
    }

    pub fn target_spacing(&self, height: u32) -> i64 {
        self.target_spacing.at(height, self.reduce_blocktime_height)
    }

    pub fn target_spacing_duration(&self, height: u32) -> Duration {
        Duration::from_secs(self.target_spacing(height).max(0).unsigned_abs())
    }

    /// Number of blocks since the last big reward, counting blocks mined
    /// before the block time speedup `blocktime_downscale_factor` times.
    pub fn subsidy_halving_weight(&self, height: u32) -> u64 {
        if height <= self.last_big_reward {
            return 0;
        }

        let downscale_factor = u64::from(self.blocktime_downscale_factor(height));
        let block_count = u64::from(height - self.last_big_reward);
        let before_downscale = if downscale_factor == 1 {
            0
        } else {
            u64::from(
                self.reduce_blocktime_height
                    .saturating_sub(self.last_big_reward)
                    .saturating_sub(1),
            )
        };
        block_count - before_downscale + before_downscale * downscale_factor
    }

    pub fn timestamp_downscale_factor(&self, height: u32) -> u32 {
        if height < self.reduce_blocktime_height {
            return 1;
        }
        let legacy = u64::from(self.stake_timestamp_mask.legacy) + 1;
        let upgraded = u64::from(self.stake_timestamp_mask.upgraded) + 1;
        u32::try_from(legacy / upgraded).unwrap_or(u32::MAX)
    }

    /// Target timespan. QIP-9 switches it first, the block time fork second.
    pub fn target_timespan(&self, height: u32) -> i64 {
        if height < self.qip9_height {
            self.target_timespan
        } else if height < self.reduce_blocktime_height {
            self.target_timespan_v2
        } else {
            self.rbt_target_timespan
        }
    }

    pub fn difficulty_adjustment_interval(&self, height: u32) -> i64 {
        self.target_timespan(height) / self.target_spacing(height).max(1)
    }

    pub fn checkpoint_span(&self, height: u32) -> u32 {
        self.checkpoint_span.at(height, self.reduce_blocktime_height)
    }

    pub fn coinbase_maturity(&self, height: u32) -> u32 {
        self.coinbase_maturity.at(height, self.reduce_blocktime_height)
    }

    pub fn max_checkpoint_span(&self) -> u32 {
        self.checkpoint_span.max_value()
    }

    /// Proof-of-work limit, or the proof-of-stake limit of the era `height` falls in.
    pub fn pow_limit_for(&self, height: u32, proof_of_stake: bool) -> U256 {
        if !proof_of_stake || height < self.qip9_height {
            self.pow_limit
        } else if height < self.reduce_blocktime_height {
            self.qip9_pos_limit
        } else {
            self.rbt_pos_limit
        }
    }

    pub fn height_gate(&self, gate: HeightGate) -> u32 {
        match gate {
            HeightGate::Bip34 => self.bip34_height,
            HeightGate::Bip65 => self.bip65_height,
            HeightGate::Bip66 => self.bip66_height,
            HeightGate::Csv => self.csv_height,
            HeightGate::Segwit => self.segwit_height,
            HeightGate::MinBip9Warning => self.min_bip9_warning_height,
            HeightGate::Qip5 => self.qip5_height,
            HeightGate::Qip6 => self.qip6_height,
            HeightGate::Qip7 => self.qip7_height,
            HeightGate::Qip9 => self.qip9_height,
            HeightGate::ReduceBlocktime => self.reduce_blocktime_height,
            HeightGate::MuirGlacier => self.muir_glacier_height,
            HeightGate::London => self.london_height,
            HeightGate::FirstMpos => self.first_mpos_block,
            HeightGate::FixUtxoCacheHf => self.fix_utxo_cache_hf_height,
            HeightGate::EnableHeaderSignature => self.enable_header_signature_height,
            HeightGate::ExploitFix2 => self.exploit_fix_2_height,
        }
    }

    pub fn is_height_gate_active(&self, gate: HeightGate, height: u32) -> bool {
        height >= self.height_gate(gate)
    }

    pub fn time_gate(&self, gate: TimeGate) -> i64 {
        match gate {
            TimeGate::OpIsCoinstake => self.op_is_coinstake_time,
            TimeGate::PaidSmsg => i64::from(self.paid_smsg_time),
            TimeGate::SmsgFee => i64::from(self.smsg_fee_time),
            TimeGate::Bulletproof => i64::from(self.bulletproof_time),
            TimeGate::Rct => i64::from(self.rct_time),
            TimeGate::SmsgDifficulty => i64::from(self.smsg_difficulty_time),
            TimeGate::ClampTxVersion => i64::from(self.clamp_tx_version_time),
            TimeGate::ExploitFix1 => i64::from(self.exploit_fix_1_time),
            TimeGate::ExploitFix2 => i64::from(self.exploit_fix_2_time),
            TimeGate::ExploitFix3 => i64::from(self.exploit_fix_3_time),
            TimeGate::Taproot => i64::from(self.taproot_time),
        }
    }

    pub fn is_time_gate_active(&self, gate: TimeGate, time: i64) -> bool {
        time >= self.time_gate(gate)
    }

    pub fn deployment_height(&self, dep: BuriedDeployment) -> u32 {
        match dep {
            BuriedDeployment::HeightInCoinbase => self.bip34_height,
            BuriedDeployment::Cltv => self.bip65_height,
            BuriedDeployment::DerSig => self.bip66_height,
            BuriedDeployment::Csv => self.csv_height,
            BuriedDeployment::Segwit => self.segwit_height,
        }
    }

    pub fn deployment_active_at(&self, dep: BuriedDeployment, height: u32) -> bool {
        height >= self.deployment_height(dep)
    }

    pub fn deployment(&self, pos: DeploymentPos) -> &Bip9Deployment {
        &self.deployments[pos.index()]
    }

    /// Relaxed script flags for a known-anomalous buried block.
    pub fn script_flag_exception(&self, block_hash: &BlockHash) -> Option<u32> {
        self.script_flag_exceptions.get(block_hash).copied()
    }

    pub fn min_ringsize(&self, post_hf2: bool) -> usize {
        if post_hf2 {
            self.min_ringsize_post_hf2
        } else {
            self.min_ringsize
        }
    }

    pub fn ring_size_in_bounds(&self, ring_size: usize, post_hf2: bool) -> bool {
        ring_size >= self.min_ringsize(post_hf2) && ring_size <= self.max_ringsize
    }

    /// True for anon outputs created before the remediation boundary.
    pub fn is_frozen_anon_index(&self, index: i64) -> bool {
        index <= self.frozen_anon_index
    }

    /// True for blinded outputs created before the remediation boundary.
    pub fn is_frozen_blinded_height(&self, height: u32) -> bool {
        height <= self.frozen_blinded_height
    }

    pub fn may_spend_tainted(&self, value: Amount) -> bool {
        value <= self.max_tainted_value_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_validate() {
        for network in [Network::Mainnet, Network::Testnet, Network::Regtest] {
            let params = ConsensusParams::for_network(network);
            assert_eq!(params.network, network);
            assert_eq!(params.validate(), Ok(()));
        }
    }

    #[test]
    fn test_presets_have_no_assume_valid_or_chain_work() {
        for network in [Network::Mainnet, Network::Testnet, Network::Regtest] {
            let params = ConsensusParams::for_network(network);
            assert_eq!(params.minimum_chain_work, U256::ZERO);
            assert_eq!(params.default_assume_valid, BlockHash::all_zeros());
        }
    }

    #[test]
    fn test_network_from_str() {
        assert_eq!("mainnet".parse::<Network>(), Ok(Network::Mainnet));
        assert_eq!("TestNet".parse::<Network>(), Ok(Network::Testnet));
        assert_eq!("regtest".parse::<Network>(), Ok(Network::Regtest));
        assert!("signet".parse::<Network>().is_err());
        assert_eq!(Network::Regtest.to_string(), "regtest");
    }

    #[test]
    fn test_network_params_matches_build_network() {
        assert_eq!(NETWORK_PARAMS.network, NETWORK_TYPE);
    }

    #[test]
    fn test_genesis_hash_display_order() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        assert_eq!(
            params.genesis_hash.to_string(),
            "000075aef83cf2853580f8ae8ce6f8c3096cfa21d98334d6e3f95e5582ed986c"
        );
    }

    #[test]
    fn test_dual_valued_boundaries() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let fork = params.reduce_blocktime_height;

        assert_eq!(params.target_spacing(fork - 1), 128);
        assert_eq!(params.target_spacing(fork), 32);
        assert_eq!(params.target_spacing(fork + 1), 32);

        assert_eq!(params.stake_timestamp_mask(fork - 1), 15);
        assert_eq!(params.stake_timestamp_mask(fork), 3);

        assert_eq!(params.subsidy_halving_interval(fork - 1), 985_500);
        assert_eq!(params.subsidy_halving_interval(fork), 3_942_000);

        assert_eq!(params.checkpoint_span(fork - 1), 500);
        assert_eq!(params.checkpoint_span(fork), 2000);

        assert_eq!(params.coinbase_maturity(fork - 1), 500);
        assert_eq!(params.coinbase_maturity(fork + 1), 2000);

        assert_eq!(params.blocktime_downscale_factor(fork - 1), 1);
        assert_eq!(params.blocktime_downscale_factor(fork), 4);

        assert_eq!(params.timestamp_downscale_factor(fork - 1), 1);
        assert_eq!(params.timestamp_downscale_factor(fork), 4);
    }

    #[test]
    fn test_target_timespan_three_eras() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let qip9 = params.qip9_height;
        let fork = params.reduce_blocktime_height;

        assert_eq!(params.target_timespan(0), 960);
        assert_eq!(params.target_timespan(qip9 - 1), 960);
        assert_eq!(params.target_timespan(qip9), 4000);
        assert_eq!(params.target_timespan(fork - 1), 4000);
        assert_eq!(params.target_timespan(fork), 1000);
        assert_eq!(params.target_timespan(u32::MAX), 1000);
    }

    #[test]
    fn test_difficulty_adjustment_interval() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        assert_eq!(params.difficulty_adjustment_interval(0), 960 / 128);
        assert_eq!(
            params.difficulty_adjustment_interval(params.reduce_blocktime_height),
            1000 / 32
        );
        assert_eq!(
            params.target_spacing_duration(params.reduce_blocktime_height),
            Duration::from_secs(32)
        );
    }

    #[test]
    fn test_subsidy_halving_weight() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let lbr = params.last_big_reward;
        let fork = params.reduce_blocktime_height;

        assert_eq!(params.subsidy_halving_weight(0), 0);
        assert_eq!(params.subsidy_halving_weight(lbr), 0);
        assert_eq!(params.subsidy_halving_weight(lbr + 1), 1);
        assert_eq!(params.subsidy_halving_weight(fork - 1), u64::from(fork - 1 - lbr));

        let before = u64::from(fork - lbr - 1);
        assert_eq!(params.subsidy_halving_weight(fork), 1 + before * 4);
        assert_eq!(params.subsidy_halving_weight(fork + 9), 10 + before * 4);
    }

    #[test]
    fn test_subsidy_halving_weight_fork_before_last_big_reward() {
        // regtest switches block time at genesis, before the last big reward
        let params = ConsensusParams::for_network(Network::Regtest);
        let lbr = params.last_big_reward;
        assert_eq!(params.subsidy_halving_weight(lbr), 0);
        assert_eq!(params.subsidy_halving_weight(lbr + 7), 7);
    }

    #[test]
    fn test_max_checkpoint_span() {
        let mut params = ConsensusParams::for_network(Network::Mainnet);
        assert_eq!(params.max_checkpoint_span(), 2000);
        params.checkpoint_span = ForkGated::new(3000, 2000);
        assert_eq!(params.max_checkpoint_span(), 3000);
    }

    #[test]
    fn test_pow_limit_eras() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let fork = params.reduce_blocktime_height;
        assert_eq!(params.pow_limit_for(fork, false), params.pow_limit);
        assert_eq!(params.pow_limit_for(params.qip9_height - 1, true), params.pow_limit);
        assert_eq!(params.pow_limit_for(params.qip9_height, true), params.qip9_pos_limit);
        assert_eq!(params.pow_limit_for(fork, true), params.rbt_pos_limit);
    }

    #[test]
    fn test_time_gates_inclusive() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        let t = params.time_gate(TimeGate::Bulletproof);
        assert!(!params.is_time_gate_active(TimeGate::Bulletproof, t - 1));
        assert!(params.is_time_gate_active(TimeGate::Bulletproof, t));
    }

    #[test]
    fn test_deployment_heights() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        assert_eq!(params.deployment_height(BuriedDeployment::Segwit), 6048);
        assert!(!params.deployment_active_at(BuriedDeployment::Csv, 6047));
        assert!(params.deployment_active_at(BuriedDeployment::Csv, 6048));
        assert!(params.deployment_active_at(BuriedDeployment::HeightInCoinbase, 0));
        for dep in BuriedDeployment::ALL {
            let gate = match dep {
                BuriedDeployment::HeightInCoinbase => HeightGate::Bip34,
                BuriedDeployment::Cltv => HeightGate::Bip65,
                BuriedDeployment::DerSig => HeightGate::Bip66,
                BuriedDeployment::Csv => HeightGate::Csv,
                BuriedDeployment::Segwit => HeightGate::Segwit,
            };
            assert_eq!(params.deployment_height(dep), params.height_gate(gate));
        }
    }

    #[test]
    fn test_script_flag_exception_lookup() {
        let mut params = ConsensusParams::for_network(Network::Regtest);
        let anomalous = display_hash(hex!(
            "00000000000002dc756eebf4f49723ed8d30cc28a5f108eb94b1ba88ac4f9c22"
        ));
        assert_eq!(params.script_flag_exception(&anomalous), None);
        params
            .script_flag_exceptions
            .insert(anomalous, crate::constants::SCRIPT_VERIFY_NONE);
        assert_eq!(
            params.script_flag_exception(&anomalous),
            Some(crate::constants::SCRIPT_VERIFY_NONE)
        );
        assert_eq!(params.script_flag_exception(&params.genesis_hash), None);
    }

    #[test]
    fn test_anon_policy_bounds() {
        let params = ConsensusParams::for_network(Network::Mainnet);
        assert!(params.ring_size_in_bounds(1, false));
        assert!(!params.ring_size_in_bounds(1, true));
        assert!(params.ring_size_in_bounds(3, true));
        assert!(!params.ring_size_in_bounds(33, false));
        assert!(params.is_frozen_anon_index(27_340));
        assert!(!params.is_frozen_anon_index(27_341));
        assert!(params.is_frozen_blinded_height(884_433));
        assert!(!params.is_frozen_blinded_height(884_434));
        assert!(params.may_spend_tainted(200 * COIN));
        assert!(!params.may_spend_tainted(200 * COIN + 1));
    }

    #[test]
    fn test_validate_rejects_gate_order() {
        let mut params = ConsensusParams::for_network(Network::Mainnet);
        params.qip9_height = params.reduce_blocktime_height + 1;
        assert!(matches!(
            params.validate(),
            Err(ParamsError::GateOrder { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_threshold_above_window() {
        let mut params = ConsensusParams::for_network(Network::Regtest);
        params.rule_change_activation_threshold = params.miner_confirmation_window + 1;
        assert!(matches!(
            params.validate(),
            Err(ParamsError::ActivationThreshold { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_ring_bounds() {
        let mut params = ConsensusParams::for_network(Network::Mainnet);
        params.min_ringsize_post_hf2 = params.max_ringsize + 1;
        assert!(matches!(
            params.validate(),
            Err(ParamsError::RingSizeBounds { .. })
        ));
    }
}
