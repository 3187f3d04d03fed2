// Soft-fork Deployments
// =====================
//
// Two kinds of deployment exist. A buried deployment has its activation
// height hard-coded long after the rule change activated (BIP-90), so no
// signalling is involved. A versioned deployment is activated by miners
// signalling a version bit inside a start/timeout window (BIP-9); the
// threshold state machine itself lives outside this crate.
//
// The ordinals of both enums are preserved exactly. Buried deployments take
// negative values so the two ranges never overlap when carried in one field.

use serde::{Deserialize, Serialize};

use crate::constants::VERSIONBITS_NUM_BITS;
use crate::params::ParamsError;

/// A deployment whose activation height is hard-coded.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i16)]
pub enum BuriedDeployment {
    /// BIP-34: block height in coinbase
    HeightInCoinbase = i16::MIN,
    /// BIP-65: OP_CHECKLOCKTIMEVERIFY
    Cltv,
    /// BIP-66: strict DER signatures
    DerSig,
    /// BIP-68, BIP-112, BIP-113: relative lock-time
    Csv,
    /// BIP-141, BIP-143, BIP-147: segregated witness
    Segwit,
}

impl BuriedDeployment {
    pub const ALL: [BuriedDeployment; 5] = [
        BuriedDeployment::HeightInCoinbase,
        BuriedDeployment::Cltv,
        BuriedDeployment::DerSig,
        BuriedDeployment::Csv,
        BuriedDeployment::Segwit,
    ];

    /// The last defined buried deployment.
    pub const LAST: BuriedDeployment = BuriedDeployment::Segwit;

    pub const fn ordinal(self) -> i16 {
        self as i16
    }

    /// An ordinal names a buried deployment iff it is not past the last one.
    pub const fn is_valid_ordinal(ordinal: i16) -> bool {
        ordinal <= Self::LAST.ordinal()
    }

    pub fn from_ordinal(ordinal: i16) -> Option<Self> {
        if !Self::is_valid_ordinal(ordinal) {
            return None;
        }
        Self::ALL.iter().copied().find(|dep| dep.ordinal() == ordinal)
    }

    pub const fn name(self) -> &'static str {
        match self {
            BuriedDeployment::HeightInCoinbase => "bip34",
            BuriedDeployment::Cltv => "bip65",
            BuriedDeployment::DerSig => "bip66",
            BuriedDeployment::Csv => "csv",
            BuriedDeployment::Segwit => "segwit",
        }
    }
}

/// Position of a version-bits deployment in `ConsensusParams::deployments`.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u16)]
pub enum DeploymentPos {
    TestDummy = 0,
    /// Schnorr/Taproot (BIPs 340-342)
    Taproot = 1,
}

/// Number of version-bits deployments. Every `DeploymentPos` is below it.
pub const MAX_VERSION_BITS_DEPLOYMENTS: usize = 2;

impl DeploymentPos {
    pub const ALL: [DeploymentPos; MAX_VERSION_BITS_DEPLOYMENTS] =
        [DeploymentPos::TestDummy, DeploymentPos::Taproot];

    pub const fn ordinal(self) -> u16 {
        self as u16
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn is_valid_ordinal(ordinal: u16) -> bool {
        (ordinal as usize) < MAX_VERSION_BITS_DEPLOYMENTS
    }

    pub fn from_ordinal(ordinal: u16) -> Option<Self> {
        if !Self::is_valid_ordinal(ordinal) {
            return None;
        }
        Some(Self::ALL[ordinal as usize])
    }

    pub const fn name(self) -> &'static str {
        match self {
            DeploymentPos::TestDummy => "testdummy",
            DeploymentPos::Taproot => "taproot",
        }
    }
}

/// Either kind of deployment.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Deployment {
    Buried(BuriedDeployment),
    Versioned(DeploymentPos),
}

impl Deployment {
    pub const fn name(self) -> &'static str {
        match self {
            Deployment::Buried(dep) => dep.name(),
            Deployment::Versioned(pos) => pos.name(),
        }
    }
}

impl From<BuriedDeployment> for Deployment {
    fn from(dep: BuriedDeployment) -> Self {
        Deployment::Buried(dep)
    }
}

impl From<DeploymentPos> for Deployment {
    fn from(pos: DeploymentPos) -> Self {
        Deployment::Versioned(pos)
    }
}

/// How a versioned deployment is scheduled.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentSchedule {
    /// Active from genesis, the signalling window is skipped.
    AlwaysActive,
    /// Disabled. Code for the rule ships ahead of its activation.
    NeverActive,
    /// Miners signal between the two median times.
    Signalled { start_time: i64, timeout: i64 },
}

/// Parameters of a single BIP-9 rule change.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bip9Deployment {
    /// Bit position to select the particular bit in nVersion.
    pub bit: u8,
    /// Start median time for version bits miner confirmation. Can be a date in the past.
    pub start_time: i64,
    /// Timeout/expiry median time for the deployment attempt.
    pub timeout: i64,
    /// If lock in occurs, delay activation until at least this block height.
    /// Activation only occurs on a retarget boundary.
    pub min_activation_height: u32,
}

impl Bip9Deployment {
    /// Timeout very far in the future.
    pub const NO_TIMEOUT: i64 = i64::MAX;

    /// Start time marking a deployment as always active.
    pub const ALWAYS_ACTIVE: i64 = -1;

    /// Start time marking a deployment as never active.
    pub const NEVER_ACTIVE: i64 = -2;

    pub const fn always_active(bit: u8) -> Self {
        Self {
            bit,
            start_time: Self::ALWAYS_ACTIVE,
            timeout: Self::NO_TIMEOUT,
            min_activation_height: 0,
        }
    }

    pub const fn never_active(bit: u8) -> Self {
        Self {
            bit,
            start_time: Self::NEVER_ACTIVE,
            timeout: Self::NEVER_ACTIVE,
            min_activation_height: 0,
        }
    }

    pub const fn signalled(bit: u8, start_time: i64, timeout: i64, min_activation_height: u32) -> Self {
        Self {
            bit,
            start_time,
            timeout,
            min_activation_height,
        }
    }

    pub fn schedule(&self) -> DeploymentSchedule {
        match self.start_time {
            Self::ALWAYS_ACTIVE => DeploymentSchedule::AlwaysActive,
            Self::NEVER_ACTIVE => DeploymentSchedule::NeverActive,
            start_time => DeploymentSchedule::Signalled {
                start_time,
                timeout: self.timeout,
            },
        }
    }

    /// The nVersion bit this deployment signals with.
    pub fn mask(&self) -> u32 {
        1u32 << self.bit
    }

    pub fn validate(&self, pos: DeploymentPos) -> Result<(), ParamsError> {
        if self.bit >= VERSIONBITS_NUM_BITS {
            return Err(ParamsError::DeploymentBitOutOfRange {
                deployment: pos.name(),
                bit: self.bit,
            });
        }
        match self.schedule() {
            DeploymentSchedule::AlwaysActive | DeploymentSchedule::NeverActive => Ok(()),
            DeploymentSchedule::Signalled { start_time, timeout } => {
                if start_time < 0 {
                    return Err(ParamsError::DeploymentBadStart {
                        deployment: pos.name(),
                        start_time,
                    });
                }
                if timeout <= start_time {
                    return Err(ParamsError::DeploymentTimeoutBeforeStart {
                        deployment: pos.name(),
                        start_time,
                        timeout,
                    });
                }
                Ok(())
            }
        }
    }
}

impl Default for Bip9Deployment {
    fn default() -> Self {
        Self::never_active(28)
    }
}
