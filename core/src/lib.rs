//! Consensus parameters and validation state of the Globe network.
//!
//! The crate resolves which rule set applies at a given block height or
//! time, and carries the verdict of a transaction or block validation pass.

pub mod amount;
pub mod block;
pub mod constants;
pub mod deployments;
pub mod limits;
pub mod params;
pub mod softfork_manager;
pub mod transaction;
pub mod validation;

pub use amount::{money_range, Amount, COIN, MAX_MONEY};
pub use deployments::{Bip9Deployment, BuriedDeployment, Deployment, DeploymentPos};
pub use limits::BlockSizeLimits;
pub use params::{ConsensusParams, ForkGated, HeightGate, Network, TimeGate, NETWORK_PARAMS};
pub use softfork_manager::SoftforkFlags;
pub use validation::{
    BlockValidationResult, BlockValidationState, TxValidationResult, TxValidationState,
    ValidationMode, ValidationResult, ValidationState,
};
