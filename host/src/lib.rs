use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use bitcoin::{Block, Transaction};
use borsh::BorshDeserialize;
use globe_consensus_core::block::{
    get_block_weight, get_witness_commitment_index, has_witness_data, witness_commitment,
};
use globe_consensus_core::constants::MAX_TRANSACTION_BASE_SIZE;
use globe_consensus_core::deployments::{BuriedDeployment, DeploymentPos, DeploymentSchedule};
use globe_consensus_core::limits::BlockSizeLimits;
use globe_consensus_core::params::{ConsensusParams, HeightGate, Network};
use globe_consensus_core::softfork_manager::SoftforkFlags;
use globe_consensus_core::transaction::{get_transaction_weight, serialize_transaction, SerializeWitness};
use globe_consensus_core::validation::{
    ActivationSnapshot, BalanceError, BlockValidationResult, BlockValidationState, ChainView, Flow,
    PassFlags, TxValidationResult, TxValidationState, ValidationVerdict, ValueCategory,
};
use globe_consensus_core::Amount;
use serde::Serialize;
use tracing::{debug, info, warn};

pub mod config;

// Parse a block from a binary file
pub fn parse_block_from_file(file_path: impl AsRef<Path>) -> Result<Block> {
    let file_path = file_path.as_ref();
    info!("Parsing block from file: {}", file_path.display());
    let mut file = File::open(file_path)
        .with_context(|| format!("cannot open block file {}", file_path.display()))?;
    let mut buffer = Vec::new();
    file.read_to_end(&mut buffer)?;
    info!("  Read {} bytes from file", buffer.len());
    let block: Block = bitcoin::consensus::deserialize(&buffer)
        .with_context(|| format!("{} is not a consensus-encoded block", file_path.display()))?;
    info!("  Block parsed successfully:");
    info!("    Hash: {}", block.block_hash());
    info!("    Previous block: {}", block.header.prev_blockhash);
    info!("    Timestamp: {}", block.header.time);
    info!("    Transaction count: {}", block.txdata.len());
    Ok(block)
}

/// The chain as seen by an inspected block: it sits directly on top of the tip.
struct InspectedTip {
    height: u32,
    time: i64,
}

impl ChainView for InspectedTip {
    fn tip_height(&self) -> Option<u32> {
        self.height.checked_sub(1)
    }

    fn median_time_past(&self) -> i64 {
        self.time
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct TxReport {
    pub txid: String,
    pub weight: u64,
    pub base_size: usize,
    pub value_out: Amount,
    pub verdict: ValidationVerdict<TxValidationResult>,
}

#[derive(Serialize, Debug, Clone)]
pub struct BlockReport {
    pub block_hash: String,
    pub network: Network,
    pub height: u32,
    pub time: i64,
    pub weight: u64,
    pub max_block_weight: u64,
    pub segwit_active: bool,
    pub has_witness_data: bool,
    pub witness_commitment: Option<String>,
    pub snapshot: ActivationSnapshot,
    pub verdict: ValidationVerdict<BlockValidationResult>,
    pub transactions: Vec<TxReport>,
}

/// Runs the context-free block checks and the per-transaction size and
/// value checks against `params` as of `height` and `time`.
pub fn inspect_block(
    params: &ConsensusParams,
    limits: &BlockSizeLimits,
    block: &Block,
    height: u32,
    time: i64,
) -> BlockReport {
    let tip = InspectedTip { height, time };
    let mut state = BlockValidationState::new();
    state.set_chain(&tip);
    state.set_state_info(
        time,
        Some(height),
        params,
        PassFlags {
            in_block: true,
            ..PassFlags::default()
        },
    );

    let softforks = SoftforkFlags::at_height(params, height);
    let weight = get_block_weight(block);
    let witness_present = has_witness_data(block);

    if block.txdata.is_empty() {
        state.invalid(BlockValidationResult::Consensus, "bad-blk-length", "size limits failed");
    } else if weight > limits.max_block_weight {
        state.invalid(
            BlockValidationResult::Consensus,
            "bad-blk-weight",
            format!("weight limit failed: {weight} > {}", limits.max_block_weight),
        );
    } else {
        check_witness(&mut state, block, softforks.is_segwit_active(), witness_present);
    }

    let mut transactions = Vec::with_capacity(block.txdata.len());
    for tx in &block.txdata {
        let mut tx_state = TxValidationState::new();
        tx_state.copy_state_info(&state);
        let report = check_transaction(&mut tx_state, tx, limits);
        if state.is_valid() && tx_state.result() == TxValidationResult::Consensus {
            state.invalid(
                BlockValidationResult::Consensus,
                tx_state.reject_reason().to_string(),
                format!("transaction {} failed: {}", report.txid, tx_state),
            );
        }
        transactions.push(report);
    }

    if state.is_valid() {
        info!(height, weight, txs = block.txdata.len(), "block passed inspection");
    } else {
        warn!(height, reason = %state, "block failed inspection");
    }

    BlockReport {
        block_hash: block.block_hash().to_string(),
        network: params.network,
        height,
        time,
        weight,
        max_block_weight: limits.max_block_weight,
        segwit_active: softforks.is_segwit_active(),
        has_witness_data: witness_present,
        witness_commitment: witness_commitment(block).map(hex::encode),
        snapshot: *state.info(),
        verdict: state.verdict(),
        transactions,
    }
}

fn check_witness(state: &mut BlockValidationState<'_>, block: &Block, segwit_active: bool, has_witness_data: bool) {
    if segwit_active && get_witness_commitment_index(block).is_some() {
        let nonce_ok = block.txdata[0].input.first().is_some_and(|input| {
            input.witness.len() == 1 && input.witness.nth(0).is_some_and(|nonce| nonce.len() == 32)
        });
        if !nonce_ok {
            state.invalid(
                BlockValidationResult::Mutated,
                "bad-witness-nonce-size",
                "invalid witness reserved value size",
            );
        } else if !block.check_witness_commitment() {
            state.invalid(
                BlockValidationResult::Mutated,
                "bad-witness-merkle-match",
                "witness merkle commitment mismatch",
            );
        }
        return;
    }
    if has_witness_data {
        state.invalid(
            BlockValidationResult::Mutated,
            "unexpected-witness",
            "unexpected witness data found",
        );
    }
}

fn check_transaction(state: &mut TxValidationState<'_>, tx: &Transaction, limits: &BlockSizeLimits) -> TxReport {
    let txid = tx.compute_txid().to_string();
    let weight = get_transaction_weight(tx);
    let base_size = serialize_transaction(tx, SerializeWitness::Exclude).len();

    if weight < limits.min_transaction_weight() {
        state.invalid(
            TxValidationResult::Consensus,
            "bad-txns-undersize",
            format!("weight {weight} below {}", limits.min_transaction_weight()),
        );
    } else if tx.input.is_empty() {
        state.invalid(TxValidationResult::Consensus, "bad-txns-vin-empty", "");
    } else if tx.output.is_empty() {
        state.invalid(TxValidationResult::Consensus, "bad-txns-vout-empty", "");
    } else if base_size > MAX_TRANSACTION_BASE_SIZE {
        state.invalid(
            TxValidationResult::Consensus,
            "bad-txns-oversize",
            format!("base size {base_size} above {MAX_TRANSACTION_BASE_SIZE}"),
        );
    } else {
        for output in &tx.output {
            let value = Amount::try_from(output.value.to_sat()).unwrap_or(Amount::MAX);
            match state.balances.add(ValueCategory::Plain, Flow::Out, value) {
                Ok(()) => {}
                Err(err @ BalanceError::OutOfRange(_)) => {
                    state.invalid(TxValidationResult::Consensus, "bad-txns-vout-toolarge", err.to_string());
                    break;
                }
                Err(err @ BalanceError::Overflow { .. }) => {
                    state.invalid(
                        TxValidationResult::Consensus,
                        "bad-txns-txouttotal-toolarge",
                        err.to_string(),
                    );
                    break;
                }
            }
        }
    }
    debug!(%txid, weight, base_size, verdict = %state, "checked transaction");

    TxReport {
        txid,
        weight,
        base_size,
        value_out: state.balances.total(ValueCategory::Plain, Flow::Out),
        verdict: state.verdict(),
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ParamsReport {
    pub network: Network,
    pub height: u32,
    pub target_spacing: i64,
    pub target_timespan: i64,
    pub difficulty_adjustment_interval: i64,
    pub subsidy_halving_interval: u32,
    pub subsidy_halving_weight: u64,
    pub blocktime_downscale_factor: u32,
    pub timestamp_downscale_factor: u32,
    pub stake_timestamp_mask: u32,
    pub checkpoint_span: u32,
    pub coinbase_maturity: u32,
    pub pow_limit: String,
    pub pos_limit: String,
    pub softforks: SoftforkFlags,
    pub active_height_gates: Vec<&'static str>,
}

pub fn resolve_params(params: &ConsensusParams, height: u32) -> ParamsReport {
    ParamsReport {
        network: params.network,
        height,
        target_spacing: params.target_spacing(height),
        target_timespan: params.target_timespan(height),
        difficulty_adjustment_interval: params.difficulty_adjustment_interval(height),
        subsidy_halving_interval: params.subsidy_halving_interval(height),
        subsidy_halving_weight: params.subsidy_halving_weight(height),
        blocktime_downscale_factor: params.blocktime_downscale_factor(height),
        timestamp_downscale_factor: params.timestamp_downscale_factor(height),
        stake_timestamp_mask: params.stake_timestamp_mask(height),
        checkpoint_span: params.checkpoint_span(height),
        coinbase_maturity: params.coinbase_maturity(height),
        pow_limit: format!("{:x}", params.pow_limit_for(height, false)),
        pos_limit: format!("{:x}", params.pow_limit_for(height, true)),
        softforks: SoftforkFlags::at_height(params, height),
        active_height_gates: HeightGate::ALL
            .into_iter()
            .filter(|gate| params.is_height_gate_active(*gate, height))
            .map(HeightGate::name)
            .collect(),
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct BuriedDeploymentReport {
    pub name: &'static str,
    pub ordinal: i16,
    pub height: u32,
}

#[derive(Serialize, Debug, Clone)]
pub struct VersionedDeploymentReport {
    pub name: &'static str,
    pub ordinal: u16,
    pub bit: u8,
    pub mask: u32,
    pub schedule: DeploymentSchedule,
    pub min_activation_height: u32,
}

#[derive(Serialize, Debug, Clone)]
pub struct DeploymentsReport {
    pub network: Network,
    pub buried: Vec<BuriedDeploymentReport>,
    pub versioned: Vec<VersionedDeploymentReport>,
}

pub fn list_deployments(params: &ConsensusParams) -> DeploymentsReport {
    DeploymentsReport {
        network: params.network,
        buried: BuriedDeployment::ALL
            .into_iter()
            .map(|dep| BuriedDeploymentReport {
                name: dep.name(),
                ordinal: dep.ordinal(),
                height: params.deployment_height(dep),
            })
            .collect(),
        versioned: DeploymentPos::ALL
            .into_iter()
            .map(|pos| {
                let deployment = params.deployment(pos);
                VersionedDeploymentReport {
                    name: pos.name(),
                    ordinal: pos.ordinal(),
                    bit: deployment.bit,
                    mask: deployment.mask(),
                    schedule: deployment.schedule(),
                    min_activation_height: deployment.min_activation_height,
                }
            })
            .collect(),
    }
}

/// Appends the block verdict to a borsh-encoded log of `(height, verdict)` records.
pub fn append_verdict_log(path: impl AsRef<Path>, report: &BlockReport) -> Result<()> {
    let path = path.as_ref();
    let record = borsh::to_vec(&(report.height, &report.verdict))?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open verdict log {}", path.display()))?;
    file.write_all(&record)?;
    Ok(())
}

pub fn read_verdict_log(path: impl AsRef<Path>) -> Result<Vec<(u32, ValidationVerdict<BlockValidationResult>)>> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("cannot read verdict log {}", path.display()))?;
    let mut buf = bytes.as_slice();
    let mut records = Vec::new();
    while !buf.is_empty() {
        let record = <(u32, ValidationVerdict<BlockValidationResult>)>::deserialize(&mut buf)
            .with_context(|| format!("corrupt record {} in verdict log", records.len()))?;
        records.push(record);
    }
    Ok(records)
}
