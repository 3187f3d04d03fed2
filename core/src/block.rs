use bitcoin::consensus::encode::{self, VarInt};
use bitcoin::Block;

use crate::constants::{MINIMUM_WITNESS_COMMITMENT, WITNESS_COMMITMENT_HEADER, WITNESS_SCALE_FACTOR};
use crate::transaction::{has_witness, serialize_transaction, weight_from_sizes, SerializeWitness};

/// Serializes a block, optionally with every transaction in the legacy witness-free format.
pub fn serialize_block(block: &Block, witness: SerializeWitness) -> Vec<u8> {
    let mut bytes = encode::serialize(&block.header);
    bytes.extend(encode::serialize(&VarInt::from(block.txdata.len())));
    for tx in &block.txdata {
        bytes.extend(serialize_transaction(tx, witness));
    }
    bytes
}

pub fn get_block_weight(block: &Block) -> u64 {
    weight_from_sizes(
        serialize_block(block, SerializeWitness::Exclude).len(),
        serialize_block(block, SerializeWitness::Include).len(),
        WITNESS_SCALE_FACTOR,
    )
}

/// Index of the witness commitment output of the coinbase, if any
///
/// The commitment is in the last output whose script starts with the
/// commitment header, so every output is scanned.
pub fn get_witness_commitment_index(block: &Block) -> Option<usize> {
    let coinbase = block.txdata.first()?;
    let mut commitment_pos = None;
    for (index, output) in coinbase.output.iter().enumerate() {
        let script = output.script_pubkey.as_bytes();
        if script.len() >= MINIMUM_WITNESS_COMMITMENT
            && script[..WITNESS_COMMITMENT_HEADER.len()] == WITNESS_COMMITMENT_HEADER
        {
            commitment_pos = Some(index);
        }
    }
    commitment_pos
}

/// The 32 byte commitment hash carried by the witness commitment output.
pub fn witness_commitment(block: &Block) -> Option<[u8; 32]> {
    let index = get_witness_commitment_index(block)?;
    let script = block.txdata[0].output[index].script_pubkey.as_bytes();
    let start = WITNESS_COMMITMENT_HEADER.len();
    script[start..start + 32].try_into().ok()
}

/// True if any transaction, the coinbase included, carries witness data.
pub fn has_witness_data(block: &Block) -> bool {
    block.txdata.iter().any(has_witness)
}
