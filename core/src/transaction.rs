// Transaction Weight
// ==================
//
// weight = stripped_size * (WITNESS_SCALE_FACTOR - 1) + total_size
//
// Both sizes come from actually serializing the transaction, once with the
// witness suppressed and once in full. As witness_size = total_size -
// stripped_size this is the BIP-141 formula stripped_size * 4 + witness_size.

use bitcoin::consensus::encode;
use bitcoin::{Transaction, TxIn};

use crate::constants::WITNESS_SCALE_FACTOR;

/// Whether witness data is written when serializing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SerializeWitness {
    Include,
    Exclude,
}

/// Serializes a transaction, optionally in the legacy witness-free format.
///
/// The extended format is only written when some input carries a witness,
/// so a transaction without inputs has no marker and flag bytes.
pub fn serialize_transaction(tx: &Transaction, witness: SerializeWitness) -> Vec<u8> {
    match witness {
        SerializeWitness::Include if has_witness(tx) => encode::serialize(tx),
        SerializeWitness::Include | SerializeWitness::Exclude => {
            // TxIn never carries its witness; it is written in a separate section.
            let mut bytes = encode::serialize(&tx.version);
            bytes.extend(encode::serialize(&tx.input));
            bytes.extend(encode::serialize(&tx.output));
            bytes.extend(encode::serialize(&tx.lock_time));
            bytes
        }
    }
}

pub fn weight_from_sizes(stripped_size: usize, total_size: usize, scale_factor: u64) -> u64 {
    stripped_size as u64 * scale_factor.saturating_sub(1) + total_size as u64
}

pub fn get_transaction_weight(tx: &Transaction) -> u64 {
    weight_from_sizes(
        serialize_transaction(tx, SerializeWitness::Exclude).len(),
        serialize_transaction(tx, SerializeWitness::Include).len(),
        WITNESS_SCALE_FACTOR,
    )
}

/// Weight of a single input. The witness stack size is added separately
/// because inputs and witnesses are serialized in disjoint sections.
pub fn get_transaction_input_weight(txin: &TxIn) -> u64 {
    let input_size = encode::serialize(txin).len();
    let witness_size = encode::serialize(&txin.witness).len();
    weight_from_sizes(input_size, input_size, WITNESS_SCALE_FACTOR) + witness_size as u64
}

/// True if any input carries witness data.
pub fn has_witness(tx: &Transaction) -> bool {
    tx.input.iter().any(|input| !input.witness.is_empty())
}
