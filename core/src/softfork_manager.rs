use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::deployments::BuriedDeployment;
use crate::params::{ConsensusParams, HeightGate};

/// Which height-gated rules apply to a block at a given height.
#[derive(Serialize, Deserialize, Eq, PartialEq, Clone, Debug, Default, BorshDeserialize, BorshSerialize)]
pub struct SoftforkFlags {
    pub height: u32,
    pub bip34: bool,
    pub bip65: bool,
    pub bip66: bool,
    pub csv: bool,
    pub segwit: bool,
    pub qip5: bool,
    pub qip6: bool,
    pub qip7: bool,
    pub qip9: bool,
    pub reduce_blocktime: bool,
    pub muir_glacier: bool,
    pub london: bool,
    pub header_signature: bool,
}

impl SoftforkFlags {
    pub fn at_height(params: &ConsensusParams, height: u32) -> Self {
        let gate = |g: HeightGate| params.is_height_gate_active(g, height);
        Self {
            height,
            bip34: params.deployment_active_at(BuriedDeployment::HeightInCoinbase, height),
            bip65: params.deployment_active_at(BuriedDeployment::Cltv, height),
            bip66: params.deployment_active_at(BuriedDeployment::DerSig, height),
            csv: params.deployment_active_at(BuriedDeployment::Csv, height),
            segwit: params.deployment_active_at(BuriedDeployment::Segwit, height),
            qip5: gate(HeightGate::Qip5),
            qip6: gate(HeightGate::Qip6),
            qip7: gate(HeightGate::Qip7),
            qip9: gate(HeightGate::Qip9),
            reduce_blocktime: gate(HeightGate::ReduceBlocktime),
            muir_glacier: gate(HeightGate::MuirGlacier),
            london: gate(HeightGate::London),
            header_signature: gate(HeightGate::EnableHeaderSignature),
        }
    }

    pub fn is_active(&self, dep: BuriedDeployment) -> bool {
        match dep {
            BuriedDeployment::HeightInCoinbase => self.bip34,
            BuriedDeployment::Cltv => self.bip65,
            BuriedDeployment::DerSig => self.bip66,
            BuriedDeployment::Csv => self.csv,
            BuriedDeployment::Segwit => self.segwit,
        }
    }

    pub fn is_segwit_active(&self) -> bool {
        self.segwit
    }

    pub fn is_reduce_blocktime_active(&self) -> bool {
        self.reduce_blocktime
    }
}
