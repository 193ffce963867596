//! Per-core MIPS shares.

use serde::{Deserialize, Serialize};

/// MIPS requested or granted for each virtual core of a VM.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MipsShare(Vec<f64>);

impl MipsShare {
    pub fn new(mips: Vec<f64>) -> Self {
        Self(mips)
    }

    /// Creates share of `pes` virtual cores with the same capacity.
    pub fn uniform(pes: u32, mips: f64) -> Self {
        Self(vec![mips; pes as usize])
    }

    pub fn pes(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn mips(&self) -> &[f64] {
        &self.0
    }

    pub fn total_mips(&self) -> f64 {
        self.0.iter().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the share with every value multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self(self.0.iter().map(|mips| mips * factor).collect())
    }
}
