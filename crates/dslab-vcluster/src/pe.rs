//! Physical processing elements (cores) of a host.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PeStatus {
    Free,
    Busy,
    Failed,
}

/// Physical core with fixed MIPS capacity.
#[derive(Clone, Debug, Serialize)]
pub struct Pe {
    pub id: u32,
    pub mips: f64,
    pub status: PeStatus,
}

impl Pe {
    pub fn new(id: u32, mips: f64) -> Self {
        Self {
            id,
            mips,
            status: PeStatus::Free,
        }
    }

    pub fn is_working(&self) -> bool {
        self.status != PeStatus::Failed
    }
}

/// Creates `count` cores with identical capacity, numbered from zero.
pub fn uniform_pes(count: u32, mips: f64) -> Vec<Pe> {
    (0..count).map(|id| Pe::new(id, mips)).collect()
}
