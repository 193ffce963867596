//! Representations of virtual machine and its status.

use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::common::MipsShare;

/// Status of virtual machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum VmStatus {
    Pending,
    Running,
    Migrating,
    Finished,
    FailedToAllocate,
}

impl Display for VmStatus {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            VmStatus::Pending => write!(f, "pending"),
            VmStatus::Running => write!(f, "running"),
            VmStatus::Migrating => write!(f, "migrating"),
            VmStatus::Finished => write!(f, "finished"),
            VmStatus::FailedToAllocate => write!(f, "failed_to_allocate"),
        }
    }
}

/// Capabilities of a VM needed for oversubscription-aware allocation.
///
/// Allocation engine and placement policies depend only on this trait, so any VM representation
/// can be placed as long as it declares an oversubscription ratio and accepts the granted MIPS share.
pub trait Oversubscribable {
    fn id(&self) -> u32;

    /// Number of requested virtual cores.
    fn pes_number(&self) -> u32;

    /// Declared oversubscription ratio, 1.0 means no oversubscription.
    fn oversubscription_ratio(&self) -> f64;

    fn requested_mips(&self) -> &MipsShare;

    fn allocated_mips(&self) -> &MipsShare;

    fn set_allocated_mips(&mut self, share: MipsShare);

    fn is_in_migration(&self) -> bool;
}

/// Represents virtual machine (VM).
#[derive(Clone, Debug, Serialize)]
pub struct VirtualMachine {
    pub id: u32,
    oversubscription_ratio: f64,
    requested_mips: MipsShare,
    allocated_mips: MipsShare,
    in_migration: bool,
    status: VmStatus,
}

impl VirtualMachine {
    /// Creates VM with `pes` virtual cores of `mips` capacity each.
    pub fn new(id: u32, pes: u32, mips: f64, oversubscription_ratio: f64) -> Self {
        Self::with_requested_mips(id, MipsShare::uniform(pes, mips), oversubscription_ratio)
    }

    /// Creates VM with arbitrary per-core MIPS request.
    pub fn with_requested_mips(id: u32, requested_mips: MipsShare, oversubscription_ratio: f64) -> Self {
        Self {
            id,
            oversubscription_ratio,
            requested_mips,
            allocated_mips: MipsShare::default(),
            in_migration: false,
            status: VmStatus::Pending,
        }
    }

    pub fn status(&self) -> VmStatus {
        self.status
    }

    pub fn set_status(&mut self, status: VmStatus) {
        self.status = status;
    }

    pub fn set_in_migration(&mut self, in_migration: bool) {
        self.in_migration = in_migration;
    }
}

impl Oversubscribable for VirtualMachine {
    fn id(&self) -> u32 {
        self.id
    }

    fn pes_number(&self) -> u32 {
        self.requested_mips.pes()
    }

    fn oversubscription_ratio(&self) -> f64 {
        self.oversubscription_ratio
    }

    fn requested_mips(&self) -> &MipsShare {
        &self.requested_mips
    }

    fn allocated_mips(&self) -> &MipsShare {
        &self.allocated_mips
    }

    fn set_allocated_mips(&mut self, share: MipsShare) {
        self.allocated_mips = share;
    }

    fn is_in_migration(&self) -> bool {
        self.in_migration
    }
}
