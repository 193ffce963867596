//! Oversubscription-aware allocation of host cores to VMs.

use crate::cluster::{ClusterTracker, VCluster};
use crate::common::MipsShare;
use crate::config::CatalogConfig;
use crate::error::{AllocationError, ConfigError};
use crate::pe::{Pe, PeStatus};
use crate::vm::Oversubscribable;

/// Performs admission control and accounting of host cores for VMs grouped into vClusters.
///
/// VMs declaring the same oversubscription ratio form a vCluster. Once a vCluster has at least
/// `critical_mass` members, it is charged `ceil(raw_demand / ratio)` cores, otherwise it is charged
/// its raw demand. The sum of these charges is the host footprint, which must not exceed the number
/// of working cores.
///
/// Each host owns its own engine. The engine is not synchronized: a caller sharing hosts between threads
/// must hold a per-host lock from the admission check until the allocation is done.
#[derive(Clone, Debug)]
pub struct AllocationEngine {
    host_id: u32,
    pes: Vec<Pe>,
    clusters: ClusterTracker,
    critical_mass: u32,
    migration_overhead: f64,
}

impl AllocationEngine {
    pub fn new(host_id: u32, pes: Vec<Pe>, catalog: &CatalogConfig) -> Result<Self, ConfigError> {
        catalog.validate()?;
        Ok(Self {
            host_id,
            pes,
            clusters: ClusterTracker::new(&catalog.ratios),
            critical_mass: catalog.critical_mass,
            migration_overhead: catalog.migration_overhead,
        })
    }

    pub fn pes(&self) -> &[Pe] {
        &self.pes
    }

    /// Returns the number of cores which are not failed.
    pub fn working_pes_number(&self) -> u32 {
        self.pes.iter().filter(|pe| pe.is_working()).count() as u32
    }

    pub fn critical_mass(&self) -> u32 {
        self.critical_mass
    }

    pub fn migration_overhead(&self) -> f64 {
        self.migration_overhead
    }

    pub fn ratios(&self) -> impl Iterator<Item = f64> + '_ {
        self.clusters.ratios()
    }

    pub fn cluster(&self, ratio: f64) -> Option<&VCluster> {
        self.clusters.cluster(ratio)
    }

    pub fn is_allocated(&self, vm_id: u32) -> bool {
        self.clusters.find(vm_id).is_some()
    }

    /// Returns the number of cores currently charged for all vClusters.
    pub fn footprint(&self) -> u64 {
        self.clusters.footprint(self.critical_mass, None)
    }

    /// Returns the footprint the host would have after allocating the VM.
    pub fn footprint_with(&self, vm: &dyn Oversubscribable) -> Result<u64, AllocationError> {
        self.check_ratio(vm)?;
        Ok(self
            .clusters
            .footprint(self.critical_mass, Some((vm.oversubscription_ratio(), vm.pes_number()))))
    }

    /// Checks whether the VM can be allocated without exceeding the number of working cores.
    pub fn is_admissible(&self, vm: &dyn Oversubscribable) -> Result<bool, AllocationError> {
        Ok(self.footprint_with(vm)? <= self.working_pes_number() as u64)
    }

    /// Same as [`Self::is_admissible`], but reports rejection as an error with the resulting footprint.
    pub fn check_admission(&self, vm: &dyn Oversubscribable) -> Result<(), AllocationError> {
        let footprint = self.footprint_with(vm)?;
        let capacity = self.working_pes_number();
        if footprint > capacity as u64 {
            return Err(AllocationError::AdmissionRejected {
                vm_id: vm.id(),
                host_id: self.host_id,
                footprint,
                capacity,
            });
        }
        Ok(())
    }

    /// Allocates cores for the VM and registers it in the vCluster of its ratio.
    ///
    /// The VM is granted `requested_mips`, reduced by the migration overhead if the VM is migrating.
    /// On failure the engine and the VM stay unchanged.
    pub fn allocate(
        &mut self,
        vm: &mut dyn Oversubscribable,
        requested_mips: &MipsShare,
    ) -> Result<(), AllocationError> {
        if self.is_allocated(vm.id()) {
            return Err(AllocationError::AlreadyAllocated {
                vm_id: vm.id(),
                host_id: self.host_id,
            });
        }
        self.check_admission(vm)?;

        let share = self.mips_share_to_allocate(vm, requested_mips);
        vm.set_allocated_mips(share);
        self.clusters
            .register(vm.oversubscription_ratio(), vm.id(), vm.pes_number());
        self.update_pe_statuses();
        Ok(())
    }

    /// Removes the VM from its vCluster and clears its allocated MIPS share.
    ///
    /// Returns the change of footprint (before minus after). Because of rounding and the critical mass,
    /// it generally differs from the number of VM cores and can even be negative.
    pub fn deallocate(&mut self, vm: &mut dyn Oversubscribable) -> Result<i64, AllocationError> {
        self.check_ratio(vm)?;
        let before = self.footprint();
        if self
            .clusters
            .unregister(vm.oversubscription_ratio(), vm.id())
            .is_none()
        {
            return Err(AllocationError::NotAllocated {
                vm_id: vm.id(),
                host_id: self.host_id,
            });
        }
        let after = self.footprint();
        vm.set_allocated_mips(MipsShare::default());
        self.update_pe_statuses();
        Ok(before as i64 - after as i64)
    }

    /// Returns the number of cores left after placing one more single-core VM with the specified ratio.
    /// The value is negative if such a VM does not fit, `None` is returned for a ratio outside of the catalog.
    pub fn availability_for(&self, ratio: f64) -> Option<i64> {
        if !self.clusters.contains_ratio(ratio) {
            return None;
        }
        let footprint = self.clusters.footprint(self.critical_mass, Some((ratio, 1)));
        Some(self.working_pes_number() as i64 - footprint as i64)
    }

    /// Returns raw demand (vCPUs before oversubscription) of the vCluster with the specified ratio.
    pub fn size_for(&self, ratio: f64) -> Option<u64> {
        self.clusters.size_for(ratio)
    }

    /// Grants the share once more, e.g. when VM migration is finished.
    pub fn update_allocated_mips(&self, vm: &mut dyn Oversubscribable) -> Result<(), AllocationError> {
        if !self.is_allocated(vm.id()) {
            return Err(AllocationError::NotAllocated {
                vm_id: vm.id(),
                host_id: self.host_id,
            });
        }
        let share = self.mips_share_to_allocate(vm, vm.requested_mips());
        vm.set_allocated_mips(share);
        Ok(())
    }

    /// Marks the core as failed or recovers it, which changes the number of working cores.
    /// Returns false if there is no such core.
    pub fn set_pe_failed(&mut self, pe_id: u32, failed: bool) -> bool {
        match self.pes.iter_mut().find(|pe| pe.id == pe_id) {
            Some(pe) => {
                pe.status = if failed { PeStatus::Failed } else { PeStatus::Free };
                self.update_pe_statuses();
                true
            }
            None => false,
        }
    }

    /// Returns the share granted to the VM, reduced if the VM is migrating.
    pub fn mips_share_to_allocate(&self, vm: &dyn Oversubscribable, requested_mips: &MipsShare) -> MipsShare {
        if vm.is_in_migration() {
            requested_mips.scaled(1. - self.migration_overhead)
        } else {
            requested_mips.clone()
        }
    }

    fn check_ratio(&self, vm: &dyn Oversubscribable) -> Result<(), AllocationError> {
        if self.clusters.contains_ratio(vm.oversubscription_ratio()) {
            Ok(())
        } else {
            Err(AllocationError::UnknownRatio {
                vm_id: vm.id(),
                host_id: self.host_id,
                ratio: vm.oversubscription_ratio(),
            })
        }
    }

    // The first `footprint` working cores are busy.
    fn update_pe_statuses(&mut self) {
        let mut busy = self.footprint();
        for pe in self.pes.iter_mut().filter(|pe| pe.is_working()) {
            pe.status = if busy > 0 { PeStatus::Busy } else { PeStatus::Free };
            busy = busy.saturating_sub(1);
        }
    }
}
