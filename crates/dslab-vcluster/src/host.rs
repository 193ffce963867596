//! Physical host and its suitability check.

use serde::Serialize;

use crate::allocation_engine::AllocationEngine;
use crate::common::MipsShare;
use crate::config::CatalogConfig;
use crate::error::{AllocationError, ConfigError};
use crate::pe::Pe;
use crate::vm::Oversubscribable;

/// Result of checking whether a host has enough resources of each kind for a VM.
///
/// Storage, memory and bandwidth are not modeled and are always reported as sufficient.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HostSuitability {
    pub for_storage: bool,
    pub for_ram: bool,
    pub for_bw: bool,
    pub for_pes: bool,
}

impl HostSuitability {
    pub fn fully_suitable(&self) -> bool {
        self.for_storage && self.for_ram && self.for_bw && self.for_pes
    }
}

/// Physical machine which runs VMs on its cores according to the oversubscription catalog.
#[derive(Clone, Debug)]
pub struct Host {
    pub id: u32,
    pub name: String,
    active: bool,
    engine: AllocationEngine,
}

impl Host {
    pub fn new(id: u32, name: &str, pes: Vec<Pe>, catalog: &CatalogConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            id,
            name: name.to_string(),
            active: true,
            engine: AllocationEngine::new(id, pes, catalog)?,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn engine(&self) -> &AllocationEngine {
        &self.engine
    }

    pub fn pes(&self) -> &[Pe] {
        self.engine.pes()
    }

    pub fn working_pes_number(&self) -> u32 {
        self.engine.working_pes_number()
    }

    /// Checks whether the VM fits the host.
    /// Fails only if the VM ratio is not in the host catalog.
    pub fn suitability_for(&self, vm: &dyn Oversubscribable) -> Result<HostSuitability, AllocationError> {
        Ok(HostSuitability {
            for_storage: true,
            for_ram: true,
            for_bw: true,
            for_pes: self.engine.is_admissible(vm)?,
        })
    }

    pub fn is_suitable_for(&self, vm: &dyn Oversubscribable) -> Result<bool, AllocationError> {
        Ok(self.suitability_for(vm)?.fully_suitable())
    }

    /// See [`AllocationEngine::availability_for`].
    pub fn availability_for(&self, ratio: f64) -> Option<i64> {
        self.engine.availability_for(ratio)
    }

    /// See [`AllocationEngine::size_for`].
    pub fn size_for(&self, ratio: f64) -> Option<u64> {
        self.engine.size_for(ratio)
    }

    pub fn footprint(&self) -> u64 {
        self.engine.footprint()
    }

    /// Allocates the VM with the MIPS it requests.
    pub fn allocate(&mut self, vm: &mut dyn Oversubscribable) -> Result<(), AllocationError> {
        let requested = vm.requested_mips().clone();
        self.allocate_with_share(vm, &requested)
    }

    pub fn allocate_with_share(
        &mut self,
        vm: &mut dyn Oversubscribable,
        requested_mips: &MipsShare,
    ) -> Result<(), AllocationError> {
        self.engine.allocate(vm, requested_mips)
    }

    /// Releases the VM, returns the number of cores freed.
    pub fn deallocate(&mut self, vm: &mut dyn Oversubscribable) -> Result<i64, AllocationError> {
        self.engine.deallocate(vm)
    }

    pub fn update_allocated_mips(&self, vm: &mut dyn Oversubscribable) -> Result<(), AllocationError> {
        self.engine.update_allocated_mips(vm)
    }

    pub fn set_pe_failed(&mut self, pe_id: u32, failed: bool) -> bool {
        self.engine.set_pe_failed(pe_id, failed)
    }
}
