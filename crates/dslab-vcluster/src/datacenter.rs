//! Datacenter: hosts, VMs and the commit of placement decisions.

use std::collections::{BTreeMap, HashMap};

use log::{debug, trace, warn};

use crate::config::{CatalogConfig, DatacenterConfig};
use crate::error::{AllocationError, ConfigError};
use crate::host::Host;
use crate::pe::{uniform_pes, Pe};
use crate::trace::{HostVerdict, PlacementTrace, TraceLog};
use crate::vm::{VirtualMachine, VmStatus};
use crate::vm_allocation_policy::{placement_policy_resolver, VmAllocationPolicy};

/// Keeps hosts and VMs, selects hosts for VMs with the allocation policy and commits the selection.
///
/// Time is not modeled here: the caller decides when VMs are placed, released or migrated.
pub struct Datacenter {
    hosts: Vec<Host>,
    vms: BTreeMap<u32, VirtualMachine>,
    vm_locations: HashMap<u32, u32>,
    policy: Box<dyn VmAllocationPolicy>,
    trace_log: TraceLog,
}

impl Datacenter {
    pub fn new(policy: Box<dyn VmAllocationPolicy>) -> Self {
        Self {
            hosts: Vec::new(),
            vms: BTreeMap::new(),
            vm_locations: HashMap::new(),
            policy,
            trace_log: TraceLog::new(),
        }
    }

    /// Creates datacenter with hosts and policy from the config.
    pub fn from_config(config: &DatacenterConfig) -> Result<Self, ConfigError> {
        let mut datacenter = Self::new(placement_policy_resolver(&config.placement_policy)?);
        for host_config in &config.hosts {
            for name in host_config.host_names()? {
                datacenter.add_host(
                    &name,
                    uniform_pes(host_config.pes, host_config.pe_mips),
                    &host_config.catalog,
                )?;
            }
        }
        Ok(datacenter)
    }

    /// Adds host, returns its ID.
    pub fn add_host(&mut self, name: &str, pes: Vec<Pe>, catalog: &CatalogConfig) -> Result<u32, ConfigError> {
        if pes.is_empty() {
            return Err(ConfigError::InvalidHost(format!("host {} has no PEs", name)));
        }
        let id = self.hosts.len() as u32;
        self.hosts.push(Host::new(id, name, pes, catalog)?);
        debug!("host #{} ({}) added", id, name);
        Ok(id)
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn host(&self, host_id: u32) -> Option<&Host> {
        self.hosts.get(host_id as usize)
    }

    pub fn host_by_name(&self, name: &str) -> Option<&Host> {
        self.hosts.iter().find(|host| host.name == name)
    }

    fn host_mut(&mut self, host_id: u32) -> Result<&mut Host, AllocationError> {
        self.hosts
            .get_mut(host_id as usize)
            .ok_or(AllocationError::HostNotFound(host_id))
    }

    /// Activates or deactivates host. VMs of a deactivated host keep running, but no new VMs are placed there.
    pub fn set_host_active(&mut self, host_id: u32, active: bool) -> Result<(), AllocationError> {
        let host = self.host_mut(host_id)?;
        host.set_active(active);
        if !active && host.footprint() > 0 {
            warn!("host #{} is deactivated while running VMs", host_id);
        } else {
            debug!("host #{} is {}", host_id, if active { "activated" } else { "deactivated" });
        }
        Ok(())
    }

    /// Marks host core as failed or recovers it.
    pub fn set_pe_failed(&mut self, host_id: u32, pe_id: u32, failed: bool) -> Result<bool, AllocationError> {
        let host = self.host_mut(host_id)?;
        let found = host.set_pe_failed(pe_id, failed);
        if found && host.footprint() > host.working_pes_number() as u64 {
            warn!(
                "host #{} is overloaded: footprint {} exceeds {} working PEs",
                host_id,
                host.footprint(),
                host.working_pes_number()
            );
        }
        Ok(found)
    }

    /// Registers VM waiting for placement.
    pub fn add_vm(&mut self, vm: VirtualMachine) -> Result<(), AllocationError> {
        if self.vms.contains_key(&vm.id) {
            return Err(AllocationError::VmAlreadyExists(vm.id));
        }
        self.vms.insert(vm.id, vm);
        Ok(())
    }

    pub fn vm(&self, vm_id: u32) -> Option<&VirtualMachine> {
        self.vms.get(&vm_id)
    }

    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.vms.values()
    }

    /// Returns ID of host where the VM is allocated.
    pub fn vm_location(&self, vm_id: u32) -> Option<u32> {
        self.vm_locations.get(&vm_id).copied()
    }

    /// Removes finished VMs from the registry, returns their number.
    ///
    /// Finished VMs are kept until this is called.
    pub fn remove_finished_vms(&mut self) -> usize {
        let before = self.vms.len();
        self.vms.retain(|_, vm| vm.status() != VmStatus::Finished);
        before - self.vms.len()
    }

    /// Traces of all placements made so far. The log is never truncated automatically, use
    /// [`TraceLog::clear`] on [`Self::trace_log_mut`] to drop saved traces.
    pub fn trace_log(&self) -> &TraceLog {
        &self.trace_log
    }

    pub fn trace_log_mut(&mut self) -> &mut TraceLog {
        &mut self.trace_log
    }

    /// Runs host selection for the VM without allocating it.
    pub fn find_host_for_vm(&self, vm_id: u32) -> Result<PlacementTrace, AllocationError> {
        let vm = self.vms.get(&vm_id).ok_or(AllocationError::VmNotFound(vm_id))?;
        Ok(self.policy.select_host(vm, &self.hosts))
    }

    /// Selects host for the pending VM and allocates the VM there. Returns ID of the selected host.
    ///
    /// A VM which failed to be placed can be placed again later.
    pub fn place_vm(&mut self, vm_id: u32) -> Result<u32, AllocationError> {
        let vm = self.vms.get(&vm_id).ok_or(AllocationError::VmNotFound(vm_id))?;
        if !matches!(vm.status(), VmStatus::Pending | VmStatus::FailedToAllocate) {
            return Err(AllocationError::InvalidVmStatus {
                vm_id,
                status: vm.status(),
            });
        }
        let placement = self.policy.select_host(vm, &self.hosts);
        log_placement(&placement);
        let selected = placement.result();
        self.trace_log.push(placement);

        let vm = self.vms.get_mut(&vm_id).ok_or(AllocationError::VmNotFound(vm_id))?;
        let result = match selected {
            Ok(host_id) => match self.hosts.get_mut(host_id as usize) {
                Some(host) => host.allocate(vm).map(|_| host_id),
                None => Err(AllocationError::HostNotFound(host_id)),
            },
            Err(e) => Err(e),
        };
        match result {
            Ok(host_id) => {
                vm.set_status(VmStatus::Running);
                self.vm_locations.insert(vm_id, host_id);
                debug!("vm #{} allocated on host #{}", vm_id, host_id);
                Ok(host_id)
            }
            Err(e) => {
                vm.set_status(VmStatus::FailedToAllocate);
                debug!("failed to allocate vm #{}: {}", vm_id, e);
                Err(e)
            }
        }
    }

    /// Releases host resources of the finished VM. Returns the change of host footprint.
    pub fn release_vm(&mut self, vm_id: u32) -> Result<i64, AllocationError> {
        let vm = self.vms.get_mut(&vm_id).ok_or(AllocationError::VmNotFound(vm_id))?;
        let host_id = match (vm.status(), self.vm_locations.get(&vm_id)) {
            (VmStatus::Running | VmStatus::Migrating, Some(&host_id)) => host_id,
            (status, _) => return Err(AllocationError::InvalidVmStatus { vm_id, status }),
        };
        let host = self
            .hosts
            .get_mut(host_id as usize)
            .ok_or(AllocationError::HostNotFound(host_id))?;
        let released = host.deallocate(vm)?;
        vm.set_in_migration(false);
        vm.set_status(VmStatus::Finished);
        self.vm_locations.remove(&vm_id);
        debug!(
            "release resources from vm #{} on host #{}, footprint decreased by {}",
            vm_id, host_id, released
        );
        Ok(released)
    }

    /// Moves running VM to the target host.
    ///
    /// The VM leaves its vCluster on the source host and joins the vCluster on the target host at once.
    /// Until [`Self::finish_migration`] is called it receives MIPS reduced by the target migration overhead.
    pub fn migrate_vm(&mut self, vm_id: u32, target_host_id: u32) -> Result<(), AllocationError> {
        let vm = self.vms.get_mut(&vm_id).ok_or(AllocationError::VmNotFound(vm_id))?;
        let source_host_id = match (vm.status(), self.vm_locations.get(&vm_id)) {
            (VmStatus::Running, Some(&host_id)) => host_id,
            (status, _) => return Err(AllocationError::InvalidVmStatus { vm_id, status }),
        };
        if source_host_id == target_host_id {
            return Err(AllocationError::AlreadyAllocated {
                vm_id,
                host_id: target_host_id,
            });
        }
        let target = self
            .hosts
            .get(target_host_id as usize)
            .ok_or(AllocationError::HostNotFound(target_host_id))?;
        if !target.is_active() {
            return Err(AllocationError::HostInactive(target_host_id));
        }
        if let Err(e) = target.engine().check_admission(vm) {
            debug!("vm #{} can't be migrated to host #{}: {}", vm_id, target_host_id, e);
            return Err(e);
        }

        self.hosts[source_host_id as usize].deallocate(vm)?;
        vm.set_in_migration(true);
        self.hosts[target_host_id as usize].allocate(vm)?;
        vm.set_status(VmStatus::Migrating);
        self.vm_locations.insert(vm_id, target_host_id);
        debug!(
            "vm #{} migrates from host #{} to host #{}",
            vm_id, source_host_id, target_host_id
        );
        Ok(())
    }

    /// Completes VM migration and restores the full MIPS share of the VM.
    pub fn finish_migration(&mut self, vm_id: u32) -> Result<(), AllocationError> {
        let vm = self.vms.get_mut(&vm_id).ok_or(AllocationError::VmNotFound(vm_id))?;
        let host_id = match (vm.status(), self.vm_locations.get(&vm_id)) {
            (VmStatus::Migrating, Some(&host_id)) => host_id,
            (status, _) => return Err(AllocationError::InvalidVmStatus { vm_id, status }),
        };
        vm.set_in_migration(false);
        self.hosts
            .get(host_id as usize)
            .ok_or(AllocationError::HostNotFound(host_id))?
            .update_allocated_mips(vm)?;
        vm.set_status(VmStatus::Running);
        debug!("vm #{} migration to host #{} is finished", vm_id, host_id);
        Ok(())
    }
}

fn log_placement(placement: &PlacementTrace) {
    trace!(
        "host selection for vm #{} with {} vCPU, ratio {}",
        placement.vm_id,
        placement.vm_pes,
        placement.ratio
    );
    for eval in &placement.evaluations {
        match eval.verdict {
            HostVerdict::Candidate { availability, size } => {
                trace!("host #{} available: {} size: {}", eval.host_id, availability, size)
            }
            HostVerdict::Unsuitable { footprint, capacity } => {
                trace!("host #{} is full: footprint {} of {}", eval.host_id, footprint, capacity)
            }
            HostVerdict::Inactive => trace!("host #{} is inactive", eval.host_id),
            HostVerdict::UnknownRatio => {
                trace!("host #{} does not support ratio {}", eval.host_id, placement.ratio)
            }
        }
    }
    debug!("vm #{} placement decision: {:?}", placement.vm_id, placement.decision);
}
