//! First Fit policy.

use crate::host::Host;
use crate::trace::{HostVerdict, PlacementDecision, PlacementTrace, SelectionReason};
use crate::vm::Oversubscribable;
use crate::vm_allocation_policies::check_host;
use crate::vm_allocation_policy::VmAllocationPolicy;

/// Uses the first active suitable host.
#[derive(Default)]
pub struct FirstFit;

impl FirstFit {
    pub fn new() -> Self {
        Default::default()
    }
}

impl VmAllocationPolicy for FirstFit {
    fn select_host(&self, vm: &dyn Oversubscribable, hosts: &[Host]) -> PlacementTrace {
        let mut trace = PlacementTrace::new(vm);
        let ratio = vm.oversubscription_ratio();
        for host in hosts {
            if let Err(verdict) = check_host(vm, host) {
                trace.evaluate(host.id, verdict);
                continue;
            }
            trace.evaluate(
                host.id,
                HostVerdict::Candidate {
                    availability: host.availability_for(ratio).unwrap_or_default(),
                    size: host.size_for(ratio).unwrap_or_default(),
                },
            );
            trace.decision = PlacementDecision::Selected {
                host_id: host.id,
                reason: SelectionReason::FirstFit,
            };
            break;
        }
        trace
    }
}
