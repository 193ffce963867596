//! vCluster-aware policy.

use crate::host::Host;
use crate::trace::{HostVerdict, PlacementDecision, PlacementTrace, SelectionReason};
use crate::vm::Oversubscribable;
use crate::vm_allocation_policies::check_host;
use crate::vm_allocation_policy::VmAllocationPolicy;

/// Ranks suitable hosts by the state of the vCluster matching the VM ratio.
///
/// The host with maximum availability is preferred among the hosts whose availability covers the VM,
/// i.e. which can take the VM without growing their vClusters beyond the current slack.
/// If there is no such host, the host with maximum vCluster size is used.
///
/// Note that the fallback picks the *largest* vCluster, which concentrates load instead of spreading it
/// over the smallest vClusters.
#[derive(Default)]
pub struct ClusterAware;

impl ClusterAware {
    pub fn new() -> Self {
        Default::default()
    }
}

impl VmAllocationPolicy for ClusterAware {
    fn select_host(&self, vm: &dyn Oversubscribable, hosts: &[Host]) -> PlacementTrace {
        let mut trace = PlacementTrace::new(vm);
        let ratio = vm.oversubscription_ratio();
        let mut max_availability: Option<(u32, i64)> = None;
        let mut max_size: Option<(u32, u64)> = None;

        for host in hosts {
            if let Err(verdict) = check_host(vm, host) {
                trace.evaluate(host.id, verdict);
                continue;
            }
            // ratio is known to suitable hosts
            let availability = host.availability_for(ratio).unwrap_or_default();
            let size = host.size_for(ratio).unwrap_or_default();

            if vm.pes_number() as i64 <= availability && max_availability.map_or(true, |(_, best)| availability > best)
            {
                max_availability = Some((host.id, availability));
            }
            if max_size.map_or(true, |(_, best)| size > best) {
                max_size = Some((host.id, size));
            }
            trace.evaluate(host.id, HostVerdict::Candidate { availability, size });
        }

        trace.decision = match (max_availability, max_size) {
            (Some((host_id, _)), _) => PlacementDecision::Selected {
                host_id,
                reason: SelectionReason::Availability,
            },
            (None, Some((host_id, _))) => PlacementDecision::Selected {
                host_id,
                reason: SelectionReason::Size,
            },
            (None, None) => PlacementDecision::NoPlacement,
        };
        trace
    }
}
