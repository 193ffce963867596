//! Implementations of VM allocation policies.

pub mod cluster_aware;
pub mod first_fit;

use crate::host::Host;
use crate::trace::HostVerdict;
use crate::vm::Oversubscribable;

/// Applies host suitability check, returns the verdict for non-candidate hosts.
pub(crate) fn check_host(vm: &dyn Oversubscribable, host: &Host) -> Result<(), HostVerdict> {
    if !host.is_active() {
        return Err(HostVerdict::Inactive);
    }
    match host.is_suitable_for(vm) {
        Ok(true) => Ok(()),
        Ok(false) => Err(HostVerdict::Unsuitable {
            footprint: host.engine().footprint_with(vm).unwrap_or_default(),
            capacity: host.working_pes_number(),
        }),
        Err(_) => Err(HostVerdict::UnknownRatio),
    }
}
