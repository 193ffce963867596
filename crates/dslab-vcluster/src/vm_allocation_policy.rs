//! Virtual machine allocation policies.

use crate::config::parse_config_value;
use crate::error::ConfigError;
use crate::host::Host;
use crate::trace::PlacementTrace;
use crate::vm::Oversubscribable;
use crate::vm_allocation_policies::cluster_aware::ClusterAware;
use crate::vm_allocation_policies::first_fit::FirstFit;

/// Trait for implementation of VM allocation policies.
///
/// The policy is defined as a function of VM and current hosts state, which returns the trace of host selection.
/// The selected host (if any) is stored in the trace decision, while the per-host evaluations explain the choice.
///
/// The policy must not change hosts: the allocation itself is performed by the caller after the host is selected.
pub trait VmAllocationPolicy {
    fn select_host(&self, vm: &dyn Oversubscribable, hosts: &[Host]) -> PlacementTrace;
}

/// Creates the policy from its config string, e.g. `ClusterAware`.
pub fn placement_policy_resolver(config_str: &str) -> Result<Box<dyn VmAllocationPolicy>, ConfigError> {
    let (policy_name, options) = parse_config_value(config_str);
    if options.map_or(false, |options| !options.trim().is_empty()) {
        return Err(ConfigError::UnknownPolicy(format!(
            "{} does not accept options: {}",
            policy_name, config_str
        )));
    }
    match policy_name.as_str() {
        "ClusterAware" => Ok(Box::new(ClusterAware::new())),
        "FirstFit" => Ok(Box::new(FirstFit::new())),
        _ => Err(ConfigError::UnknownPolicy(config_str.to_string())),
    }
}
