//! Error types.

use thiserror::Error;

use crate::vm::VmStatus;

/// Failures of admission, placement and VM lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
    #[error("vm #{vm_id} does not fit host #{host_id}: footprint {footprint} exceeds {capacity} working PEs")]
    AdmissionRejected {
        vm_id: u32,
        host_id: u32,
        footprint: u64,
        capacity: u32,
    },

    #[error("no active host can accommodate vm #{vm_id}")]
    PlacementExhausted { vm_id: u32 },

    #[error("oversubscription ratio {ratio} of vm #{vm_id} is not in the catalog of host #{host_id}")]
    UnknownRatio { vm_id: u32, host_id: u32, ratio: f64 },

    #[error("oversubscription ratio {ratio} of vm #{vm_id} is not in the catalog of any active host")]
    RatioNotServed { vm_id: u32, ratio: f64 },

    #[error("vm #{vm_id} is already allocated on host #{host_id}")]
    AlreadyAllocated { vm_id: u32, host_id: u32 },

    #[error("vm #{vm_id} is not allocated on host #{host_id}")]
    NotAllocated { vm_id: u32, host_id: u32 },

    #[error("host #{0} not found")]
    HostNotFound(u32),

    #[error("host #{0} is inactive")]
    HostInactive(u32),

    #[error("vm #{0} not found")]
    VmNotFound(u32),

    #[error("vm #{0} already exists")]
    VmAlreadyExists(u32),

    #[error("vm #{vm_id} is {status}")]
    InvalidVmStatus { vm_id: u32, status: VmStatus },
}

/// Failures of reading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("can't read file {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("can't parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("oversubscription ratio catalog is empty")]
    EmptyCatalog,

    #[error("invalid oversubscription ratio {0}: must be finite and not less than 1")]
    InvalidRatio(f64),

    #[error("oversubscription ratio {0} is listed twice")]
    DuplicateRatio(f64),

    #[error("invalid critical mass {0}: must be at least 1")]
    InvalidCriticalMass(u32),

    #[error("invalid migration overhead {0}: must be within [0, 1]")]
    InvalidMigrationOverhead(f64),

    #[error("invalid host config: {0}")]
    InvalidHost(String),

    #[error("can't resolve placement policy: {0}")]
    UnknownPolicy(String),
}
