//! Datacenter configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default fraction of MIPS lost by a VM while it is migrating.
pub const DEFAULT_MIGRATION_OVERHEAD: f64 = 0.1;

/// Holds raw datacenter config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawDatacenterConfig {
    pub placement_policy: Option<String>,
    pub hosts: Option<Vec<RawHostConfig>>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawHostConfig {
    pub name: Option<String>,
    pub name_prefix: Option<String>,
    pub pes: u32,
    pub pe_mips: Option<f64>,
    pub count: Option<u32>,
    pub oversubscription_ratios: Option<Vec<f64>>,
    pub critical_mass: Option<u32>,
    pub migration_overhead: Option<f64>,
}

/// Oversubscription settings of a host.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct CatalogConfig {
    /// Recognized oversubscription ratios, 1.0 means no oversubscription.
    pub ratios: Vec<f64>,
    /// Minimum number of cluster members before the cluster demand is divided by its ratio.
    pub critical_mass: u32,
    /// Fraction of requested MIPS withheld from a VM during its migration.
    pub migration_overhead: f64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            ratios: vec![1.0],
            critical_mass: 1,
            migration_overhead: DEFAULT_MIGRATION_OVERHEAD,
        }
    }
}

impl CatalogConfig {
    pub fn new(ratios: Vec<f64>, critical_mass: u32) -> Self {
        Self {
            ratios,
            critical_mass,
            ..Default::default()
        }
    }

    pub fn with_migration_overhead(mut self, migration_overhead: f64) -> Self {
        self.migration_overhead = migration_overhead;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ratios.is_empty() {
            return Err(ConfigError::EmptyCatalog);
        }
        for (i, &ratio) in self.ratios.iter().enumerate() {
            if !ratio.is_finite() || ratio < 1. {
                return Err(ConfigError::InvalidRatio(ratio));
            }
            if self.ratios[..i].contains(&ratio) {
                return Err(ConfigError::DuplicateRatio(ratio));
            }
        }
        if self.critical_mass < 1 {
            return Err(ConfigError::InvalidCriticalMass(self.critical_mass));
        }
        if !(0. ..=1.).contains(&self.migration_overhead) {
            return Err(ConfigError::InvalidMigrationOverhead(self.migration_overhead));
        }
        Ok(())
    }
}

/// Holds configuration of a single physical host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Host name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Host name prefix.
    /// Full name is produced by appending host instance number to the prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    /// Number of physical cores.
    pub pes: u32,
    /// Capacity of each core in MIPS.
    pub pe_mips: f64,
    /// Number of such hosts.
    pub count: u32,
    pub catalog: CatalogConfig,
}

impl HostConfig {
    /// Returns names of hosts described by this config.
    pub fn host_names(&self) -> Result<Vec<String>, ConfigError> {
        if self.count == 1 {
            if let Some(name) = &self.name {
                return Ok(vec![name.clone()]);
            }
        }
        match &self.name_prefix {
            Some(prefix) => Ok((1..=self.count).map(|i| format!("{}{}", prefix, i)).collect()),
            None if self.count == 1 => Err(ConfigError::InvalidHost(
                "either name or name_prefix should be set".to_string(),
            )),
            None => Err(ConfigError::InvalidHost(format!(
                "name_prefix should be set for {} hosts",
                self.count
            ))),
        }
    }
}

/// Represents datacenter configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct DatacenterConfig {
    /// VM placement policy in the form `Name[options]`.
    pub placement_policy: String,
    /// Configurations of physical hosts.
    pub hosts: Vec<HostConfig>,
}

impl DatacenterConfig {
    /// Creates datacenter config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(file_name).map_err(|source| ConfigError::Io {
            path: file_name.to_string(),
            source,
        })?;
        Self::from_yaml(&data)
    }

    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        let raw: RawDatacenterConfig = serde_yaml::from_str(data)?;
        let hosts = raw
            .hosts
            .unwrap_or_default()
            .into_iter()
            .map(|raw_host| {
                let default_catalog = CatalogConfig::default();
                let host = HostConfig {
                    name: raw_host.name,
                    name_prefix: raw_host.name_prefix,
                    pes: raw_host.pes,
                    pe_mips: raw_host.pe_mips.unwrap_or(1000.),
                    count: raw_host.count.unwrap_or(1),
                    catalog: CatalogConfig {
                        ratios: raw_host.oversubscription_ratios.unwrap_or(default_catalog.ratios),
                        critical_mass: raw_host.critical_mass.unwrap_or(default_catalog.critical_mass),
                        migration_overhead: raw_host
                            .migration_overhead
                            .unwrap_or(default_catalog.migration_overhead),
                    },
                };
                if host.pes == 0 {
                    return Err(ConfigError::InvalidHost("host should have at least one PE".to_string()));
                }
                if !host.pe_mips.is_finite() || host.pe_mips <= 0. {
                    return Err(ConfigError::InvalidHost(format!(
                        "PE MIPS should be positive, got {}",
                        host.pe_mips
                    )));
                }
                host.catalog.validate()?;
                Ok(host)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            placement_policy: raw.placement_policy.unwrap_or_else(|| "ClusterAware".to_string()),
            hosts,
        })
    }
}

/// Parses config value string, which consists of two parts - name and options.
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.to_string(), Some(r.to_string().replace(']', ""))),
        None => (config_str.to_string(), None),
    }
}
