//! Oversubscription clusters (vClusters) of a host.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use ordered_float::OrderedFloat;

/// VMs of a single host sharing the same oversubscription ratio.
#[derive(Clone, Debug, Default)]
pub struct VCluster {
    // vm id -> number of vCPUs
    members: IndexMap<u32, u32>,
    raw_demand: u64,
}

impl VCluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Total number of vCPUs requested by cluster members, before applying oversubscription.
    pub fn raw_demand(&self) -> u64 {
        self.raw_demand
    }

    pub fn contains(&self, vm_id: u32) -> bool {
        self.members.contains_key(&vm_id)
    }

    /// Returns IDs of member VMs in the order of their registration.
    pub fn members(&self) -> impl Iterator<Item = u32> + '_ {
        self.members.keys().copied()
    }

    /// Number of physical cores charged for the cluster, optionally with one more member of `extra_pes` vCPUs.
    ///
    /// The demand is divided by the ratio only when the cluster has at least `critical_mass` members.
    fn footprint(&self, ratio: f64, critical_mass: u32, extra_pes: Option<u32>) -> u64 {
        let mut size = self.members.len() as u64;
        let mut demand = self.raw_demand;
        if let Some(pes) = extra_pes {
            size += 1;
            demand += pes as u64;
        }
        if size >= critical_mass as u64 {
            reduced_demand(demand, ratio)
        } else {
            demand
        }
    }
}

/// Returns `ceil(demand / ratio)`.
///
/// Quotients within a relative `1e-9` of an integer are snapped to it, so `21 / 1.4` gives 15 and not 16.
fn reduced_demand(demand: u64, ratio: f64) -> u64 {
    let quotient = demand as f64 / ratio;
    let nearest = quotient.round();
    if (quotient - nearest).abs() <= 1e-9 * nearest.max(1.) {
        nearest as u64
    } else {
        quotient.ceil() as u64
    }
}

/// Groups VMs of a host by their oversubscription ratio.
///
/// Clusters are created for every ratio of the host catalog at construction and are never removed.
#[derive(Clone, Debug)]
pub struct ClusterTracker {
    clusters: BTreeMap<OrderedFloat<f64>, VCluster>,
}

impl ClusterTracker {
    pub fn new(ratios: &[f64]) -> Self {
        Self {
            clusters: ratios
                .iter()
                .map(|&ratio| (OrderedFloat(ratio), VCluster::default()))
                .collect(),
        }
    }

    /// Returns catalog ratios in ascending order.
    pub fn ratios(&self) -> impl Iterator<Item = f64> + '_ {
        self.clusters.keys().map(|ratio| ratio.into_inner())
    }

    pub fn contains_ratio(&self, ratio: f64) -> bool {
        self.clusters.contains_key(&OrderedFloat(ratio))
    }

    pub fn cluster(&self, ratio: f64) -> Option<&VCluster> {
        self.clusters.get(&OrderedFloat(ratio))
    }

    /// Returns the ratio of cluster which contains the specified VM.
    pub fn find(&self, vm_id: u32) -> Option<f64> {
        self.clusters
            .iter()
            .find(|(_, cluster)| cluster.contains(vm_id))
            .map(|(ratio, _)| ratio.into_inner())
    }

    /// Adds VM to the cluster of specified ratio.
    /// Returns false if the ratio is not in catalog or the VM is already a member of some cluster.
    pub fn register(&mut self, ratio: f64, vm_id: u32, pes: u32) -> bool {
        if self.find(vm_id).is_some() {
            return false;
        }
        match self.clusters.get_mut(&OrderedFloat(ratio)) {
            Some(cluster) => {
                cluster.members.insert(vm_id, pes);
                cluster.raw_demand += pes as u64;
                true
            }
            None => false,
        }
    }

    /// Removes VM from the cluster of specified ratio, returns the number of its vCPUs.
    pub fn unregister(&mut self, ratio: f64, vm_id: u32) -> Option<u32> {
        let cluster = self.clusters.get_mut(&OrderedFloat(ratio))?;
        let pes = cluster.members.shift_remove(&vm_id)?;
        cluster.raw_demand -= pes as u64;
        Some(pes)
    }

    /// Computes the number of physical cores charged for all clusters.
    ///
    /// If `hypothetical` VM (ratio, vCPUs) is passed, it is counted as a member of the cluster with matching ratio.
    /// A VM with ratio outside of the catalog does not change the result.
    pub fn footprint(&self, critical_mass: u32, hypothetical: Option<(f64, u32)>) -> u64 {
        self.clusters
            .iter()
            .map(|(ratio, cluster)| {
                let extra_pes = hypothetical
                    .filter(|(vm_ratio, _)| OrderedFloat(*vm_ratio) == *ratio)
                    .map(|(_, pes)| pes);
                cluster.footprint(ratio.into_inner(), critical_mass, extra_pes)
            })
            .sum()
    }

    /// Returns raw demand of the cluster with specified ratio.
    pub fn size_for(&self, ratio: f64) -> Option<u64> {
        self.cluster(ratio).map(|cluster| cluster.raw_demand())
    }
}
