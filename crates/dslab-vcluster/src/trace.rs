//! Structured records of placement decisions.

use std::fs::File;
use std::io::BufWriter;

use serde::Serialize;

use crate::error::AllocationError;
use crate::vm::Oversubscribable;

/// Outcome of checking a single host during host selection.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum HostVerdict {
    Inactive,
    /// VM ratio is not in the host catalog.
    UnknownRatio,
    /// VM does not fit the host.
    Unsuitable { footprint: u64, capacity: u32 },
    /// VM fits the host, which is ranked by the vCluster metrics.
    Candidate { availability: i64, size: u64 },
}

impl HostVerdict {
    fn name(&self) -> &'static str {
        match self {
            HostVerdict::Inactive => "inactive",
            HostVerdict::UnknownRatio => "unknown_ratio",
            HostVerdict::Unsuitable { .. } => "unsuitable",
            HostVerdict::Candidate { .. } => "candidate",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HostEvaluation {
    pub host_id: u32,
    #[serde(flatten)]
    pub verdict: HostVerdict,
}

/// Why the host was selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionReason {
    /// Host with maximum availability which can take the VM without growing its vClusters.
    Availability,
    /// Host with maximum size of the vCluster matching the VM ratio.
    Size,
    /// First suitable host.
    FirstFit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementDecision {
    Selected { host_id: u32, reason: SelectionReason },
    NoPlacement,
}

/// Host selection for a single VM: the evaluation of every host and the final decision.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlacementTrace {
    pub vm_id: u32,
    pub vm_pes: u32,
    pub ratio: f64,
    pub evaluations: Vec<HostEvaluation>,
    pub decision: PlacementDecision,
}

impl PlacementTrace {
    pub fn new(vm: &dyn Oversubscribable) -> Self {
        Self {
            vm_id: vm.id(),
            vm_pes: vm.pes_number(),
            ratio: vm.oversubscription_ratio(),
            evaluations: Vec::new(),
            decision: PlacementDecision::NoPlacement,
        }
    }

    pub fn evaluate(&mut self, host_id: u32, verdict: HostVerdict) {
        self.evaluations.push(HostEvaluation { host_id, verdict });
    }

    pub fn selected_host(&self) -> Option<u32> {
        match self.decision {
            PlacementDecision::Selected { host_id, .. } => Some(host_id),
            PlacementDecision::NoPlacement => None,
        }
    }

    /// Converts the decision into the selected host ID or the reason why no host was selected.
    ///
    /// If none of the active hosts recognizes the VM ratio, the request is reported as misconfigured
    /// rather than as lack of capacity.
    pub fn result(&self) -> Result<u32, AllocationError> {
        if let Some(host_id) = self.selected_host() {
            return Ok(host_id);
        }
        let mut active = self
            .evaluations
            .iter()
            .filter(|eval| eval.verdict != HostVerdict::Inactive)
            .peekable();
        if active.peek().is_some() && active.all(|eval| eval.verdict == HostVerdict::UnknownRatio) {
            Err(AllocationError::RatioNotServed {
                vm_id: self.vm_id,
                ratio: self.ratio,
            })
        } else {
            Err(AllocationError::PlacementExhausted { vm_id: self.vm_id })
        }
    }
}

#[derive(Serialize)]
struct TraceRow {
    vm_id: u32,
    vm_pes: u32,
    ratio: f64,
    host_id: Option<u32>,
    verdict: Option<&'static str>,
    footprint: Option<u64>,
    capacity: Option<u32>,
    availability: Option<i64>,
    size: Option<u64>,
    selected: bool,
    reason: Option<SelectionReason>,
}

/// Collects placement traces and saves them for external analysis.
#[derive(Default)]
pub struct TraceLog {
    traces: Vec<PlacementTrace>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trace: PlacementTrace) {
        self.traces.push(trace);
    }

    pub fn traces(&self) -> &[PlacementTrace] {
        &self.traces
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn clear(&mut self) {
        self.traces.clear();
    }

    /// Saves traces as CSV with one row per host evaluation.
    pub fn save_csv(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for row in self.rows() {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn save_json(&self, path: &str) -> Result<(), std::io::Error> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.traces)?;
        Ok(())
    }

    fn rows(&self) -> Vec<TraceRow> {
        let mut rows = Vec::new();
        for trace in &self.traces {
            let (selected_host, reason) = match trace.decision {
                PlacementDecision::Selected { host_id, reason } => (Some(host_id), Some(reason)),
                PlacementDecision::NoPlacement => (None, None),
            };
            let row = |eval: Option<&HostEvaluation>| {
                let (mut footprint, mut capacity, mut availability, mut size) = (None, None, None, None);
                match eval.map(|e| e.verdict) {
                    Some(HostVerdict::Unsuitable { footprint: f, capacity: c }) => {
                        footprint = Some(f);
                        capacity = Some(c);
                    }
                    Some(HostVerdict::Candidate { availability: a, size: s }) => {
                        availability = Some(a);
                        size = Some(s);
                    }
                    _ => {}
                }
                let host_id = eval.map(|e| e.host_id);
                TraceRow {
                    vm_id: trace.vm_id,
                    vm_pes: trace.vm_pes,
                    ratio: trace.ratio,
                    host_id,
                    verdict: eval.map(|e| e.verdict.name()),
                    footprint,
                    capacity,
                    availability,
                    size,
                    selected: host_id.is_some() && host_id == selected_host,
                    reason,
                }
            };
            if trace.evaluations.is_empty() {
                rows.push(row(None));
            } else {
                rows.extend(trace.evaluations.iter().map(|eval| row(Some(eval))));
            }
        }
        rows
    }
}
