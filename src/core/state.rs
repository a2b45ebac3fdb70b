// Bind journal for Exliar VFIO
//
// The bind sequence has no rollback. The journal records every step that
// completed so a mid-sequence failure can be reported precisely, in
// particular the case where the device was unbound but never re-attached.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

/// One step of the unbind → override → probe sequence, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindStep {
    ExistenceCheck,
    IommuCheck,
    Unbind,
    Override,
    Probe,
}

impl BindStep {
    /// All steps in the order they run
    pub const SEQUENCE: [BindStep; 5] = [
        BindStep::ExistenceCheck,
        BindStep::IommuCheck,
        BindStep::Unbind,
        BindStep::Override,
        BindStep::Probe,
    ];
}

impl fmt::Display for BindStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BindStep::ExistenceCheck => write!(f, "device existence check"),
            BindStep::IommuCheck => write!(f, "iommu check"),
            BindStep::Unbind => write!(f, "unbind"),
            BindStep::Override => write!(f, "driver_override"),
            BindStep::Probe => write!(f, "driver_probe"),
        }
    }
}

/// A completed step
#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub step: BindStep,
    pub detail: String,
    pub completed_at: DateTime<Local>,
}

/// Steps completed for one device, in order
#[derive(Debug, Clone, Serialize)]
pub struct BindJournal {
    pub address: String,
    entries: Vec<JournalEntry>,
}

impl BindJournal {
    pub fn new(address: &str) -> Self {
        Self { address: address.to_string(), entries: Vec::new() }
    }

    /// Records a step as done
    pub fn record(&mut self, step: BindStep, detail: impl Into<String>) {
        log::debug!("{}: {} done", self.address, step);
        self.entries.push(JournalEntry { step, detail: detail.into(), completed_at: Local::now() });
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn completed(&self, step: BindStep) -> bool {
        self.entries.iter().any(|e| e.step == step)
    }

    pub fn last_completed(&self) -> Option<BindStep> {
        self.entries.last().map(|e| e.step)
    }

    /// The step that would have run next
    pub fn next_step(&self) -> Option<BindStep> {
        BindStep::SEQUENCE.iter().copied().find(|step| !self.completed(*step))
    }

    /// True when the old driver was detached but the probe never happened,
    /// leaving the device without any driver
    pub fn left_unbound(&self) -> bool {
        self.completed(BindStep::Unbind) && !self.completed(BindStep::Probe)
    }

    /// One-line description, e.g. "0000:01:00.0: existence check, iommu check, unbind"
    pub fn summary(&self) -> String {
        let steps: Vec<String> = self.entries.iter().map(|e| e.step.to_string()).collect();
        if steps.is_empty() {
            format!("{}: no steps completed", self.address)
        } else {
            format!("{}: {}", self.address, steps.join(", "))
        }
    }
}
