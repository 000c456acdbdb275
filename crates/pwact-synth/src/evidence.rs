#![forbid(unsafe_code)]

//! Bounded FIFO evidence ledger for the synthesis sweep.
//!
//! One entry per (attempt, combination) solve records how the sweep
//! went; `SolverError` outcomes stay distinguishable from plain
//! infeasibility for diagnostics even though both continue the sweep.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use pwact_lmi::MethodCombination;

/// How one combination's solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepOutcome {
    Feasible,
    Infeasible,
    SolverError,
    /// Combination dropped before solving (e.g. ellipsoidal slack
    /// requested on a model without ellipsoid data).
    Skipped,
}

/// Record of a single solve inside a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepLogEntry {
    /// 1-based sweep number.
    pub attempt: usize,
    pub combination: MethodCombination,
    pub outcome: SweepOutcome,
    pub detail: String,
}

/// Bounded FIFO buffer of sweep records. When full, the oldest entry is
/// evicted before a new one is appended. Capacity is clamped to at
/// least one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisLedger {
    capacity: usize,
    entries: VecDeque<SweepLogEntry>,
}

impl SynthesisLedger {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn record(&mut self, entry: SweepLogEntry) {
        if self.entries.len() == self.capacity {
            let _ = self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&SweepLogEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SweepLogEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// JSON array of all retained entries.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_else(|_| "[]".into())
    }
}
