//! Per-run counters

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// What one dispatch pass did, stage by stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub inputs: usize,
    pub specs: usize,
    /// Candidates produced by the cross product
    pub generated: usize,
    /// Candidates dropped for a malformed spec
    pub rejected: usize,
    /// Candidates dropped as duplicates of an earlier candidate
    pub duplicates: usize,
    /// Candidates the store did not know about
    pub new: usize,
    pub already_existing: usize,
    pub admitted: usize,
    /// New candidates another writer admitted first
    pub conflicts: usize,
    pub eligible: usize,
    pub reset: u64,
    pub identity_mismatches: usize,
    pub assigned: usize,
    pub shards: usize,
    pub dry_run: bool,
    /// Counted against an empty stand-in store, so every candidate looks new
    pub store_unreachable: bool,
}

impl RunSummary {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            ..Self::default()
        }
    }

    /// Whether the pass produced no work for any worker
    pub fn is_noop(&self) -> bool {
        self.assigned == 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match (self.dry_run, self.store_unreachable) {
            (true, true) => " (dry run, store unreachable: counts assume an empty store)",
            (true, false) => " (dry run)",
            (false, true) => " (store unreachable)",
            (false, false) => "",
        };
        writeln!(f, "Run {}{}", self.run_id, mode)?;
        writeln!(f, "  inputs:            {}", self.inputs)?;
        writeln!(f, "  analysis specs:    {}", self.specs)?;
        writeln!(f, "  generated:         {}", self.generated)?;
        writeln!(f, "  rejected:          {}", self.rejected)?;
        writeln!(f, "  duplicates:        {}", self.duplicates)?;
        writeln!(f, "  new:               {}", self.new)?;
        writeln!(f, "  already existing:  {}", self.already_existing)?;
        writeln!(f, "  admitted:          {}", self.admitted)?;
        writeln!(f, "  conflicts:         {}", self.conflicts)?;
        writeln!(f, "  eligible:          {}", self.eligible)?;
        writeln!(f, "  reset to pending:  {}", self.reset)?;
        if self.identity_mismatches > 0 {
            writeln!(f, "  hash mismatches:   {}", self.identity_mismatches)?;
        }
        if self.is_noop() && !self.dry_run {
            write!(f, "  nothing to assign")
        } else {
            write!(f, "  assigned:          {} across {} shard(s)", self.assigned, self.shards)
        }
    }
}
