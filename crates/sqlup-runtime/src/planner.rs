use sqlup_core::event::SkipReason;
use sqlup_core::script::Script;

use crate::journal::{AppliedScripts, JournalStatus};

/// Scripts a run will execute, in execution order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    scripts: Vec<Script>,
    skipped: Vec<(String, SkipReason)>,
}

impl ExecutionPlan {
    pub fn scripts(&self) -> &[Script] {
        &self.scripts
    }

    /// Scripts left out, with the reason, in source order.
    pub fn skipped(&self) -> &[(String, SkipReason)] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }
}

/// Filter `scripts` down to those the journal has not seen.
///
/// Source order is preserved; the planner never re-sorts.
pub fn plan(scripts: Vec<Script>, applied: &AppliedScripts) -> ExecutionPlan {
    let mut plan = ExecutionPlan::default();
    for script in scripts {
        match applied.status(&script) {
            JournalStatus::Pending => plan.scripts.push(script),
            JournalStatus::Applied => plan
                .skipped
                .push((script.name().to_string(), SkipReason::AlreadyApplied)),
            JournalStatus::Drifted => plan
                .skipped
                .push((script.name().to_string(), SkipReason::ChecksumDrift)),
        }
    }
    plan
}
