//! Per-case bookkeeping.

use hashbrown::HashMap;

use crate::clock::Timestamp;
use crate::error::MessagesError;
use crate::ids::Id;
use crate::registry::StepPosition;

/// State of the scenario instance currently being tracked.
///
/// The arena maps step positions to test step ids for one case only; a new
/// case replaces it wholesale.
#[derive(Debug)]
pub(super) struct CaseContext {
    test_case_id: Id,
    steps: HashMap<StepPosition, Id>,
    started_id: Option<Id>,
    step_starts: HashMap<Id, Timestamp>,
}

impl CaseContext {
    pub(super) fn new(test_case_id: Id, steps: HashMap<StepPosition, Id>) -> Self {
        Self {
            test_case_id,
            steps,
            started_id: None,
            step_starts: HashMap::new(),
        }
    }

    pub(super) fn test_case_id(&self) -> &Id {
        &self.test_case_id
    }

    pub(super) fn start_attempt(&mut self, started_id: Id) {
        self.started_id = Some(started_id);
        self.step_starts.clear();
    }

    pub(super) fn started_id(&self) -> Option<&Id> {
        self.started_id.as_ref()
    }

    /// Test step id recorded for `position` at case setup.
    pub(super) fn step_id(&self, position: StepPosition) -> Result<&Id, MessagesError> {
        self.steps
            .get(&position)
            .ok_or_else(|| MessagesError::UnresolvedStep {
                position: position.0,
                test_case_id: self.test_case_id.clone(),
            })
    }

    pub(super) fn record_start(&mut self, step_id: Id, at: Timestamp) {
        self.step_starts.insert(step_id, at);
    }

    pub(super) fn take_start(&mut self, step_id: &Id) -> Result<Timestamp, MessagesError> {
        self.step_starts
            .remove(step_id)
            .ok_or_else(|| MessagesError::StepNotStarted {
                test_step_id: step_id.clone(),
            })
    }
}
