//! Test case declarations and execution events.

use serde::{Deserialize, Serialize};

use crate::clock::{Duration, Timestamp};
use crate::ids::Id;

/// A scenario instance together with the steps resolved for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Identifier of the test case.
    pub id: Id,
    /// Identifier of the scenario instance (pickle) supplied by the host.
    pub pickle_id: Id,
    /// Resolved steps, in scenario order.
    pub test_steps: Vec<TestStep>,
}

/// A scenario step that was matched to a handler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    /// Identifier of the test step.
    pub id: Id,
    /// Identifier of the scenario step supplied by the host.
    pub pickle_step_id: Id,
    /// Handlers that matched the step.
    pub step_definition_ids: Vec<Id>,
    /// Captured arguments, one list per entry of `step_definition_ids`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_match_arguments_lists: Option<Vec<StepMatchArgumentsList>>,
}

/// Arguments captured by one matching handler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMatchArgumentsList {
    /// Captured arguments in pattern order.
    pub step_match_arguments: Vec<StepMatchArgument>,
}

/// One captured argument.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMatchArgument {
    /// Capture group holding the argument text.
    pub group: Group,
    /// Name of the placeholder type, when the pattern declared one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_type_name: Option<String>,
}

/// Capture group within the step text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Nested groups.
    pub children: Vec<Group>,
    /// Byte offset of the capture within the step text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    /// Captured text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A test case began an attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseStarted {
    /// Zero-based attempt counter supplied by the host.
    pub attempt: u32,
    /// Identifier of this attempt; step events reference it.
    pub id: Id,
    /// Identifier of the declared test case.
    pub test_case_id: Id,
    /// Worker executing the attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    /// Start of the attempt.
    pub timestamp: Timestamp,
}

/// A test step began.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepStarted {
    /// Identifier of the enclosing attempt.
    pub test_case_started_id: Id,
    /// Identifier of the test step.
    pub test_step_id: Id,
    /// Start of the step.
    pub timestamp: Timestamp,
}

/// A test step finished.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStepFinished {
    /// Identifier of the enclosing attempt.
    pub test_case_started_id: Id,
    /// Identifier of the test step.
    pub test_step_id: Id,
    /// Outcome of the step.
    pub test_step_result: TestStepResult,
    /// End of the step.
    pub timestamp: Timestamp,
}

/// Outcome of a test step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStepResult {
    /// Time between the step's start and finish.
    pub duration: Duration,
    /// Outcome classification.
    pub status: Status,
    /// Failure detail; the tracker never fills it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Outcome classification of a test step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Outcome not known.
    Unknown,
    /// Step completed.
    Passed,
    /// Step skipped.
    Skipped,
    /// Step marked itself pending.
    Pending,
    /// No handler matched.
    Undefined,
    /// Several handlers matched.
    Ambiguous,
    /// Step raised an error.
    Failed,
}

impl Status {
    /// Lowercase label.
    ///
    /// # Examples
    ///
    /// ```
    /// use rstest_bdd_messages::messages::Status;
    ///
    /// assert_eq!(Status::Failed.label(), "failed");
    /// ```
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Passed => "passed",
            Self::Skipped => "skipped",
            Self::Pending => "pending",
            Self::Undefined => "undefined",
            Self::Ambiguous => "ambiguous",
            Self::Failed => "failed",
        }
    }
}

/// A test case attempt finished.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseFinished {
    /// Identifier of the attempt.
    pub test_case_started_id: Id,
    /// End of the attempt.
    pub timestamp: Timestamp,
    /// Whether the host will run another attempt.
    pub will_be_retried: bool,
}

/// The run began executing tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunStarted {
    /// Start of the run.
    pub timestamp: Timestamp,
}

/// The run finished.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunFinished {
    /// Whether the host reported no failures.
    pub success: bool,
    /// End of the run.
    pub timestamp: Timestamp,
    /// Reason the run stopped early, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
