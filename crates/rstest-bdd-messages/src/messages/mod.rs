//! Cucumber protocol messages produced by the tracker.
//!
//! Every emission is one [`Envelope`] with exactly one populated variant.
//! Serialisation follows the protocol's camel-case field names and omits
//! unset optional fields, so a serialised envelope is a valid line of a
//! Cucumber NDJSON stream.

mod definitions;
mod execution;
mod meta;

pub use definitions::{
    Location, PatternType, SourceReference, StepDefinition, StepDefinitionPattern,
};
pub use execution::{
    Group, Status, StepMatchArgument, StepMatchArgumentsList, TestCase, TestCaseFinished,
    TestCaseStarted, TestRunFinished, TestRunStarted, TestStep, TestStepFinished, TestStepResult,
    TestStepStarted,
};
pub use meta::{Ci, Git, Meta, Product};

use serde::{Deserialize, Serialize};

/// Version of the Cucumber messages protocol this crate emits.
pub const PROTOCOL_VERSION: &str = "22.0.0";

/// Tagged union of every message the tracker can emit.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::clock::Timestamp;
/// use rstest_bdd_messages::messages::{Envelope, TestRunStarted};
///
/// let envelope = Envelope::TestRunStarted(TestRunStarted {
///     timestamp: Timestamp { seconds: 1, nanos: 2 },
/// });
/// let line = serde_json::to_string(&envelope).unwrap();
/// assert_eq!(line, r#"{"testRunStarted":{"timestamp":{"seconds":1,"nanos":2}}}"#);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Envelope {
    /// Run metadata.
    Meta(Meta),
    /// Declaration of a registered step handler.
    StepDefinition(StepDefinition),
    /// The run began executing tests.
    TestRunStarted(TestRunStarted),
    /// Declaration of a scenario instance and its resolved steps.
    TestCase(TestCase),
    /// A test case began an attempt.
    TestCaseStarted(TestCaseStarted),
    /// A test step began.
    TestStepStarted(TestStepStarted),
    /// A test step finished.
    TestStepFinished(TestStepFinished),
    /// A test case attempt finished.
    TestCaseFinished(TestCaseFinished),
    /// The run finished.
    TestRunFinished(TestRunFinished),
}

impl Envelope {
    /// Kind of the populated variant.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Meta(_) => MessageKind::Meta,
            Self::StepDefinition(_) => MessageKind::StepDefinition,
            Self::TestRunStarted(_) => MessageKind::TestRunStarted,
            Self::TestCase(_) => MessageKind::TestCase,
            Self::TestCaseStarted(_) => MessageKind::TestCaseStarted,
            Self::TestStepStarted(_) => MessageKind::TestStepStarted,
            Self::TestStepFinished(_) => MessageKind::TestStepFinished,
            Self::TestCaseFinished(_) => MessageKind::TestCaseFinished,
            Self::TestRunFinished(_) => MessageKind::TestRunFinished,
        }
    }
}

/// Discriminant of an [`Envelope`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageKind {
    /// `meta`
    Meta,
    /// `step_definition`
    StepDefinition,
    /// `test_run_started`
    TestRunStarted,
    /// `test_case`
    TestCase,
    /// `test_case_started`
    TestCaseStarted,
    /// `test_step_started`
    TestStepStarted,
    /// `test_step_finished`
    TestStepFinished,
    /// `test_case_finished`
    TestCaseFinished,
    /// `test_run_finished`
    TestRunFinished,
}

impl MessageKind {
    /// Every kind, in the order a well-formed stream first mentions them.
    pub const ALL: [Self; 9] = [
        Self::StepDefinition,
        Self::Meta,
        Self::TestRunStarted,
        Self::TestCase,
        Self::TestCaseStarted,
        Self::TestStepStarted,
        Self::TestStepFinished,
        Self::TestCaseFinished,
        Self::TestRunFinished,
    ];

    /// Lowercase snake-case label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::StepDefinition => "step_definition",
            Self::TestRunStarted => "test_run_started",
            Self::TestCase => "test_case",
            Self::TestCaseStarted => "test_case_started",
            Self::TestStepStarted => "test_step_started",
            Self::TestStepFinished => "test_step_finished",
            Self::TestCaseFinished => "test_case_finished",
            Self::TestRunFinished => "test_run_finished",
        }
    }

    /// Field name used for this kind on the wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::StepDefinition => "stepDefinition",
            Self::TestRunStarted => "testRunStarted",
            Self::TestCase => "testCase",
            Self::TestCaseStarted => "testCaseStarted",
            Self::TestStepStarted => "testStepStarted",
            Self::TestStepFinished => "testStepFinished",
            Self::TestCaseFinished => "testCaseFinished",
            Self::TestRunFinished => "testRunFinished",
        }
    }
}
