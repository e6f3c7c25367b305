//! Error types surfaced while tracking a run and emitting its messages.
//!
//! Match failures and missing metadata are recovered where they occur and
//! never reach these types. Everything here indicates either a reporting
//! misconfiguration or a broken invariant and is meant to abort the run.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::clock::Timestamp;
use crate::ids::Id;

/// Errors raised by the lifecycle tracker and the message emitter.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::MessagesError;
///
/// let error = MessagesError::UnresolvedStep {
///     position: 2,
///     test_case_id: "7".into(),
/// };
/// assert!(error.is_consistency_violation());
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MessagesError {
    /// The configured output file could not be opened or written.
    #[error("cannot append to message file `{path}`: {source}")]
    Sink {
        /// Path of the configured NDJSON file.
        path: Utf8PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A message could not be serialised.
    #[error("failed to serialise message: {0}")]
    Serialize(#[from] serde_json::Error),

    /// A step hook referenced a step that was not resolved at case setup.
    #[error("step at position {position} has no test step in test case {test_case_id}")]
    UnresolvedStep {
        /// Zero-based position of the step within its scenario.
        position: usize,
        /// Identifier of the active test case.
        test_case_id: Id,
    },

    /// A step finished without a recorded start.
    #[error("test step {test_step_id} finished before it was started")]
    StepNotStarted {
        /// Identifier of the test step.
        test_step_id: Id,
    },

    /// The matcher returned a handler the registry never declared.
    #[error("step handler `{handler}` was not declared by the step registry")]
    UnknownHandler {
        /// Key of the undeclared handler.
        handler: String,
    },

    /// A finish timestamp preceded its start timestamp.
    #[error("clock went backwards: finished at {finish} before starting at {start}")]
    ClockRegression {
        /// Recorded start.
        start: Timestamp,
        /// Captured finish.
        finish: Timestamp,
    },

    /// A lifecycle hook arrived in a state with no matching transition.
    #[error("unexpected `{event}` while tracker is {state}")]
    UnexpectedEvent {
        /// Name of the tracker state.
        state: &'static str,
        /// Name of the lifecycle event.
        event: &'static str,
    },
}

impl MessagesError {
    /// Returns `true` when the error reports a broken tracking invariant
    /// rather than an I/O or serialisation failure.
    #[must_use]
    pub fn is_consistency_violation(&self) -> bool {
        matches!(
            self,
            Self::UnresolvedStep { .. }
                | Self::StepNotStarted { .. }
                | Self::UnknownHandler { .. }
                | Self::ClockRegression { .. }
                | Self::UnexpectedEvent { .. }
        )
    }
}

/// Errors raised while registering a step definition pattern.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PatternError {
    /// A placeholder was malformed or a brace was left unbalanced.
    #[error("invalid step pattern `{pattern}`: {source}")]
    Placeholder {
        /// Pattern source as registered.
        pattern: String,
        /// Failure reported by the pattern compiler.
        #[source]
        source: rstest_bdd_patterns::PatternError,
    },

    /// The compiled expression was rejected by the regex engine.
    #[error("invalid regular expression `{pattern}`: {source}")]
    Regex {
        /// Pattern source as registered.
        pattern: String,
        /// Regex compilation failure.
        #[source]
        source: regex::Error,
    },
}

/// Violations detected while validating an emitted message stream.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// A line could not be parsed as an envelope.
    #[error("line {line}: not a message envelope: {reason}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// Parser message.
        reason: String,
    },

    /// A message appeared where the stream grammar does not allow it.
    #[error("line {line}: `{found}` is not allowed after `{after}`")]
    OutOfOrder {
        /// One-based line number.
        line: usize,
        /// Kind of the offending message.
        found: &'static str,
        /// Kind of the preceding message, or `start`.
        after: &'static str,
    },

    /// An identifier was declared twice.
    #[error("line {line}: identifier `{id}` declared more than once")]
    DuplicateId {
        /// One-based line number.
        line: usize,
        /// Duplicated identifier.
        id: String,
    },

    /// A message referenced an identifier that was not declared earlier.
    #[error("line {line}: `{field}` references undeclared identifier `{id}`")]
    DanglingReference {
        /// One-based line number.
        line: usize,
        /// Name of the referencing field.
        field: &'static str,
        /// Referenced identifier.
        id: String,
    },

    /// A step duration disagrees with its start and finish timestamps.
    #[error("line {line}: duration of test step `{test_step_id}` does not match its timestamps")]
    DurationMismatch {
        /// One-based line number.
        line: usize,
        /// Identifier of the test step.
        test_step_id: String,
    },

    /// The stream ended before the run finished.
    #[error("stream ended after `{last}` without a test run finished message")]
    Truncated {
        /// Kind of the last message seen, or `start`.
        last: &'static str,
    },
}
