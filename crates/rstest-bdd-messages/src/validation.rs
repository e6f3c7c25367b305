//! Structural checks for emitted message streams.
//!
//! A stream is accepted when, for every run it contains:
//!
//! ```text
//! stepDefinition* meta testRunStarted
//!   (testCase testCaseStarted (testStepStarted testStepFinished)* testCaseFinished)*
//! testRunFinished
//! ```
//!
//! holds, every id is declared once before any reference to it, and each
//! step duration equals the difference of its start and finish timestamps.
//! Identifier scopes reset when a new run begins.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use serde::Serialize;

use crate::clock::{Timestamp, duration_between};
use crate::error::ValidationError;
use crate::ids::Id;
use crate::messages::{
    Envelope, MessageKind, TestCase, TestCaseStarted, TestStepFinished, TestStepStarted,
};

/// Parse one NDJSON line.
///
/// # Errors
///
/// Returns [`ValidationError::Malformed`] when the line is not an envelope.
pub fn parse_line(line: usize, text: &str) -> Result<Envelope, ValidationError> {
    serde_json::from_str(text).map_err(|err| ValidationError::Malformed {
        line,
        reason: err.to_string(),
    })
}

/// Counts describing a validated stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    /// Number of messages of each kind, keyed by snake-case label.
    pub messages: BTreeMap<&'static str, usize>,
    /// Number of finished test steps per status, keyed by lowercase label.
    pub step_statuses: BTreeMap<&'static str, usize>,
    /// Number of runs in the stream.
    pub runs: usize,
    /// Outcome of the last run.
    pub success: Option<bool>,
}

impl StreamSummary {
    /// Messages of `kind` seen.
    #[must_use]
    pub fn count(&self, kind: MessageKind) -> usize {
        self.messages.get(kind.label()).copied().unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct OpenCase {
    started_id: Option<Id>,
    steps: HashSet<Id>,
    active: Option<(Id, Timestamp)>,
}

/// Incremental stream validator.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::ValidationError;
/// use rstest_bdd_messages::validation::StreamValidator;
///
/// let stream = concat!(
///     r#"{"meta":{"protocolVersion":"22.0.0","implementation":{"name":"x"},"#,
///     r#""runtime":{"name":"rust"},"os":{"name":"linux"},"cpu":{"name":"x86_64"}}}"#, "\n",
///     r#"{"testRunStarted":{"timestamp":{"seconds":1,"nanos":0}}}"#, "\n",
///     r#"{"testRunFinished":{"success":true,"timestamp":{"seconds":2,"nanos":0}}}"#, "\n",
/// );
/// let summary = StreamValidator::validate_str(stream).unwrap();
/// assert_eq!(summary.success, Some(true));
///
/// let truncated = StreamValidator::validate_str(stream.lines().next().unwrap());
/// assert_eq!(truncated, Err(ValidationError::Truncated { last: "meta" }));
/// ```
#[derive(Debug, Default)]
pub struct StreamValidator {
    last: Option<MessageKind>,
    definitions: HashSet<Id>,
    test_cases: HashMap<Id, HashSet<Id>>,
    declared: HashSet<Id>,
    case: Option<OpenCase>,
    summary: StreamSummary,
}

fn allowed_after(last: Option<MessageKind>, next: MessageKind) -> bool {
    use MessageKind as K;
    match last {
        None | Some(K::StepDefinition | K::TestRunFinished) => {
            matches!(next, K::StepDefinition | K::Meta)
        }
        Some(K::Meta) => next == K::TestRunStarted,
        Some(K::TestRunStarted | K::TestCaseFinished) => {
            matches!(next, K::TestCase | K::TestRunFinished)
        }
        Some(K::TestCase) => next == K::TestCaseStarted,
        Some(K::TestCaseStarted | K::TestStepFinished) => {
            matches!(next, K::TestStepStarted | K::TestCaseFinished)
        }
        Some(K::TestStepStarted) => next == K::TestStepFinished,
    }
}

impl StreamValidator {
    /// Validate a whole NDJSON document. Blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn validate_str(text: &str) -> Result<StreamSummary, ValidationError> {
        let mut validator = Self::default();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let number = index.saturating_add(1);
            validator.push(number, &parse_line(number, line)?)?;
        }
        validator.finish()
    }

    /// Check the next envelope of the stream.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming `line` when the envelope breaks
    /// the grammar, reuses an id, references an undeclared id or carries an
    /// inconsistent duration.
    pub fn push(&mut self, line: usize, envelope: &Envelope) -> Result<(), ValidationError> {
        let kind = envelope.kind();
        if !allowed_after(self.last, kind) {
            return Err(ValidationError::OutOfOrder {
                line,
                found: kind.label(),
                after: self.last.map_or("start", MessageKind::label),
            });
        }
        if matches!(self.last, None | Some(MessageKind::TestRunFinished)) {
            self.begin_run();
        }
        match envelope {
            Envelope::StepDefinition(definition) => {
                self.declare(line, &definition.id)?;
                self.definitions.insert(definition.id.clone());
            }
            Envelope::TestCase(test_case) => self.test_case(line, test_case)?,
            Envelope::TestCaseStarted(started) => self.case_started(line, started)?,
            Envelope::TestStepStarted(started) => self.step_started(line, started)?,
            Envelope::TestStepFinished(finished) => self.step_finished(line, finished)?,
            Envelope::TestCaseFinished(finished) => {
                let case = self.case.take().unwrap_or_default();
                check_started_id(line, case.started_id.as_ref(), &finished.test_case_started_id)?;
            }
            Envelope::TestRunFinished(finished) => self.summary.success = Some(finished.success),
            Envelope::Meta(_) | Envelope::TestRunStarted(_) => {}
        }
        *self.summary.messages.entry(kind.label()).or_default() += 1;
        self.last = Some(kind);
        Ok(())
    }

    /// Finish validation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Truncated`] unless the last run finished.
    pub fn finish(self) -> Result<StreamSummary, ValidationError> {
        match self.last {
            Some(MessageKind::TestRunFinished) => Ok(self.summary),
            last => Err(ValidationError::Truncated {
                last: last.map_or("start", MessageKind::label),
            }),
        }
    }

    fn begin_run(&mut self) {
        self.definitions.clear();
        self.test_cases.clear();
        self.declared.clear();
        self.case = None;
        self.summary.runs = self.summary.runs.saturating_add(1);
    }

    fn declare(&mut self, line: usize, id: &Id) -> Result<(), ValidationError> {
        if self.declared.insert(id.clone()) {
            Ok(())
        } else {
            Err(ValidationError::DuplicateId {
                line,
                id: id.to_string(),
            })
        }
    }

    fn test_case(&mut self, line: usize, test_case: &TestCase) -> Result<(), ValidationError> {
        let mut steps = HashSet::with_capacity(test_case.test_steps.len());
        for step in &test_case.test_steps {
            self.declare(line, &step.id)?;
            if let Some(dangling) = step
                .step_definition_ids
                .iter()
                .find(|id| !self.definitions.contains(*id))
            {
                return Err(dangling_reference(line, "stepDefinitionIds", dangling));
            }
            steps.insert(step.id.clone());
        }
        self.declare(line, &test_case.id)?;
        self.test_cases.insert(test_case.id.clone(), steps);
        Ok(())
    }

    fn case_started(
        &mut self,
        line: usize,
        started: &TestCaseStarted,
    ) -> Result<(), ValidationError> {
        let steps = self
            .test_cases
            .get(&started.test_case_id)
            .cloned()
            .ok_or_else(|| dangling_reference(line, "testCaseId", &started.test_case_id))?;
        self.declare(line, &started.id)?;
        self.case = Some(OpenCase {
            started_id: Some(started.id.clone()),
            steps,
            active: None,
        });
        Ok(())
    }

    fn open_case(
        &mut self,
        line: usize,
        started_id: &Id,
    ) -> Result<&mut OpenCase, ValidationError> {
        let case = self
            .case
            .as_mut()
            .ok_or_else(|| dangling_reference(line, "testCaseStartedId", started_id))?;
        check_started_id(line, case.started_id.as_ref(), started_id)?;
        Ok(case)
    }

    fn step_started(
        &mut self,
        line: usize,
        started: &TestStepStarted,
    ) -> Result<(), ValidationError> {
        let case = self.open_case(line, &started.test_case_started_id)?;
        if !case.steps.contains(&started.test_step_id) {
            return Err(dangling_reference(line, "testStepId", &started.test_step_id));
        }
        case.active = Some((started.test_step_id.clone(), started.timestamp));
        Ok(())
    }

    fn step_finished(
        &mut self,
        line: usize,
        finished: &TestStepFinished,
    ) -> Result<(), ValidationError> {
        let case = self.open_case(line, &finished.test_case_started_id)?;
        let Some((step_id, start)) = case.active.take() else {
            return Err(dangling_reference(line, "testStepId", &finished.test_step_id));
        };
        if step_id != finished.test_step_id {
            return Err(dangling_reference(line, "testStepId", &finished.test_step_id));
        }
        let consistent = duration_between(start, finished.timestamp)
            .is_ok_and(|elapsed| elapsed == finished.test_step_result.duration);
        if !consistent {
            return Err(ValidationError::DurationMismatch {
                line,
                test_step_id: step_id.to_string(),
            });
        }
        let status = finished.test_step_result.status.label();
        *self.summary.step_statuses.entry(status).or_default() += 1;
        Ok(())
    }
}

fn dangling_reference(line: usize, field: &'static str, id: &Id) -> ValidationError {
    ValidationError::DanglingReference {
        line,
        field,
        id: id.to_string(),
    }
}

fn check_started_id(line: usize, expected: Option<&Id>, found: &Id) -> Result<(), ValidationError> {
    if expected == Some(found) {
        Ok(())
    } else {
        Err(dangling_reference(line, "testCaseStartedId", found))
    }
}
