//! Lifecycle tracker translating host events into protocol messages.
//!
//! ```text
//! Idle ──session_start──► MetaEmitted ──test_loop_begin──► RunStarted
//! RunStarted ──case_setup──► CaseAnnounced ──before_scenario──► CaseStarted
//! CaseStarted ──before_step──► StepStarted ──after_step | step_error──► CaseStarted
//! CaseStarted ──after_scenario──► RunStarted
//! RunStarted ──session_finish──► Idle
//! ```
//!
//! A hook arriving in any other state fails with
//! [`MessagesError::UnexpectedEvent`]. When the emitter has no sink every
//! hook returns immediately without reading the clock, allocating ids or
//! changing state.

mod case;

use std::fmt;

use hashbrown::HashMap;

use crate::ci::Environment;
use crate::clock::{Clock, SystemClock, duration_between};
use crate::config::MessagesConfig;
use crate::error::MessagesError;
use crate::events::{ExitStatus, LifecycleEvent, LifecycleListener, Session};
use crate::ids::{Id, IdGenerator, IncrementingIds};
use crate::messages::{
    Envelope, Status, StepDefinition, StepMatchArgumentsList, TestCase, TestCaseFinished,
    TestCaseStarted, TestRunFinished, TestRunStarted, TestStep, TestStepFinished,
    TestStepResult, TestStepStarted,
};
use crate::meta::MetaCollector;
use crate::registry::{
    FeatureRef, HandlerRef, MatchContext, Pickle, StepMatcher, StepPosition, StepRegistry,
};
use crate::sink::Emitter;

use case::CaseContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle,
    MetaEmitted,
    RunStarted,
    CaseAnnounced,
    CaseStarted,
    StepStarted,
}

impl Phase {
    const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::MetaEmitted => "meta_emitted",
            Self::RunStarted => "run_started",
            Self::CaseAnnounced => "case_announced",
            Self::CaseStarted => "case_started",
            Self::StepStarted => "step_started",
        }
    }
}

/// Tracks one worker's run and emits its message stream.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::ci::{Environment, NoCi};
/// use rstest_bdd_messages::events::ExitStatus;
/// use rstest_bdd_messages::meta::MetaCollector;
/// use rstest_bdd_messages::registry::DefinitionRegistry;
/// use rstest_bdd_messages::sink::{Emitter, MemorySink};
/// use rstest_bdd_messages::{LifecycleTracker, MessagesConfig};
///
/// let sink = MemorySink::default();
/// let mut tracker = LifecycleTracker::new(MessagesConfig::default())
///     .with_emitter(Emitter::with_sink(sink.clone()))
///     .with_meta_collector(MetaCollector::default().with_ci_detector(NoCi));
/// let registry = DefinitionRegistry::default();
///
/// tracker.session_start(&registry, &Environment::default())?;
/// tracker.test_loop_begin()?;
/// tracker.session_finish(ExitStatus::Ok)?;
/// assert_eq!(sink.len(), 3);
/// # Ok::<(), rstest_bdd_messages::MessagesError>(())
/// ```
pub struct LifecycleTracker<C = SystemClock, G = IncrementingIds> {
    emitter: Emitter,
    clock: C,
    ids: G,
    meta: MetaCollector,
    worker_id: String,
    phase: Phase,
    definitions: HashMap<HandlerRef, Id>,
    case: Option<CaseContext>,
}

impl<C, G> fmt::Debug for LifecycleTracker<C, G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleTracker")
            .field("emitter", &self.emitter)
            .field("worker_id", &self.worker_id)
            .field("phase", &self.phase)
            .field("definitions", &self.definitions.len())
            .finish_non_exhaustive()
    }
}

impl LifecycleTracker {
    /// Tracker writing to the file named by `config`, using the system
    /// clock and incrementing ids.
    #[must_use]
    pub fn new(config: MessagesConfig) -> Self {
        Self {
            emitter: Emitter::from_config(&config),
            clock: SystemClock::new(),
            ids: IncrementingIds::default(),
            meta: MetaCollector::default(),
            worker_id: config.worker_id().to_owned(),
            phase: Phase::Idle,
            definitions: HashMap::new(),
            case: None,
        }
    }
}

impl<C, G> LifecycleTracker<C, G> {
    /// Replace the clock.
    #[must_use]
    pub fn with_clock<C2: Clock>(self, clock: C2) -> LifecycleTracker<C2, G> {
        LifecycleTracker {
            emitter: self.emitter,
            clock,
            ids: self.ids,
            meta: self.meta,
            worker_id: self.worker_id,
            phase: self.phase,
            definitions: self.definitions,
            case: self.case,
        }
    }

    /// Replace the id generator.
    #[must_use]
    pub fn with_ids<G2: IdGenerator>(self, ids: G2) -> LifecycleTracker<C, G2> {
        LifecycleTracker {
            emitter: self.emitter,
            clock: self.clock,
            ids,
            meta: self.meta,
            worker_id: self.worker_id,
            phase: self.phase,
            definitions: self.definitions,
            case: self.case,
        }
    }

    /// Replace the emitter.
    #[must_use]
    pub fn with_emitter(mut self, emitter: Emitter) -> Self {
        self.emitter = emitter;
        self
    }

    /// Replace the metadata collector.
    #[must_use]
    pub fn with_meta_collector(mut self, meta: MetaCollector) -> Self {
        self.meta = meta;
        self
    }

    /// Whether hooks produce messages.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.emitter.is_enabled()
    }

    /// Turn every later hook into a no-op.
    ///
    /// Nothing is flushed or closed; messages already written stay as they
    /// are.
    pub fn disable(&mut self) {
        log::debug!("message tracking disabled in phase {}", self.phase.name());
        self.emitter.disable();
    }
}

impl<C: Clock, G: IdGenerator> LifecycleTracker<C, G> {
    fn expect_phase(&self, expected: Phase, event: &'static str) -> Result<(), MessagesError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(MessagesError::UnexpectedEvent {
                state: self.phase.name(),
                event,
            })
        }
    }

    fn case_mut(&mut self, event: &'static str) -> Result<&mut CaseContext, MessagesError> {
        let state = self.phase.name();
        self.case
            .as_mut()
            .ok_or(MessagesError::UnexpectedEvent { state, event })
    }

    /// Declare every step handler, then emit the run metadata.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError`] when called out of order or when the sink
    /// fails.
    pub fn session_start(
        &mut self,
        registry: &dyn StepRegistry,
        environment: &Environment,
    ) -> Result<(), MessagesError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.expect_phase(Phase::Idle, "session_start")?;
        self.definitions.clear();
        for declaration in registry.step_handlers() {
            let id = self.ids.next_id();
            self.emitter.emit(&Envelope::StepDefinition(StepDefinition {
                id: id.clone(),
                pattern: declaration.pattern,
                source_reference: declaration.source,
            }))?;
            if let Some(previous) = self.definitions.insert(declaration.handler, id) {
                log::warn!("step handler declared twice; replacing definition {previous}");
            }
        }
        self.emitter
            .emit(&Envelope::Meta(self.meta.collect(environment)))?;
        self.phase = Phase::MetaEmitted;
        Ok(())
    }

    /// Mark the start of test execution.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError`] when called out of order or when the sink
    /// fails.
    pub fn test_loop_begin(&mut self) -> Result<(), MessagesError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.expect_phase(Phase::MetaEmitted, "test_loop_begin")?;
        let timestamp = self.clock.now();
        self.emitter
            .emit(&Envelope::TestRunStarted(TestRunStarted { timestamp }))?;
        self.phase = Phase::RunStarted;
        Ok(())
    }

    /// Resolve the scenario's steps and declare the test case.
    ///
    /// Steps the matcher rejects are left out of the test case.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError::UnknownHandler`] when the matcher names a
    /// handler the registry never declared, or another [`MessagesError`]
    /// when called out of order or when the sink fails.
    pub fn case_setup(
        &mut self,
        feature: &FeatureRef,
        scenario: &Pickle,
        matcher: &dyn StepMatcher,
    ) -> Result<(), MessagesError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.expect_phase(Phase::RunStarted, "case_setup")?;
        let mut arena = HashMap::with_capacity(scenario.steps.len());
        let mut test_steps = Vec::with_capacity(scenario.steps.len());
        let mut previous_step = None;
        for (index, step) in scenario.steps.iter().enumerate() {
            let position = StepPosition(index);
            let context = MatchContext {
                feature,
                scenario,
                position,
                previous_step,
            };
            previous_step = Some(step);
            let matched = match matcher.match_step(step, &context) {
                Ok(matched) => matched,
                Err(no_match) => {
                    log::debug!("{no_match}; step {position} of `{}` left out", scenario.name);
                    continue;
                }
            };
            let definition_id = self
                .definitions
                .get(&matched.handler)
                .cloned()
                .ok_or_else(|| MessagesError::UnknownHandler {
                    handler: matched.handler.to_string(),
                })?;
            let id = self.ids.next_id();
            arena.insert(position, id.clone());
            test_steps.push(TestStep {
                id,
                pickle_step_id: step.id.clone(),
                step_definition_ids: vec![definition_id],
                step_match_arguments_lists: Some(vec![StepMatchArgumentsList {
                    step_match_arguments: matched.arguments,
                }]),
            });
        }
        let test_case_id = self.ids.next_id();
        self.emitter.emit(&Envelope::TestCase(TestCase {
            id: test_case_id.clone(),
            pickle_id: scenario.id.clone(),
            test_steps,
        }))?;
        self.case = Some(CaseContext::new(test_case_id, arena));
        self.phase = Phase::CaseAnnounced;
        Ok(())
    }

    /// Start an attempt of the announced test case.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError`] when called out of order or when the sink
    /// fails.
    pub fn before_scenario(&mut self, attempt: u32) -> Result<(), MessagesError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.expect_phase(Phase::CaseAnnounced, "before_scenario")?;
        let started_id = self.ids.next_id();
        let timestamp = self.clock.now();
        let worker_id = self.worker_id.clone();
        let case = self.case_mut("before_scenario")?;
        case.start_attempt(started_id.clone());
        let envelope = Envelope::TestCaseStarted(TestCaseStarted {
            attempt,
            id: started_id,
            test_case_id: case.test_case_id().clone(),
            worker_id: Some(worker_id),
            timestamp,
        });
        self.emitter.emit(&envelope)?;
        self.phase = Phase::CaseStarted;
        Ok(())
    }

    /// Record the start of the step at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError::UnresolvedStep`] when the step was left out
    /// at case setup, or another [`MessagesError`] when called out of order
    /// or when the sink fails.
    pub fn before_step(&mut self, position: StepPosition) -> Result<(), MessagesError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.expect_phase(Phase::CaseStarted, "before_step")?;
        let case = self.case_mut("before_step")?;
        let step_id = case.step_id(position)?.clone();
        let started_id = started_id(case, "before_step")?;
        let timestamp = self.clock.now();
        let case = self.case_mut("before_step")?;
        case.record_start(step_id.clone(), timestamp);
        self.emitter.emit(&Envelope::TestStepStarted(TestStepStarted {
            test_case_started_id: started_id,
            test_step_id: step_id,
            timestamp,
        }))?;
        self.phase = Phase::StepStarted;
        Ok(())
    }

    /// Record that the step at `position` passed.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError`] when the step cannot be resolved, was not
    /// started, the clock regressed, or the sink fails.
    pub fn after_step(&mut self, position: StepPosition) -> Result<(), MessagesError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.finish_step(position, Status::Passed, "after_step")
    }

    /// Record that the step at `position` failed.
    ///
    /// The error is logged and not embedded in the message.
    ///
    /// # Errors
    ///
    /// As for [`after_step`](Self::after_step).
    pub fn step_error(
        &mut self,
        position: StepPosition,
        error: &dyn fmt::Display,
    ) -> Result<(), MessagesError> {
        if !self.is_enabled() {
            return Ok(());
        }
        log::debug!("step {position} failed: {error}");
        self.finish_step(position, Status::Failed, "step_error")
    }

    fn finish_step(
        &mut self,
        position: StepPosition,
        status: Status,
        event: &'static str,
    ) -> Result<(), MessagesError> {
        self.expect_phase(Phase::StepStarted, event)?;
        let case = self.case_mut(event)?;
        let step_id = case.step_id(position)?.clone();
        let started_id = started_id(case, event)?;
        let start = case.take_start(&step_id)?;
        let finish = self.clock.now();
        let duration = duration_between(start, finish)?;
        self.emitter.emit(&Envelope::TestStepFinished(TestStepFinished {
            test_case_started_id: started_id,
            test_step_id: step_id,
            test_step_result: TestStepResult {
                duration,
                status,
                message: None,
            },
            timestamp: finish,
        }))?;
        self.phase = Phase::CaseStarted;
        Ok(())
    }

    /// Finish the current test case attempt.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError`] when called out of order or when the sink
    /// fails.
    pub fn after_scenario(&mut self) -> Result<(), MessagesError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.expect_phase(Phase::CaseStarted, "after_scenario")?;
        let case = self.case_mut("after_scenario")?;
        let started_id = started_id(case, "after_scenario")?;
        let timestamp = self.clock.now();
        self.emitter.emit(&Envelope::TestCaseFinished(TestCaseFinished {
            test_case_started_id: started_id,
            timestamp,
            will_be_retried: false,
        }))?;
        self.case = None;
        self.phase = Phase::RunStarted;
        Ok(())
    }

    /// Finish the run with the host's exit status.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError`] when called out of order or when the sink
    /// fails.
    pub fn session_finish(&mut self, exit: ExitStatus) -> Result<(), MessagesError> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.expect_phase(Phase::RunStarted, "session_finish")?;
        let timestamp = self.clock.now();
        self.emitter.emit(&Envelope::TestRunFinished(TestRunFinished {
            success: exit.is_success(),
            timestamp,
            message: None,
        }))?;
        self.definitions.clear();
        self.phase = Phase::Idle;
        Ok(())
    }
}

fn started_id(case: &CaseContext, event: &'static str) -> Result<Id, MessagesError> {
    case.started_id()
        .cloned()
        .ok_or_else(|| MessagesError::UnexpectedEvent {
            state: Phase::CaseAnnounced.name(),
            event,
        })
}

impl<C: Clock, G: IdGenerator> LifecycleListener for LifecycleTracker<C, G> {
    fn handle(
        &mut self,
        session: &Session<'_>,
        event: &LifecycleEvent<'_>,
    ) -> Result<(), MessagesError> {
        match *event {
            LifecycleEvent::SessionStart => {
                self.session_start(session.registry, session.environment)
            }
            LifecycleEvent::TestLoopBegin => self.test_loop_begin(),
            LifecycleEvent::CaseSetup { feature, scenario } => {
                self.case_setup(feature, scenario, session.matcher)
            }
            LifecycleEvent::BeforeScenario { attempt } => self.before_scenario(attempt),
            LifecycleEvent::BeforeStep { position } => self.before_step(position),
            LifecycleEvent::AfterStep { position } => self.after_step(position),
            LifecycleEvent::StepError { position, error } => self.step_error(position, error),
            LifecycleEvent::AfterScenario => self.after_scenario(),
            LifecycleEvent::SessionFinish { exit } => self.session_finish(exit),
        }
    }
}

#[cfg(test)]
mod tests;
