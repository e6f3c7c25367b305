//! Typed lifecycle events published by the host runner.
//!
//! ```text
//!   host runner ── publish(&Session, LifecycleEvent) ──► LifecycleBus
//!                                                           │
//!                                         ┌─────────────────┴──────┐
//!                                         ▼                        ▼
//!                                  LifecycleTracker           EventLogger
//! ```
//!
//! Listeners run synchronously in subscription order. The first listener
//! error stops dispatch of that event and is returned to the host.

use std::fmt;

use crate::ci::Environment;
use crate::error::MessagesError;
use crate::registry::{FeatureRef, Pickle, StepMatcher, StepPosition, StepRegistry};

/// Collaborators shared by every event of one session.
#[derive(Clone, Copy)]
pub struct Session<'a> {
    /// Source of step handler declarations.
    pub registry: &'a dyn StepRegistry,
    /// Resolves scenario steps to handlers.
    pub matcher: &'a dyn StepMatcher,
    /// Environment snapshot used for CI detection.
    pub environment: &'a Environment,
}

impl fmt::Debug for Session<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("environment", self.environment)
            .finish_non_exhaustive()
    }
}

/// Exit status reported by the host when the session ends.
///
/// Codes follow the conventional test-runner meanings; only
/// [`ExitStatus::Ok`] counts as success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    /// Every test passed.
    Ok,
    /// At least one test failed.
    TestsFailed,
    /// The run was interrupted.
    Interrupted,
    /// The runner itself failed.
    InternalError,
    /// The runner was misused.
    UsageError,
    /// Nothing was collected.
    NoTestsCollected,
    /// Any other code.
    Other(i32),
}

impl ExitStatus {
    /// Whether the run succeeded.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<i32> for ExitStatus {
    fn from(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::TestsFailed,
            2 => Self::Interrupted,
            3 => Self::InternalError,
            4 => Self::UsageError,
            5 => Self::NoTestsCollected,
            other => Self::Other(other),
        }
    }
}

/// One host lifecycle notification.
#[derive(Clone, Copy)]
pub enum LifecycleEvent<'a> {
    /// The session began.
    SessionStart,
    /// The runner is about to execute tests.
    TestLoopBegin,
    /// A scenario instance was set up and is about to be attempted.
    CaseSetup {
        /// Feature containing the scenario.
        feature: &'a FeatureRef,
        /// The scenario instance.
        scenario: &'a Pickle,
    },
    /// An attempt of the current scenario began.
    BeforeScenario {
        /// Zero-based attempt counter.
        attempt: u32,
    },
    /// A step is about to run.
    BeforeStep {
        /// Position of the step in its scenario.
        position: StepPosition,
    },
    /// A step returned normally.
    AfterStep {
        /// Position of the step in its scenario.
        position: StepPosition,
    },
    /// A step raised an error.
    StepError {
        /// Position of the step in its scenario.
        position: StepPosition,
        /// The step's error.
        error: &'a dyn fmt::Display,
    },
    /// The current scenario attempt finished.
    AfterScenario,
    /// The session ended.
    SessionFinish {
        /// Exit status reported by the host.
        exit: ExitStatus,
    },
}

impl LifecycleEvent<'_> {
    /// Snake-case name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SessionStart => "session_start",
            Self::TestLoopBegin => "test_loop_begin",
            Self::CaseSetup { .. } => "case_setup",
            Self::BeforeScenario { .. } => "before_scenario",
            Self::BeforeStep { .. } => "before_step",
            Self::AfterStep { .. } => "after_step",
            Self::StepError { .. } => "step_error",
            Self::AfterScenario => "after_scenario",
            Self::SessionFinish { .. } => "session_finish",
        }
    }
}

impl fmt::Debug for LifecycleEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CaseSetup { feature, scenario } => f
                .debug_struct("CaseSetup")
                .field("feature", &feature.name)
                .field("scenario", &scenario.name)
                .finish(),
            Self::BeforeScenario { attempt } => {
                f.debug_struct("BeforeScenario").field("attempt", attempt).finish()
            }
            Self::BeforeStep { position } | Self::AfterStep { position } => f
                .debug_struct(self.name())
                .field("position", position)
                .finish(),
            Self::StepError { position, error } => f
                .debug_struct("StepError")
                .field("position", position)
                .field("error", &format_args!("{error}"))
                .finish(),
            Self::SessionFinish { exit } => {
                f.debug_struct("SessionFinish").field("exit", exit).finish()
            }
            Self::SessionStart | Self::TestLoopBegin | Self::AfterScenario => {
                f.write_str(self.name())
            }
        }
    }
}

/// Reacts to lifecycle events.
pub trait LifecycleListener {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError`] when the event cannot be processed; the bus
    /// stops dispatching that event.
    fn handle(
        &mut self,
        session: &Session<'_>,
        event: &LifecycleEvent<'_>,
    ) -> Result<(), MessagesError>;
}

impl<T: LifecycleListener + ?Sized> LifecycleListener for &mut T {
    fn handle(
        &mut self,
        session: &Session<'_>,
        event: &LifecycleEvent<'_>,
    ) -> Result<(), MessagesError> {
        (**self).handle(session, event)
    }
}

/// Listener that logs every event at trace level.
#[derive(Clone, Copy, Debug, Default)]
pub struct EventLogger;

impl LifecycleListener for EventLogger {
    fn handle(
        &mut self,
        _session: &Session<'_>,
        event: &LifecycleEvent<'_>,
    ) -> Result<(), MessagesError> {
        log::trace!("lifecycle event {event:?}");
        Ok(())
    }
}

/// Ordered fan-out of lifecycle events to listeners.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::ci::Environment;
/// use rstest_bdd_messages::events::{EventLogger, LifecycleBus, LifecycleEvent, Session};
/// use rstest_bdd_messages::registry::DefinitionRegistry;
///
/// let registry = DefinitionRegistry::default();
/// let environment = Environment::default();
/// let session = Session {
///     registry: &registry,
///     matcher: &registry,
///     environment: &environment,
/// };
/// let mut bus = LifecycleBus::default();
/// bus.subscribe(EventLogger);
/// assert!(bus.publish(&session, LifecycleEvent::TestLoopBegin).is_ok());
/// ```
#[derive(Default)]
pub struct LifecycleBus<'l> {
    listeners: Vec<Box<dyn LifecycleListener + 'l>>,
}

impl fmt::Debug for LifecycleBus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<'l> LifecycleBus<'l> {
    /// Append a listener. Listeners receive events in subscription order.
    pub fn subscribe(&mut self, listener: impl LifecycleListener + 'l) -> &mut Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Dispatch `event` to every listener.
    ///
    /// # Errors
    ///
    /// Returns the first listener error; later listeners do not see the
    /// event.
    pub fn publish(
        &mut self,
        session: &Session<'_>,
        event: LifecycleEvent<'_>,
    ) -> Result<(), MessagesError> {
        self.listeners
            .iter_mut()
            .try_for_each(|listener| listener.handle(session, &event))
    }
}
