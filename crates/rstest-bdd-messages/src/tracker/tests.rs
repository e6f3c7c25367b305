//! Unit tests for the lifecycle tracker.

use std::cell::Cell;
use std::rc::Rc;

use rstest::{fixture, rstest};

use super::*;
use crate::ci::NoCi;
use crate::clock::{Duration, Timestamp};
use crate::events::LifecycleBus;
use crate::messages::{MessageKind, Product, SourceReference};
use crate::meta::HostInfo;
use crate::registry::{DefinitionRegistry, NoMatch, PickleStep, StepKeyword, StepMatch};
use crate::sink::MemorySink;

/// Clock advancing by a fixed step on every read.
#[derive(Clone)]
struct SteppingClock {
    next: Rc<Cell<u64>>,
    step: u64,
    reads: Rc<Cell<usize>>,
}

impl SteppingClock {
    fn new(start: u64, step: u64) -> Self {
        Self {
            next: Rc::new(Cell::new(start)),
            step,
            reads: Rc::new(Cell::new(0)),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> Timestamp {
        self.reads.set(self.reads.get() + 1);
        let now = self.next.get();
        self.next.set(now + self.step);
        Timestamp::from_epoch_nanos(now)
    }
}

/// Id generator counting how often it was asked.
struct CountingIds {
    inner: IncrementingIds,
    calls: Rc<Cell<usize>>,
}

impl IdGenerator for CountingIds {
    fn next_id(&mut self) -> Id {
        self.calls.set(self.calls.get() + 1);
        self.inner.next_id()
    }
}

struct Harness {
    tracker: LifecycleTracker<SteppingClock, CountingIds>,
    sink: MemorySink,
    clock: SteppingClock,
    id_calls: Rc<Cell<usize>>,
}

fn harness(emitter: Emitter, sink: MemorySink, config: MessagesConfig) -> Harness {
    let clock = SteppingClock::new(1_700_000_000_999_999_000, 1_500);
    let id_calls = Rc::new(Cell::new(0));
    let meta = MetaCollector::default().with_ci_detector(NoCi).with_host(HostInfo {
        os: Product::new("linux", None),
        cpu: Product::new("x86_64", None),
    });
    let tracker = LifecycleTracker::new(config)
        .with_emitter(emitter)
        .with_meta_collector(meta)
        .with_clock(clock.clone())
        .with_ids(CountingIds {
            inner: IncrementingIds::default(),
            calls: Rc::clone(&id_calls),
        });
    Harness {
        tracker,
        sink,
        clock,
        id_calls,
    }
}

#[fixture]
fn enabled() -> Harness {
    let sink = MemorySink::default();
    harness(Emitter::with_sink(sink.clone()), sink, MessagesConfig::default())
}

#[fixture]
fn disabled() -> Harness {
    harness(Emitter::disabled(), MemorySink::default(), MessagesConfig::default())
}

#[fixture]
fn registry() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::default();
    let source = |line| SourceReference::file_line("tests/steps/basket.rs", line);
    let add = "I add {count:u32} apples";
    let holds = "the basket holds {count:u32}";
    let registered = registry
        .placeholder(Some(StepKeyword::Given), "empty_basket", "an empty basket", source(3))
        .and_then(|r| r.placeholder(Some(StepKeyword::When), "add", add, source(8)))
        .and_then(|r| r.placeholder(Some(StepKeyword::Then), "holds", holds, source(13)));
    if let Err(err) = registered {
        panic!("patterns must compile: {err}");
    }
    registry
}

fn feature() -> FeatureRef {
    FeatureRef {
        uri: "tests/features/basket.feature".into(),
        name: "Basket".into(),
    }
}

fn scenario(steps: &[(StepKeyword, &str)]) -> Pickle {
    Pickle {
        id: Id::from("pickle-0"),
        name: "Adding apples".into(),
        steps: steps
            .iter()
            .enumerate()
            .map(|(index, (keyword, text))| {
                PickleStep::new(format!("pickle-0-step-{index}"), *keyword, *text)
            })
            .collect(),
    }
}

fn passing_scenario() -> Pickle {
    scenario(&[
        (StepKeyword::Given, "an empty basket"),
        (StepKeyword::When, "I add 3 apples"),
        (StepKeyword::Then, "the basket holds 3"),
    ])
}

fn run_scenario(
    tracker: &mut LifecycleTracker<SteppingClock, CountingIds>,
    registry: &DefinitionRegistry,
    scenario: &Pickle,
) -> Result<(), MessagesError> {
    tracker.session_start(registry, &Environment::default())?;
    tracker.test_loop_begin()?;
    tracker.case_setup(&feature(), scenario, registry)?;
    tracker.before_scenario(0)?;
    for index in 0..scenario.steps.len() {
        tracker.before_step(StepPosition(index))?;
        tracker.after_step(StepPosition(index))?;
    }
    tracker.after_scenario()?;
    tracker.session_finish(ExitStatus::Ok)
}

fn kinds(sink: &MemorySink) -> Vec<MessageKind> {
    sink.envelopes().iter().map(Envelope::kind).collect()
}

#[rstest]
fn disabled_tracker_touches_nothing(mut disabled: Harness, registry: DefinitionRegistry) {
    let result = run_scenario(&mut disabled.tracker, &registry, &passing_scenario());
    assert!(result.is_ok());
    // Out-of-order hooks are ignored too.
    assert!(disabled.tracker.after_scenario().is_ok());
    assert!(disabled.tracker.before_step(StepPosition(9)).is_ok());
    assert_eq!(disabled.clock.reads.get(), 0);
    assert_eq!(disabled.id_calls.get(), 0);
    assert!(disabled.sink.is_empty());
    assert!(!disabled.tracker.is_enabled());
}

#[rstest]
fn passing_scenario_emits_the_full_grammar(mut enabled: Harness, registry: DefinitionRegistry) {
    let result = run_scenario(&mut enabled.tracker, &registry, &passing_scenario());
    assert!(result.is_ok(), "{result:?}");
    use MessageKind as K;
    assert_eq!(
        kinds(&enabled.sink),
        [
            K::StepDefinition,
            K::StepDefinition,
            K::StepDefinition,
            K::Meta,
            K::TestRunStarted,
            K::TestCase,
            K::TestCaseStarted,
            K::TestStepStarted,
            K::TestStepFinished,
            K::TestStepStarted,
            K::TestStepFinished,
            K::TestStepStarted,
            K::TestStepFinished,
            K::TestCaseFinished,
            K::TestRunFinished,
        ]
    );
}

#[rstest]
fn identifiers_follow_allocation_order(mut enabled: Harness, registry: DefinitionRegistry) {
    assert!(run_scenario(&mut enabled.tracker, &registry, &passing_scenario()).is_ok());
    let envelopes = enabled.sink.envelopes();
    let test_case = envelopes.iter().find(|e| e.kind() == MessageKind::TestCase);
    let Some(Envelope::TestCase(test_case)) = test_case else {
        panic!("test case missing");
    };
    // Definitions take 0..=2, steps 3..=5, the case 6.
    assert_eq!(test_case.id.as_str(), "6");
    let step_ids: Vec<_> = test_case.test_steps.iter().map(|step| step.id.as_str()).collect();
    assert_eq!(step_ids, ["3", "4", "5"]);
    let definition_ids: Vec<_> = test_case
        .test_steps
        .iter()
        .flat_map(|step| step.step_definition_ids.iter().map(Id::as_str))
        .collect();
    assert_eq!(definition_ids, ["0", "1", "2"]);
    let Some(Envelope::TestCaseStarted(started)) =
        envelopes.iter().find(|e| e.kind() == MessageKind::TestCaseStarted)
    else {
        panic!("test case started missing");
    };
    assert_eq!(started.id.as_str(), "7");
    assert_eq!(started.test_case_id, test_case.id);
    assert_eq!(started.worker_id.as_deref(), Some("master"));
    for envelope in &envelopes {
        match envelope {
            Envelope::TestStepStarted(step) => assert_eq!(step.test_case_started_id, started.id),
            Envelope::TestStepFinished(step) => assert_eq!(step.test_case_started_id, started.id),
            Envelope::TestCaseFinished(finished) => {
                assert_eq!(finished.test_case_started_id, started.id);
                assert!(!finished.will_be_retried);
            }
            _ => {}
        }
    }
}

#[rstest]
fn step_durations_match_the_clock(mut enabled: Harness, registry: DefinitionRegistry) {
    assert!(run_scenario(&mut enabled.tracker, &registry, &passing_scenario()).is_ok());
    let finished: Vec<_> = enabled
        .sink
        .envelopes()
        .into_iter()
        .filter_map(|envelope| match envelope {
            Envelope::TestStepFinished(finished) => Some(finished),
            _ => None,
        })
        .collect();
    assert_eq!(finished.len(), 3);
    for step in finished {
        assert_eq!(step.test_step_result.duration, Duration { seconds: 0, nanos: 1_500 });
        assert_eq!(step.test_step_result.status, Status::Passed);
    }
}

#[rstest]
fn unmatched_steps_are_left_out(mut enabled: Harness, registry: DefinitionRegistry) {
    let scenario = scenario(&[
        (StepKeyword::Given, "an empty basket"),
        (StepKeyword::When, "I juggle the apples"),
        (StepKeyword::Then, "the basket holds 0"),
    ]);
    let tracker = &mut enabled.tracker;
    assert!(tracker.session_start(&registry, &Environment::default()).is_ok());
    assert!(tracker.test_loop_begin().is_ok());
    assert!(tracker.case_setup(&feature(), &scenario, &registry).is_ok());
    assert!(tracker.before_scenario(0).is_ok());
    let reads = enabled.clock.reads.get();
    let result = tracker.before_step(StepPosition(1));
    assert!(matches!(
        result,
        Err(MessagesError::UnresolvedStep { position: 1, .. })
    ));
    assert_eq!(enabled.clock.reads.get(), reads);

    let envelopes = enabled.sink.envelopes();
    let test_case = envelopes.iter().find(|e| e.kind() == MessageKind::TestCase);
    let Some(Envelope::TestCase(test_case)) = test_case else {
        panic!("test case missing");
    };
    let pickle_steps: Vec<_> = test_case
        .test_steps
        .iter()
        .map(|step| step.pickle_step_id.as_str())
        .collect();
    assert_eq!(pickle_steps, ["pickle-0-step-0", "pickle-0-step-2"]);
}

#[rstest]
fn new_case_replaces_previous_step_ids(mut enabled: Harness, registry: DefinitionRegistry) {
    let first = passing_scenario();
    let second = scenario(&[
        (StepKeyword::Given, "an empty basket"),
        (StepKeyword::When, "I juggle the apples"),
    ]);
    let tracker = &mut enabled.tracker;
    let setup = (|| {
        tracker.session_start(&registry, &Environment::default())?;
        tracker.test_loop_begin()?;
        tracker.case_setup(&feature(), &first, &registry)?;
        tracker.before_scenario(0)?;
        for index in 0..first.steps.len() {
            tracker.before_step(StepPosition(index))?;
            tracker.after_step(StepPosition(index))?;
        }
        tracker.after_scenario()?;
        tracker.case_setup(&feature(), &second, &registry)?;
        tracker.before_scenario(0)
    })();
    assert!(setup.is_ok(), "{setup:?}");

    let result = tracker.before_step(StepPosition(1));

    let envelopes = enabled.sink.envelopes();
    let case_ids: Vec<_> = envelopes
        .iter()
        .filter_map(|envelope| match envelope {
            Envelope::TestCase(test_case) => Some(test_case.id.clone()),
            _ => None,
        })
        .collect();
    let [_, second_case_id] = case_ids.as_slice() else {
        panic!("expected two test cases, got {case_ids:?}");
    };
    assert!(
        matches!(
            &result,
            Err(MessagesError::UnresolvedStep { position: 1, test_case_id })
                if test_case_id == second_case_id
        ),
        "{result:?}"
    );
}

#[rstest]
fn failing_step_marks_the_run_unsuccessful(mut enabled: Harness, registry: DefinitionRegistry) {
    let scenario = passing_scenario();
    let tracker = &mut enabled.tracker;
    let outcome = (|| -> Result<(), MessagesError> {
        tracker.session_start(&registry, &Environment::default())?;
        tracker.test_loop_begin()?;
        tracker.case_setup(&feature(), &scenario, &registry)?;
        tracker.before_scenario(0)?;
        tracker.before_step(StepPosition(0))?;
        tracker.after_step(StepPosition(0))?;
        tracker.before_step(StepPosition(1))?;
        tracker.step_error(StepPosition(1), &"basket is full")?;
        tracker.after_scenario()?;
        tracker.session_finish(ExitStatus::TestsFailed)
    })();
    assert!(outcome.is_ok(), "{outcome:?}");
    let envelopes = enabled.sink.envelopes();
    let statuses: Vec<_> = envelopes
        .iter()
        .filter_map(|envelope| match envelope {
            Envelope::TestStepFinished(finished) => Some(finished.test_step_result.status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, [Status::Passed, Status::Failed]);
    let Some(Envelope::TestRunFinished(finished)) = envelopes.last() else {
        panic!("run finished missing");
    };
    assert!(!finished.success);
}

#[rstest]
#[case::step_before_case("before_step", "run_started")]
#[case::scenario_before_setup("before_scenario", "run_started")]
#[case::case_finished_without_start("after_scenario", "run_started")]
fn hooks_out_of_order_are_rejected(
    mut enabled: Harness,
    registry: DefinitionRegistry,
    #[case] hook: &str,
    #[case] state: &'static str,
) {
    let tracker = &mut enabled.tracker;
    assert!(tracker.session_start(&registry, &Environment::default()).is_ok());
    assert!(tracker.test_loop_begin().is_ok());
    let result = match hook {
        "before_step" => tracker.before_step(StepPosition(0)),
        "before_scenario" => tracker.before_scenario(0),
        _ => tracker.after_scenario(),
    };
    assert!(
        matches!(
            result,
            Err(MessagesError::UnexpectedEvent { state: s, event }) if s == state && event == hook
        ),
        "{result:?}"
    );
}

#[rstest]
fn session_must_start_before_the_loop(mut enabled: Harness) {
    let result = enabled.tracker.test_loop_begin();
    assert!(matches!(
        result,
        Err(MessagesError::UnexpectedEvent { state: "idle", event: "test_loop_begin" })
    ));
    assert_eq!(enabled.clock.reads.get(), 0);
}

struct RogueMatcher;

impl StepMatcher for RogueMatcher {
    fn match_step(
        &self,
        _step: &PickleStep,
        _context: &MatchContext<'_>,
    ) -> Result<StepMatch, NoMatch> {
        Ok(StepMatch {
            handler: HandlerRef::from("undeclared"),
            arguments: Vec::new(),
        })
    }
}

#[rstest]
fn undeclared_handlers_are_rejected(mut enabled: Harness, registry: DefinitionRegistry) {
    let tracker = &mut enabled.tracker;
    assert!(tracker.session_start(&registry, &Environment::default()).is_ok());
    assert!(tracker.test_loop_begin().is_ok());
    let result = tracker.case_setup(&feature(), &passing_scenario(), &RogueMatcher);
    assert!(matches!(
        result,
        Err(MessagesError::UnknownHandler { handler }) if handler == "undeclared"
    ));
}

#[rstest]
fn disabling_mid_run_stops_emission(mut enabled: Harness, registry: DefinitionRegistry) {
    let tracker = &mut enabled.tracker;
    assert!(tracker.session_start(&registry, &Environment::default()).is_ok());
    assert!(tracker.test_loop_begin().is_ok());
    let emitted = enabled.sink.len();
    let reads = enabled.clock.reads.get();
    tracker.disable();
    assert!(tracker.case_setup(&feature(), &passing_scenario(), &registry).is_ok());
    assert!(tracker.session_finish(ExitStatus::Ok).is_ok());
    assert_eq!(enabled.sink.len(), emitted);
    assert_eq!(enabled.clock.reads.get(), reads);
}

#[rstest]
fn configured_worker_id_is_reported(registry: DefinitionRegistry) {
    let sink = MemorySink::default();
    let mut harness = harness(
        Emitter::with_sink(sink.clone()),
        sink,
        MessagesConfig::default().with_worker_id("gw2"),
    );
    assert!(run_scenario(&mut harness.tracker, &registry, &passing_scenario()).is_ok());
    let worker = harness.sink.envelopes().into_iter().find_map(|envelope| match envelope {
        Envelope::TestCaseStarted(started) => started.worker_id,
        _ => None,
    });
    assert_eq!(worker.as_deref(), Some("gw2"));
}

/// Clock replaying fixed readings.
struct ReplayClock(Cell<usize>, Vec<Timestamp>);

impl Clock for ReplayClock {
    fn now(&self) -> Timestamp {
        let index = self.0.get();
        self.0.set(index + 1);
        self.1.get(index).copied().unwrap_or_default()
    }
}

#[rstest]
fn clock_regression_is_fatal(registry: DefinitionRegistry) {
    let sink = MemorySink::default();
    let readings = vec![
        Timestamp { seconds: 10, nanos: 0 },
        Timestamp { seconds: 11, nanos: 0 },
        Timestamp { seconds: 12, nanos: 0 },
        Timestamp { seconds: 11, nanos: 999_999_999 },
    ];
    let mut tracker = LifecycleTracker::new(MessagesConfig::default())
        .with_emitter(Emitter::with_sink(sink))
        .with_meta_collector(MetaCollector::default().with_ci_detector(NoCi))
        .with_clock(ReplayClock(Cell::new(0), readings));
    let outcome = (|| -> Result<(), MessagesError> {
        tracker.session_start(&registry, &Environment::default())?;
        tracker.test_loop_begin()?;
        tracker.case_setup(&feature(), &passing_scenario(), &registry)?;
        tracker.before_scenario(0)?;
        tracker.before_step(StepPosition(0))?;
        tracker.after_step(StepPosition(0))
    })();
    assert!(matches!(outcome, Err(MessagesError::ClockRegression { .. })), "{outcome:?}");
}

#[rstest]
fn tracker_listens_on_the_bus(mut enabled: Harness, registry: DefinitionRegistry) {
    let environment = Environment::default();
    let session = Session {
        registry: &registry,
        matcher: &registry,
        environment: &environment,
    };
    let feature = feature();
    let scenario = passing_scenario();
    let error = "apple slipped";
    let events = [
        LifecycleEvent::SessionStart,
        LifecycleEvent::TestLoopBegin,
        LifecycleEvent::CaseSetup {
            feature: &feature,
            scenario: &scenario,
        },
        LifecycleEvent::BeforeScenario { attempt: 0 },
        LifecycleEvent::BeforeStep { position: StepPosition(0) },
        LifecycleEvent::StepError {
            position: StepPosition(0),
            error: &error,
        },
        LifecycleEvent::AfterScenario,
        LifecycleEvent::SessionFinish {
            exit: ExitStatus::from(1),
        },
    ];
    {
        let mut bus = LifecycleBus::default();
        bus.subscribe(&mut enabled.tracker);
        for event in events {
            if let Err(err) = bus.publish(&session, event) {
                panic!("{} failed: {err}", event.name());
            }
        }
    }
    assert_eq!(enabled.sink.len(), 11);
}
