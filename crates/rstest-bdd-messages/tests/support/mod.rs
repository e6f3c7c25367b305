//! Miniature host runner driving the tracker from parsed feature text.

use camino::Utf8PathBuf;
use gherkin::{Feature, GherkinEnv};
use hashbrown::HashSet;
use rstest_bdd_messages::ci::{Environment, NoCi};
use rstest_bdd_messages::events::{ExitStatus, LifecycleBus, LifecycleEvent, Session};
use rstest_bdd_messages::messages::{Envelope, Product, SourceReference};
use rstest_bdd_messages::meta::{HostInfo, MetaCollector};
use rstest_bdd_messages::registry::{
    DefinitionRegistry, FeatureRef, HandlerRef, MatchContext, Pickle, PickleStep, StepKeyword,
    StepMatcher, StepPosition,
};
use rstest_bdd_messages::validation::parse_line;
use rstest_bdd_messages::{LifecycleTracker, MessagesConfig, MessagesError};

/// Scenarios of one feature converted into pickles.
pub struct LoadedFeature {
    pub feature: FeatureRef,
    pub pickles: Vec<Pickle>,
}

fn keyword(step: &gherkin::Step) -> StepKeyword {
    step.keyword
        .trim()
        .parse()
        .or_else(|_| StepKeyword::try_from(step.ty))
        .unwrap_or_else(|err| panic!("unsupported step keyword: {err}"))
}

/// Parse `text` and flatten background and scenario steps into pickles.
pub fn load_feature(uri: &str, text: &str) -> LoadedFeature {
    let parsed = Feature::parse(text, GherkinEnv::default())
        .unwrap_or_else(|err| panic!("feature text must parse: {err}"));
    let background: Vec<&gherkin::Step> = parsed
        .background
        .as_ref()
        .map(|background| background.steps.iter().collect())
        .unwrap_or_default();
    let pickles = parsed
        .scenarios
        .iter()
        .enumerate()
        .map(|(scenario_index, scenario)| {
            let id = format!("{uri}#{scenario_index}");
            let steps = background
                .iter()
                .copied()
                .chain(scenario.steps.iter())
                .enumerate()
                .map(|(step_index, step)| {
                    PickleStep::new(format!("{id}/{step_index}"), keyword(step), step.value.clone())
                })
                .collect();
            Pickle {
                id: id.into(),
                name: scenario.name.clone(),
                steps,
            }
        })
        .collect();
    LoadedFeature {
        feature: FeatureRef {
            uri: uri.to_owned(),
            name: parsed.name.clone(),
        },
        pickles,
    }
}

pub const BASKET_FEATURE: &str = "\
Feature: Basket
  Background:
    Given an empty basket

  Scenario: Adding apples
    When I add 3 apples
    Then the basket holds 3 apples

  Scenario: Juggling
    When I juggle the basket
    And I add 1 apples
    Then the basket holds 1 apples

  Scenario: Overflowing
    When I add 2 apples
    And the basket overflows
    Then the basket holds 2 apples
";

/// Step handlers for [`BASKET_FEATURE`]; `overflow` always fails.
pub fn basket_registry() -> DefinitionRegistry {
    let mut registry = DefinitionRegistry::default();
    let source = |line| SourceReference::file_line("tests/support/mod.rs", line);
    let registered = registry
        .placeholder(Some(StepKeyword::Given), "empty_basket", "an empty basket", source(1))
        .and_then(|r| {
            let add = "I add {count:u32} apples";
            r.placeholder(Some(StepKeyword::When), "add_apples", add, source(2))
        })
        .and_then(|r| {
            r.regex(Some(StepKeyword::When), "overflow", "the basket overflows", source(3))
        })
        .and_then(|r| {
            let holds = "the basket holds {count:u32} apples";
            r.placeholder(Some(StepKeyword::Then), "holds", holds, source(4))
        });
    if let Err(err) = registered {
        panic!("basket patterns must compile: {err}");
    }
    registry
}

/// Drives a feature through a [`LifecycleBus`] the way a test runner would.
pub struct Host {
    registry: DefinitionRegistry,
    failing: HashSet<HandlerRef>,
    environment: Environment,
}

impl Host {
    pub fn new(registry: DefinitionRegistry) -> Self {
        Self {
            registry,
            failing: HashSet::from_iter([HandlerRef::from("overflow")]),
            environment: Environment::default(),
        }
    }

    /// Run `pickles`; stops a scenario at its first unmatched or failing step.
    pub fn run(
        &self,
        tracker: &mut LifecycleTracker,
        feature: &FeatureRef,
        pickles: &[Pickle],
    ) -> Result<ExitStatus, MessagesError> {
        let session = Session {
            registry: &self.registry,
            matcher: &self.registry,
            environment: &self.environment,
        };
        let mut bus = LifecycleBus::default();
        bus.subscribe(tracker);
        bus.publish(&session, LifecycleEvent::SessionStart)?;
        bus.publish(&session, LifecycleEvent::TestLoopBegin)?;
        let mut all_passed = true;
        for scenario in pickles {
            bus.publish(&session, LifecycleEvent::CaseSetup { feature, scenario })?;
            bus.publish(&session, LifecycleEvent::BeforeScenario { attempt: 0 })?;
            all_passed &= self.run_steps(&mut bus, &session, feature, scenario)?;
            bus.publish(&session, LifecycleEvent::AfterScenario)?;
        }
        let exit = if all_passed {
            ExitStatus::Ok
        } else {
            ExitStatus::TestsFailed
        };
        bus.publish(&session, LifecycleEvent::SessionFinish { exit })?;
        Ok(exit)
    }

    fn run_steps(
        &self,
        bus: &mut LifecycleBus<'_>,
        session: &Session<'_>,
        feature: &FeatureRef,
        scenario: &Pickle,
    ) -> Result<bool, MessagesError> {
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
            let Ok(matched) = self.registry.match_step(step, &context) else {
                return Ok(false);
            };
            bus.publish(session, LifecycleEvent::BeforeStep { position })?;
            if self.failing.contains(&matched.handler) {
                let error = format!("handler `{}` failed", matched.handler);
                bus.publish(session, LifecycleEvent::StepError { position, error: &error })?;
                return Ok(false);
            }
            bus.publish(session, LifecycleEvent::AfterStep { position })?;
        }
        Ok(true)
    }
}

/// Tracker writing to `path` with fixed host metadata.
pub fn file_tracker(path: &Utf8PathBuf) -> LifecycleTracker {
    tracker(MessagesConfig::default().with_ndjson_path(path.clone()))
}

/// Tracker for `config` with fixed host metadata and no CI detection.
pub fn tracker(config: MessagesConfig) -> LifecycleTracker {
    LifecycleTracker::new(config).with_meta_collector(
        MetaCollector::default().with_ci_detector(NoCi).with_host(HostInfo {
            os: Product::new("linux", Some("6.8".into())),
            cpu: Product::new("x86_64", None),
        }),
    )
}

/// Temporary directory holding the output file.
pub fn output_path() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(dir.path().join("messages.ndjson"))
        .unwrap_or_else(|path| panic!("non-UTF-8 temp path {path:?}"));
    (dir, path)
}

/// Read back an NDJSON file.
pub fn read_envelopes(path: &Utf8PathBuf) -> (String, Vec<Envelope>) {
    let text = std::fs::read_to_string(path).unwrap_or_else(|err| panic!("read {path}: {err}"));
    let envelopes = text
        .lines()
        .enumerate()
        .map(|(index, line)| parse_line(index + 1, line).unwrap_or_else(|err| panic!("{err}")))
        .collect();
    (text, envelopes)
}
