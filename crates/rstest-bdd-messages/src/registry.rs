//! Step definitions, scenario steps and the matching between them.
//!
//! The tracker depends on two collaborator traits: [`StepRegistry`] lists the
//! handlers a run knows about and [`StepMatcher`] resolves a scenario step to
//! one of them. [`DefinitionRegistry`] implements both for hosts that do not
//! bring their own matcher.

use std::fmt;

use regex::Regex;
use rstest_bdd_patterns::build_regex_from_pattern;
use rstest_bdd_patterns::pattern::lexer::{Token, lex_pattern};
use thiserror::Error;

use crate::error::PatternError;
use crate::ids::Id;
use crate::messages::{
    Group, PatternType, SourceReference, StepDefinitionPattern, StepMatchArgument,
};

pub use rstest_bdd_patterns::{StepKeyword, StepKeywordParseError};

/// Feature file containing a scenario.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureRef {
    /// Path of the feature file.
    pub uri: String,
    /// Feature title.
    pub name: String,
}

/// One step of a scenario as declared in its feature file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickleStep {
    /// Identifier assigned by the host.
    pub id: Id,
    /// Keyword as written.
    pub keyword: StepKeyword,
    /// Step text without the keyword.
    pub text: String,
}

impl PickleStep {
    /// Construct a step.
    #[must_use]
    pub fn new(id: impl Into<Id>, keyword: StepKeyword, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            keyword,
            text: text.into(),
        }
    }
}

/// A scenario instance ready to execute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pickle {
    /// Identifier assigned by the host.
    pub id: Id,
    /// Scenario title.
    pub name: String,
    /// Steps in declaration order.
    pub steps: Vec<PickleStep>,
}

/// Zero-based index of a step within its scenario.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StepPosition(pub usize);

impl fmt::Display for StepPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Stable key naming a step handler.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerRef(String);

impl HandlerRef {
    /// Wrap a handler key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerRef {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A step handler as declared to the message stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerDeclaration {
    /// Key the matcher returns for this handler.
    pub handler: HandlerRef,
    /// Pattern the handler matches.
    pub pattern: StepDefinitionPattern,
    /// Where the handler is defined.
    pub source: SourceReference,
}

/// Lists every step handler known to the run.
pub trait StepRegistry {
    /// Declarations in a stable order.
    fn step_handlers(&self) -> Vec<HandlerDeclaration>;
}

/// Surroundings of the step being matched.
#[derive(Clone, Copy, Debug)]
pub struct MatchContext<'a> {
    /// Feature containing the scenario.
    pub feature: &'a FeatureRef,
    /// Scenario containing the step.
    pub scenario: &'a Pickle,
    /// Position of the step being matched.
    pub position: StepPosition,
    /// Step immediately before, if any.
    pub previous_step: Option<&'a PickleStep>,
}

/// Successful resolution of a step to a handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepMatch {
    /// Matched handler.
    pub handler: HandlerRef,
    /// Captured arguments, in pattern order.
    pub arguments: Vec<StepMatchArgument>,
}

/// No handler accepts the step.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("no step definition matches `{} {text}`", .keyword.as_str())]
pub struct NoMatch {
    /// Keyword the step was matched under.
    pub keyword: StepKeyword,
    /// Step text.
    pub text: String,
}

/// Resolves scenario steps to handlers.
pub trait StepMatcher {
    /// Find the handler for `step`.
    ///
    /// # Errors
    ///
    /// Returns [`NoMatch`] when no handler accepts the step.
    fn match_step(
        &self,
        step: &PickleStep,
        context: &MatchContext<'_>,
    ) -> Result<StepMatch, NoMatch>;
}

impl<T: StepRegistry + ?Sized> StepRegistry for &T {
    fn step_handlers(&self) -> Vec<HandlerDeclaration> {
        (**self).step_handlers()
    }
}

impl<T: StepMatcher + ?Sized> StepMatcher for &T {
    fn match_step(
        &self,
        step: &PickleStep,
        context: &MatchContext<'_>,
    ) -> Result<StepMatch, NoMatch> {
        (**self).match_step(step, context)
    }
}

/// Anchored regex source for a `{name[:type]}` pattern, plus the type hint
/// of each capture group in order.
fn compile_placeholders(pattern: &str) -> Result<(String, Vec<Option<String>>), PatternError> {
    let invalid = |source| PatternError::Placeholder {
        pattern: pattern.to_owned(),
        source,
    };
    let regex = build_regex_from_pattern(pattern).map_err(invalid)?;
    let hints = lex_pattern(pattern)
        .map_err(invalid)?
        .into_iter()
        .filter_map(|token| match token {
            Token::Placeholder { hint, .. } => Some(hint),
            _ => None,
        })
        .collect();
    Ok((regex, hints))
}

#[derive(Debug)]
struct Definition {
    declaration: HandlerDeclaration,
    keyword: Option<StepKeyword>,
    regex: Regex,
    parameter_types: Vec<Option<String>>,
}

impl Definition {
    fn capture(&self, text: &str) -> Option<Vec<StepMatchArgument>> {
        let captures = self.regex.captures(text)?;
        let arguments = captures
            .iter()
            .skip(1)
            .enumerate()
            .map(|(index, group)| StepMatchArgument {
                group: Group {
                    children: Vec::new(),
                    start: group.and_then(|m| u32::try_from(m.start()).ok()),
                    value: group.map(|m| m.as_str().to_owned()),
                },
                parameter_type_name: self.parameter_types.get(index).cloned().flatten(),
            })
            .collect();
        Some(arguments)
    }
}

/// Reference registry and matcher.
///
/// Definitions are tried in registration order. Definitions registered for
/// the step's resolved keyword are preferred; definitions registered without
/// a keyword accept any step. The first matching definition wins.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::messages::SourceReference;
/// use rstest_bdd_messages::registry::{
///     DefinitionRegistry, FeatureRef, MatchContext, Pickle, PickleStep, StepKeyword,
///     StepMatcher, StepPosition,
/// };
///
/// let mut registry = DefinitionRegistry::default();
/// registry
///     .placeholder(
///         Some(StepKeyword::Given),
///         "cukes",
///         "I have {count:u32} cukes",
///         SourceReference::file_line("tests/steps.rs", 4),
///     )
///     .unwrap();
///
/// let step = PickleStep::new("s0", StepKeyword::Given, "I have 5 cukes");
/// let scenario = Pickle { id: "p0".into(), name: "Eating".into(), steps: vec![step.clone()] };
/// let feature = FeatureRef { uri: "eating.feature".into(), name: "Cukes".into() };
/// let context = MatchContext {
///     feature: &feature,
///     scenario: &scenario,
///     position: StepPosition(0),
///     previous_step: None,
/// };
/// let matched = registry.match_step(&step, &context).unwrap();
/// assert_eq!(matched.handler.as_str(), "cukes");
/// assert_eq!(matched.arguments[0].group.value.as_deref(), Some("5"));
/// ```
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    definitions: Vec<Definition>,
}

impl DefinitionRegistry {
    /// Register a handler with a `{name[:type]}` placeholder pattern.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError`] when the pattern is malformed.
    pub fn placeholder(
        &mut self,
        keyword: Option<StepKeyword>,
        handler: impl Into<HandlerRef>,
        pattern: &str,
        source: SourceReference,
    ) -> Result<&mut Self, PatternError> {
        let (regex_source, parameter_types) = compile_placeholders(pattern)?;
        let regex = compile(pattern, &regex_source)?;
        let pattern = StepDefinitionPattern {
            source: pattern.to_owned(),
            kind: PatternType::CucumberExpression,
        };
        self.push(keyword, handler.into(), pattern, regex, parameter_types, source);
        Ok(self)
    }

    /// Register a handler with a regular expression matched against the
    /// whole step text.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Regex`] when the expression does not compile.
    pub fn regex(
        &mut self,
        keyword: Option<StepKeyword>,
        handler: impl Into<HandlerRef>,
        pattern: &str,
        source: SourceReference,
    ) -> Result<&mut Self, PatternError> {
        let regex = compile(pattern, &format!("^(?:{pattern})$"))?;
        let parameter_types = vec![None; regex.captures_len().saturating_sub(1)];
        let pattern = StepDefinitionPattern {
            source: pattern.to_owned(),
            kind: PatternType::RegularExpression,
        };
        self.push(keyword, handler.into(), pattern, regex, parameter_types, source);
        Ok(self)
    }

    fn push(
        &mut self,
        keyword: Option<StepKeyword>,
        handler: HandlerRef,
        pattern: StepDefinitionPattern,
        regex: Regex,
        parameter_types: Vec<Option<String>>,
        source: SourceReference,
    ) {
        self.definitions.push(Definition {
            declaration: HandlerDeclaration {
                handler,
                pattern,
                source,
            },
            keyword,
            regex,
            parameter_types,
        });
    }

    /// Number of registered definitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

fn compile(pattern: &str, source: &str) -> Result<Regex, PatternError> {
    Regex::new(source).map_err(|source| PatternError::Regex {
        pattern: pattern.to_owned(),
        source,
    })
}

fn resolved_keyword(step: &PickleStep, context: &MatchContext<'_>) -> StepKeyword {
    let preceding = context
        .scenario
        .steps
        .get(..context.position.0)
        .unwrap_or_default();
    let mut prev = None;
    for earlier in preceding {
        let _ = earlier.keyword.resolve(&mut prev);
    }
    if prev.is_none() {
        // Scenarios assembled without their earlier steps still carry the
        // immediate predecessor.
        prev = context
            .previous_step
            .map(|step| step.keyword)
            .filter(|keyword| !matches!(keyword, StepKeyword::And | StepKeyword::But));
    }
    step.keyword.resolve(&mut prev)
}

impl StepRegistry for DefinitionRegistry {
    fn step_handlers(&self) -> Vec<HandlerDeclaration> {
        self.definitions
            .iter()
            .map(|definition| definition.declaration.clone())
            .collect()
    }
}

impl StepMatcher for DefinitionRegistry {
    fn match_step(
        &self,
        step: &PickleStep,
        context: &MatchContext<'_>,
    ) -> Result<StepMatch, NoMatch> {
        let keyword = resolved_keyword(step, context);
        let strict = |definition: &&Definition| definition.keyword == Some(keyword);
        let liberal = |definition: &&Definition| definition.keyword.is_none();
        let passes: [&dyn Fn(&&Definition) -> bool; 2] = [&strict, &liberal];
        for accepts in passes {
            let mut candidates = self
                .definitions
                .iter()
                .filter(accepts)
                .filter_map(|definition| Some((definition, definition.capture(&step.text)?)));
            if let Some((definition, arguments)) = candidates.next() {
                if candidates.next().is_some() {
                    log::warn!(
                        "several step definitions match `{} {}`; using `{}`",
                        keyword.as_str(),
                        step.text,
                        definition.declaration.handler
                    );
                }
                return Ok(StepMatch {
                    handler: definition.declaration.handler.clone(),
                    arguments,
                });
            }
        }
        Err(NoMatch {
            keyword,
            text: step.text.clone(),
        })
    }
}
