//! Step definition declarations.

use serde::{Deserialize, Serialize};

use crate::ids::Id;

/// Declaration of one registered step handler.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Identifier referenced by test steps matched to this handler.
    pub id: Id,
    /// Pattern the handler matches.
    pub pattern: StepDefinitionPattern,
    /// Where the handler is defined.
    pub source_reference: SourceReference,
}

/// Pattern text and its dialect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDefinitionPattern {
    /// Pattern as written by the author.
    pub source: String,
    /// Dialect of `source`.
    #[serde(rename = "type")]
    pub kind: PatternType,
}

/// Dialect of a step definition pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternType {
    /// Placeholder expression such as `I have {count} cukes`.
    CucumberExpression,
    /// Regular expression.
    RegularExpression,
}

/// Source location of a step handler.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    /// File containing the handler.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Position within `uri`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl SourceReference {
    /// Reference a line of a file.
    #[must_use]
    pub fn file_line(uri: impl Into<String>, line: u32) -> Self {
        Self {
            uri: Some(uri.into()),
            location: Some(Location { line, column: None }),
        }
    }
}

/// One-based line and optional column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// One-based line.
    pub line: u32,
    /// One-based column, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}
