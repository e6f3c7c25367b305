//! Run metadata.

use serde::{Deserialize, Serialize};

/// Describes the reporting implementation and the machine running it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// Version of the messages protocol.
    pub protocol_version: String,
    /// This reporting implementation.
    pub implementation: Product,
    /// Language runtime.
    pub runtime: Product,
    /// Operating system.
    pub os: Product,
    /// Processor architecture and model.
    pub cpu: Product,
    /// Continuous integration service, when one was detected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci: Option<Ci>,
}

/// Named product with an optional version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    /// Product name.
    pub name: String,
    /// Product version, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Product {
    /// Construct a product description.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Continuous integration service running the tests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ci {
    /// Service name, for example `GitHub Actions`.
    pub name: String,
    /// Link to the build.
    pub url: String,
    /// Build number assigned by the service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_number: Option<String>,
    /// Revision under test.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git: Option<Git>,
}

/// Source revision under test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Git {
    /// Remote repository URL.
    pub remote: String,
    /// Commit hash.
    pub revision: String,
    /// Branch name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Tag name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}
