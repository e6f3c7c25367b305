//! Product version lookup used when assembling run metadata.
//!
//! A [`VersionTable`] answers from explicit entries first and otherwise
//! applies the [`Fallback`] chosen when the table was built.

use std::collections::BTreeMap;
use std::fmt;

/// Name under which this crate reports itself in run metadata.
pub const PRODUCT_NAME: &str = "rstest-bdd-messages";

/// Product looked up for the runtime version.
pub const RUNTIME_PRODUCT: &str = "rustc";

/// Resolves the version string of a named product.
pub trait VersionLookup {
    /// Version of `product`, or `None` when it cannot be determined.
    fn version_of(&self, product: &str) -> Option<String>;
}

/// Policy applied to products without an explicit table entry.
#[derive(Clone, Copy, Default)]
pub enum Fallback {
    /// Derive the version from the product name.
    Compute(fn(&str) -> Option<String>),
    /// Report the product name itself as the version.
    Passthrough,
    /// Report a fixed version string.
    Literal(&'static str),
    /// Report no version.
    #[default]
    Skip,
}

impl fmt::Debug for Fallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Compute(_) => f.write_str("Compute(..)"),
            Self::Passthrough => f.write_str("Passthrough"),
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Skip => f.write_str("Skip"),
        }
    }
}

impl Fallback {
    fn resolve(self, product: &str) -> Option<String> {
        match self {
            Self::Compute(compute) => compute(product),
            Self::Passthrough => Some(product.to_owned()),
            Self::Literal(value) => Some(value.to_owned()),
            Self::Skip => None,
        }
    }
}

/// Version lookup backed by explicit entries and a fallback policy.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::versions::{Fallback, VersionLookup, VersionTable};
///
/// let table = VersionTable::new(Fallback::Literal("unknown"))
///     .with_version("rustc", "1.85.0");
/// assert_eq!(table.version_of("rustc").as_deref(), Some("1.85.0"));
/// assert_eq!(table.version_of("cargo").as_deref(), Some("unknown"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct VersionTable {
    entries: BTreeMap<String, String>,
    fallback: Fallback,
}

impl VersionTable {
    /// Create an empty table with the given fallback.
    #[must_use]
    pub fn new(fallback: Fallback) -> Self {
        Self {
            entries: BTreeMap::new(),
            fallback,
        }
    }

    /// Register the version of `product`, replacing any earlier entry.
    #[must_use]
    pub fn with_version(mut self, product: impl Into<String>, version: impl Into<String>) -> Self {
        self.entries.insert(product.into(), version.into());
        self
    }
}

impl VersionLookup for VersionTable {
    fn version_of(&self, product: &str) -> Option<String> {
        self.entries
            .get(product)
            .cloned()
            .or_else(|| self.fallback.resolve(product))
    }
}

/// Compiler version captured when this crate was built, if the build script
/// could determine it.
pub const RUSTC_VERSION: Option<&str> = option_env!("RSTEST_BDD_MESSAGES_RUSTC_VERSION");

/// Table knowing this crate's own version and the compiler that built it.
#[must_use]
pub fn builtin_versions() -> VersionTable {
    let table =
        VersionTable::new(Fallback::Skip).with_version(PRODUCT_NAME, env!("CARGO_PKG_VERSION"));
    match RUSTC_VERSION {
        Some(version) => table.with_version(RUNTIME_PRODUCT, version),
        None => table,
    }
}
