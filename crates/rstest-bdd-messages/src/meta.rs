//! One-shot run metadata.
//!
//! Every field is best-effort. Unknown versions are omitted, and a missing
//! CI service leaves `ci` unset; nothing here can abort session start.

use sysinfo::{CpuRefreshKind, RefreshKind, System};

use crate::ci::{CiDetector, EnvCiDetector, Environment};
use crate::messages::{Meta, PROTOCOL_VERSION, Product};
use crate::versions::{PRODUCT_NAME, RUNTIME_PRODUCT, VersionLookup, builtin_versions};

/// Name reported for the language runtime.
pub const RUNTIME_NAME: &str = "rust";

/// Operating system and processor of the machine running the tests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostInfo {
    /// Operating system name and version.
    pub os: Product,
    /// Architecture and processor model.
    pub cpu: Product,
}

impl HostInfo {
    /// Probe the current machine.
    ///
    /// Falls back to the compile-time target names when the system cannot
    /// report them.
    #[must_use]
    pub fn probe() -> Self {
        let system =
            System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing()));
        let model = system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().trim().to_owned())
            .filter(|brand| !brand.is_empty());
        if model.is_none() {
            log::debug!("processor model unavailable; omitting cpu version");
        }
        let os_name = System::name().unwrap_or_else(|| std::env::consts::OS.to_owned());
        Self {
            os: Product::new(os_name, System::os_version()),
            cpu: Product::new(std::env::consts::ARCH, model),
        }
    }
}

/// Assembles the [`Meta`] message emitted once at session start.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::ci::{Environment, NoCi};
/// use rstest_bdd_messages::messages::Product;
/// use rstest_bdd_messages::meta::{HostInfo, MetaCollector};
///
/// let collector = MetaCollector::default()
///     .with_ci_detector(NoCi)
///     .with_host(HostInfo {
///         os: Product::new("linux", None),
///         cpu: Product::new("x86_64", None),
///     });
/// let meta = collector.collect(&Environment::default());
/// assert_eq!(meta.protocol_version, "22.0.0");
/// assert_eq!(meta.implementation.name, "rstest-bdd-messages");
/// assert!(meta.ci.is_none());
/// ```
pub struct MetaCollector {
    versions: Box<dyn VersionLookup>,
    ci: Box<dyn CiDetector>,
    host: Option<HostInfo>,
}

impl Default for MetaCollector {
    fn default() -> Self {
        Self {
            versions: Box::new(builtin_versions()),
            ci: Box::new(EnvCiDetector),
            host: None,
        }
    }
}

impl std::fmt::Debug for MetaCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaCollector")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl MetaCollector {
    /// Replace the version lookup.
    #[must_use]
    pub fn with_versions(mut self, versions: impl VersionLookup + 'static) -> Self {
        self.versions = Box::new(versions);
        self
    }

    /// Replace the CI detector.
    #[must_use]
    pub fn with_ci_detector(mut self, detector: impl CiDetector + 'static) -> Self {
        self.ci = Box::new(detector);
        self
    }

    /// Use fixed host details instead of probing the machine.
    #[must_use]
    pub fn with_host(mut self, host: HostInfo) -> Self {
        self.host = Some(host);
        self
    }

    /// Build the metadata record.
    #[must_use]
    pub fn collect(&self, env: &Environment) -> Meta {
        let HostInfo { os, cpu } = self.host.clone().unwrap_or_else(HostInfo::probe);
        let ci = self.ci.detect(env);
        if let Some(ci) = &ci {
            log::debug!("running under {}", ci.name);
        }
        Meta {
            protocol_version: PROTOCOL_VERSION.to_owned(),
            implementation: Product::new(PRODUCT_NAME, self.versions.version_of(PRODUCT_NAME)),
            runtime: Product::new(RUNTIME_NAME, self.versions.version_of(RUNTIME_PRODUCT)),
            os,
            cpu,
            ci,
        }
    }
}
