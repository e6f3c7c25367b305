//! Cucumber message stream reporting for rstest-bdd runs.
//!
//! This crate turns the lifecycle of a behaviour test run into an ordered,
//! newline-delimited stream of Cucumber protocol messages that external
//! report tools can consume.
//!
//! # Overview
//!
//! A host runner publishes [`events::LifecycleEvent`]s (or calls the hook
//! methods directly) on a [`LifecycleTracker`]. The tracker assigns ids,
//! captures timestamps and hands each [`messages::Envelope`] to an
//! [`sink::Emitter`], which appends it to the configured NDJSON file.
//!
//! Reporting is off unless an output path is configured. A disabled tracker
//! returns from every hook before doing any work.
//!
//! # Configuration
//!
//! - `RSTEST_BDD_MESSAGES_NDJSON`: output file; unset or empty disables
//!   reporting
//! - `RSTEST_BDD_WORKER_ID`: worker id reported on each test case attempt
//!
//! # Example
//!
//! ```
//! use rstest_bdd_messages::ci::Environment;
//! use rstest_bdd_messages::events::ExitStatus;
//! use rstest_bdd_messages::registry::DefinitionRegistry;
//! use rstest_bdd_messages::{LifecycleTracker, MessagesConfig};
//!
//! let mut tracker = LifecycleTracker::new(MessagesConfig::default());
//! let registry = DefinitionRegistry::default();
//! tracker.session_start(&registry, &Environment::default())?;
//! tracker.session_finish(ExitStatus::Ok)?;
//! assert!(!tracker.is_enabled());
//! # Ok::<(), rstest_bdd_messages::MessagesError>(())
//! ```

pub mod ci;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod messages;
pub mod meta;
pub mod registry;
pub mod sink;
pub mod tracker;
pub mod validation;
pub mod versions;

pub use config::MessagesConfig;
pub use error::{MessagesError, PatternError, ValidationError};
pub use tracker::LifecycleTracker;
