//! Destinations for emitted messages.
//!
//! [`NdjsonFileSink`] appends one compact JSON object per line to a file and
//! reopens it for every message, so interleaved writers and crashes leave at
//! most the final line incomplete. [`MemorySink`] keeps envelopes in memory.
//! The [`Emitter`] wraps an optional sink and is inert when it has none.

use std::cell::RefCell;
use std::fs::OpenOptions;
use std::io::Write;
use std::rc::Rc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::MessagesConfig;
use crate::error::MessagesError;
use crate::messages::Envelope;

/// Receives envelopes in emission order.
pub trait MessageSink {
    /// Persist one envelope.
    ///
    /// # Errors
    ///
    /// Returns [`MessagesError`] when the envelope cannot be serialised or
    /// written.
    fn append(&mut self, envelope: &Envelope) -> Result<(), MessagesError>;
}

/// Serialise an envelope as a single NDJSON line, including the newline.
///
/// # Errors
///
/// Returns [`MessagesError::Serialize`] if serialisation fails.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::clock::Timestamp;
/// use rstest_bdd_messages::messages::{Envelope, TestRunStarted};
/// use rstest_bdd_messages::sink::to_ndjson_line;
///
/// let envelope = Envelope::TestRunStarted(TestRunStarted { timestamp: Timestamp::default() });
/// let line = to_ndjson_line(&envelope).unwrap();
/// assert!(line.ends_with("}\n"));
/// assert_eq!(line.lines().count(), 1);
/// ```
pub fn to_ndjson_line(envelope: &Envelope) -> Result<String, MessagesError> {
    let mut line = serde_json::to_string(envelope)?;
    line.push('\n');
    Ok(line)
}

/// Appends envelopes to an NDJSON file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NdjsonFileSink {
    path: Utf8PathBuf,
}

impl NdjsonFileSink {
    /// Target `path`. The file is created on the first append.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Output file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> MessagesError {
        MessagesError::Sink {
            path: self.path.clone(),
            source,
        }
    }
}

impl MessageSink for NdjsonFileSink {
    fn append(&mut self, envelope: &Envelope) -> Result<(), MessagesError> {
        let line = to_ndjson_line(envelope)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| self.io_error(err))?;
        file.write_all(line.as_bytes())
            .map_err(|err| self.io_error(err))?;
        file.flush().map_err(|err| self.io_error(err))
    }
}

/// In-memory sink whose clones share the same storage.
///
/// # Examples
///
/// ```
/// use rstest_bdd_messages::clock::Timestamp;
/// use rstest_bdd_messages::messages::{Envelope, TestRunStarted};
/// use rstest_bdd_messages::sink::{MemorySink, MessageSink};
///
/// let sink = MemorySink::default();
/// let mut writer = sink.clone();
/// writer
///     .append(&Envelope::TestRunStarted(TestRunStarted { timestamp: Timestamp::default() }))
///     .unwrap();
/// assert_eq!(sink.len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    envelopes: Rc<RefCell<Vec<Envelope>>>,
}

impl MemorySink {
    /// Copy of every envelope received so far.
    #[must_use]
    pub fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.borrow().clone()
    }

    /// Remove and return every envelope received so far.
    pub fn drain(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.envelopes.borrow_mut())
    }

    /// Number of envelopes received.
    #[must_use]
    pub fn len(&self) -> usize {
        self.envelopes.borrow().len()
    }

    /// Whether nothing has been received.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.envelopes.borrow().is_empty()
    }
}

impl MessageSink for MemorySink {
    fn append(&mut self, envelope: &Envelope) -> Result<(), MessagesError> {
        self.envelopes.borrow_mut().push(envelope.clone());
        Ok(())
    }
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn append(&mut self, envelope: &Envelope) -> Result<(), MessagesError> {
        (**self).append(envelope)
    }
}

/// Forwards envelopes to a sink, or drops them when none is configured.
///
/// An emitter built without a sink stays inert for its whole lifetime.
pub struct Emitter {
    sink: Option<Box<dyn MessageSink>>,
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl Emitter {
    /// Emitter writing to the configured NDJSON file, if any.
    #[must_use]
    pub fn from_config(config: &MessagesConfig) -> Self {
        config
            .ndjson_path()
            .map_or_else(Self::disabled, |path| Self::with_sink(NdjsonFileSink::new(path.clone())))
    }

    /// Emitter forwarding to `sink`.
    #[must_use]
    pub fn with_sink(sink: impl MessageSink + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
        }
    }

    /// Emitter that drops everything.
    #[must_use]
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Whether envelopes reach a sink.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Forward `envelope` to the sink.
    ///
    /// # Errors
    ///
    /// Propagates the sink's failure.
    pub fn emit(&mut self, envelope: &Envelope) -> Result<(), MessagesError> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        log::debug!("emitting {}", envelope.kind().label());
        sink.append(envelope)
    }

    /// Drop the sink. Later emissions are ignored.
    pub fn disable(&mut self) {
        self.sink = None;
    }
}
