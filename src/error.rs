//! Error types used by the listenvisor runtime, engine, and channels.
//!
//! This module defines the error enums for each stage of the listener lifecycle:
//!
//! - [`SpecError`] / [`NameError`] — invalid listener requests or object names.
//! - [`EngineError`] — failures reported by the streaming SQL engine.
//! - [`RegistrationError`] — a listener could not be created (possibly leaving an orphan).
//! - [`TeardownError`] — a listener could not be removed.
//! - [`DecodeError`] — a trigger message did not match the sink envelope.
//! - [`ChannelError`] — the trigger channel could not be read.
//! - [`RuntimeError`] — worker pool orchestration failures.
//!
//! Each type provides `as_label` returning a stable snake_case label for logs.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the worker-pool runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some workers were still running and were aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of workers that did not stop in time.
        stuck: Vec<String>,
    },

    /// A consumer worker could not join the trigger channel.
    #[error("consumer member {member} could not subscribe: {source}")]
    Subscribe {
        /// Member number.
        member: usize,
        /// Channel failure.
        #[source]
        source: ChannelError,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use listenvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Subscribe { .. } => "runtime_subscribe",
        }
    }
}

/// An identifier or identifier prefix is not legal in the engine's naming grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// Name is empty.
    #[error("object name is empty")]
    Empty,

    /// Name exceeds the engine's identifier length limit.
    #[error("object name {name:?} is longer than {max} bytes")]
    TooLong {
        /// Offending name.
        name: String,
        /// Maximum length in bytes.
        max: usize,
    },

    /// Name contains characters outside `[a-z0-9_]` or starts with a digit.
    #[error("object name {name:?} is not a plain identifier")]
    Invalid {
        /// Offending name.
        name: String,
    },
}

/// A listener request could not be turned into a [`ListenerSpec`](crate::ListenerSpec).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// The event-type set is empty.
    #[error("event type set is empty")]
    EmptyTypeSet,

    /// An event type string is empty or blank.
    #[error("event type must not be blank")]
    BlankType,

    /// A selector pool has no candidates to draw from.
    #[error("selector pool {pool:?} is empty")]
    EmptyPool {
        /// Which pool is empty (`resources`, `leads`, `type_sets`).
        pool: &'static str,
    },

    /// View and sink names must differ.
    #[error("view and sink share the name {name:?}")]
    NameClash {
        /// The shared name.
        name: String,
    },

    /// A supplied name is not a legal identifier.
    #[error(transparent)]
    Name(#[from] NameError),
}

/// # Errors reported by the streaming SQL engine.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The named object does not exist.
    #[error("object {object} does not exist")]
    NotFound {
        /// Object name.
        object: String,
    },

    /// An object with that name already exists.
    #[error("object {object} already exists")]
    AlreadyExists {
        /// Object name.
        object: String,
    },

    /// No connection could be obtained from the pool.
    #[error("connection pool error: {error}")]
    Pool {
        /// The underlying error message.
        error: String,
    },

    /// The connection failed while a statement was in flight.
    #[error("connection lost: {error}")]
    Connection {
        /// The underlying error message.
        error: String,
    },

    /// The engine rejected or failed the statement.
    #[error("statement failed: {error}")]
    Statement {
        /// The underlying error message.
        error: String,
    },

    /// The statement did not complete in time.
    #[error("statement timed out after {timeout:?}")]
    Timeout {
        /// Configured statement timeout.
        timeout: Duration,
    },
}

impl EngineError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "engine_not_found",
            EngineError::AlreadyExists { .. } => "engine_already_exists",
            EngineError::Pool { .. } => "engine_pool",
            EngineError::Connection { .. } => "engine_connection",
            EngineError::Statement { .. } => "engine_statement",
            EngineError::Timeout { .. } => "engine_timeout",
        }
    }

    /// True when the error only says the object is already gone.
    ///
    /// Teardown treats this outcome as success.
    ///
    /// # Example
    /// ```
    /// use listenvisor::EngineError;
    ///
    /// let gone = EngineError::NotFound { object: "view_1".into() };
    /// assert!(gone.is_not_found());
    ///
    /// let other = EngineError::Statement { error: "boom".into() };
    /// assert!(!other.is_not_found());
    /// ```
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }

    /// True when the statement may have been applied even though it failed.
    ///
    /// A timed-out or disconnected `CREATE` can still commit on the engine.
    ///
    /// # Example
    /// ```
    /// use listenvisor::EngineError;
    /// use std::time::Duration;
    ///
    /// assert!(EngineError::Timeout { timeout: Duration::from_secs(1) }.is_indeterminate());
    /// assert!(!EngineError::Pool { error: "no slot".into() }.is_indeterminate());
    /// ```
    pub fn is_indeterminate(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout { .. } | EngineError::Connection { .. }
        )
    }
}

/// # A listener could not be registered.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The filtered view was not created, or was dropped again after an
    /// indeterminate failure.
    #[error("create view {view} failed: {source}")]
    CreateView {
        /// View name.
        view: String,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// The sink was not created; the view was dropped again.
    #[error("create sink {sink} failed (view {view} dropped): {source}")]
    CreateSink {
        /// View name.
        view: String,
        /// Sink name.
        sink: String,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// A one-shot listener stopped waiting for its first match; the view was dropped.
    #[error("waiting on view {view} failed: {source}")]
    Tail {
        /// View name.
        view: String,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// A one-shot listener was cancelled before it matched; the view was dropped.
    #[error("one-shot listener {view} cancelled")]
    Cancelled {
        /// View name.
        view: String,
    },

    /// Registration did not complete and the compensating view drop failed as well.
    ///
    /// The view is left in the engine for external cleanup.
    #[error("orphaned view {view} could not be dropped: {drop_error} (cause: {cause:?})")]
    Orphaned {
        /// Orphaned view name.
        view: String,
        /// Sink name of the listener.
        sink: String,
        /// Why registration stopped (`None` when cancelled).
        cause: Option<EngineError>,
        /// Why the compensating drop failed.
        drop_error: EngineError,
    },
}

impl RegistrationError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistrationError::CreateView { .. } => "registration_create_view",
            RegistrationError::CreateSink { .. } => "registration_create_sink",
            RegistrationError::Tail { .. } => "registration_tail",
            RegistrationError::Cancelled { .. } => "registration_cancelled",
            RegistrationError::Orphaned { .. } => "registration_orphaned",
        }
    }

    /// True when a view was left in the engine without a way to fire or be dropped.
    pub fn is_orphaned(&self) -> bool {
        matches!(self, RegistrationError::Orphaned { .. })
    }
}

/// # A listener could not be torn down.
///
/// Both drops are attempted; each slot holds the error of the drop that failed
/// for a reason other than "does not exist".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("teardown of {view}/{sink} failed: sink={sink_error:?} view={view_error:?}")]
pub struct TeardownError {
    /// View name.
    pub view: String,
    /// Sink name.
    pub sink: String,
    /// Failure dropping the view, if any.
    pub view_error: Option<EngineError>,
    /// Failure dropping the sink, if any.
    pub sink_error: Option<EngineError>,
}

impl TeardownError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        "teardown_failed"
    }
}

/// # A delivered trigger message could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not valid JSON or a field has the wrong shape.
    #[error("malformed trigger payload: {error}")]
    Malformed {
        /// The underlying parser message.
        error: String,
    },

    /// Envelope has no `after.row` (not an insert after-image).
    #[error("trigger envelope has no after.row")]
    MissingRow,
}

impl DecodeError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DecodeError::Malformed { .. } => "decode_malformed",
            DecodeError::MissingRow => "decode_missing_row",
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError::Malformed {
            error: e.to_string(),
        }
    }
}

/// # The trigger channel could not be read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The channel was closed by the producer side.
    #[error("trigger channel closed")]
    Closed,

    /// The broker transport failed.
    #[error("trigger channel transport error: {error}")]
    Transport {
        /// The underlying error message.
        error: String,
    },
}

impl ChannelError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::Closed => "channel_closed",
            ChannelError::Transport { .. } => "channel_transport",
        }
    }
}
