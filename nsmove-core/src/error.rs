//! Error types for nsmove

use thiserror::Error;

/// nsmove error types
///
/// The relocation variants follow the order in which a relocation can fail:
/// acquiring handles, switching, looking the interface up, reassigning it and
/// finally restoring the home namespace.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A namespace handle could not be opened or read, or the connection
    /// lacks the parameters needed to resolve one. Nothing to undo.
    #[error("Acquisition error: {message}")]
    Acquisition {
        /// Error message
        message: String,
    },

    /// Switching the worker thread into a namespace failed
    #[error("Switch error: {message}")]
    Switch {
        /// Error message
        message: String,
    },

    /// Interface not found in the active namespace
    #[error("Interface {interface} not found: {message}")]
    Lookup {
        /// Interface name
        interface: String,
        /// Error message
        message: String,
    },

    /// Reassigning the interface to another namespace failed
    #[error("Failed to relocate interface {interface}: {message}")]
    Relocation {
        /// Interface name
        interface: String,
        /// Error message
        message: String,
    },

    /// Restoring the home namespace failed. The worker thread is in an
    /// unknown namespace and has been torn down.
    #[error("Unrecoverable namespace state: {message}")]
    UnrecoverableState {
        /// Error message
        message: String,
    },

    /// The next chain element failed
    #[error("Delegation error: {source}")]
    Delegation {
        /// Error returned downstream
        source: Box<Error>,
    },

    /// A chain element refused the request
    #[error("Rejected: {message}")]
    Rejected {
        /// Error message
        message: String,
    },

    /// The request context was cancelled before relocation started
    #[error("Cancelled")]
    Cancelled,

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// System error from nix
    #[error("System error: {0}")]
    System(#[from] nix::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Build an [`Error::Acquisition`]
    pub fn acquisition(message: impl Into<String>) -> Self {
        Self::Acquisition {
            message: message.into(),
        }
    }

    /// Build an [`Error::Switch`]
    pub fn switch(message: impl Into<String>) -> Self {
        Self::Switch {
            message: message.into(),
        }
    }

    /// Wrap a downstream failure
    #[must_use]
    pub fn delegation(source: Self) -> Self {
        Self::Delegation {
            source: Box::new(source),
        }
    }

    /// Whether this error leaves the executing thread in an unknown namespace.
    ///
    /// Callers must stop using whatever produced a fatal error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::UnrecoverableState { .. })
    }

    /// Short, stable name of the error class (used as a tracing field)
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Acquisition { .. } => "acquisition",
            Self::Switch { .. } => "switch",
            Self::Lookup { .. } => "lookup",
            Self::Relocation { .. } => "relocation",
            Self::UnrecoverableState { .. } => "unrecoverable_state",
            Self::Delegation { .. } => "delegation",
            Self::Rejected { .. } => "rejected",
            Self::Cancelled => "cancelled",
            Self::InvalidConfig { .. } => "invalid_config",
            Self::Io(_) => "io",
            Self::System(_) => "system",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Result type alias for nsmove operations
pub type Result<T> = std::result::Result<T, Error>;
