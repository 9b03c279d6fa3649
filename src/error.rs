//! # Error Handling
//!
//! This module defines the centralized error type for the merge engine. It
//! uses the `thiserror` library to build a single `Error` enum covering every
//! failure mode of a merge run, from trigger construction through livefs
//! mutation.
//!
//! ## Key Components
//!
//! - **`Error`**: The main enum. Each variant carries the context needed to
//!   tell the caller which hook, trigger, or change-set was involved.
//!
//! - **`Result<T>`**: A type alias for `std::result::Result<T, Error>`.
//!
//! ## Fatal versus recoverable
//!
//! Only `Error::TriggerWarning` is recoverable. A hook catches it, records it
//! against its status, and carries on with the next trigger. Every other
//! variant raised while a trigger runs is wrapped in `Error::TriggerFailed`
//! and aborts the whole run. Use [`Error::is_warning`] and
//! [`Error::root_cause`] to inspect an error without matching on the wrapper.

use thiserror::Error;

/// Main error type for merge engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// A trigger was constructed with malformed arguments.
    ///
    /// Raised at construction time, never during a run.
    #[error("Trigger validation error: {message}")]
    Validation { message: String },

    /// A trigger required a change-set the engine does not have and cannot derive.
    #[error("Missing change-set '{label}' required by trigger '{trigger}' in hook '{hook}'")]
    MissingChangeSet {
        hook: String,
        trigger: String,
        label: String,
    },

    /// A delegated action failed in a way that does not make the merge unsafe.
    #[error("Trigger warning: {message}")]
    TriggerWarning { message: String },

    /// A trigger raised a fatal error; the run was aborted.
    #[error("Trigger '{trigger}' failed in hook '{hook}': {source}")]
    TriggerFailed {
        hook: String,
        trigger: String,
        #[source]
        source: Box<Error>,
    },

    /// A registration strategy refused to add a trigger to a hook.
    #[error("Registration of trigger '{trigger}' into hook '{hook}' rejected: {reason}")]
    RegistrationRejected {
        hook: String,
        trigger: String,
        reason: String,
    },

    /// Registration was attempted on a hook that has already started firing.
    #[error("Hook '{hook}' has already fired; registration is closed")]
    HookSealed { hook: String },

    /// A trigger was registered against a hook the engine does not know.
    #[error("Unknown hook: {hook}")]
    UnknownHook { hook: String },

    /// No routine is registered under the requested plugin namespace and name.
    #[error("Plugin not found: {namespace}:{name}")]
    PluginNotFound { namespace: String, name: String },

    /// An external process could not be started.
    #[error("Failed to spawn {command}: {message}")]
    Spawn { command: String, message: String },

    /// A livefs operation failed.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// The merge configuration could not be parsed.
    #[error("Configuration parsing error: {message}")]
    ConfigParse { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A directory walk error, wrapped from `walkdir::Error`.
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl Error {
    /// Build a `TriggerWarning` from anything printable.
    pub fn warning(message: impl Into<String>) -> Self {
        Error::TriggerWarning {
            message: message.into(),
        }
    }

    /// Build a `Validation` error from anything printable.
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Whether this error is a recoverable trigger warning.
    pub fn is_warning(&self) -> bool {
        matches!(self, Error::TriggerWarning { .. })
    }

    /// Strip any `TriggerFailed` wrappers and return the underlying error.
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Error::TriggerFailed { source, .. } = current {
            current = source;
        }
        current
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
