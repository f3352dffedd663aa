//! Error taxonomy shared by the engine and by modules

use crate::command::ProcessOutput;
use thiserror::Error;

/// Boxed error used as the source of hard errors
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the engine, and by modules that want their failures classified
///
/// Module hooks return `anyhow::Result`, so any error type may end a phase. The variants
/// below are the ones the engine knows how to classify: a [`Error::Soft`] anywhere in an
/// error's cause chain marks the resulting failure as soft.
#[derive(Debug, Error)]
pub enum Error {
    /// Infrastructure or programming problem, always a candidate for alerting
    #[error("{message}")]
    Hard {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// User-actionable condition, e.g. an empty set of work items
    #[error("{message}")]
    Soft { message: String },

    /// Abort this pipeline attempt and let the outer driver run it again
    #[error("{message}")]
    Retry { message: String },

    /// External command exited with a non-zero status
    #[error("Command '{}' failed with exit code {}", cmd.join(" "), output.exit_code)]
    Command { cmd: Vec<String>, output: ProcessOutput },

    #[error("No such module '{0}'")]
    NoSuchModule(String),

    #[error("Step '{0}' wraps a callback and cannot be serialized")]
    NotSerializable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn hard(message: impl Into<String>) -> Self {
        Error::Hard {
            message: message.into(),
            source: None,
        }
    }

    /// Hard error caused by another error
    pub fn hard_with(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Hard {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    pub fn soft(message: impl Into<String>) -> Self {
        Error::Soft {
            message: message.into(),
        }
    }

    pub fn retry(message: impl Into<String>) -> Self {
        Error::Retry {
            message: message.into(),
        }
    }

    /// Whether this error is up to the user to fix
    pub fn is_soft(&self) -> bool {
        matches!(self, Error::Soft { .. })
    }

    /// Whether this error asks the outer driver to restart the pipeline
    pub fn is_retry(&self) -> bool {
        matches!(self, Error::Retry { .. })
    }

    /// Stable name of the error kind, used to filter failure reporting
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::Hard { .. } => "hard",
            Error::Soft { .. } => "soft",
            Error::Retry { .. } => "retry",
            Error::Command { .. } => "command",
            Error::NoSuchModule(_) => "no-such-module",
            Error::NotSerializable(_) => "not-serializable",
            Error::Serialization(_) => "serialization",
            Error::Yaml(_) => "yaml",
            Error::Io(_) => "io",
        }
    }

    /// First engine error found in the cause chain of `err`
    pub fn find_in(err: &anyhow::Error) -> Option<&Error> {
        err.chain().find_map(|cause| cause.downcast_ref::<Error>())
    }
}

/// Whether `err`, or anything it wraps, is a soft error
pub fn is_soft(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<Error>())
        .any(Error::is_soft)
}

/// Whether `err`, or anything it wraps, is a retry signal
pub fn is_retry(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<Error>())
        .any(Error::is_retry)
}

/// Turn errors matching `pred` into retry signals, leaving other results untouched
pub fn retry_if<T, F>(result: anyhow::Result<T>, pred: F) -> anyhow::Result<T>
where
    F: Fn(&anyhow::Error) -> bool,
{
    result.map_err(|err| {
        if pred(&err) && !is_retry(&err) {
            Error::retry(err.to_string()).into()
        } else {
            err
        }
    })
}
