//! Captured module failures

use crate::core::error::{self, Error};
use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;

/// Something in a module's code failed
///
/// Created exactly once, where the error (or panic) is caught, then handed up the call chain
/// as an ordinary value. Reporting is done by whoever holds the failure.
#[derive(Debug)]
pub struct Failure {
    /// Unique name of the module instance the failure happened in, if any
    pub module: Option<String>,

    /// The error that ended the phase
    pub cause: anyhow::Error,

    /// User-fixable failure, never escalated to alerting
    pub soft: bool,

    /// Identifier assigned by the failure reporter, if the failure was submitted
    pub telemetry_id: Option<String>,

    pub captured_at: DateTime<Utc>,
}

/// Context attached to the cause of a failure handed further up by [`Failure::propagate`]
///
/// Displays as the message given there.
#[derive(Debug, Clone)]
pub struct Propagated {
    message: String,

    /// Module the original failure happened in
    pub module: Option<String>,

    /// Identifier the original failure was reported under
    pub telemetry_id: Option<String>,
}

impl fmt::Display for Propagated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Failure {
    pub fn new(module: Option<String>, cause: anyhow::Error) -> Self {
        let soft = error::is_soft(&cause);
        let telemetry_id = cause
            .downcast_ref::<Propagated>()
            .and_then(|propagated| propagated.telemetry_id.clone());

        Self {
            module,
            cause,
            soft,
            telemetry_id,
            captured_at: Utc::now(),
        }
    }

    /// Turn the failure back into an error for the caller's own hook to return
    ///
    /// A failure captured from the returned error keeps this one's telemetry id and is not
    /// submitted to the reporter again.
    pub fn propagate(self, message: impl Into<String>) -> anyhow::Error {
        let marker = Propagated {
            message: message.into(),
            module: self.module,
            telemetry_id: self.telemetry_id,
        };

        self.cause.context(marker)
    }

    /// Marker left by [`Failure::propagate`], if the cause went through it
    pub fn propagated(&self) -> Option<&Propagated> {
        self.cause.downcast_ref::<Propagated>()
    }

    /// Capture a panic payload as a hard failure
    pub fn from_panic(module: Option<String>, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };

        Self::new(module, Error::hard(format!("panicked: {message}")).into())
    }

    /// Whether the failure asks the outer driver to run the pipeline again
    pub fn is_retry(&self) -> bool {
        error::is_retry(&self.cause)
    }

    /// The engine error behind this failure, if the cause carries one
    pub fn error(&self) -> Option<&Error> {
        Error::find_in(&self.cause)
    }

    /// Kind name used to filter reporting; foreign errors count as hard
    pub fn kind_name(&self) -> &'static str {
        self.error().map_or("hard", Error::kind_name)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.module {
            Some(module) => write!(f, "exception in module '{}': {:#}", module, self.cause),
            None => write!(f, "exception: {:#}", self.cause),
        }
    }
}
