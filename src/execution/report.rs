//! Failure reporting capability handed to the orchestrator

use crate::core::failure::Failure;
use tracing::error;
use uuid::Uuid;

/// Sink for hard failures worth alerting about
///
/// Returns an identifier of the submitted report, stored as [`Failure::telemetry_id`].
pub trait FailureReporter {
    fn submit(&self, failure: &Failure) -> Option<String>;
}

/// Reporter that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl FailureReporter for NullReporter {
    fn submit(&self, _failure: &Failure) -> Option<String> {
        None
    }
}

/// Reporter that logs each failure under a fresh incident id
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl FailureReporter for LogReporter {
    fn submit(&self, failure: &Failure) -> Option<String> {
        let incident = Uuid::new_v4().to_string();

        error!(
            incident = %incident,
            kind = failure.kind_name(),
            captured_at = %failure.captured_at.to_rfc3339(),
            "{}",
            failure
        );

        Some(incident)
    }
}
