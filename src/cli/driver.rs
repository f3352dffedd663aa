//! Outer driver: retries of the whole pipeline and the exit status

use crate::core::failure::Failure;
use crate::core::step::PipelineStep;
use crate::execution::{Glue, PipelineReturn};
use tracing::{error, warn};

/// Run `steps`, running them again up to `retries` times while they ask for a retry
///
/// A teardown failure ends the loop at once. When retries run out, the last result is returned.
pub fn run_with_retries(glue: &Glue, steps: &[PipelineStep], retries: usize) -> PipelineReturn {
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            warn!("retrying execution (attempt #{} out of {})", attempt, retries);
        }

        let (failure, destroy_failure) = glue.run_steps(steps.to_vec());

        let retry = destroy_failure.is_none() && failure.as_ref().is_some_and(Failure::is_retry);
        if !retry || attempt >= retries {
            return (failure, destroy_failure);
        }

        if let Some(failure) = &failure {
            error!("{}", failure.cause);
        }

        attempt += 1;
    }
}

/// Process exit status for a pipeline result
///
/// Clean runs and soft failures exit with 0, hard failures with 1. A teardown failure
/// overrides the status of the run.
pub fn exit_status(result: &PipelineReturn) -> i32 {
    let status = |failure: &Failure| if failure.soft { 0 } else { 1 };

    match result {
        (_, Some(destroy_failure)) => status(destroy_failure),
        (Some(failure), None) => status(failure),
        (None, None) => 0,
    }
}
