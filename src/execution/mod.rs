//! Pipeline execution engine

pub mod glue;
pub mod pipeline;
pub mod report;
pub mod shared;

pub use glue::{Glue, CORE_OWNER};
pub use pipeline::{Pipeline, PipelineReturn, PipelineState};
pub use report::{FailureReporter, LogReporter, NullReporter};
pub use shared::{SharedEntry, SharedFunctionTable};
