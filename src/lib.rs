//! gluetool - runs pipelines of independently written modules

pub mod cli;
pub mod command;
pub mod core;
pub mod execution;
pub mod modules;

// Re-export commonly used types
pub use core::{
    retry_if, DryRunLevel, Error, Failure, GlueConfig, Module, ModuleContext, ModuleOption,
    ModuleRegistry, ModuleStep, Outcome, PipelineStep, Result, SharedFunctions,
};
pub use execution::{FailureReporter, Glue, LogReporter, NullReporter, Pipeline, PipelineReturn};
