//! Core domain models for gluetool
//!
//! This module defines the values the engine passes around: outcomes, errors and
//! failures, module options and configuration, the module contract, and pipeline steps.

pub mod config;
pub mod dryrun;
pub mod error;
pub mod failure;
pub mod module;
pub mod outcome;
pub mod registry;
pub mod step;

pub use config::{Configuration, GlueConfig, ModuleOption, OptionKind};
pub use dryrun::DryRunLevel;
pub use error::{retry_if, Error, Result};
pub use failure::{Failure, Propagated};
pub use module::{Module, ModuleContext, ModuleInstance, SharedFunction, SharedFunctions};
pub use outcome::Outcome;
pub use registry::{ModuleFactory, ModuleRegistry};
pub use step::{CallbackStep, ModuleStep, PipelineStep};
