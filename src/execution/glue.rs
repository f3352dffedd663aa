//! The orchestrator: stack of nested pipelines and shared-function resolution

use crate::core::config::GlueConfig;
use crate::core::dryrun::DryRunLevel;
use crate::core::error::{Error, Result};
use crate::core::failure::Failure;
use crate::core::module::{ModuleContext, SharedFunction};
use crate::core::registry::ModuleRegistry;
use crate::core::step::PipelineStep;
use crate::execution::pipeline::{Pipeline, PipelineReturn};
use crate::execution::report::{FailureReporter, NullReporter};
use crate::execution::shared::SharedEntry;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info_span, warn};

/// Owner recorded for functions the orchestrator publishes itself
pub const CORE_OWNER: &str = "gluetool core";

/// Pops the innermost pipeline when a run ends, however it ends
struct StackGuard<'a> {
    stack: &'a RefCell<Vec<Rc<Pipeline>>>,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.stack.borrow_mut().pop();
    }
}

pub struct Glue {
    config: GlueConfig,
    dryrun_level: DryRunLevel,
    registry: ModuleRegistry,
    reporter: Box<dyn FailureReporter>,

    /// Never empty: the base pipeline holds orchestrator-level functions
    stack: RefCell<Vec<Rc<Pipeline>>>,
}

impl Glue {
    pub fn new(registry: ModuleRegistry, config: GlueConfig) -> Self {
        Self::with_reporter(registry, config, Box::new(NullReporter))
    }

    pub fn with_reporter(
        registry: ModuleRegistry,
        config: GlueConfig,
        reporter: Box<dyn FailureReporter>,
    ) -> Self {
        let dryrun_level = config.dryrun_level();
        if dryrun_level.is_enabled() {
            warn!("running at dry-run level {}", dryrun_level);
        }

        let base = Pipeline::new(Vec::new());
        base.add_shared(
            "eval_context",
            CORE_OWNER,
            Rc::new(|glue: &Glue, _args: &[Value]| Ok(Value::Object(glue.eval_context()))),
        );

        Self {
            config,
            dryrun_level,
            registry,
            reporter,
            stack: RefCell::new(vec![Rc::new(base)]),
        }
    }

    pub fn config(&self) -> &GlueConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Process-wide dry-run level, fixed at construction
    pub fn dryrun_level(&self) -> DryRunLevel {
        self.dryrun_level
    }

    /// Number of pipelines on the stack, the base one included
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    fn innermost(&self) -> Rc<Pipeline> {
        let stack = self.stack.borrow();
        // The base pipeline is pushed in the constructor and never popped
        Rc::clone(&stack[stack.len() - 1])
    }

    /// Snapshot of the stack, oldest pipeline first
    fn pipelines(&self) -> Vec<Rc<Pipeline>> {
        self.stack.borrow().clone()
    }

    pub fn run_steps(&self, steps: Vec<PipelineStep>) -> PipelineReturn {
        self.run_pipeline(Rc::new(Pipeline::new(steps)))
    }

    /// Run a single module as a pipeline of its own
    pub fn run_module(&self, name: &str, argv: Vec<String>) -> PipelineReturn {
        self.run_steps(vec![PipelineStep::module(name, argv)])
    }

    /// Push `pipeline`, run it to completion and pop it again
    ///
    /// Handy when the caller wants to inspect the pipeline afterwards.
    pub fn run_pipeline(&self, pipeline: Rc<Pipeline>) -> PipelineReturn {
        self.stack.borrow_mut().push(Rc::clone(&pipeline));
        let _guard = StackGuard { stack: &self.stack };

        let _span = info_span!("pipeline", depth = self.depth() - 1).entered();
        debug!(
            "running pipeline: {}",
            pipeline
                .steps()
                .iter()
                .map(PipelineStep::designation)
                .collect::<Vec<_>>()
                .join(" ")
        );

        pipeline.run(self)
    }

    /// Unique name of the module running in the innermost pipeline, if any
    pub fn current_module(&self) -> Option<String> {
        self.pipelines()
            .iter()
            .rev()
            .find_map(|pipeline| pipeline.current_module())
    }

    /// Publish `function` in the innermost pipeline
    pub fn add_shared(
        &self,
        name: &str,
        owner: &str,
        function: SharedFunction,
    ) -> Option<SharedEntry> {
        self.innermost().add_shared(name, owner, function)
    }

    /// Remove `name` from the innermost pipeline; unknown names are ignored
    pub fn del_shared(&self, name: &str) {
        if self.innermost().del_shared(name).is_some() {
            debug!("removed shared function '{}'", name);
        }
    }

    pub fn has_shared(&self, name: &str) -> bool {
        self.get_shared(name).is_some()
    }

    /// Resolve `name`, innermost pipeline first
    pub fn get_shared(&self, name: &str) -> Option<SharedFunction> {
        self.pipelines()
            .iter()
            .rev()
            .find_map(|pipeline| pipeline.get_shared(name))
    }

    /// Call a shared function; `None` when nobody provides it
    pub fn shared(&self, name: &str, args: &[Value]) -> anyhow::Result<Option<Value>> {
        let Some(function) = self.get_shared(name) else {
            debug!("shared function '{}' not available", name);
            return Ok(None);
        };

        function(self, args).map(Some)
    }

    /// Check that all `names` are available
    ///
    /// A missing function is a hard error, or only a warning with `warn_only`; the return value
    /// tells whether everything was found.
    pub fn require_shared(&self, names: &[&str], warn_only: bool) -> Result<bool> {
        for name in names {
            if self.has_shared(name) {
                continue;
            }

            let message = format!(
                "Shared function '{}' is required. See `gluetool -L` to find out which module provides it.",
                name
            );

            if warn_only {
                warn!("{}", message);
                return Ok(false);
            }

            return Err(Error::hard(message));
        }

        Ok(true)
    }

    /// Variables of the whole stack merged together, newer modules winning
    pub fn eval_context(&self) -> Map<String, Value> {
        let mut context = Map::new();

        let env: Map<String, Value> = std::env::vars()
            .map(|(key, value)| (key, Value::String(value)))
            .collect();
        context.insert("ENV".to_string(), Value::Object(env));

        for pipeline in self.pipelines() {
            for instance in pipeline.modules() {
                let ctx = ModuleContext::new(self, &instance);
                context.extend(instance.module().eval_context(&ctx));
            }
        }

        if let Some(module) = self.current_module() {
            context.insert("MODULE".to_string(), Value::String(module));
        }

        context
    }

    /// Hand a hard failure to the reporter and remember the id it returns
    pub fn report_failure(&self, failure: &mut Failure) {
        if failure.propagated().is_some() {
            debug!("failure already went through a nested pipeline");
            return;
        }

        if failure.soft {
            debug!("not reporting soft failure");
            return;
        }

        let kind = failure.kind_name();
        if self.config.no_report_errors.iter().any(|name| name == kind) {
            debug!("not reporting failure of kind '{}'", kind);
            return;
        }

        failure.telemetry_id = self.reporter.submit(failure);
    }
}

impl fmt::Debug for Glue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Glue")
            .field("dryrun_level", &self.dryrun_level)
            .field("registry", &self.registry)
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}
