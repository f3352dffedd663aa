//! Module contract and live module instances

use crate::core::config::{Configuration, ModuleOption};
use crate::core::dryrun::DryRunLevel;
use crate::core::error::{Error, Result};
use crate::core::failure::Failure;
use crate::core::step::PipelineStep;
use crate::execution::{Glue, PipelineReturn};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use tracing::{debug, warn};

/// A function one module publishes for others to call
pub type SharedFunction = Rc<dyn Fn(&Glue, &[Value]) -> anyhow::Result<Value>>;

/// Named callables a module exports
#[derive(Clone, Default)]
pub struct SharedFunctions {
    functions: BTreeMap<String, SharedFunction>,
}

impl SharedFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a function, builder style
    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Glue, &[Value]) -> anyhow::Result<Value> + 'static,
    {
        self.insert(name, Rc::new(function));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, function: SharedFunction) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<&SharedFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }
}

impl fmt::Debug for SharedFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.functions.keys()).finish()
    }
}

/// A unit of pipeline work
///
/// Every hook has a default, so a module implements only what it needs. Hooks take `&self`:
/// a module may be reached again (through its shared functions, or a nested pipeline) while
/// one of its hooks is running, so mutable state belongs behind a `RefCell`.
pub trait Module {
    /// Name of the implementation, e.g. `yaml-pipeline`
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Options accepted from config files and command-line arguments
    fn options(&self) -> Vec<ModuleOption> {
        Vec::new()
    }

    fn required_options(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Highest dry-run level the module can honour
    fn supported_dryrun_level(&self) -> DryRunLevel {
        DryRunLevel::Default
    }

    /// Names of shared functions this module promises to publish
    fn shared_function_names(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Callables backing the names from [`Module::shared_function_names`]
    fn shared_functions(self: Rc<Self>) -> SharedFunctions {
        SharedFunctions::new()
    }

    /// Extra checks before anything executes
    fn sanity(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn execute(&self, _ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Cleanup, called however the pipeline ended
    ///
    /// `failure` is the failure that ended the pipeline, if any.
    fn destroy(&self, _ctx: &ModuleContext<'_>, _failure: Option<&Failure>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Variables this module contributes to the evaluation context
    fn eval_context(&self, _ctx: &ModuleContext<'_>) -> Map<String, Value> {
        Map::new()
    }
}

/// A materialized module: implementation plus its own configuration store
pub struct ModuleInstance {
    unique_name: String,
    module: Rc<dyn Module>,
    config: RefCell<Configuration>,
    overloaded: RefCell<BTreeMap<String, SharedFunction>>,
}

impl ModuleInstance {
    pub fn new(unique_name: impl Into<String>, module: Rc<dyn Module>) -> Self {
        let config = Configuration::new(module.options());

        Self {
            unique_name: unique_name.into(),
            module,
            config: RefCell::new(config),
            overloaded: RefCell::new(BTreeMap::new()),
        }
    }

    /// Name this instance is addressed by
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Name of the implementation behind this instance
    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn module(&self) -> &Rc<dyn Module> {
        &self.module
    }

    pub fn option(&self, name: &str) -> Option<Value> {
        self.config.borrow().option(name).cloned()
    }

    pub fn set_option(&self, name: &str, value: Value) {
        self.config.borrow_mut().set(name, value);
    }

    /// Load `<dir>/<unique name>.yaml` from each config directory
    pub fn parse_config(&self, config_dirs: &[PathBuf]) -> Result<()> {
        let paths: Vec<PathBuf> = config_dirs
            .iter()
            .map(|dir| dir.join(format!("{}.yaml", self.unique_name)))
            .collect();

        self.config
            .borrow_mut()
            .parse_config(&self.unique_name, &paths)
    }

    pub fn parse_args(&self, argv: &[String]) -> Result<()> {
        self.config.borrow_mut().parse_args(&self.unique_name, argv)
    }

    pub fn check_required_options(&self) -> Result<()> {
        let required = self.module.required_options();
        if required.is_empty() {
            debug!("skipping checking of required options of '{}'", self.unique_name);
            return Ok(());
        }

        self.config.borrow().check_required_options(&required)
    }

    /// Fail when the active dry-run level is beyond what the module supports
    pub fn check_dryrun(&self, active: DryRunLevel) -> Result<()> {
        if !active.is_enabled() {
            return Ok(());
        }

        if active > self.module.supported_dryrun_level() {
            return Err(Error::hard(format!(
                "Module '{}' does not support current dry-run level of '{}'",
                self.unique_name, active
            )));
        }

        Ok(())
    }

    /// Declared shared functions, checked against what the module actually provides
    pub fn exported_functions(&self) -> Result<Vec<(String, SharedFunction)>> {
        let provided = Rc::clone(&self.module).shared_functions();

        self.module
            .shared_function_names()
            .into_iter()
            .map(|name| {
                provided
                    .get(name)
                    .map(|function| (name.to_string(), Rc::clone(function)))
                    .ok_or_else(|| {
                        Error::hard(format!(
                            "No such shared function '{}' of module '{}'",
                            name, self.unique_name
                        ))
                    })
            })
            .collect()
    }

    pub(crate) fn remember_overloaded(&self, name: &str, function: SharedFunction) {
        self.overloaded
            .borrow_mut()
            .insert(name.to_string(), function);
    }

    /// The function this instance displaced when publishing `name`, if any
    pub fn overloaded(&self, name: &str) -> Option<SharedFunction> {
        self.overloaded.borrow().get(name).cloned()
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("unique_name", &self.unique_name)
            .field("module", &self.module.name())
            .finish()
    }
}

/// What a module sees of the engine while one of its hooks runs
pub struct ModuleContext<'a> {
    glue: &'a Glue,
    instance: &'a ModuleInstance,
}

impl<'a> ModuleContext<'a> {
    pub fn new(glue: &'a Glue, instance: &'a ModuleInstance) -> Self {
        Self { glue, instance }
    }

    pub fn glue(&self) -> &'a Glue {
        self.glue
    }

    pub fn instance(&self) -> &'a ModuleInstance {
        self.instance
    }

    pub fn unique_name(&self) -> &str {
        self.instance.unique_name()
    }

    pub fn option(&self, name: &str) -> Option<Value> {
        self.instance.option(name)
    }

    /// Option value rendered as a string; lists are joined by commas
    pub fn option_str(&self, name: &str) -> Option<String> {
        self.option(name).map(|value| match value {
            Value::String(s) => s,
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map_or_else(|| item.to_string(), str::to_string))
                .collect::<Vec<_>>()
                .join(","),
            other => other.to_string(),
        })
    }

    pub fn dryrun_level(&self) -> DryRunLevel {
        self.glue.dryrun_level()
    }

    pub fn dryrun_enabled(&self) -> bool {
        self.dryrun_level().is_enabled()
    }

    fn dryrun_allows_at(&self, threshold: DryRunLevel, msg: &str) -> bool {
        if self.dryrun_level().allows(threshold) {
            return true;
        }

        warn!(module = %self.unique_name(), "{} is not allowed by current dry-run level", msg);
        false
    }

    /// Whether an action changing the outside world may run
    pub fn dryrun_allows(&self, msg: &str) -> bool {
        self.dryrun_allows_at(DryRunLevel::Dry, msg)
    }

    /// Whether an action touching the outside world at all may run
    pub fn isolatedrun_allows(&self, msg: &str) -> bool {
        self.dryrun_allows_at(DryRunLevel::Isolated, msg)
    }

    pub fn has_shared(&self, name: &str) -> bool {
        self.glue.has_shared(name)
    }

    pub fn get_shared(&self, name: &str) -> Option<SharedFunction> {
        self.glue.get_shared(name)
    }

    /// Call a shared function; `None` when nobody provides it
    pub fn shared(&self, name: &str, args: &[Value]) -> anyhow::Result<Option<Value>> {
        self.glue.shared(name, args)
    }

    pub fn require_shared(&self, names: &[&str], warn_only: bool) -> Result<bool> {
        self.glue.require_shared(names, warn_only)
    }

    /// Call the function this module shadowed when it published `name`
    pub fn overloaded_shared(&self, name: &str, args: &[Value]) -> anyhow::Result<Option<Value>> {
        let Some(function) = self.instance.overloaded(name) else {
            return Ok(None);
        };

        debug!("calling overloaded shared function '{}'", name);
        function(self.glue, args).map(Some)
    }

    /// Merged evaluation context of the whole pipeline stack
    pub fn eval_context(&self) -> anyhow::Result<Map<String, Value>> {
        match self.shared("eval_context", &[])? {
            Some(Value::Object(context)) => Ok(context),
            _ => Ok(Map::new()),
        }
    }

    /// Run a single module as a nested pipeline
    pub fn run_module(&self, name: &str, argv: Vec<String>) -> PipelineReturn {
        self.glue.run_module(name, argv)
    }

    /// Run a list of steps as a nested pipeline
    pub fn run_steps(&self, steps: Vec<PipelineStep>) -> PipelineReturn {
        self.glue.run_steps(steps)
    }
}
