//! Test utility functions for gluetool

#![allow(dead_code)]

use gluetool::core::failure::Failure;
use gluetool::core::module::{Module, ModuleContext, SharedFunctions};
use gluetool::{DryRunLevel, Error, Glue, GlueConfig, ModuleOption, ModuleRegistry};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// Shared log of hook calls, e.g. `a.execute`
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.borrow().iter().any(|e| e == entry)
    }

    /// Entries ending with `.<hook>`, in order
    pub fn calls_of(&self, hook: &str) -> Vec<String> {
        let suffix = format!(".{}", hook);
        self.0
            .borrow()
            .iter()
            .filter(|e| e.ends_with(&suffix))
            .cloned()
            .collect()
    }
}

/// Hook a [`TestModule`] can fail in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Sanity,
    Execute,
    Destroy,
}

/// How a [`TestModule`] fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Hard,
    Soft,
    Retry,
    Panic,
}

type ContextHook = Rc<dyn Fn(&ModuleContext<'_>, &Journal) -> anyhow::Result<()>>;

/// Configurable module recording every hook call into a [`Journal`]
#[derive(Clone)]
pub struct TestModule {
    name: String,
    journal: Journal,
    options: Vec<ModuleOption>,
    required: Vec<&'static str>,
    dryrun: DryRunLevel,
    declared: Vec<&'static str>,
    exports: Vec<(&'static str, Value)>,
    fault: Option<(Hook, Fault)>,
    on_execute: Option<ContextHook>,
    on_destroy: Option<ContextHook>,
}

impl TestModule {
    pub fn new(name: &str, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            journal: journal.clone(),
            options: Vec::new(),
            required: Vec::new(),
            dryrun: DryRunLevel::Default,
            declared: Vec::new(),
            exports: Vec::new(),
            fault: None,
            on_execute: None,
            on_destroy: None,
        }
    }

    pub fn option(mut self, option: ModuleOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn requiring(mut self, name: &'static str) -> Self {
        self.required.push(name);
        self
    }

    pub fn supporting(mut self, level: DryRunLevel) -> Self {
        self.dryrun = level;
        self
    }

    /// Export `name`, a function returning `value`
    pub fn exporting(mut self, name: &'static str, value: Value) -> Self {
        self.declared.push(name);
        self.exports.push((name, value));
        self
    }

    /// Declare `name` without providing it
    pub fn declaring(mut self, name: &'static str) -> Self {
        self.declared.push(name);
        self
    }

    pub fn failing(mut self, hook: Hook, fault: Fault) -> Self {
        self.fault = Some((hook, fault));
        self
    }

    pub fn on_execute<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ModuleContext<'_>, &Journal) -> anyhow::Result<()> + 'static,
    {
        self.on_execute = Some(Rc::new(hook));
        self
    }

    pub fn on_destroy<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ModuleContext<'_>, &Journal) -> anyhow::Result<()> + 'static,
    {
        self.on_destroy = Some(Rc::new(hook));
        self
    }

    fn hook(&self, ctx: &ModuleContext<'_>, hook: Hook, label: &str) -> anyhow::Result<()> {
        self.journal.record(format!("{}.{}", ctx.unique_name(), label));

        match self.fault {
            Some((failing, fault)) if failing == hook => {
                let message = format!("{} failed in {}", ctx.unique_name(), label);
                match fault {
                    Fault::Hard => Err(Error::hard(message).into()),
                    Fault::Soft => Err(Error::soft(message).into()),
                    Fault::Retry => Err(Error::retry(message).into()),
                    Fault::Panic => panic!("{}", message),
                }
            }
            _ => Ok(()),
        }
    }
}

impl Module for TestModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records its hook calls."
    }

    fn options(&self) -> Vec<ModuleOption> {
        self.options.clone()
    }

    fn required_options(&self) -> Vec<&str> {
        self.required.clone()
    }

    fn supported_dryrun_level(&self) -> DryRunLevel {
        self.dryrun
    }

    fn shared_function_names(&self) -> Vec<&str> {
        self.declared.clone()
    }

    fn shared_functions(self: Rc<Self>) -> SharedFunctions {
        self.exports
            .iter()
            .fold(SharedFunctions::new(), |functions, (name, value)| {
                let value = value.clone();
                functions.with(*name, move |_glue, _args| Ok(value.clone()))
            })
    }

    fn sanity(&self, ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        self.hook(ctx, Hook::Sanity, "sanity")
    }

    fn execute(&self, ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        self.hook(ctx, Hook::Execute, "execute")?;
        match &self.on_execute {
            Some(hook) => hook(ctx, &self.journal),
            None => Ok(()),
        }
    }

    fn destroy(&self, ctx: &ModuleContext<'_>, failure: Option<&Failure>) -> anyhow::Result<()> {
        if let Some(failure) = failure {
            self.journal.record(format!(
                "{}.destroy-saw:{}",
                ctx.unique_name(),
                failure.module.as_deref().unwrap_or("-")
            ));
        }

        self.hook(ctx, Hook::Destroy, "destroy")?;
        match &self.on_destroy {
            Some(hook) => hook(ctx, &self.journal),
            None => Ok(()),
        }
    }
}

/// Registry with every module registered under its own name
pub fn registry_of(modules: Vec<TestModule>) -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    add_modules(&mut registry, modules);
    registry
}

pub fn add_modules(registry: &mut ModuleRegistry, modules: Vec<TestModule>) {
    for module in modules {
        let name = module.name.clone();
        registry.register(name, move || Rc::new(module.clone()) as Rc<dyn Module>);
    }
}

/// Orchestrator over `modules`, no config directories, default dry-run level
pub fn glue_with(modules: Vec<TestModule>) -> Glue {
    Glue::new(registry_of(modules), isolated_config())
}

/// Configuration that never reads the user's module config directories
pub fn isolated_config() -> GlueConfig {
    GlueConfig {
        module_config_paths: vec![std::env::temp_dir().join("gluetool-tests-no-such-dir")],
        ..GlueConfig::default()
    }
}

pub fn args(argv: &[&str]) -> Vec<String> {
    argv.iter().map(|s| s.to_string()).collect()
}

/// Cause message of a failure, including its context chain
pub fn failure_message(failure: &Failure) -> String {
    format!("{:#}", failure.cause)
}
