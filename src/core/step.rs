//! Pipeline steps

use crate::core::error::{Error, Result};
use crate::core::module::{Module, ModuleContext, ModuleInstance};
use crate::core::registry::ModuleRegistry;
use crate::execution::Glue;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::rc::Rc;

/// Instantiate a registered module under a given name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ModuleStepRecord")]
pub struct ModuleStep {
    /// Name the running instance is addressed by
    pub module: String,

    /// Registered implementation to instantiate
    pub actual_module: String,

    /// Command-line style options for the instance
    pub argv: Vec<String>,
}

/// Persisted shape of a module step; `actual_module` defaults to `module`
#[derive(Deserialize)]
struct ModuleStepRecord {
    module: String,
    #[serde(default)]
    actual_module: Option<String>,
    argv: Vec<String>,
}

impl From<ModuleStepRecord> for ModuleStep {
    fn from(record: ModuleStepRecord) -> Self {
        ModuleStep::aliased(record.module, record.actual_module, record.argv)
    }
}

impl ModuleStep {
    pub fn new(module: impl Into<String>, argv: Vec<String>) -> Self {
        let module = module.into();
        Self {
            actual_module: module.clone(),
            module,
            argv,
        }
    }

    /// Step whose instance name differs from the implementation it runs
    pub fn aliased(
        module: impl Into<String>,
        actual_module: Option<String>,
        argv: Vec<String>,
    ) -> Self {
        let module = module.into();
        Self {
            actual_module: actual_module.unwrap_or_else(|| module.clone()),
            module,
            argv,
        }
    }

    /// `name`, or `name:implementation` for aliased steps
    pub fn designation(&self) -> String {
        if self.module == self.actual_module {
            self.module.clone()
        } else {
            format!("{}:{}", self.module, self.actual_module)
        }
    }

    pub fn materialize(&self, registry: &ModuleRegistry) -> Result<ModuleInstance> {
        let module = registry.instantiate(&self.actual_module)?;
        Ok(ModuleInstance::new(self.module.clone(), module))
    }
}

/// Function run by a callback step
pub type Callback = Rc<dyn Fn(&Glue, &[Value]) -> anyhow::Result<()>>;

/// Run a bare function as if it were a module
#[derive(Clone)]
pub struct CallbackStep {
    pub name: String,
    callback: Callback,
    pub args: Vec<Value>,
}

impl CallbackStep {
    pub fn new<F>(name: impl Into<String>, callback: F, args: Vec<Value>) -> Self
    where
        F: Fn(&Glue, &[Value]) -> anyhow::Result<()> + 'static,
    {
        Self {
            name: name.into(),
            callback: Rc::new(callback),
            args,
        }
    }

    pub fn materialize(&self) -> ModuleInstance {
        let adapter = CallbackModule {
            name: self.name.clone(),
            callback: Rc::clone(&self.callback),
            args: self.args.clone(),
        };
        ModuleInstance::new(self.name.clone(), Rc::new(adapter))
    }
}

impl fmt::Debug for CallbackStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackStep")
            .field("name", &self.name)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// Module face of a callback step: only `execute` does anything
struct CallbackModule {
    name: String,
    callback: Callback,
    args: Vec<Value>,
}

impl Module for CallbackModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        (self.callback)(ctx.glue(), &self.args)
    }
}

/// One unit of a pipeline
#[derive(Debug, Clone)]
pub enum PipelineStep {
    Module(ModuleStep),
    Callback(CallbackStep),
}

impl PipelineStep {
    pub fn module(name: impl Into<String>, argv: Vec<String>) -> Self {
        PipelineStep::Module(ModuleStep::new(name, argv))
    }

    pub fn callback<F>(name: impl Into<String>, callback: F, args: Vec<Value>) -> Self
    where
        F: Fn(&Glue, &[Value]) -> anyhow::Result<()> + 'static,
    {
        PipelineStep::Callback(CallbackStep::new(name, callback, args))
    }

    /// Name of the instance this step materializes into
    pub fn name(&self) -> &str {
        match self {
            PipelineStep::Module(step) => &step.module,
            PipelineStep::Callback(step) => &step.name,
        }
    }

    pub fn designation(&self) -> String {
        match self {
            PipelineStep::Module(step) => step.designation(),
            PipelineStep::Callback(step) => format!("callback {}", step.name),
        }
    }

    /// Arguments to parse after config files; callbacks take none
    pub fn argv(&self) -> Option<&[String]> {
        match self {
            PipelineStep::Module(step) => Some(&step.argv),
            PipelineStep::Callback(_) => None,
        }
    }

    pub fn materialize(&self, registry: &ModuleRegistry) -> Result<ModuleInstance> {
        match self {
            PipelineStep::Module(step) => step.materialize(registry),
            PipelineStep::Callback(step) => Ok(step.materialize()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        match self {
            PipelineStep::Module(step) => Ok(serde_json::to_string(step)?),
            PipelineStep::Callback(step) => Err(Error::NotSerializable(step.name.clone())),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(PipelineStep::Module(serde_json::from_str(json)?))
    }
}

impl Serialize for PipelineStep {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            PipelineStep::Module(step) => step.serialize(serializer),
            PipelineStep::Callback(step) => Err(serde::ser::Error::custom(
                Error::NotSerializable(step.name.clone()),
            )),
        }
    }
}

impl<'de> Deserialize<'de> for PipelineStep {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        ModuleStep::deserialize(deserializer).map(PipelineStep::Module)
    }
}
