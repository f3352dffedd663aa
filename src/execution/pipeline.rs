//! Pipeline state machine

use crate::core::failure::Failure;
use crate::core::module::{ModuleContext, ModuleInstance, SharedFunction};
use crate::core::step::PipelineStep;
use crate::execution::glue::Glue;
use crate::execution::shared::{SharedEntry, SharedFunctionTable};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tracing::{debug, debug_span, error, info, warn};

/// Result of a pipeline run: `(run failure, teardown failure)`
pub type PipelineReturn = (Option<Failure>, Option<Failure>);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Created,
    Setup,
    Sanity,
    Execute,
    Destroy,
    Done,
}

/// One run of an ordered list of steps
///
/// Phases short-circuit on the first failure, but destroy always runs and sees every
/// module that was materialized. Module code may re-enter the engine while a phase is
/// running, so the module list is snapshotted before any hook is called.
#[derive(Debug)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    modules: RefCell<Vec<Rc<ModuleInstance>>>,
    current_module: RefCell<Option<String>>,
    shared: RefCell<SharedFunctionTable>,
    state: Cell<PipelineState>,
}

impl Pipeline {
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        Self {
            steps,
            modules: RefCell::new(Vec::new()),
            current_module: RefCell::new(None),
            shared: RefCell::new(SharedFunctionTable::new()),
            state: Cell::new(PipelineState::Created),
        }
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Live module instances, in materialization order
    pub fn modules(&self) -> Vec<Rc<ModuleInstance>> {
        self.modules.borrow().clone()
    }

    /// Unique name of the module whose hook is running, if any
    pub fn current_module(&self) -> Option<String> {
        self.current_module.borrow().clone()
    }

    pub fn add_shared(
        &self,
        name: impl Into<String>,
        owner: impl Into<String>,
        function: SharedFunction,
    ) -> Option<SharedEntry> {
        let name = name.into();
        let owner = owner.into();
        debug!("registering shared function '{}' of module '{}'", name, owner);
        self.shared.borrow_mut().add(name, owner, function)
    }

    pub fn del_shared(&self, name: &str) -> Option<SharedEntry> {
        self.shared.borrow_mut().remove(name)
    }

    pub fn has_shared(&self, name: &str) -> bool {
        self.shared.borrow().contains(name)
    }

    pub fn get_shared(&self, name: &str) -> Option<SharedFunction> {
        self.shared.borrow().get(name)
    }

    pub fn shared_owner(&self, name: &str) -> Option<String> {
        self.shared.borrow().owner(name).map(str::to_string)
    }

    pub fn shared_names(&self) -> Vec<String> {
        self.shared
            .borrow()
            .names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Drive the pipeline through all phases
    ///
    /// Never fails by itself; anything module code raises comes back as a [`Failure`].
    pub fn run(&self, glue: &Glue) -> PipelineReturn {
        let failure = self
            .setup(glue)
            .or_else(|| self.sanity(glue))
            .or_else(|| self.execute(glue));

        let destroy_failure = self.destroy(glue, failure.as_ref());

        (failure, destroy_failure)
    }

    fn enter(&self, state: PipelineState) {
        debug!("entering {:?} phase", state);
        self.state.set(state);
    }

    fn set_current(&self, module: Option<&str>) {
        *self.current_module.borrow_mut() = module.map(str::to_string);
    }

    /// Run `hook` for `module`, turning errors and panics into a failure
    fn safe_call<F>(&self, glue: &Glue, module: &str, hook: F) -> Option<Failure>
    where
        F: FnOnce() -> anyhow::Result<()>,
    {
        self.set_current(Some(module));

        let mut failure = match panic::catch_unwind(AssertUnwindSafe(hook)) {
            Ok(Ok(())) => return None,
            Ok(Err(cause)) => Failure::new(Some(module.to_string()), cause),
            Err(payload) => Failure::from_panic(Some(module.to_string()), payload),
        };

        if failure.propagated().is_some() {
            debug!("{}", failure);
        } else if failure.soft {
            warn!("{}", failure);
        } else {
            error!("{}", failure);
        }

        glue.report_failure(&mut failure);
        Some(failure)
    }

    fn setup(&self, glue: &Glue) -> Option<Failure> {
        let _span = debug_span!("phase", name = "setup").entered();
        self.enter(PipelineState::Setup);

        for step in &self.steps {
            let materialized = self.safe_call(glue, step.name(), || {
                let instance = step.materialize(glue.registry())?;
                self.modules.borrow_mut().push(Rc::new(instance));
                Ok(())
            });

            if materialized.is_some() {
                return materialized;
            }
        }

        let config_paths = glue.config().config_paths();
        let modules = self.modules();

        for (step, instance) in self.steps.iter().zip(modules.iter()) {
            let failure = self.safe_call(glue, instance.unique_name(), || {
                instance.parse_config(&config_paths)?;
                if let Some(argv) = step.argv() {
                    instance.parse_args(argv)?;
                }
                instance.check_dryrun(glue.dryrun_level())?;
                Ok(())
            });

            if failure.is_some() {
                return failure;
            }
        }

        None
    }

    fn sanity(&self, glue: &Glue) -> Option<Failure> {
        let _span = debug_span!("phase", name = "sanity").entered();
        self.enter(PipelineState::Sanity);

        for instance in self.modules() {
            let ctx = ModuleContext::new(glue, &instance);
            let failure = self.safe_call(glue, instance.unique_name(), || {
                instance.module().sanity(&ctx)?;
                instance.check_required_options()?;
                Ok(())
            });

            if failure.is_some() {
                return failure;
            }
        }

        None
    }

    fn execute(&self, glue: &Glue) -> Option<Failure> {
        let _span = debug_span!("phase", name = "execute").entered();
        self.enter(PipelineState::Execute);

        for instance in self.modules() {
            info!("executing module '{}'", instance.unique_name());

            let ctx = ModuleContext::new(glue, &instance);
            let failure = self.safe_call(glue, instance.unique_name(), || {
                instance.module().execute(&ctx)
            });

            // Published whether or not execute succeeded
            let publish_failure = self.safe_call(glue, instance.unique_name(), || {
                self.publish(glue, &instance)
            });

            match (failure, publish_failure) {
                (Some(failure), Some(publish_failure)) => {
                    debug!("publishing after failed execute also failed: {}", publish_failure);
                    return Some(failure);
                }
                (Some(failure), None) | (None, Some(failure)) => return Some(failure),
                (None, None) => {}
            }
        }

        self.set_current(None);
        None
    }

    fn publish(&self, glue: &Glue, instance: &ModuleInstance) -> anyhow::Result<()> {
        for (name, function) in instance.exported_functions()? {
            if let Some(displaced) = glue.get_shared(&name) {
                instance.remember_overloaded(&name, displaced);
            }

            self.add_shared(name, instance.unique_name(), function);
        }

        Ok(())
    }

    fn destroy(&self, glue: &Glue, failure: Option<&Failure>) -> Option<Failure> {
        let _span = debug_span!("phase", name = "destroy").entered();
        self.enter(PipelineState::Destroy);

        let modules = self.modules();
        if !modules.is_empty() {
            debug!("destroying all modules in reverse order");
        }

        let mut destroy_failure = None;

        for instance in modules.iter().rev() {
            debug!("destroying module '{}'", instance.unique_name());

            let ctx = ModuleContext::new(glue, instance);
            destroy_failure = self.safe_call(glue, instance.unique_name(), || {
                instance.module().destroy(&ctx, failure)
            });

            if destroy_failure.is_some() {
                break;
            }
        }

        self.set_current(None);
        self.modules.borrow_mut().clear();
        self.enter(PipelineState::Done);

        destroy_failure
    }
}
