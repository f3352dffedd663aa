//! Registry of module implementations

use crate::core::error::{Error, Result};
use crate::core::module::Module;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Creates a fresh instance of one module implementation
pub type ModuleFactory = Rc<dyn Fn() -> Rc<dyn Module>>;

/// Explicit table of `name -> factory` pairs
///
/// How implementations are found is up to whoever fills the registry; the engine only
/// resolves names during step materialization.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Rc<dyn Module> + 'static,
    {
        self.factories.insert(name.into(), Rc::new(factory));
        self
    }

    /// Register a module type constructed with `Default`
    pub fn register_default<M>(&mut self, name: impl Into<String>) -> &mut Self
    where
        M: Module + Default + 'static,
    {
        self.register(name, || Rc::new(M::default()) as Rc<dyn Module>)
    }

    pub fn resolve(&self, name: &str) -> Option<&ModuleFactory> {
        self.factories.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Fresh instance of the implementation registered as `name`
    pub fn instantiate(&self, name: &str) -> Result<Rc<dyn Module>> {
        self.resolve(name)
            .map(|factory| factory())
            .ok_or_else(|| Error::NoSuchModule(name.to_string()))
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// `(name, description)` of every registered implementation
    pub fn describe(&self) -> Vec<(String, String)> {
        self.factories
            .iter()
            .map(|(name, factory)| (name.clone(), factory().description().to_string()))
            .collect()
    }

    /// `(function, module)` for every shared function a registered module declares
    pub fn shared_functions(&self) -> Vec<(String, String)> {
        let mut functions: Vec<(String, String)> = self
            .factories
            .iter()
            .flat_map(|(name, factory)| {
                let module = factory();
                module
                    .shared_function_names()
                    .into_iter()
                    .map(|function| (function.to_string(), name.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();
        functions.sort();
        functions
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Dummy;

    impl Module for Dummy {
        fn name(&self) -> &str {
            "dummy"
        }

        fn description(&self) -> &str {
            "Does nothing."
        }

        fn shared_function_names(&self) -> Vec<&str> {
            vec!["foo", "bar"]
        }
    }

    #[test]
    fn test_resolve_and_instantiate() {
        let mut registry = ModuleRegistry::new();
        registry.register_default::<Dummy>("dummy");

        assert!(registry.contains("dummy"));
        assert_eq!(registry.instantiate("dummy").unwrap().name(), "dummy");

        let err = registry.instantiate("ghost").err().unwrap();
        assert!(matches!(err, Error::NoSuchModule(ref name) if name == "ghost"));
        assert_eq!(err.to_string(), "No such module 'ghost'");
    }

    #[test]
    fn test_listings() {
        let mut registry = ModuleRegistry::new();
        registry
            .register_default::<Dummy>("zeta")
            .register_default::<Dummy>("alpha");

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert_eq!(
            registry.describe()[0],
            ("alpha".to_string(), "Does nothing.".to_string())
        );
        assert_eq!(registry.shared_functions().len(), 4);
        assert_eq!(
            registry.shared_functions()[0],
            ("bar".to_string(), "alpha".to_string())
        );
    }
}
