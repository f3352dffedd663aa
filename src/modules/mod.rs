//! Modules shipped with gluetool

pub mod yaml_pipeline;

pub use yaml_pipeline::YamlPipeline;

use crate::core::registry::ModuleRegistry;

/// Registry holding every built-in module
pub fn builtin_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register_default::<YamlPipeline>(YamlPipeline::NAME);
    registry
}
