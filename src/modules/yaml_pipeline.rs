//! `yaml-pipeline`: run a pipeline described by a YAML file
//!
//! ```yaml
//! name: build-and-test
//! description: Builds the package, then tests it.
//!
//! options:
//!   package:
//!     help: Package to build.
//!     required: true
//!   jobs:
//!     type: int
//!     default: 4
//!
//! pipeline:
//!   - prepare
//!   - build:
//!       package: "{{ OPTION.package }}"
//!       jobs: "{{ OPTION.jobs }}"
//!   - test:
//!       verbose:
//!     when: ENV.RUN_TESTS
//! ```
//!
//! Pipeline options are given after `--`:
//! `gluetool yaml-pipeline --description=build.yaml -- --package=foo`.
//!
//! Each entry runs as a nested pipeline started from within the previous entry's one, and all
//! of them are torn down, last entry first, once the final entry is done. Values may use
//! `{{ OPTION.<name> }}`, `{{ ENV.<name> }}` and `{{ SHARED.<name> }}`; the latter calls a
//! shared function published by an earlier entry, or by a module running before `yaml-pipeline`.

use crate::core::config::{Configuration, ModuleOption, OptionKind};
use crate::core::dryrun::DryRunLevel;
use crate::core::error::{Error, Result};
use crate::core::module::{Module, ModuleContext};
use crate::core::step::PipelineStep;
use crate::execution::Glue;
use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};

const FALSY: &[&str] = &["", "no", "off", "0", "false", "none"];

const PLACEHOLDER: &str = r"\{\{\s*([^{}]*?)\s*\}\}";

/// Namespaces a placeholder may refer to
const NAMESPACES: &[&str] = &["OPTION", "ENV", "SHARED"];

/// Declaration of one pipeline option in the description file
#[derive(Debug, Clone, Default, Deserialize)]
struct OptionSpec {
    #[serde(default)]
    help: String,

    #[serde(default)]
    default: Option<serde_yaml::Value>,

    #[serde(default)]
    required: bool,

    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl OptionSpec {
    fn to_option(&self, name: &str) -> Result<ModuleOption> {
        let kind = match self.kind.as_deref() {
            None | Some("str") | Some("string") => OptionKind::Value,
            Some("int") | Some("integer") => OptionKind::Integer,
            Some("bool") | Some("flag") => OptionKind::Flag,
            Some("list") => OptionKind::List,
            Some(other) => {
                return Err(Error::hard(format!("Cannot find option type '{}'", other)));
            }
        };

        let mut option = ModuleOption::new(name, kind).help(self.help.clone());
        if let Some(default) = &self.default {
            option = option.default_value(serde_json::to_value(default)?);
        }

        Ok(option)
    }
}

/// Contents of a pipeline description file
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDescription {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    options: BTreeMap<String, OptionSpec>,

    pub pipeline: Vec<serde_yaml::Value>,
}

impl PipelineDescription {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Option store of the described pipeline, filled from `argv`
    pub fn configuration(&self, argv: &[String]) -> Result<Configuration> {
        let options = self
            .options
            .iter()
            .map(|(name, spec)| spec.to_option(name))
            .collect::<Result<Vec<_>>>()?;

        let required: Vec<&str> = self
            .options
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect();

        let mut config = Configuration::new(options);
        config.parse_args(&self.name, argv)?;
        config.check_required_options(&required)?;

        Ok(config)
    }

    pub fn entries(&self) -> Result<Vec<PipelineEntry>> {
        self.pipeline.iter().map(PipelineEntry::parse).collect()
    }
}

/// One module of the described pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineEntry {
    pub module: String,
    pub when: Option<serde_yaml::Value>,
    pub options: Vec<(String, serde_yaml::Value)>,
}

impl PipelineEntry {
    fn parse(raw: &serde_yaml::Value) -> Result<Self> {
        let unexpected = || Error::hard(format!("Unexpected module syntax: {:?}", raw));

        let mapping = match raw {
            serde_yaml::Value::String(module) => {
                return Ok(Self {
                    module: module.clone(),
                    when: None,
                    options: Vec::new(),
                })
            }
            serde_yaml::Value::Mapping(mapping) => mapping,
            _ => return Err(unexpected()),
        };

        let mut when = None;
        let mut module = None;

        for (key, value) in mapping {
            match key.as_str() {
                Some("when") => when = Some(value.clone()),
                Some(name) if module.is_none() => module = Some((name.to_string(), value)),
                _ => return Err(unexpected()),
            }
        }

        let (module, value) = module.ok_or_else(unexpected)?;
        let options = parse_module_options(value).ok_or_else(unexpected)?;

        Ok(Self {
            module,
            when,
            options,
        })
    }
}

/// Options of an entry: a mapping, or a list of single-key mappings
fn parse_module_options(value: &serde_yaml::Value) -> Option<Vec<(String, serde_yaml::Value)>> {
    let pairs = |mapping: &serde_yaml::Mapping| -> Option<Vec<(String, serde_yaml::Value)>> {
        mapping
            .iter()
            .map(|(key, value)| Some((key.as_str()?.to_string(), value.clone())))
            .collect()
    };

    match value {
        serde_yaml::Value::Null => Some(Vec::new()),
        serde_yaml::Value::Mapping(mapping) => pairs(mapping),
        serde_yaml::Value::Sequence(items) => {
            let mut options = Vec::new();
            for item in items {
                options.extend(pairs(item.as_mapping()?)?);
            }
            Some(options)
        }
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_to_string).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Whether a bare `when` string names a value, e.g. `OPTION.package`
fn is_expression(value: &str) -> bool {
    value
        .trim()
        .split_once('.')
        .is_some_and(|(namespace, _)| NAMESPACES.contains(&namespace))
}

/// Resolves `{{ NAMESPACE.name }}` placeholders
struct Renderer<'a> {
    glue: &'a Glue,
    options: &'a Configuration,
}

impl Renderer<'_> {
    fn resolve(&self, expression: &str) -> anyhow::Result<String> {
        let (namespace, name) = expression
            .split_once('.')
            .ok_or_else(|| Error::hard(format!("Cannot evaluate '{}'", expression)))?;

        let value = match namespace {
            "OPTION" => self.options.option(name).map(value_to_string),
            "ENV" => std::env::var(name).ok(),
            "SHARED" => self.glue.shared(name, &[])?.as_ref().map(value_to_string),
            _ => {
                return Err(Error::hard(format!(
                    "Unknown namespace '{}' in '{}'",
                    namespace, expression
                ))
                .into())
            }
        };

        Ok(value.unwrap_or_default())
    }

    fn render(&self, template: &str) -> anyhow::Result<String> {
        let pattern = Regex::new(PLACEHOLDER)
            .map_err(|e| Error::hard_with("Invalid placeholder pattern", e))?;

        let mut rendered = String::with_capacity(template.len());
        let mut last = 0;

        for captures in pattern.captures_iter(template) {
            let (Some(whole), Some(expression)) = (captures.get(0), captures.get(1)) else {
                continue;
            };

            rendered.push_str(&template[last..whole.start()]);
            rendered.push_str(&self.resolve(expression.as_str())?);
            last = whole.end();
        }

        rendered.push_str(&template[last..]);
        Ok(rendered)
    }

    /// Render an option value; `None` stands for a bare `--option`
    fn render_value(&self, value: &serde_yaml::Value) -> anyhow::Result<Option<String>> {
        match value {
            serde_yaml::Value::Null => Ok(None),
            serde_yaml::Value::String(s) => self.render(s).map(Some),
            serde_yaml::Value::Bool(b) => Ok(Some(b.to_string())),
            serde_yaml::Value::Number(n) => Ok(Some(n.to_string())),
            other => Ok(Some(serde_yaml::to_string(other)?.trim().to_string())),
        }
    }

    /// Whether a `when` condition lets its module run
    fn when_allows(&self, when: &serde_yaml::Value) -> anyhow::Result<bool> {
        let evaluated = match when {
            serde_yaml::Value::Null => return Ok(true),
            serde_yaml::Value::Bool(b) => return Ok(*b),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) if s.contains("{{") => self.render(s)?,
            serde_yaml::Value::String(s) if is_expression(s) => self.resolve(s.trim())?,
            serde_yaml::Value::String(s) => s.clone(),
            _ => return Ok(true),
        };

        debug!("evaluated when: '{}'", evaluated);
        Ok(!FALSY.contains(&evaluated.trim().to_lowercase().as_str()))
    }
}

/// Runs pipeline, described by a given YAML file
#[derive(Debug, Default)]
pub struct YamlPipeline;

impl YamlPipeline {
    pub const NAME: &'static str = "yaml-pipeline";
}

impl Module for YamlPipeline {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Runs pipeline, described by a given YAML file."
    }

    fn options(&self) -> Vec<ModuleOption> {
        vec![
            ModuleOption::value("description")
                .help("File with pipeline description.")
                .metavar("FILE"),
            ModuleOption::remainder("pipeline-options").help("Pipeline options."),
        ]
    }

    fn required_options(&self) -> Vec<&str> {
        vec!["description"]
    }

    fn supported_dryrun_level(&self) -> DryRunLevel {
        DryRunLevel::Isolated
    }

    fn execute(&self, ctx: &ModuleContext<'_>) -> anyhow::Result<()> {
        let path = ctx.option_str("description").unwrap_or_default();
        let description = PipelineDescription::from_file(Path::new(&path))
            .with_context(|| format!("Cannot load pipeline description '{}'", path))?;

        let argv: Vec<String> = match ctx.option("pipeline-options") {
            Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
            _ => Vec::new(),
        };

        let chain = Rc::new(EntryChain {
            options: description.configuration(&argv)?,
            entries: description.entries()?,
            name: description.name,
        });

        info!("running pipeline '{}'", chain.name);
        chain.run_from(ctx.glue(), 0)
    }
}

/// Name of the callback step running the rest of the entries
const CONTINUATION: &str = "yaml-pipeline continuation";

/// Entries of a loaded description, run one nested pipeline inside another
///
/// Entry N+1 is rendered and started by a callback following entry N, so every earlier entry
/// is still alive, and its shared functions visible, until the last one finishes.
struct EntryChain {
    name: String,
    entries: Vec<PipelineEntry>,
    options: Configuration,
}

impl EntryChain {
    fn run_from(self: &Rc<Self>, glue: &Glue, start: usize) -> anyhow::Result<()> {
        let renderer = Renderer {
            glue,
            options: &self.options,
        };

        let mut next = start;
        let entry = loop {
            let Some(entry) = self.entries.get(next) else {
                return Ok(());
            };
            next += 1;

            match &entry.when {
                Some(when) if !renderer.when_allows(when)? => {
                    debug!("skipping module '{}'", entry.module);
                }
                _ => break entry,
            }
        };

        let mut argv = Vec::with_capacity(entry.options.len());
        for (option, value) in &entry.options {
            match renderer.render_value(value)? {
                Some(value) => argv.push(format!("--{}={}", option, value)),
                None => argv.push(format!("--{}", option)),
            }
        }

        debug!("module '{}' arguments: {:?}", entry.module, argv);

        let mut steps = vec![PipelineStep::module(entry.module.clone(), argv)];
        if next < self.entries.len() {
            let chain = Rc::clone(self);
            steps.push(PipelineStep::callback(
                CONTINUATION,
                move |glue, _args| chain.run_from(glue, next),
                Vec::new(),
            ));
        }

        let (failure, destroy_failure) = glue.run_steps(steps);
        match failure.or(destroy_failure) {
            None => Ok(()),
            Some(failure) if failure.module.as_deref() == Some(CONTINUATION) => {
                // already described by the entry that failed
                if failure.propagated().is_some() {
                    return Err(failure.cause);
                }

                Err(failure.propagate(format!(
                    "Pipeline '{}' failed after module '{}'",
                    self.name, entry.module
                )))
            }
            Some(failure) => Err(failure.propagate(format!(
                "Module '{}' of pipeline '{}' failed",
                entry.module, self.name
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::GlueConfig;
    use crate::core::registry::ModuleRegistry;

    const DESCRIPTION: &str = r#"
name: demo
description: Demo pipeline.
options:
  package:
    help: Package to build.
    required: true
  jobs:
    type: int
    default: 4
pipeline:
  - prepare
  - build:
      package: "{{ OPTION.package }}"
      jobs: "{{ OPTION.jobs }}"
      verbose:
  - test:
      - suite: smoke
    when: "OPTION.package"
"#;

    fn with_renderer<F>(options: &Configuration, check: F)
    where
        F: FnOnce(&Renderer<'_>),
    {
        let glue = Glue::new(ModuleRegistry::new(), GlueConfig::default());
        check(&Renderer {
            glue: &glue,
            options,
        });
    }

    #[test]
    fn test_entries() {
        let description = PipelineDescription::from_yaml(DESCRIPTION).unwrap();
        let entries = description.entries().unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].module, "prepare");
        assert!(entries[0].options.is_empty());
        assert_eq!(entries[1].options.len(), 3);
        assert_eq!(entries[2].module, "test");
        assert_eq!(entries[2].options[0].0, "suite");
        assert!(entries[2].when.is_some());
    }

    #[test]
    fn test_configuration_applies_defaults_and_required() {
        let description = PipelineDescription::from_yaml(DESCRIPTION).unwrap();

        let err = description.configuration(&[]).unwrap_err();
        assert_eq!(err.to_string(), "Missing required 'package' option");

        let config = description
            .configuration(&["--package=bash".to_string()])
            .unwrap();
        assert_eq!(config.option("package"), Some(&Value::from("bash")));
        assert_eq!(config.option("jobs"), Some(&Value::from(4)));
    }

    #[test]
    fn test_unknown_option_type() {
        let yaml = "name: x\noptions:\n  foo:\n    type: callable\npipeline: []\n";
        let err = PipelineDescription::from_yaml(yaml)
            .unwrap()
            .configuration(&[])
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot find option type 'callable'");
    }

    #[test]
    fn test_unexpected_entry_syntax() {
        let description = PipelineDescription::from_yaml("name: x\npipeline: [42]\n").unwrap();
        assert!(description.entries().is_err());
    }

    #[test]
    fn test_render_placeholders() {
        let description = PipelineDescription::from_yaml(DESCRIPTION).unwrap();
        let options = description
            .configuration(&["--package=bash".to_string(), "--jobs=8".to_string()])
            .unwrap();

        with_renderer(&options, |renderer| {
            assert_eq!(
                renderer.render("{{ OPTION.package }}-{{OPTION.jobs}}").unwrap(),
                "bash-8"
            );
            assert_eq!(renderer.render("{{ SHARED.missing }}").unwrap(), "");
            assert!(renderer.render("{{ PIPELINE.option }}").is_err());
            assert_eq!(
                renderer.render_value(&serde_yaml::Value::Null).unwrap(),
                None
            );
        });
    }

    #[test]
    fn test_when_conditions() {
        let description = PipelineDescription::from_yaml(DESCRIPTION).unwrap();
        let options = description
            .configuration(&["--package=bash".to_string()])
            .unwrap();

        with_renderer(&options, |renderer| {
            let when = |yaml: &str| renderer.when_allows(&serde_yaml::from_str(yaml).unwrap()).unwrap();

            assert!(when("OPTION.package"));
            assert!(!when("OPTION.unknown"));
            assert!(!when("\"{{ OPTION.unknown }}\""));
            assert!(!when("false"));
            assert!(!when("\"Off\""));
            assert!(!when("0"));
            assert!(when("yes"));
        });
    }
}
