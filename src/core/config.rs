//! Engine configuration and per-module option stores

use crate::core::dryrun::DryRunLevel;
use crate::core::error::{Error, Result};
use anyhow::Context;
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct GlueConfig {
    /// Directories searched for module configuration files
    pub module_config_paths: Vec<PathBuf>,

    /// Modules make no changes to the outside world
    pub dry_run: bool,

    /// Modules do not interact with the outside world at all
    pub isolated_run: bool,

    /// How many times the outer driver re-runs a pipeline asking for a retry
    pub retries: usize,

    /// Error kinds never submitted to the failure reporter
    pub no_report_errors: Vec<String>,
}

impl GlueConfig {
    /// Load engine configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::from_yaml(&content)?)
    }

    /// Parse engine configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if serde_yaml::from_str::<serde_yaml::Value>(yaml)?.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn dryrun_level(&self) -> DryRunLevel {
        DryRunLevel::from_flags(self.dry_run, self.isolated_run)
    }

    /// Configured module config directories, or the default ones
    pub fn config_paths(&self) -> Vec<PathBuf> {
        if !self.module_config_paths.is_empty() {
            return self.module_config_paths.clone();
        }

        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("gluetool").join("modules"));
        }
        paths.push(PathBuf::from("/etc/gluetool.d/modules"));
        paths
    }
}

/// How an option takes its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    /// Single string value, `--name=value`
    Value,
    /// Single integer value
    Integer,
    /// Boolean switch, `--name`
    Flag,
    /// Repeatable option collecting a list of strings
    List,
    /// Everything after `--`, as a list of strings
    Remainder,
}

/// Declaration of a single module option
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleOption {
    pub name: String,

    #[serde(default)]
    pub short: Option<char>,

    #[serde(default)]
    pub help: String,

    #[serde(default = "default_option_kind")]
    pub kind: OptionKind,

    /// Value used when the option is given neither on command line nor in a config file
    #[serde(default)]
    pub default: Option<Value>,

    #[serde(default)]
    pub metavar: Option<String>,
}

fn default_option_kind() -> OptionKind {
    OptionKind::Value
}

impl ModuleOption {
    pub fn new(name: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            short: None,
            help: String::new(),
            kind,
            default: None,
            metavar: None,
        }
    }

    pub fn value(name: impl Into<String>) -> Self {
        Self::new(name, OptionKind::Value)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, OptionKind::Integer)
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self::new(name, OptionKind::Flag)
    }

    pub fn list(name: impl Into<String>) -> Self {
        Self::new(name, OptionKind::List)
    }

    pub fn remainder(name: impl Into<String>) -> Self {
        Self::new(name, OptionKind::Remainder)
    }

    pub fn short(mut self, short: char) -> Self {
        self.short = Some(short);
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = help.into();
        self
    }

    pub fn default_value(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = Some(metavar.into());
        self
    }

    fn to_arg(&self) -> Arg {
        let mut arg = Arg::new(self.name.clone()).help(self.help.clone());

        if self.kind == OptionKind::Remainder {
            return arg.num_args(0..).last(true).allow_hyphen_values(true);
        }

        arg = arg.long(self.name.clone());
        if let Some(short) = self.short {
            arg = arg.short(short);
        }
        if let Some(metavar) = &self.metavar {
            arg = arg.value_name(metavar.clone());
        }

        arg = match self.kind {
            OptionKind::Flag => arg.action(ArgAction::SetTrue),
            OptionKind::List => arg.action(ArgAction::Append),
            OptionKind::Integer => arg
                .action(ArgAction::Set)
                .value_parser(clap::value_parser!(i64)),
            _ => arg.action(ArgAction::Set),
        };

        match (&self.default, self.kind) {
            (_, OptionKind::Flag) | (None, _) => arg,
            (Some(Value::Array(items)), _) => {
                arg.default_values(items.iter().filter_map(scalar_to_string).collect::<Vec<_>>())
            }
            (Some(value), _) => match scalar_to_string(value) {
                Some(default) => arg.default_value(default),
                None => arg,
            },
        }
    }

    /// Value for this option parsed by `matches`, if there is any
    fn extract(&self, matches: &ArgMatches) -> Option<Value> {
        let id = self.name.as_str();
        match self.kind {
            OptionKind::Value => matches.get_one::<String>(id).cloned().map(Value::String),
            OptionKind::Integer => matches.get_one::<i64>(id).map(|v| Value::from(*v)),
            OptionKind::Flag => Some(Value::Bool(matches.get_flag(id))),
            OptionKind::List | OptionKind::Remainder => matches
                .get_many::<String>(id)
                .map(|values| values.cloned().map(Value::String).collect()),
        }
    }

    /// Convert a config-file value to this option's kind
    fn convert(&self, owner: &str, raw: &serde_yaml::Value) -> Result<Value> {
        let mismatch = |expected: &str| {
            Error::hard(format!(
                "Value of option '{}' of '{}' expected to be '{}' but cannot be parsed: '{:?}'",
                self.name, owner, expected, raw
            ))
        };

        let value = match self.kind {
            OptionKind::Value => {
                Value::String(yaml_scalar_to_string(raw).ok_or_else(|| mismatch("string"))?)
            }
            OptionKind::Integer => match raw {
                serde_yaml::Value::Number(n) => {
                    Value::from(n.as_i64().ok_or_else(|| mismatch("integer"))?)
                }
                serde_yaml::Value::String(s) => {
                    Value::from(s.trim().parse::<i64>().map_err(|_| mismatch("integer"))?)
                }
                _ => return Err(mismatch("integer")),
            },
            OptionKind::Flag => match raw {
                serde_yaml::Value::Bool(b) => Value::Bool(*b),
                serde_yaml::Value::String(s) => {
                    Value::Bool(parse_bool(s).ok_or_else(|| mismatch("boolean"))?)
                }
                serde_yaml::Value::Number(n) => Value::Bool(n.as_i64() != Some(0)),
                _ => return Err(mismatch("boolean")),
            },
            OptionKind::List | OptionKind::Remainder => match raw {
                serde_yaml::Value::Sequence(items) => items
                    .iter()
                    .map(|item| yaml_scalar_to_string(item).ok_or_else(|| mismatch("list")))
                    .collect::<Result<Vec<_>>>()?
                    .into_iter()
                    .map(Value::String)
                    .collect(),
                other => yaml_scalar_to_string(other)
                    .ok_or_else(|| mismatch("list"))?
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            },
        };

        Ok(value)
    }
}

/// Parse the usual spellings of a boolean option
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "yes" | "true" | "1" | "y" | "on" => Some(true),
        "no" | "false" | "0" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn yaml_scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Option declarations of one configurable object, and their current values
///
/// Values come from config files first and from command-line arguments second. A value
/// the command line did not explicitly provide never replaces one that is already set.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    options: Vec<ModuleOption>,
    values: BTreeMap<String, Value>,
}

impl Configuration {
    pub fn new(options: Vec<ModuleOption>) -> Self {
        let values = options
            .iter()
            .map(|option| (option.name.clone(), Value::Null))
            .collect();

        Self { options, values }
    }

    pub fn options(&self) -> &[ModuleOption] {
        &self.options
    }

    /// Current value of an option; unset options yield `None`
    pub fn option(&self, name: &str) -> Option<&Value> {
        self.values.get(name).filter(|value| !value.is_null())
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    fn is_set(&self, name: &str) -> bool {
        self.option(name).is_some()
    }

    /// Read options from YAML config files, later files overriding earlier ones
    ///
    /// Files that don't exist are skipped. Keys that don't name a declared option are ignored.
    pub fn parse_config(&mut self, owner: &str, paths: &[PathBuf]) -> Result<()> {
        debug!("loading configuration of '{}' from {:?}", owner, paths);

        for path in paths {
            if !path.is_file() {
                debug!("no config file {}", path.display());
                continue;
            }

            let content = std::fs::read_to_string(path)?;
            let document: serde_yaml::Value = serde_yaml::from_str(&content)?;

            let mapping = match document {
                serde_yaml::Value::Null => continue,
                serde_yaml::Value::Mapping(mapping) => mapping,
                _ => {
                    return Err(Error::hard(format!(
                        "Config file {} must contain a mapping of options",
                        path.display()
                    )))
                }
            };

            for option in &self.options {
                let Some(raw) = mapping.get(option.name.as_str()) else {
                    continue;
                };

                let value = option.convert(owner, raw)?;
                debug!("option '{}' set to '{}' by config file", option.name, value);
                self.values.insert(option.name.clone(), value);
            }
        }

        Ok(())
    }

    /// Read options from command-line style arguments
    pub fn parse_args(&mut self, owner: &str, argv: &[String]) -> Result<()> {
        debug!("loading configuration of '{}' from command-line arguments", owner);

        let parser = self
            .options
            .iter()
            .fold(
                Command::new(owner.to_string())
                    .no_binary_name(true)
                    .disable_help_flag(true)
                    .disable_version_flag(true),
                |cmd, option| cmd.arg(option.to_arg()),
            );

        let matches = parser.try_get_matches_from(argv).map_err(|err| {
            Error::hard(format!(
                "Cannot parse arguments of '{}': {}",
                owner,
                err.render().to_string().trim()
            ))
        })?;

        for option in &self.options {
            let Some(value) = option.extract(&matches) else {
                continue;
            };

            let explicit = matches.value_source(&option.name) == Some(ValueSource::CommandLine);
            if !explicit && self.is_set(&option.name) {
                continue;
            }

            debug!("option '{}' set to '{}' by command-line", option.name, value);
            self.values.insert(option.name.clone(), value);
        }

        Ok(())
    }

    /// Fail on the first required option with no meaningful value
    pub fn check_required_options(&self, required: &[&str]) -> Result<()> {
        for name in required {
            let present = match self.option(name) {
                None | Some(Value::Bool(false)) => false,
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Array(items)) => !items.is_empty(),
                Some(_) => true,
            };

            if !present {
                return Err(Error::hard(format!("Missing required '{}' option", name)));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    fn args(argv: &[&str]) -> Vec<String> {
        argv.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> Configuration {
        Configuration::new(vec![
            ModuleOption::integer("x").help("Some number"),
            ModuleOption::value("name").short('n').default_value("anonymous"),
            ModuleOption::flag("force"),
            ModuleOption::list("tag"),
            ModuleOption::remainder("rest"),
        ])
    }

    #[test]
    fn test_unset_cli_flags_keep_configured_values() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.yaml");
        fs::write(&file, "x: 5\nname: configured\nforce: true\n").unwrap();

        let mut config = sample();
        config.parse_config("m", &[file]).unwrap();
        config.parse_args("m", &[]).unwrap();

        assert_eq!(config.option("x"), Some(&json!(5)));
        assert_eq!(config.option("name"), Some(&json!("configured")));
        assert_eq!(config.option("force"), Some(&json!(true)));
    }

    #[test]
    fn test_explicit_cli_values_override_config() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.yaml");
        fs::write(&file, "x: 5\nname: configured\n").unwrap();

        let mut config = sample();
        config.parse_config("m", &[file]).unwrap();
        config
            .parse_args("m", &args(&["--x=7", "-n", "cli", "--tag", "a", "--tag=b", "--", "--raw", "v"]))
            .unwrap();

        assert_eq!(config.option("x"), Some(&json!(7)));
        assert_eq!(config.option("name"), Some(&json!("cli")));
        assert_eq!(config.option("tag"), Some(&json!(["a", "b"])));
        assert_eq!(config.option("rest"), Some(&json!(["--raw", "v"])));
    }

    #[test]
    fn test_defaults_fill_unset_options() {
        let mut config = sample();
        config.parse_args("m", &[]).unwrap();

        assert_eq!(config.option("name"), Some(&json!("anonymous")));
        assert_eq!(config.option("force"), Some(&json!(false)));
        assert_eq!(config.option("x"), None);
        assert_eq!(config.option("tag"), None);
    }

    #[test]
    fn test_later_config_files_override_earlier() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.yaml");
        let second = dir.path().join("second.yaml");
        fs::write(&first, "x: 1\ntag: a, b\n").unwrap();
        fs::write(&second, "x: '2'\n").unwrap();

        let mut config = sample();
        config
            .parse_config("m", &[first, dir.path().join("missing.yaml"), second])
            .unwrap();

        assert_eq!(config.option("x"), Some(&json!(2)));
        assert_eq!(config.option("tag"), Some(&json!(["a", "b"])));
    }

    #[test]
    fn test_bad_config_value_is_hard_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("m.yaml");
        fs::write(&file, "x: not-a-number\n").unwrap();

        let err = sample().parse_config("m", &[file]).unwrap_err();
        assert!(err.to_string().contains("'x'"));
        assert!(!err.is_soft());
    }

    #[test]
    fn test_unknown_argument_is_rejected() {
        let err = sample().parse_args("m", &args(&["--bogus"])).unwrap_err();
        assert!(err.to_string().contains("Cannot parse arguments of 'm'"));
    }

    #[test]
    fn test_required_options_names_first_missing() {
        let mut config = sample();
        config.set("x", json!(3));

        assert!(config.check_required_options(&["x"]).is_ok());

        let err = config.check_required_options(&["x", "tag", "name"]).unwrap_err();
        assert_eq!(err.to_string(), "Missing required 'tag' option");
    }

    #[test]
    fn test_glue_config_from_yaml() {
        let config = GlueConfig::from_yaml(
            "module-config-paths: [/tmp/a]\ndry-run: true\nretries: 2\n",
        )
        .unwrap();

        assert_eq!(config.module_config_paths, vec![PathBuf::from("/tmp/a")]);
        assert_eq!(config.dryrun_level(), DryRunLevel::Dry);
        assert_eq!(config.retries, 2);
        assert_eq!(config.config_paths(), vec![PathBuf::from("/tmp/a")]);

        assert_eq!(GlueConfig::from_yaml("").unwrap(), GlueConfig::default());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
