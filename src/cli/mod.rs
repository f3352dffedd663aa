//! Command-line interface

pub mod driver;
pub mod output;
pub mod steps;

use crate::core::config::GlueConfig;
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;

/// Runs a pipeline of modules given on the command line
#[derive(Debug, Parser, Clone)]
#[command(name = "gluetool")]
#[command(version)]
#[command(about = "Runs a pipeline of modules", long_about = None)]
#[command(override_usage = "gluetool [OPTIONS] module1 [module1 options] [module2 [module2 options]] ...")]
pub struct Cli {
    /// Engine configuration file (YAML)
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Log everything, including traces
    #[arg(short, long)]
    pub verbose: bool,

    /// Log debugging messages
    #[arg(short, long)]
    pub debug: bool,

    /// Log only warnings and errors
    #[arg(short, long, conflicts_with_all = ["verbose", "debug"])]
    pub quiet: bool,

    /// List all available modules
    #[arg(short = 'l', long)]
    pub list_modules: bool,

    /// List all available shared functions
    #[arg(short = 'L', long)]
    pub list_shared: bool,

    /// Log the command line of the pipeline before running it
    #[arg(short, long)]
    pub info: bool,

    /// Number of times the pipeline is run again when it asks for a retry
    #[arg(short, long)]
    pub retries: Option<usize>,

    /// Directory with module configuration files (repeatable)
    #[arg(long = "module-config-path", value_name = "DIR")]
    pub module_config_paths: Vec<PathBuf>,

    /// Modules make no changes to the outside world
    #[arg(long)]
    pub dry_run: bool,

    /// Modules do not interact with the outside world at all
    #[arg(long)]
    pub isolated_run: bool,

    /// Error kind never submitted to the failure reporter (repeatable)
    #[arg(long = "no-report-error", value_name = "KIND")]
    pub no_report_errors: Vec<String>,

    /// Modules and their options
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "PIPELINE")]
    pub pipeline: Vec<String>,
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }

    /// Global options in `argv`, i.e. everything between the program name and the pipeline
    pub fn global_args(&self, argv: &[String]) -> Vec<String> {
        let args = argv.get(1..).unwrap_or_default();
        args[..args.len().saturating_sub(self.pipeline.len())].to_vec()
    }

    /// Engine configuration: the config file, if any, overridden by command-line options
    pub fn glue_config(&self) -> anyhow::Result<GlueConfig> {
        let mut config = match &self.config {
            Some(path) => GlueConfig::from_file(path)?,
            None => GlueConfig::default(),
        };

        if !self.module_config_paths.is_empty() {
            config.module_config_paths = self.module_config_paths.clone();
        }
        config.dry_run |= self.dry_run;
        config.isolated_run |= self.isolated_run;
        if let Some(retries) = self.retries {
            config.retries = retries;
        }
        config
            .no_report_errors
            .extend(self.no_report_errors.iter().cloned());

        Ok(config)
    }
}
