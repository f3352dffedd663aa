use anyhow::{Context, Result};
use gluetool::cli::driver::{exit_status, run_with_retries};
use gluetool::cli::output::*;
use gluetool::cli::steps::deduce_pipeline;
use gluetool::cli::Cli;
use gluetool::execution::{Glue, LogReporter};
use gluetool::modules::builtin_registry;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let log_level = if cli.verbose {
        "trace"
    } else if cli.debug {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let registry = builtin_registry();

    if cli.list_modules {
        println!("{}Available modules:", INFO);
        println!("{}", format_module_list(&registry.describe()));
        return Ok(());
    }

    if cli.list_shared {
        println!("{}Available shared functions:", INFO);
        println!("{}", format_shared_list(&registry.shared_functions()));
        return Ok(());
    }

    let config = cli.glue_config().context("Failed to load configuration")?;
    let steps = deduce_pipeline(&cli.pipeline, &registry.names())?;
    if steps.is_empty() {
        anyhow::bail!("No module specified, use -l to list available");
    }

    if cli.info {
        let argv: Vec<String> = std::env::args().collect();
        let global = cli.global_args(&argv);
        info!(
            "command-line:\n{}",
            format_command_line("gluetool", &global, &steps)
        );
    }

    let retries = config.retries;
    let glue = Glue::with_reporter(registry, config, Box::new(LogReporter));

    println!(
        "{}Running pipeline of {} module(s)",
        ROCKET,
        style(steps.len()).cyan()
    );

    let result = run_with_retries(&glue, &steps, retries);
    let (failure, destroy_failure) = &result;

    if let Some(failure) = failure {
        eprintln!("{}", format_failure(failure));
    }

    if let Some(destroy_failure) = destroy_failure {
        warn!("Exception raised when destroying modules, overriding exit status");
        eprintln!("{}", format_failure(destroy_failure));
    }

    let status = exit_status(&result);
    if status == 0 {
        println!("{}Pipeline {}", CHECK, style("finished").green());
    } else {
        println!("{}Pipeline {}", CROSS, style("failed").red());
    }

    std::process::exit(status);
}
