use anyhow::Result;
use clap::{Parser, Subcommand};
use expansion_core::abi::Slot;
use expansion_core::HostSettings;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod run;

use crate::run::{LibraryTarget, RunOptions};

#[derive(Parser, Debug)]
#[command(name = "expansion-host")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Loads SVC16 expansions and drives them through their lifecycle")]
struct Args {
    /// Settings file (defaults to ~/.svc16/expansions.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load expansions and report their API version without initializing them
    Inspect {
        #[arg(required = true)]
        libraries: Vec<PathBuf>,

        /// Print one JSON object per library
        #[arg(long)]
        json: bool,
    },
    /// Initialize, trigger and deinitialize expansions
    Run {
        /// Libraries to run (defaults to the enabled expansions in the settings)
        libraries: Vec<PathBuf>,

        /// Number of triggers per expansion
        #[arg(long)]
        triggers: Option<usize>,

        /// Value written to every slot before each trigger
        #[arg(long)]
        fill: Option<Slot>,

        /// Print one JSON object per trigger
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings_path = match &args.config {
        Some(path) => path.clone(),
        None => HostSettings::default_path()?,
    };
    let settings = HostSettings::load(&settings_path)?;

    setup_tracing(&settings.log_filter, args.log_file.as_deref())?;
    info!("Settings loaded from {:?}", settings_path);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match args.command {
        Command::Inspect { libraries, json } => run::inspect(&libraries, json, &mut out),
        Command::Run {
            libraries,
            triggers,
            fill,
            json,
        } => {
            let targets: Vec<LibraryTarget> = if libraries.is_empty() {
                settings
                    .enabled_expansions()
                    .map(LibraryTarget::from_config)
                    .collect()
            } else {
                libraries.into_iter().map(LibraryTarget::from_path).collect()
            };
            let options = RunOptions {
                triggers: triggers.unwrap_or(settings.triggers),
                fill: fill.unwrap_or(settings.fill),
                json,
            };
            run::run(&targets, &options, &mut out)
        }
    }
}

fn setup_tracing(default_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let dir = dir.unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("--log-file must name a file: {:?}", path))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            Some(
                fmt::layer()
                    .with_writer(appender)
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    let stderr_layer = if file_layer.is_none() {
        Some(fmt::layer().with_writer(std::io::stderr))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(filter)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_args() {
        let args = Args::try_parse_from([
            "expansion-host",
            "run",
            "libexpansion_hello.so",
            "--triggers",
            "3",
            "--fill",
            "65535",
            "--json",
        ])
        .unwrap();

        match args.command {
            Command::Run {
                libraries,
                triggers,
                fill,
                json,
            } => {
                assert_eq!(libraries, vec![PathBuf::from("libexpansion_hello.so")]);
                assert_eq!(triggers, Some(3));
                assert_eq!(fill, Some(65535));
                assert!(json);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_inspect_requires_a_library() {
        assert!(Args::try_parse_from(["expansion-host", "inspect"]).is_err());
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let args =
            Args::try_parse_from(["expansion-host", "run", "--config", "/tmp/e.toml"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("/tmp/e.toml")));
    }
}
