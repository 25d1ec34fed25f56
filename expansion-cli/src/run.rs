use anyhow::{bail, Result};
use expansion_core::abi::{is_supported, Slot};
use expansion_core::host::expansion_name;
use expansion_core::settings::ExpansionConfig;
use expansion_core::{ExpansionError, ExpansionInstance, ExpansionLoader, SharedBuffer};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// A library to drive, with an optional display name from the settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryTarget {
    pub path: PathBuf,
    pub name: Option<String>,
}

impl LibraryTarget {
    pub fn from_path(path: PathBuf) -> Self {
        Self { path, name: None }
    }

    pub fn from_config(config: &ExpansionConfig) -> Self {
        Self {
            path: config.library.clone(),
            name: config.name.clone(),
        }
    }

    fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| expansion_name(&self.path))
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub triggers: usize,
    pub fill: Slot,
    pub json: bool,
}

/// Outcome of one trigger call, as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriggerReport {
    pub expansion: String,
    pub trigger: usize,
    /// Code points the expansion wrote at the start of the buffer.
    pub text: String,
    /// Slots that no longer hold the fill value.
    pub changed_slots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectReport {
    pub library: PathBuf,
    pub name: String,
    pub api_version: Option<usize>,
    pub supported: bool,
    pub error: Option<String>,
}

/// Runs every target in turn. A failing expansion is logged and skipped; the
/// run as a whole fails if any of them did.
pub fn run(targets: &[LibraryTarget], options: &RunOptions, out: &mut impl Write) -> Result<()> {
    if targets.is_empty() {
        bail!("No expansions to run: pass library paths or enable some in the settings");
    }

    let mut failures = 0;
    for target in targets {
        if let Err(e) = run_library(target, options, out) {
            error!("Expansion {:?} failed: {:#}", target.path, e);
            failures += 1;
        }
    }

    if failures > 0 {
        bail!("{} of {} expansions failed", failures, targets.len());
    }
    Ok(())
}

fn run_library(target: &LibraryTarget, options: &RunOptions, out: &mut impl Write) -> Result<()> {
    let mut expansion = ExpansionLoader::load(&target.path)?;
    let reports = drive(&mut expansion, &target.display_name(), options)?;
    for report in &reports {
        write_report(report, options.json, out)?;
    }
    Ok(())
}

/// Takes a freshly loaded expansion through init, `options.triggers`
/// triggers and deinit. The buffer is refilled before every trigger since
/// the expansion only writes the slots it cares about.
pub fn drive(
    expansion: &mut ExpansionInstance,
    name: &str,
    options: &RunOptions,
) -> Result<Vec<TriggerReport>> {
    expansion.init()?;

    let mut buffer = SharedBuffer::filled(options.fill);
    let mut reports = Vec::with_capacity(options.triggers);
    for trigger in 1..=options.triggers {
        buffer.fill(options.fill);
        expansion.trigger(&mut buffer)?;
        reports.push(TriggerReport {
            expansion: name.to_string(),
            trigger,
            text: buffer.text_until(options.fill),
            changed_slots: buffer.count_changed(options.fill),
        });
    }

    expansion.deinit()?;
    info!(
        "Expansion '{}' handled {} triggers",
        name,
        expansion.trigger_count()
    );
    Ok(reports)
}

fn write_report(report: &TriggerReport, json: bool, out: &mut impl Write) -> Result<()> {
    if json {
        let json = serde_json::to_string(report)?;
        writeln!(out, "{json}")?;
    } else {
        writeln!(
            out,
            "{} #{}: {:?} ({} slots changed)",
            report.expansion, report.trigger, report.text, report.changed_slots
        )?;
    }
    Ok(())
}

/// Loads each library for its version only; `on_init` is never called.
pub fn inspect(libraries: &[PathBuf], json: bool, out: &mut impl Write) -> Result<()> {
    let mut failures = 0;
    for library in libraries {
        let report = inspect_library(library);
        if report.error.is_some() {
            failures += 1;
        }
        if json {
            writeln!(out, "{}", serde_json::to_string(&report)?)?;
        } else {
            let version = report
                .api_version
                .map_or_else(|| "?".to_string(), |v| v.to_string());
            let status = match (&report.error, report.supported) {
                (None, _) => "supported".to_string(),
                (Some(_), false) if report.api_version.is_some() => "unsupported".to_string(),
                (Some(e), _) => format!("error: {e}"),
            };
            writeln!(
                out,
                "{}\t{}\tAPI v{}\t{}",
                report.library.display(),
                report.name,
                version,
                status
            )?;
        }
    }

    if failures > 0 {
        bail!("{} of {} libraries could not be used", failures, libraries.len());
    }
    Ok(())
}

fn inspect_library(library: &Path) -> InspectReport {
    let name = expansion_name(library);
    match ExpansionLoader::load(library) {
        Ok(expansion) => InspectReport {
            library: library.to_path_buf(),
            name: expansion.name().to_string(),
            api_version: Some(expansion.negotiated_version()),
            supported: true,
            error: None,
        },
        Err(e) => {
            let api_version = match &e {
                ExpansionError::ApiVersionMismatch { found, .. } => Some(*found),
                _ => None,
            };
            InspectReport {
                library: library.to_path_buf(),
                name,
                api_version,
                supported: api_version.is_some_and(is_supported),
                error: Some(e.to_string()),
            }
        }
    }
}
