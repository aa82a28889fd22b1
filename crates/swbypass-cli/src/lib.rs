//! File-driven front end for the scheduler passes of `swbypass`.
//!
//! A job reads a machine description (TOML) and a scheduled block (JSON),
//! configures a pass from the registry, runs its bypasser over the block and
//! applies the resulting plan.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use swbypass::{
    Block, BypassPlan, BypassStatistics, CommandLineOverrides, MachineSummary, NamedOption,
    PassError, PassRegistry,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid machine file {}", path.display())]
    Machine {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid block file {}", path.display())]
    Block {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Malformed option `{0}`, expected name=value")]
    MalformedOption(String),
    #[error(transparent)]
    Pass(#[from] PassError),
}

/// Contents of a machine file: a `[machine]` table and an optional
/// `[[options]]` list handed to the pass before any command line option.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineFile {
    #[serde(default)]
    pub machine: MachineSummary,
    #[serde(default)]
    pub options: Vec<NamedOption>,
}

impl MachineFile {
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let text = read(path)?;
        toml::from_str(&text).map_err(|source| CliError::Machine {
            path: path.to_path_buf(),
            source,
        })
    }
}

pub fn load_block(path: &Path) -> Result<Block, CliError> {
    let text = read(path)?;
    serde_json::from_str(&text).map_err(|source| CliError::Block {
        path: path.to_path_buf(),
        source,
    })
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Parses `name=value` arguments in command line order.
pub fn parse_options<S: AsRef<str>>(specs: &[S]) -> Result<Vec<NamedOption>, CliError> {
    specs
        .iter()
        .map(|spec| {
            NamedOption::parse(spec.as_ref())
                .ok_or_else(|| CliError::MalformedOption(spec.as_ref().to_string()))
        })
        .collect()
}

/// One run of a scheduler pass over one block.
#[derive(Debug, Clone)]
pub struct Job {
    pub pass: String,
    pub machine: MachineFile,
    pub block: Block,
    /// Appended after the options of the machine file.
    pub options: Vec<NamedOption>,
    pub overrides: CommandLineOverrides,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub pass: String,
    pub bypasser: String,
    pub plan: BypassPlan,
    /// The block after the plan was applied.
    pub block: Block,
    pub statistics: BypassStatistics,
}

pub fn run_job(registry: &PassRegistry, job: &Job) -> Result<Report, CliError> {
    let mut pass = registry.create(&job.pass)?;
    let options: Vec<NamedOption> = job
        .machine
        .options
        .iter()
        .chain(&job.options)
        .cloned()
        .collect();
    pass.set_options(&options).map_err(PassError::from)?;
    pass.set_overrides(job.overrides);

    let module = pass
        .as_bypasser_module()
        .ok_or_else(|| PassError::NotABypasser {
            name: job.pass.clone(),
        })?;
    let bypasser = module.bypasser(&job.machine.machine);
    let plan = bypasser
        .bypass_block(&job.block, &job.machine.machine)
        .map_err(PassError::from)?;

    let mut block = job.block.clone();
    block.apply(&plan).map_err(PassError::from)?;
    log::debug!("applied plan, block is now at version {}", block.version);

    Ok(Report {
        pass: job.pass.clone(),
        bypasser: bypasser.long_description(),
        statistics: bypasser.statistics().clone(),
        plan,
        block,
    })
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.pass, self.bypasser)?;
        write!(f, "{}", self.plan)?;
        writeln!(
            f,
            "bypassed {}, killed {}, rejected {}",
            self.statistics.bypassed,
            self.statistics.killed,
            self.statistics.total_rejected()
        )?;
        write!(f, "{}", self.block)
    }
}
