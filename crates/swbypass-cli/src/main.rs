use clap::Parser as ClapParser;
use env_logger::Env;
use miette::{IntoDiagnostic, Result, bail};
use std::path::PathBuf;
use swbypass::{ClbBypasserModule, CommandLineOverrides, PassRegistry};
use swbypass_cli::{Job, MachineFile, load_block, parse_options, run_job};

#[derive(ClapParser)]
#[command(
    name = "swbypass",
    version,
    about = "Run software bypassing over a scheduled TTA basic block"
)]
struct Cli {
    /// Machine description (TOML)
    #[arg(long, required_unless_present = "list_passes")]
    machine: Option<PathBuf>,

    /// Scheduled block (JSON)
    #[arg(long, required_unless_present = "list_passes")]
    block: Option<PathBuf>,

    /// Scheduler pass to run
    #[arg(long, default_value = ClbBypasserModule::NAME)]
    pass: String,

    /// Pass option as name=value, applied after the options of the machine file
    #[arg(short = 'o', long = "option", value_name = "NAME=VALUE")]
    options: Vec<String>,

    /// Look-back distance that wins over every pass option
    #[arg(long)]
    lookback_distance: Option<u32>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// List the registered scheduler passes and exit
    #[arg(long)]
    list_passes: bool,

    /// Incremental verbosity (`-v` for debug, `-vv` for trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logger(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let registry = PassRegistry::builtin();
    if cli.list_passes {
        for name in registry.names() {
            let pass = registry.create(name).into_diagnostic()?;
            println!("{name}: {}", pass.short_description());
            println!("    {}", pass.long_description());
        }
        return Ok(());
    }

    let (Some(machine), Some(block)) = (cli.machine, cli.block) else {
        bail!("--machine and --block are required");
    };

    let job = Job {
        pass: cli.pass,
        machine: MachineFile::load(&machine).into_diagnostic()?,
        block: load_block(&block).into_diagnostic()?,
        options: parse_options(&cli.options).into_diagnostic()?,
        overrides: CommandLineOverrides {
            lookback_distance: cli.lookback_distance,
        },
    };
    let report = run_job(&registry, &job).into_diagnostic()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    } else {
        print!("{report}");
    }
    Ok(())
}
