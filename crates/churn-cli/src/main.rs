//! churn CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use churn_cli::{tally, Config};
use churn_core::{ProgressSink, StdoutProgress};
use churn_explore::{parse_step_budget, Driver, FailurePolicy, RunStatus};
use churn_repro::{expand_message, simplify_message};

#[derive(Debug, Parser)]
#[command(name = "churn")]
#[command(about = "stateful randomized testing with replayable failures")]
struct Cli {
    /// Effective steps per run. Anything but a positive integer means 255.
    #[arg(allow_hyphen_values = true)]
    steps: Option<String>,

    /// Base RNG seed. Defaults to the first run id.
    #[arg(long)]
    seed: Option<u64>,

    /// Stop after this many runs instead of running forever.
    #[arg(long)]
    runs: Option<usize>,

    /// Where reproduction scripts are written [default: ./fuzz-artifacts].
    #[arg(long)]
    artifact_dir: Option<PathBuf>,

    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, default_value = "churn.toml")]
    config: PathBuf,

    /// Log filter, used when RUST_LOG is not set.
    #[arg(long, default_value = "warn")]
    log: String,

    /// Only print run banners, no per-step markers.
    #[arg(long)]
    quiet: bool,

    /// Wait for Enter after a failed run before starting the next one.
    #[arg(long)]
    pause_on_failure: bool,

    /// End a run as stalled after this many no-op steps in a row.
    #[arg(long)]
    max_consecutive_noops: Option<u64>,

    /// Replay a reproduction script against a fresh target and exit.
    #[arg(long, value_name = "SCRIPT")]
    replay: Option<PathBuf>,

    /// Inject the demo defect into the tally target.
    #[arg(long)]
    plant_bug: bool,
}

impl Cli {
    /// Layer flags that were actually given on top of `config`.
    fn apply(&self, config: &mut Config) {
        let driver = &mut config.driver;
        if let Some(raw) = &self.steps {
            driver.steps_per_run = parse_step_budget(Some(raw));
        }
        if let Some(seed) = self.seed {
            driver.seed = Some(seed);
        }
        if let Some(dir) = &self.artifact_dir {
            driver.artifact_dir = dir.clone();
        }
        if self.pause_on_failure {
            driver.failure_policy = FailurePolicy::Pause;
        }
        if let Some(limit) = self.max_consecutive_noops {
            driver.max_consecutive_noops = Some(limit);
        }
        if self.plant_bug {
            config.tally.plant_bug = true;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log) {
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    let mut config = Config::load_optional(&cli.config);
    cli.apply(&mut config);

    match run_command(&cli, config) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
}

fn run_command(cli: &Cli, config: Config) -> anyhow::Result<ExitCode> {
    let progress: Rc<dyn ProgressSink> = if cli.quiet {
        Rc::new(StdoutProgress::quiet())
    } else {
        Rc::new(StdoutProgress::new())
    };
    let mut driver = tally::driver(config.driver, config.tally.plant_bug)?.with_progress(progress);

    if let Some(script) = &cli.replay {
        return replay_script(&driver, script);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(drive(&mut driver, cli.runs))
}

/// Run `runs` runs, or forever when no bound is given.
async fn drive(driver: &mut Driver<tally::Tally>, runs: Option<usize>) -> anyhow::Result<ExitCode> {
    let Some(runs) = runs else {
        match driver.run_forever().await? {}
    };
    let outcomes = driver.run_many(runs).await?;
    let failed = outcomes
        .iter()
        .filter(|o| o.status == RunStatus::Failed)
        .count();
    tracing::info!(runs = outcomes.len(), failed, "bounded session finished");
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn replay_script(driver: &Driver<tally::Tally>, script: &Path) -> anyhow::Result<ExitCode> {
    let actions = driver.recorder().load(script)?;
    let report = driver.replay(&actions)?;
    match &report.fault {
        None => {
            println!(
                "\nReplayed {} actions from {}: all invariants hold",
                report.applied,
                script.display()
            );
            Ok(ExitCode::SUCCESS)
        }
        Some(fault) => {
            println!(
                "\nReplayed {} of {} actions from {}: {}",
                report.applied,
                actions.len(),
                script.display(),
                simplify_message(fault.message())
            );
            println!("\nOriginal error was: {}\n", expand_message(fault));
            Ok(ExitCode::from(1))
        }
    }
}
