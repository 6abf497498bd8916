#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use revgraph_core::load_graph_config;
use revgraph_sim::campaign::{self, CampaignConfig, format_violation};
use revgraph_sim::history::HistoryConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "revgraph-sim: deterministic replay campaigns for the revision graph",
    long_about = None
)]
struct Cli {
    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// TOML file with a `[graph]` table for the graph under test.
    #[arg(long, global = true, value_name = "PATH")]
    graph_config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a campaign over a range of seeds.
    Run {
        /// First seed.
        #[arg(long, default_value_t = 0)]
        from: u64,
        /// Number of seeds.
        #[arg(long, default_value_t = 100)]
        seeds: u64,
        #[command(flatten)]
        shape: ShapeArgs,
    },
    /// Replay one seed and print its trace.
    Replay {
        /// Seed to replay.
        seed: u64,
        #[command(flatten)]
        shape: ShapeArgs,
    },
}

#[derive(Args, Debug)]
struct ShapeArgs {
    /// Revisions per generated history.
    #[arg(long, default_value_t = HistoryConfig::default().revisions)]
    revisions: usize,
    /// Chance that a revision arrives late (percent).
    #[arg(long)]
    withhold_percent: Option<u8>,
    /// Chance that a generated revision has a ghost parent (percent).
    #[arg(long)]
    ghost_percent: Option<u8>,
}

impl ShapeArgs {
    fn apply(&self, config: &mut CampaignConfig) {
        config.history.revisions = self.revisions;
        if let Some(percent) = self.withhold_percent {
            config.withhold_percent = percent;
        }
        if let Some(percent) = self.ghost_percent {
            config.history.ghost_percent = percent;
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("REVGRAPH_LOG")
        .unwrap_or_else(|_| EnvFilter::new("revgraph_sim=info,revgraph_core=warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

fn base_config(cli: &Cli) -> Result<CampaignConfig> {
    let mut config = CampaignConfig::default();
    if let Some(path) = &cli.graph_config {
        let graph = load_graph_config(path)?;
        config.heads_cache = graph.heads_cache;
        config.heads_cache_limit = graph.heads_cache_limit;
    }
    Ok(config)
}

fn run(cli: &Cli, from: u64, seeds: u64, shape: &ShapeArgs) -> Result<()> {
    let mut config = base_config(cli)?;
    config.seed_range = from..from.saturating_add(seeds);
    shape.apply(&mut config);

    let report = campaign::run_campaign(&config)?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "campaign complete: seeds_run={} seeds_passed={} interesting={}",
            report.seeds_run, report.seeds_passed, report.interesting_states_reached
        );
        for failure in &report.failures {
            println!("seed {} failed:", failure.seed);
            for violation in &failure.violations {
                println!("  {violation}");
            }
        }
    }

    if let Some(seed) = report.first_failure {
        bail!("{} seed(s) failed; replay with `revgraph-sim replay {seed}`", report.failures.len());
    }
    Ok(())
}

fn replay(cli: &Cli, seed: u64, shape: &ShapeArgs) -> Result<()> {
    let mut config = base_config(cli)?;
    config.seed_range = seed..seed.saturating_add(1);
    shape.apply(&mut config);

    let trace = campaign::replay_seed(seed, &config)
        .with_context(|| format!("Failed to replay seed {seed}"))?;
    let violations: Vec<String> = trace.oracle.violations.iter().map(format_violation).collect();

    if cli.json {
        let output = serde_json::json!({
            "seed": seed,
            "tip": trace.result.history.tip,
            "revisions": trace.result.history.revisions.len(),
            "trace": trace.result.trace,
            "probes": trace.result.probes,
            "passed": trace.oracle.passed,
            "violations": violations,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for event in &trace.result.trace {
            println!("{:>6} {:?} {:?}", event.step, event.phase, event.kind);
        }
        println!(
            "seed {seed}: revisions={} tip={} passed={}",
            trace.result.history.revisions.len(),
            trace.result.history.tip,
            trace.oracle.passed
        );
        for violation in &violations {
            println!("  {violation}");
        }
    }

    if !trace.oracle.passed {
        bail!("seed {seed} violated {} invariant(s)", violations.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { from, seeds, shape } => run(&cli, *from, *seeds, shape),
        Commands::Replay { seed, shape } => replay(&cli, *seed, shape),
    }
}
