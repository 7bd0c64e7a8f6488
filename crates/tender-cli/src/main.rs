use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tender_core::Weekday;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "tender",
    about = "Tender — freight waterfall dispatch engine",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format: text or json
    #[arg(long, global = true, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the dispatch stages a lane's waterfall resolves to
    Resolve {
        /// Path to the lane TOML file
        #[arg(short, long)]
        lane: PathBuf,
        /// Only include carriers with capacity on this weekday (mon..sun)
        #[arg(short, long)]
        day: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Replay a scripted sequence of responses against a lane.
    ///
    /// Time is simulated: each script step happens `at_mins` minutes after
    /// the run starts, and stage windows lapse at their exact deadlines.
    Simulate {
        #[arg(short, long)]
        lane: PathBuf,
        /// Path to the script TOML file ([[step]] tables)
        #[arg(short, long)]
        script: PathBuf,
        #[arg(long, default_value = "load-sim")]
        load: String,
        /// Keep letting windows lapse after the last step until the run ends
        #[arg(long)]
        until_done: bool,
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Run a waterfall live against the wall clock.
    ///
    /// Reads `accept <carrier>`, `decline <carrier>`, `pause`, `resume`,
    /// `cancel` and `status` commands from stdin.
    Run {
        #[arg(short, long)]
        lane: PathBuf,
        #[arg(long)]
        load: String,
        /// Seconds between window checks
        #[arg(long, default_value = "5")]
        tick_secs: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_format);

    match cli.command {
        Commands::Resolve { lane, day, format } => {
            let day = day
                .map(|d| d.parse::<Weekday>())
                .transpose()
                .map_err(anyhow::Error::msg)?;
            commands::resolve::resolve(&lane, day, &format)
        }
        Commands::Simulate {
            lane,
            script,
            load,
            until_done,
            format,
        } => commands::simulate::simulate(&lane, &script, &load, until_done, &format),
        Commands::Run {
            lane,
            load,
            tick_secs,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(commands::run::run(&lane, &load, tick_secs))
        }
    }
}

fn init_tracing(format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,tender_waterfall=info,tender_registry=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
}
