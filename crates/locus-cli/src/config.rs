use clap::{Parser, Subcommand};
use locus_core::Trigger;
use std::path::PathBuf;
use std::sync::LazyLock;

static VERSION_INFO: LazyLock<String> = LazyLock::new(|| {
    let version = env!("CARGO_PKG_VERSION");

    let commit = option_env!("VERGEN_GIT_SHA")
        .map(|s| s.chars().take(7).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());

    let built = option_env!("VERGEN_BUILD_DATE").unwrap_or("unknown"); // YYYY-MM-DD
    let target = option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown");
    let rustc = option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown");

    format!("{version}\ncommit: {commit}\nbuilt: {built}\ntarget: {target}\nrustc: {rustc}")
});

pub fn version_info() -> &'static str {
    &VERSION_INFO
}

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "locus")]
#[command(
    author,
    version = version_info(),
    about = "Incremental harvester for Business Profile location insights"
)]
#[command(after_help = "Examples:
  locus accounts                    # list the accounts your token can see
  locus configure                   # apply ~/.config/locus/locus.toml
  locus start                       # begin the yearly download
  locus worker                      # fire armed triggers until Ctrl-C
  locus tick yearly-insights-retry  # run one trigger handler now
  locus status")]
pub struct Config {
    /// PostgreSQL database connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// OAuth access token for the Business Profile APIs
    #[arg(long, env = "GBP_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// Custom path to locus.toml
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refresh and print the accounts visible to the access token
    Accounts,
    /// Copy locus.toml (accounts and retention) into the database
    Configure,
    /// Start the yearly download from scratch
    #[command(after_help = "Disarms every trigger and clears insights and progress markers, \
then lists locations and covers as many weeks as one slice allows. \
Armed retries continue the work; run `locus worker` to fire them.")]
    Start,
    /// Clear insights and locations, then start again
    Reset,
    /// Run one trigger handler once
    #[command(after_help = "Triggers:
  yearly-locations-retry
  yearly-insights-retry
  weekly-locations-retry
  weekly-insights-retry
  steady-state-weekly")]
    Tick {
        /// Trigger name
        trigger: Trigger,
    },
    /// Fire armed triggers as they come due until interrupted
    Worker {
        /// Seconds between polls when nothing is due
        #[arg(long, default_value = "30")]
        poll_interval: u64,

        /// Worker identifier used in logs
        #[arg(long)]
        worker_id: Option<String>,
    },
    /// Show armed triggers, configuration, progress and recent log lines
    Status {
        /// Number of audit log lines to show
        #[arg(short, long, default_value = "10")]
        logs: usize,
    },
}
