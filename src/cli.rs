//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use playground_sandbox::{RunPolicy, SandboxConfig, SettleStrategy};
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "playground-sandbox",
    version,
    about = "Live-preview code playground - compose HTML/CSS/JS and host it in an isolated runtime"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Less log output (errors only).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Log output format.
    #[arg(long = "log-format", value_enum, default_value = "pretty", global = true)]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compose the buffers into a single document without running it.
    Compose(ComposeArgs),

    /// Compose, host the page once and print its console output.
    Run(RunArgs),

    /// List the built-in examples.
    Examples,

    /// Persistent process: one JSON request per stdin line.
    Session(SessionArgs),
}

/// Buffer sources. Missing files leave that buffer empty.
#[derive(Args)]
pub struct SourceArgs {
    #[arg(long, value_name = "FILE")]
    pub markup: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub style: Option<PathBuf>,

    #[arg(long, value_name = "FILE")]
    pub script: Option<PathBuf>,

    /// Start from a library example instead (files still override it).
    #[arg(long, value_name = "NAME")]
    pub example: Option<String>,
}

#[derive(Args)]
pub struct ComposeArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Write the document here instead of stdout.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    #[command(flatten)]
    pub sandbox: SandboxArgs,
}

#[derive(Args)]
pub struct SessionArgs {
    /// Stored settings JSON (unreadable input falls back to defaults).
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// User agent of the client, for the device gate.
    #[arg(long = "user-agent", value_name = "UA")]
    pub user_agent: Option<String>,

    /// Viewport width of the client in pixels, for the device gate.
    #[arg(long = "viewport-width", value_name = "PX")]
    pub viewport_width: Option<u32>,

    #[command(flatten)]
    pub sandbox: SandboxArgs,
}

#[derive(Args)]
pub struct SandboxArgs {
    /// Upper bound in milliseconds before a run's handle is released.
    #[arg(long = "settle-ms", value_name = "MS", default_value_t = 500)]
    pub settle_ms: u64,

    #[arg(long = "settle", value_enum, default_value = "load-event")]
    pub settle: SettleArg,

    #[arg(long = "run-policy", value_enum, default_value = "single-flight")]
    pub run_policy: RunPolicyArg,

    /// How long a loaded page keeps running, in milliseconds.
    #[arg(long = "page-budget-ms", value_name = "MS", default_value_t = 2000)]
    pub page_budget_ms: u64,

    /// Heap limit per hosted page in MiB (0 = unlimited).
    #[arg(long = "max-heap-mb", value_name = "MB", default_value_t = 64)]
    pub max_heap_mb: usize,

    /// Origin allowed for in-page fetch(). Repeatable.
    #[arg(long = "allow-origin", value_name = "ORIGIN")]
    pub allowed_origins: Vec<String>,
}

impl SandboxArgs {
    pub fn to_config(&self) -> SandboxConfig {
        SandboxConfig {
            settle_delay: Duration::from_millis(self.settle_ms),
            settle_strategy: match self.settle {
                SettleArg::LoadEvent => SettleStrategy::LoadEvent,
                SettleArg::Timer => SettleStrategy::Timer,
            },
            run_policy: match self.run_policy {
                RunPolicyArg::SingleFlight => RunPolicy::SingleFlight,
                RunPolicyArg::Overlapping => RunPolicy::Overlapping,
            },
            page_budget: Duration::from_millis(self.page_budget_ms),
            max_heap_size: (self.max_heap_mb > 0).then(|| self.max_heap_mb * 1024 * 1024),
            allowed_origins: self.allowed_origins.clone(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SettleArg {
    LoadEvent,
    Timer,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RunPolicyArg {
    SingleFlight,
    Overlapping,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
