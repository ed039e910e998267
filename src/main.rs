//! Playground Sandbox CLI
//!
//! Single-shot:
//!   playground-sandbox run --example counter
//!   playground-sandbox compose --markup page.html --style page.css --out doc.html
//!
//! Session mode (persistent process, reads from stdin):
//!   playground-sandbox session
//!
//! Protocol (session mode):
//!   Request (stdin, one per line):
//!     {"op":"edit","tab":"script","text":"console.log(1)"}
//!     {"op":"run"}
//!
//!   Response (stdout):
//!     Status:Ok
//!     Length:1234
//!
//!     {"run":{"outcome":"started",...},"report":{...}}
//!
//!   Error response:
//!     Status:Error
//!     Length:42
//!
//!     no example named 'x'. Available: ...

mod cli;

use anyhow::{anyhow, Result};
use clap::Parser;
use playground_sandbox::logging::{init_logging, LogConfig, LogFormat};
use playground_sandbox::{
    compose_document, find_example, BlobRenderer, Composer, ConsoleOutput, DeviceClass,
    DeviceGate, ExecutionController, HtmlComposer, IsolatedRenderer, Session, Settings,
    SourceBuffers, DESKTOP_ONLY_NOTICE, EXAMPLES,
};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use crate::cli::{Cli, Command, ComposeArgs, LogFormatArg, RunArgs, SessionArgs, SourceArgs};

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))
}

/// Build the buffers from an optional example plus per-buffer file overrides.
fn load_sources(args: &SourceArgs) -> Result<SourceBuffers> {
    let mut buffers = match &args.example {
        Some(name) => find_example(name)?.to_buffers(),
        None => SourceBuffers::default(),
    };
    if let Some(path) = &args.markup {
        buffers.markup = read_file(path)?;
    }
    if let Some(path) = &args.style {
        buffers.style = read_file(path)?;
    }
    if let Some(path) = &args.script {
        buffers.script = read_file(path)?;
    }
    Ok(buffers)
}

fn print_console(console: &ConsoleOutput) {
    for log in &console.logs {
        eprintln!("[LOG] {}", log);
    }
    for warn in &console.warns {
        eprintln!("[WARN] {}", warn);
    }
    for err in &console.errors {
        eprintln!("[ERROR] {}", err);
    }
}

fn run_compose(args: &ComposeArgs) -> Result<()> {
    let document = compose_document(&load_sources(&args.sources)?);
    match &args.out {
        Some(path) => std::fs::write(path, document.as_str())
            .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?,
        None => println!("{}", document.as_str()),
    }
    Ok(())
}

/// Host the composed page once and report what it printed while loading.
async fn run_single_shot(args: &RunArgs) -> Result<()> {
    let config = args.sandbox.to_config();
    let document = compose_document(&load_sources(&args.sources)?);
    let html = document.as_str().to_string();

    let renderer = BlobRenderer::new(&config)?;
    let presentation = renderer.present(document)?;

    let report = match presentation.loaded {
        Some(loaded) => tokio::time::timeout(config.page_budget, loaded).await.ok().and_then(Result::ok),
        None => None,
    };
    renderer.release(&presentation.handle)?;

    let report = report.ok_or_else(|| anyhow!("Preview did not load within {:?}", config.page_budget))?;
    print_console(&report.console);
    tracing::info!(status = ?report.status, scripts = report.scripts, "Page loaded");

    println!("{}", html);
    Ok(())
}

fn run_examples() {
    for example in EXAMPLES {
        println!("{:<16} {}", example.name, example.description);
    }
}

/// Run in session mode (persistent process, reads requests from stdin)
async fn run_session(args: &SessionArgs) -> Result<()> {
    let gate = DeviceGate {
        user_agent: args.user_agent.clone(),
        viewport_width: args.viewport_width,
    };
    if gate.classify() == DeviceClass::Mobile {
        eprintln!("{}", DESKTOP_ONLY_NOTICE);
        return Err(anyhow!("Interactive sessions need a desktop client"));
    }

    let settings = match &args.settings {
        Some(path) => Settings::from_json_lenient(&read_file(path)?),
        None => Settings::default(),
    };
    let config = args.sandbox.to_config();

    let composer: Arc<dyn Composer> = Arc::new(HtmlComposer);
    let renderer = Arc::new(BlobRenderer::new(&config)?);
    let controller = ExecutionController::mount(Arc::clone(&composer), renderer, &settings, config)?;
    let session = Session::new(controller, composer);

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    eprintln!("[playground-sandbox] Session ready, reading from stdin...");
    session.serve(stdin.lock(), &mut stdout).await?;
    eprintln!("[playground-sandbox] Session shutting down");

    Ok(())
}

fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig::from_verbosity(cli.verbose, cli.quiet);
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = cli.log_file.is_none() && std::io::stderr().is_terminal();
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&log_config_from_cli(&cli))
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

    match &cli.command {
        Command::Compose(args) => run_compose(args),
        Command::Run(args) => run_single_shot(args).await,
        Command::Examples => {
            run_examples();
            Ok(())
        }
        Command::Session(args) => run_session(args).await,
    }
}
