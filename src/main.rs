use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use droidkw_lib::config::{ConfigStorage, RunnerConfig};
use droidkw_lib::reflection::ReflectionLibrary;
use droidkw_lib::rpc::{ServerHandle, TransportServer};
use droidkw_lib::script::{
    Case, CaseOutcome, CaseRunner, Interpreter, KeywordContext, KeywordRegistry, StatusEvent,
    StatusListener,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// droidkw -- keyword-script runner for Android UI tests.
#[derive(Parser, Debug)]
#[command(name = "droidkw", version, about)]
struct Cli {
    /// Config file (default: <config dir>/droidkw/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Listening port, overrides the config file
    #[arg(long, global = true)]
    port: Option<u16>,

    /// RPC call timeout in seconds, overrides the config file
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Accept device connections and log registrations until Ctrl-C
    Serve,

    /// Parse scripts without running them
    Check {
        /// Script files
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
    },

    /// Wait for a device and run scripts against it, one case per file
    Run {
        /// Device id the agent registers with
        #[arg(long)]
        device: String,

        /// Script files
        #[arg(required = true)]
        scripts: Vec<PathBuf>,
    },
}

/// Keyword registry with every bundled library available to `import`.
fn bundled_registry() -> KeywordRegistry {
    let mut registry = KeywordRegistry::new();
    registry.add_library(ReflectionLibrary);
    registry
}

fn load_config(cli: &Cli) -> anyhow::Result<RunnerConfig> {
    let storage = match &cli.config {
        Some(path) => ConfigStorage::new(path),
        None => ConfigStorage::default_location()?,
    };
    let mut config = storage
        .load()
        .with_context(|| format!("loading {}", storage.path().display()))?;

    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.rpc.call_timeout_secs = timeout;
    }
    Ok(config)
}

fn read_cases(paths: &[PathBuf]) -> anyhow::Result<Vec<Case>> {
    paths
        .iter()
        .zip(1u64..)
        .map(|(path, id)| -> anyhow::Result<Case> {
            let script = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(Case::new(id, case_name(path), script))
        })
        .collect()
}

fn case_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

async fn start_server(config: &RunnerConfig) -> anyhow::Result<ServerHandle> {
    let server = TransportServer::bind(&config.server.socket_addr())
        .await?
        .with_call_timeout(config.rpc.call_timeout());
    let handle = server.spawn()?;
    info!("Listening for devices on {}", handle.local_addr());
    Ok(handle)
}

async fn serve(config: &RunnerConfig) -> anyhow::Result<()> {
    let handle = start_server(config).await?;
    tokio::signal::ctrl_c().await?;
    info!(
        "Shutting down, {} device(s) connected",
        handle.registry().count()
    );
    handle.shutdown().await;
    Ok(())
}

fn check(paths: &[PathBuf]) -> anyhow::Result<()> {
    let mut failed = 0;
    for case in read_cases(paths)? {
        let mut interp = Interpreter::with_registry(bundled_registry());
        match interp.parse(&case.script) {
            Ok(lines) => println!("ok    {} ({} lines)", case.name, lines.len()),
            Err(e) => {
                failed += 1;
                println!("error {}: {}", case.name, e);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} script(s) failed to parse", failed, paths.len());
    }
    Ok(())
}

async fn run(config: &RunnerConfig, device: &str, paths: &[PathBuf]) -> anyhow::Result<()> {
    let cases = read_cases(paths)?;
    let handle = start_server(config).await?;

    let wait = config.rpc.registration_wait();
    info!("Waiting up to {:?} for device {}", wait, device);
    let Some(session) = handle.registry().wait_for(device, wait).await else {
        handle.shutdown().await;
        bail!("device {} did not register within {:?}", device, wait);
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<StatusEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("{}", event);
        }
    });

    let listener: Arc<dyn StatusListener> = Arc::new(event_tx);
    let runner = CaseRunner::new(bundled_registry()).with_listener(listener);
    let report = runner.spawn(cases, KeywordContext::for_session(session)).await?;

    // Runner dropped: the event channel closes and the printer drains.
    if let Err(e) = printer.await {
        warn!("Event printer stopped: {}", e);
    }
    handle.shutdown().await;

    for result in &report.cases {
        let status = match &result.outcome {
            CaseOutcome::ParseFailed { line, .. } => format!("not loaded (line {})", line),
            CaseOutcome::Executed(exec) if exec.is_success() => "passed".to_string(),
            CaseOutcome::Executed(exec) => format!("{} line(s) failed", exec.failures.len()),
        };
        println!("{:>4} {:<24} {}", result.case_id, result.name, status);
    }
    println!("{} passed, {} failed", report.passed(), report.failed());

    if !report.is_success() {
        bail!("{} case(s) failed", report.failed());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    // RUST_LOG wins over the config file.
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match &cli.command {
        Commands::Serve => serve(&config).await,
        Commands::Check { scripts } => check(scripts),
        Commands::Run { device, scripts } => run(&config, device, scripts).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from([
            "droidkw", "--port", "12000", "run", "--device", "emu-1", "a.kw", "b.kw",
        ])
        .unwrap();
        assert_eq!(cli.port, Some(12000));
        match cli.command {
            Commands::Run { device, scripts } => {
                assert_eq!(device, "emu-1");
                assert_eq!(scripts.len(), 2);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_case_name() {
        assert_eq!(case_name(Path::new("cases/login.kw")), "login");
    }

    #[test]
    fn test_bundled_registry_imports_reflection() {
        let mut interp = Interpreter::with_registry(bundled_registry());
        interp.parse("import reflection\nint 3 as n").unwrap();
    }
}
