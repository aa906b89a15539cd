use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{ArgAction, Parser, Subcommand};
use stackvisor::{
    LogWriter, Manifest, Orchestrator, RuntimeError, Subscribe, resolve,
    status_file::{self, DEFAULT_STATUS_FILE, StatusFileWriter, StatusSnapshot},
};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "stackvisor", version, about = "Start, supervise and stop a local service stack")]
struct Args {
    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start all services in dependency order and supervise them until interrupted
    StartAll {
        /// Manifest file
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_STATUS_FILE)]
        status_file: PathBuf,
    },
    /// Stop the stack run by a foreground `start-all`
    StopAll {
        #[arg(long, default_value = DEFAULT_STATUS_FILE)]
        status_file: PathBuf,
        /// How long to wait for the teardown to finish
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },
    /// Print the phase of every service
    Status {
        #[arg(long, default_value = DEFAULT_STATUS_FILE)]
        status_file: PathBuf,
    },
    /// Validate a manifest and print the start order
    Check {
        /// Manifest file
        #[arg(short, long)]
        file: PathBuf,
    },
}

fn init(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = filter::Targets::new().with_targets(vec![("stackvisor", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    match args.command {
        Command::StartAll { file, status_file } => start_all(&file, &status_file).await,
        Command::StopAll {
            status_file,
            timeout_secs,
        } => stop_all(&status_file, Duration::from_secs(timeout_secs)).await,
        Command::Status { status_file } => status(&status_file).await,
        Command::Check { file } => check(&file),
    }
}

async fn start_all(file: &Path, status_path: &Path) -> anyhow::Result<()> {
    let manifest = Manifest::load(file)?;

    if let Ok(prev) = status_file::read(status_path).await {
        if prev.running && status_file::process_alive(prev.pid) {
            bail!(
                "a stack is already running (pid {}, status file {})",
                prev.pid,
                status_path.display()
            );
        }
    }

    let log: Arc<dyn Subscribe> = Arc::new(LogWriter::new());
    let mut orch = Orchestrator::builder(manifest.config.clone(), manifest.registry.clone())
        .with_launcher(Arc::new(manifest.launcher()))
        .with_subscribers(vec![log])
        .build()
        .context("invalid service graph")?;
    info!(order = ?orch.order(), status_file = %status_path.display(), "stack resolved");

    let board = orch.status_board();
    let writer_token = CancellationToken::new();
    let writer = StatusFileWriter::new(status_path, board.clone()).spawn(orch.bus(), writer_token.clone());

    let res = orch.run().await;

    writer_token.cancel();
    let _ = writer.await;
    let teardown = match &res {
        Err(RuntimeError::Teardown(errs)) => Some(errs),
        _ => None,
    };
    if let Err(e) = status_file::write(status_path, &StatusSnapshot::finished(&board, teardown)).await {
        warn!(error = %e, "cannot write final status file");
    }
    orch.close().await;

    res.context("stack did not shut down cleanly")
}

async fn stop_all(status_path: &Path, timeout: Duration) -> anyhow::Result<()> {
    let snap = status_file::read(status_path)
        .await
        .with_context(|| format!("cannot read status file {}", status_path.display()))?;
    if !snap.running || !status_file::process_alive(snap.pid) {
        bail!("no running stack found (last pid {})", snap.pid);
    }

    status_file::request_stop(snap.pid)
        .with_context(|| format!("cannot signal orchestrator pid {}", snap.pid))?;
    info!(pid = snap.pid, "stop requested, waiting for teardown");

    let deadline = Instant::now() + timeout;
    loop {
        sleep(Duration::from_millis(250)).await;

        match status_file::read(status_path).await {
            Ok(s) if !s.running => {
                print!("{}", s.render_table());
                if !s.teardown_errors.is_empty() {
                    bail!("teardown errors:\n  {}", s.teardown_errors.join("\n  "));
                }
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "status file not readable yet"),
        }

        if !status_file::process_alive(snap.pid) {
            bail!("orchestrator pid {} exited without reporting teardown", snap.pid);
        }
        if Instant::now() >= deadline {
            bail!("teardown did not finish within {timeout:?}");
        }
    }
}

async fn status(status_path: &Path) -> anyhow::Result<()> {
    let snap = status_file::read(status_path)
        .await
        .with_context(|| format!("cannot read status file {}", status_path.display()))?;

    let state = match (snap.running, status_file::process_alive(snap.pid)) {
        (true, true) => "running",
        (true, false) => "dead (stale status file)",
        (false, _) => "stopped",
    };
    println!(
        "orchestrator pid {} {state}, updated {}",
        snap.pid,
        snap.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    print!("{}", snap.render_table());
    for err in &snap.teardown_errors {
        println!("teardown error: {err}");
    }
    Ok(())
}

fn check(file: &Path) -> anyhow::Result<()> {
    let manifest = Manifest::load(file)?;
    let order = resolve(&manifest.registry).context("invalid service graph")?;

    println!("{} services, start order:", order.len());
    for (i, name) in order.iter().enumerate() {
        let deps = manifest
            .registry
            .get(name)
            .map(|s| s.depends_on().join(", "))
            .unwrap_or_default();
        if deps.is_empty() {
            println!("{:>3}. {name}", i + 1);
        } else {
            println!("{:>3}. {name} (after {deps})", i + 1);
        }
    }
    Ok(())
}
