//! Tandem loopback simulator
//!
//! Runs one loopback session against the simulated bus and exits non-zero
//! if it ends in a fault.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tandem_core::{CompletionSignal, Session, SessionError};
use tandem_sim::config::{self, DEFAULT_CONFIG_PATH};
use tandem_sim::{build_controller, FaultPlan, TokioDelay};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Completion signal registered with the controller for the whole run
static SIGNAL: CompletionSignal = CompletionSignal::new();

#[derive(Parser)]
#[command(author, version, about = "I3C controller loopback against a simulated echo target")]
struct Args {
    /// Configuration file (defaults apply if it does not exist)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Stop after this many verified exchanges
    #[arg(short = 'n', long)]
    iterations: Option<u32>,

    /// Deliver completions from an interrupt thread after this latency
    #[arg(long)]
    latency_us: Option<u32>,

    /// Corrupt the echo on this read (1-based)
    #[arg(long)]
    corrupt_at: Option<u32>,

    /// Bound every completion wait
    #[arg(long)]
    timeout_us: Option<u32>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    if args.iterations.is_some() {
        config.session.max_iterations = args.iterations;
    }
    if args.latency_us.is_some() {
        config.sim.latency_us = args.latency_us;
    }
    if args.corrupt_at.is_some() {
        config.sim.corrupt_at = args.corrupt_at;
    }
    if args.timeout_us.is_some() {
        config.session.completion_timeout_us = args.timeout_us;
    }
    if let Err(e) = config.session.validate() {
        error!("invalid session configuration: {e:?}");
        return ExitCode::FAILURE;
    }

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("cannot start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let controller = build_controller(&config, FaultPlan::new());
    let mut session = Session::new(controller, TokioDelay, &SIGNAL, config.session.clone());

    match runtime.block_on(session.run()) {
        Ok(report) => {
            info!(
                peer = format_args!("{:#x}", report.peer_address),
                iterations = report.iterations,
                tx = report.counters.tx,
                rx = report.counters.rx,
                "loopback complete"
            );
            ExitCode::SUCCESS
        }
        Err(SessionError::Aborted { fault, cleanup }) => {
            error!(?fault, ?cleanup, "session aborted");
            ExitCode::FAILURE
        }
        Err(SessionError::Halted { fault }) => {
            let counters = session.counters();
            error!(?fault, tx = counters.tx, rx = counters.rx, "session halted");
            ExitCode::FAILURE
        }
    }
}
