//! bosun binary entry point.

use std::sync::Arc;

use bosun::commands::{Cli, Commands};
use bosun::ops::{self, Context};
use bosun::{exit_code, EnvOverrides, Orchestrator, RunConfig, RunError, RunPaths};
use clap::Parser;
use cluster::HttpsApiProbe;
use host::{host_profile, CancelSource, CancelToken, HostExecutor};
use report::{AutoConfirmer, Confirmer, ConsoleReporter, Reporter, RunLedger, StdinConfirmer};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    let source = CancelSource::new();
    let token = source.token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received");
            source.cancel();
        }
    });

    let code = match dispatch(cli, token).await {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {}", error);
            exit_code(&error)
        }
    };
    if code != 0 {
        std::process::exit(code);
    }
}

fn init_logging() {
    let filter = match std::env::var("LOG_LEVEL") {
        Ok(level) => tracing_subscriber::EnvFilter::new(level),
        Err(_) => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn dispatch(cli: Cli, cancel: CancelToken) -> Result<(), RunError> {
    let profile = host_profile();
    let paths = RunPaths::create_default()?;
    let ledger = Arc::new(RunLedger::open(&paths.ledger)?);
    let reporter: Arc<dyn Reporter> = Arc::new(ConsoleReporter::with_ledger(ledger.clone()));
    let executor = Arc::new(HostExecutor::new(profile, reporter.clone()));

    match cli.command {
        Commands::Bootstrap(args) => {
            let env = EnvOverrides::from_process();
            let cfg = RunConfig::resolve(&args, &env)?;
            let confirmer: Arc<dyn Confirmer> = if cfg.interactive {
                Arc::new(StdinConfirmer)
            } else {
                Arc::new(AutoConfirmer)
            };
            Orchestrator::new(
                cfg,
                profile,
                executor,
                reporter,
                confirmer,
                Arc::new(HttpsApiProbe::new()),
                ledger,
                cancel,
                paths,
            )
            .run()
            .await
        }
        Commands::Cluster { command } => {
            let ctx = Context {
                executor,
                reporter,
                confirmer: Arc::new(StdinConfirmer),
                probe: Arc::new(HttpsApiProbe::new()),
                cancel,
                paths,
            };
            ops::run_cluster(&ctx, command).await
        }
        Commands::Chart { command } => {
            let ctx = Context {
                executor,
                reporter,
                confirmer: Arc::new(StdinConfirmer),
                probe: Arc::new(HttpsApiProbe::new()),
                cancel,
                paths,
            };
            ops::run_chart(&ctx, command).await
        }
    }
}
