//! MOCO certificate reloader
//!
//! Keeps the agent's mTLS credentials loaded while they are rotated on disk.

use std::process::ExitCode;

use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span};

use moco_certreload::{
    Material, Reloader,
    cli::{Cli, Command, OutputFormat},
    config::Config,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Check { format }) => run_check(&config, format),
        Some(Command::Watch) | None => run_watch(config).await,
    }
}

/// Merge CLI overrides on top of file and environment configuration.
fn load_config(cli: &Cli) -> moco_certreload::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(cli.cert_dir.as_deref(), cli.interval);
    config.validate()?;
    Ok(config)
}

/// Load once and print the leaf summary
fn run_check(config: &Config, format: OutputFormat) -> ExitCode {
    let material = match Material::load(&config.cert_dir) {
        Ok(material) => material,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    let leaf = material.leaf();

    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(leaf) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("❌ Failed to serialize to JSON: {e}");
                return ExitCode::FAILURE;
            }
        },
        OutputFormat::Text => {
            println!("✅ {}", config.cert_dir.display());
            println!("   Common name: {}", leaf.common_name);
            println!("   Serial:      {}", leaf.serial);
            println!("   Not before:  {}", leaf.not_before);
            println!("   Not after:   {}", leaf.not_after);
            println!("   Trusted CAs: {}", material.roots().len());
        }
    }

    ExitCode::SUCCESS
}

/// Keep the credentials loaded until SIGINT/SIGTERM
async fn run_watch(config: Config) -> ExitCode {
    let reloader = match Reloader::with_policy(
        &config.cert_dir,
        info_span!("agent-client"),
        config.peer_policy(),
    ) {
        Ok(reloader) => reloader,
        Err(e) => {
            error!(error = %e, "failed to initialize certificate loader");
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancellationToken::new();
    let refresher = reloader.spawn(cancel.clone(), config.interval);
    info!(
        cert_dir = %config.cert_dir.display(),
        interval = %humantime::format_duration(config.interval),
        "Watching certificates"
    );

    shutdown_signal().await;
    cancel.cancel();

    match refresher.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(e)) => {
            error!(error = %e, "Certificate refresher failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Certificate refresher panicked");
            ExitCode::FAILURE
        }
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
