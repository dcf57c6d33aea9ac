// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::net::SocketAddr;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use nft_consistency_check::{
    api::router,
    checker::RunReport,
    config::{CheckerConfig, ConfigError},
    logging::{self, LogFormat},
    state::AppState,
};

#[derive(Parser)]
#[command(author, version, about = "Ledger / enclave NFT consistency checker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one verification run and exit with a code naming the outcome
    Run {
        /// Print the run report as JSON on stdout
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Serve the verification trigger and health probes over HTTP
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init(LogFormat::from_env());
    let cli = Cli::parse();

    let config = match CheckerConfig::from_env() {
        Ok(config) => config,
        Err(e) => return config_failure(e),
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    match cli.command {
        Commands::Run { json } => run_once(&config, json, &shutdown).await,
        Commands::Serve => serve(&config, shutdown).await,
    }
}

fn config_failure(e: ConfigError) -> ExitCode {
    error!(error = %e, "Invalid configuration");
    ExitCode::from(ConfigError::EXIT_CODE as u8)
}

async fn run_once(config: &CheckerConfig, json: bool, shutdown: &CancellationToken) -> ExitCode {
    let checker = match config.build_checker() {
        Ok(checker) => checker,
        Err(e) => return config_failure(e),
    };

    match checker.run(shutdown).await {
        Ok(report) => {
            print_report(&report, json);
            ExitCode::SUCCESS
        }
        Err(err) => {
            print_report(&err.report, json);
            ExitCode::from(err.source.exit_code() as u8)
        }
    }
}

fn print_report(report: &RunReport, json: bool) {
    if !json {
        return;
    }
    match serde_json::to_string_pretty(report) {
        Ok(rendered) => println!("{rendered}"),
        Err(e) => warn!(error = %e, "Failed to render run report"),
    }
}

async fn serve(config: &CheckerConfig, shutdown: CancellationToken) -> ExitCode {
    let checker = match config.build_checker() {
        Ok(checker) => checker,
        Err(e) => return config_failure(e),
    };

    let state = AppState::new(checker, shutdown.clone())
        .with_enclave_program(config.enclave_cli.clone());
    let app = router(state);

    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!(host = %config.host, port = config.port, error = %e, "Invalid bind address");
            return ExitCode::from(ConfigError::EXIT_CODE as u8);
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    info!(
        %addr,
        rpc_url = %config.ledger.rpc_url,
        enclave_cli = %config.enclave_cli.display(),
        "Consistency checker listening (docs at /docs)"
    );

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;

    match result {
        Ok(()) => {
            info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    token.cancel();
}
