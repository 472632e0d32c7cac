//! Hello World server on 127.0.0.1:3000

mod logging;

use hello_core::{Server, ServerConfig};
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::init();

    match run(ServerConfig::default()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server failed");
            if err.is_addr_in_use() {
                tracing::error!("port is already in use; stop the other process or free the port");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(config: ServerConfig) -> hello_core::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let server = Server::bind(config)?;
        let line = startup_line(server.config())?;

        println!("{line}");
        tracing::info!(addr = %server.local_addr(), "server started");

        server.serve_with_shutdown(shutdown_signal()).await
    })
}

/// The single line printed to stdout once the listener is bound
fn startup_line(config: &ServerConfig) -> hello_core::Result<String> {
    Ok(format!("Server running at {}", config.url()?))
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("SIGINT received"),
        _ = terminate => tracing::info!("SIGTERM received"),
    }
}
