use console::Term;
use tokio_util::sync::CancellationToken;

/// Set up the SIGINT/SIGTERM handler for graceful shutdown.
///
/// The first signal cancels `cancel`; the second exits immediately.
pub(crate) fn setup_shutdown_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;

        let is_tty = Term::stderr().is_term();
        if is_tty {
            eprintln!("\n\nShutdown requested, finishing current pass...");
            eprintln!("Press Ctrl+C again to force quit.");
        } else {
            tracing::warn!("Shutdown requested, finishing current pass");
        }

        cancel.cancel();

        wait_for_signal().await;

        if is_tty {
            eprintln!("Force quit!");
        } else {
            tracing::warn!("Second shutdown signal, exiting immediately");
        }
        std::process::exit(130);
    });
}

/// Resolve on the next SIGINT or SIGTERM.
///
/// If a handler cannot be installed this never resolves, leaving the process
/// to run until it is killed.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => Some(stream),
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                None
            }
        };

        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };
        let terminate = async {
            match sigterm.as_mut() {
                Some(stream) => {
                    stream.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = interrupt => {}
            () = terminate => {}
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
