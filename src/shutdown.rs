use tokio_util::sync::CancellationToken;

/// Install a shutdown handler that listens for ctrl-c (and SIGTERM on unix).
///
/// Returns a `CancellationToken` that is cancelled when a signal is received.
/// The periodic loops and both HTTP servers monitor this token and drain
/// gracefully.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received ctrl-c, initiating graceful shutdown");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received ctrl-c, initiating graceful shutdown");
        }

        token_clone.cancel();
    });

    token
}
