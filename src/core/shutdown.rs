use tokio::signal;

/// Why the session view is being torn down from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TeardownReason {
    Interrupted,
    Terminated,
    Requested,
}

impl TeardownReason {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Interrupted => "interrupted",
            Self::Terminated => "terminated",
            Self::Requested => "requested",
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never fires.
pub(crate) async fn teardown_signal() -> TeardownReason {
    let interrupted = async {
        match signal::ctrl_c().await {
            Ok(()) => TeardownReason::Interrupted,
            Err(err) => {
                tracing::error!(error = %err, "Failed to install Ctrl+C handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(unix)]
    let terminated = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                TeardownReason::Terminated
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminated = std::future::pending::<TeardownReason>();

    let reason = tokio::select! {
        reason = interrupted => reason,
        reason = terminated => reason,
    };

    tracing::info!(reason = reason.as_str(), "Teardown signal received");
    reason
}
