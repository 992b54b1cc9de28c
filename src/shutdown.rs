// src/shutdown.rs - Process signals that end the dashboard

use std::future::Future;
use std::io;
use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Terminate,
    Interrupt,
}

/// Wait for SIGTERM or Ctrl+C. Returns `None` when no signal can be listened for.
pub async fn wait_for_shutdown_signal() -> Option<ShutdownSignal> {
    #[cfg(unix)]
    let sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => Some(async move {
            sigterm.recv().await;
        }),
        Err(e) => {
            error!(event = "shutdown.handler_failed", error = %e, "Failed to install SIGTERM handler; listening for Ctrl+C only.");
            None
        }
    };
    #[cfg(not(unix))]
    let sigterm: Option<std::future::Pending<()>> = None;

    first_signal(sigterm, signal::ctrl_c()).await
}

/// Race an optional SIGTERM source against Ctrl+C. A missing SIGTERM source leaves
/// Ctrl+C as the only way out.
pub async fn first_signal<T, C>(sigterm: Option<T>, ctrl_c: C) -> Option<ShutdownSignal>
where
    T: Future<Output = ()>,
    C: Future<Output = io::Result<()>>,
{
    let received = match sigterm {
        Some(sigterm) => tokio::select! {
            _ = sigterm => Ok(ShutdownSignal::Terminate),
            result = ctrl_c => result.map(|()| ShutdownSignal::Interrupt),
        },
        None => ctrl_c.await.map(|()| ShutdownSignal::Interrupt),
    };

    match received {
        Ok(signal) => {
            info!(event = "shutdown.signal", signal = ?signal, "Shutdown signal received.");
            Some(signal)
        }
        Err(e) => {
            error!(event = "shutdown.handler_failed", error = %e, "Failed to listen for Ctrl+C.");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::{pending, ready};

    #[tokio::test]
    async fn test_ctrl_c_alone_without_sigterm_handler() {
        let signal = first_signal(None::<std::future::Pending<()>>, ready(Ok(()))).await;
        assert_eq!(signal, Some(ShutdownSignal::Interrupt));
    }

    #[tokio::test]
    async fn test_sigterm_wins_when_installed() {
        let signal = first_signal(Some(ready(())), pending::<io::Result<()>>()).await;
        assert_eq!(signal, Some(ShutdownSignal::Terminate));
    }

    #[tokio::test]
    async fn test_ctrl_c_listener_failure() {
        let failed = ready(Err(io::Error::other("no tty")));
        assert_eq!(first_signal(None::<std::future::Pending<()>>, failed).await, None);
    }
}
