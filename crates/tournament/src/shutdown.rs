//! Signal handling
//!
//! The first SIGTERM / SIGINT asks the worker to stop after the match it is
//! running. A second one means the operator is done waiting.

use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Flip `shutdown_tx` on the first signal; return on the second.
///
/// The caller should abandon the in-flight match once this returns.
pub async fn signal_listener(shutdown_tx: watch::Sender<bool>) {
    let (tx, rx) = mpsc::unbounded_channel();
    forward_signals(tx);
    escalate(rx, shutdown_tx).await;
}

/// Turn a stream of signal names into a shutdown request, then an abort.
///
/// Never returns if the stream ends before a second signal.
pub async fn escalate(
    mut signals: mpsc::UnboundedReceiver<&'static str>,
    shutdown_tx: watch::Sender<bool>,
) {
    let Some(first) = signals.recv().await else {
        warn!("no signal handlers; stop the worker with --max-matches or a kill");
        return std::future::pending().await;
    };
    info!(signal = first, "finishing current match, signal again to abort it");
    let _ = shutdown_tx.send(true);

    match signals.recv().await {
        Some(second) => warn!(signal = second, "second signal, aborting"),
        None => std::future::pending().await,
    }
}

#[cfg(unix)]
fn forward_signals(tx: mpsc::UnboundedSender<&'static str>) {
    use tokio::signal::unix::{signal, SignalKind};

    for (kind, name) in [
        (SignalKind::terminate(), "SIGTERM"),
        (SignalKind::interrupt(), "SIGINT"),
    ] {
        let mut stream = match signal(kind) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(signal = name, error = %err, "failed to register signal handler");
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            while stream.recv().await.is_some() {
                if tx.send(name).is_err() {
                    break;
                }
            }
        });
    }
}

#[cfg(not(unix))]
fn forward_signals(tx: mpsc::UnboundedSender<&'static str>) {
    tokio::spawn(async move {
        loop {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "cannot listen for ctrl-c");
                break;
            }
            if tx.send("ctrl-c").is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
#[path = "shutdown_tests.rs"]
mod shutdown_tests;
