//! Ctrl+C / SIGTERM handling
//!
//! The acquisition loop is synchronous, so signals are awaited on a small
//! current-thread runtime in a helper thread that raises the pipeline's
//! shutdown flag. The loop then stops after its current read and flushes
//! the sinks before the serial port is closed.

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Raise `flag` on Ctrl+C (or SIGTERM on Unix)
pub fn install(flag: Arc<AtomicBool>) -> Result<JoinHandle<()>> {
    watch(flag, wait_for_shutdown())
}

/// Raise `flag` once `signal` completes
fn watch<F>(flag: Arc<AtomicBool>, signal: F) -> Result<JoinHandle<()>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    thread::Builder::new()
        .name("shutdown-signal".to_string())
        .spawn(move || {
            runtime.block_on(signal);
            log::info!("Shutdown requested, stopping after the current read");
            flag.store(true, Ordering::Relaxed);
        })
        .context("Failed to start shutdown signal thread")
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                log::warn!("Failed to install SIGTERM handler: {}. Only Ctrl+C will stop acquisition", e);
                None
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    log::warn!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
            }
            _ = async {
                match term_signal {
                    Some(mut sig) => {
                        sig.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            } => {}
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
