//! Periodic retention sweeping on a dedicated thread.

use crate::UploadService;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs [`UploadService::sweep`] every `interval` until stopped or dropped.
///
/// Without it, expired uploads are only swept when the next upload arrives.
pub struct BackgroundSweeper {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundSweeper {
    /// Start the sweeper thread.
    pub fn spawn(service: Arc<UploadService>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("qrshare-sweeper".into())
            .spawn(move || {
                tracing::debug!(interval_secs = interval.as_secs(), "Background sweeper started");
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => match service.sweep() {
                            Ok(report) => tracing::debug!(
                                records_removed = report.records_removed,
                                orphans_removed = report.orphans_removed,
                                "Background sweep finished"
                            ),
                            Err(e) => tracing::warn!(error = %e, "Background sweep failed"),
                        },
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::debug!("Background sweeper stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop the thread and wait for an in-progress sweep to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Background sweeper thread panicked");
            }
        }
    }
}

impl Drop for BackgroundSweeper {
    fn drop(&mut self) {
        self.shutdown();
    }
}
