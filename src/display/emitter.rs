//! Emission loop
//!
//! Waits for the display to become Active, then renders one batch per
//! reading period. The period sleep races against the display turning
//! Idle, so a stop arriving mid-period prevents the next batch instead of
//! waiting for the period to run out. A batch already being rendered is
//! never interrupted.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::controller::DisplayWatch;
use crate::sensor::{self, BatchSink, ReadingRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitterSettings {
    pub range: ReadingRange,
    pub period: Duration,
}

/// Handle for the background emission task
#[derive(Debug)]
pub struct EmitterHandle {
    task_handle: JoinHandle<()>,
    cancel: CancellationToken,
}

impl EmitterHandle {
    pub fn spawn(watch: DisplayWatch, settings: EmitterSettings, sink: Arc<dyn BatchSink>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task_handle = tokio::spawn(async move {
            info!(
                "Emission loop ready: range {}, period {:?}",
                settings.range, settings.period
            );
            run_emission_loop(watch, settings, sink, token).await;
            debug!("Emission loop finished");
        });

        Self { task_handle, cancel }
    }

    /// Cancels the loop and waits for the task to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task_handle.await {
            error!("Emission task panicked: {}", e);
        }
    }
}

async fn run_emission_loop(
    mut watch: DisplayWatch,
    settings: EmitterSettings,
    sink: Arc<dyn BatchSink>,
    cancel: CancellationToken,
) {
    loop {
        let active = tokio::select! {
            _ = cancel.cancelled() => return,
            active = watch.wait_while_idle() => active,
        };
        if !active {
            debug!("Display controller dropped, leaving emission loop");
            return;
        }

        let batch = sensor::generate(settings.range);
        sink.emit(&batch);

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(settings.period) => {}
            still_open = watch.wait_until_idle() => {
                if !still_open {
                    return;
                }
                debug!("Display suspended during reading period");
            }
        }
    }
}
