//! Background live-status polling.
//!
//! The poller is a tokio task that, once per interval, takes the shared
//! client's mutex, reads live status on a blocking thread and publishes the
//! result on an mpsc channel. Other callers keep issuing commands through
//! the same mutex, so the link never sees two writers.

use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::SharedClient;
use crate::protocol::status::LiveStatus;
use crate::transport::Link;

/// Queued updates before the poller waits for the consumer.
const UPDATE_BUFFER: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusUpdate {
    Reading {
        at: NaiveDateTime,
        status: LiveStatus,
    },
    Failed {
        at: NaiveDateTime,
        error: String,
        /// False for timeouts and a closed link.
        reachable: bool,
    },
}

pub struct StatusPoller {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl StatusPoller {
    /// Start polling `client` every `interval`.
    pub fn spawn<L: Link + 'static>(
        client: SharedClient<L>,
        interval: Duration,
    ) -> (Self, mpsc::Receiver<StatusUpdate>) {
        let (tx, rx) = mpsc::channel(UPDATE_BUFFER);
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }

                let shared = client.clone();
                let result = tokio::task::spawn_blocking(move || {
                    let mut guard = shared.blocking_lock();
                    guard.read_status()
                })
                .await;

                let at = Local::now().naive_local();
                let update = match result {
                    Ok(Ok(status)) => StatusUpdate::Reading { at, status },
                    Ok(Err(e)) => {
                        warn!(error = %e, "status poll failed");
                        StatusUpdate::Failed {
                            at,
                            reachable: e.is_device_reachable(),
                            error: e.to_string(),
                        }
                    }
                    Err(e) => StatusUpdate::Failed {
                        at,
                        error: format!("poll task failed: {}", e),
                        reachable: false,
                    },
                };
                if tx.send(update).await.is_err() {
                    debug!("status consumer gone, stopping poller");
                    break;
                }
            }
        });

        (Self { stop, handle }, rx)
    }

    /// Stop after the poll in progress, if any, and wait for the task.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}
