//! Heartbeat polling loop.
//!
//! Polls the live health endpoint on a fixed default interval and re-arms
//! itself whenever the server returns a new wait time. A single task owns the
//! cadence, so a new interval can never double-arm the loop: it takes effect
//! strictly after the poll that carried it.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::{Duration, sleep};

use crate::api::LiveApi;
use crate::domain::HeartbeatStatus;

use super::SessionEvent;

/// Polling interval used until the server dictates one
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

pub(crate) async fn run_heartbeat_loop(
    api: Arc<dyn LiveApi>,
    live_id: String,
    events: mpsc::UnboundedSender<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = DEFAULT_HEARTBEAT_INTERVAL;

    // the first poll fires immediately on session start
    loop {
        match api.fetch_heartbeat(&live_id).await {
            Ok(heartbeat) => {
                if heartbeat.status == HeartbeatStatus::Fail {
                    // surfaced to the consumer below; whether a gone live
                    // ends the session is the caller's policy
                    tracing::warn!(
                        "heartbeat reported failure for {}: {:?}",
                        live_id,
                        heartbeat.error_code
                    );
                }
                if let Some(wait) = heartbeat.wait_time.filter(|wait| *wait > 0) {
                    let requested = Duration::from_secs(wait);
                    if requested != interval {
                        tracing::debug!(
                            "heartbeat interval adjusted: {:?} -> {:?}",
                            interval,
                            requested
                        );
                        interval = requested;
                    }
                }
                if events.send(SessionEvent::Heartbeat(heartbeat)).is_err() {
                    break;
                }
            }
            Err(e) => {
                // transient failures do not stop the loop
                tracing::warn!("heartbeat poll failed for {}: {}", live_id, e);
            }
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }

    tracing::debug!("heartbeat loop stopped for {}", live_id);
}

/// Resolves once shutdown is requested or the session side is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
