//! Background pipeline consumer.
//!
//! The durable event log is the work queue: the webhook handler only
//! appends and acks, and this worker drains `unread` records on a poll
//! interval (or sooner, when nudged by the handler). A single consumer
//! bounds pipeline concurrency and survives process restarts — anything
//! logged but unprocessed is picked up on the next cycle.

use crate::context::SyncContext;
use crate::pipeline;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};
use tracing::{error, info};

pub fn spawn(ctx: Arc<SyncContext>) -> (Arc<Notify>, JoinHandle<()>) {
    let nudge = Arc::new(Notify::new());
    let notify = nudge.clone();
    let poll = poll_interval_from_env();

    let handle = tokio::spawn(async move {
        info!(
            target = "vendize.worker",
            poll_secs = poll.as_secs(),
            "pipeline worker started"
        );
        loop {
            tokio::select! {
                _ = notify.notified() => {}
                _ = sleep(poll) => {}
            }

            match pipeline::run_batch(&ctx).await {
                Ok(summary) => {
                    if summary.pushed + summary.skipped + summary.errored > 0 {
                        info!(
                            target = "vendize.worker",
                            pushed = summary.pushed,
                            skipped = summary.skipped,
                            errored = summary.errored,
                            "drained unread events"
                        );
                    }
                }
                Err(err) => {
                    error!(target = "vendize.worker", error = %err, "event scan failed");
                }
            }
        }
    });

    (nudge, handle)
}

fn poll_interval_from_env() -> Duration {
    let secs = std::env::var("WORKER_POLL_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(30);
    Duration::from_secs(secs)
}
