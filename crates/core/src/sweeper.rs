//! Periodic eviction of idle buckets

use crate::engine::AuthEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Background task that sweeps the engine's bucket storages
pub struct Sweeper;

impl Sweeper {
    /// Start sweeping every `interval` until `shutdown` is cancelled
    ///
    /// The first sweep runs one full interval after start. A failed sweep
    /// is logged and the loop carries on.
    pub fn spawn(
        engine: Arc<AuthEngine>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tick.tick().await; // Skip immediate first tick
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        match engine.sweep_idle().await {
                            Ok(report) if report.total() > 0 => {
                                tracing::debug!(
                                    login = report.login,
                                    password = report.password,
                                    ip = report.ip,
                                    "Evicted idle buckets"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::warn!("Bucket sweep failed: {}", e),
                        }
                        match engine.list_counts().await {
                            Ok(lists) => tracing::trace!(
                                blacklist = lists.black,
                                whitelist = lists.white,
                                "List sizes"
                            ),
                            Err(e) => tracing::warn!("Failed to count list entries: {}", e),
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Bucket sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}
