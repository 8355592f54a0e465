//! Periodic execution until a stop token fires

use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Runs `pass` immediately and then every `period` until `stop` is cancelled.
///
/// Errors are logged under `loop_name`; the next tick runs regardless.
pub async fn until<F, Fut, E>(loop_name: &'static str, period: Duration, stop: CancellationToken, mut pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = pass().await {
                    tracing::error!(controller = loop_name, error = %e, "Sync failed");
                }
            }
        }
    }

    tracing::debug!(controller = loop_name, "Loop stopped");
}
