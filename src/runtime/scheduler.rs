//! Best-effort background work and the alarm loop that drives compaction
//! retries (§4.7, §5 "Back-pressure").

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::columnar::ColumnarExporter;

/// Schedules best-effort background work bounded by the cell's lifetime.
/// Mirrors the teacher's pattern of spawning a detached task and logging
/// failures rather than propagating them to the caller.
pub fn wait_until<F>(task: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = Result<(), crate::errors::CellError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "background task failed");
        }
    })
}

/// Drives the alarm loop: sleeps, attempts compaction, then re-arms itself
/// for either the normal cadence or an exponentially backed-off delay if
/// the attempt just failed (§4.3, §5 "Back-pressure").
pub async fn run_alarm_loop(exporter: Arc<ColumnarExporter>, interval: Duration) {
    let mut wait = interval;
    loop {
        tokio::time::sleep(wait).await;
        if let Err(e) = exporter.run_compaction_if_needed().await {
            tracing::warn!(error = %e, "alarm tick failed");
        }
        wait = exporter.next_alarm_delay(interval).await.unwrap_or(interval);
    }
}
