//! Background poll loop for the detection feed.
//!
//! The detection cadence is independent of the simulation stepping
//! cadence, so the poll loop runs on its own blocking thread and
//! communicates with the rest of the system only through the
//! [`DetectionFeed`]'s last-known-value store. Fetch failures are logged
//! and the previous feed contents are kept -- the control loop degrades
//! to stale (then simulation-only) data instead of erroring.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::feed::DetectionFeed;
use crate::source::DetectionSource;

/// Handle to a running detection poll loop.
///
/// Dropping the handle does not stop the loop; call
/// [`shutdown`](Self::shutdown) for a clean stop.
#[derive(Debug)]
pub struct DetectionTask {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl DetectionTask {
    /// Request the poll loop to stop and wait for it to finish.
    ///
    /// The loop notices the request at its next wakeup, so this waits at
    /// most one poll interval.
    pub async fn shutdown(self) {
        self.stop.store(true, Ordering::Release);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "detection poll loop did not shut down cleanly");
        }
    }
}

/// Spawn the detection poll loop on a blocking thread.
///
/// Every `poll_interval` the loop fetches one detection cycle from the
/// source and ingests it into the feed. The source runs on a dedicated
/// blocking thread so a slow detector can never stall the tick loop.
pub fn spawn_detection_loop(
    mut source: Box<dyn DetectionSource>,
    feed: DetectionFeed,
    poll_interval: Duration,
) -> DetectionTask {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);

    let handle = tokio::task::spawn_blocking(move || {
        let poll_interval_ms = u64::try_from(poll_interval.as_millis()).unwrap_or(u64::MAX);
        info!(poll_interval_ms, "detection poll loop started");

        while !stop_flag.load(Ordering::Acquire) {
            match source.fetch() {
                Ok(objects) => {
                    debug!(object_classes = objects.len(), "detection cycle ingested");
                    feed.ingest(objects);
                }
                Err(e) => {
                    // Keep the previous feed contents; staleness handling
                    // downstream covers the gap.
                    warn!(error = %e, "detection fetch failed, keeping last known value");
                }
            }

            std::thread::sleep(poll_interval);
        }

        info!("detection poll loop stopped");
    });

    DetectionTask { stop, handle }
}
