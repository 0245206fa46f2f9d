//! Bounded bulk sync over every top-level entity.

use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::model::ItemType;
use crate::source::ChannelSource;
use crate::util::catch_task_panic;

/// Concurrency used when the user has not configured `sync.threads`.
pub const DEFAULT_THREADS: usize = 5;

/// Outcome counts of one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Sync every target with at most `threads` syncs in flight.
///
/// Targets are admitted in order; completion order is unconstrained. Each
/// finished sync, successful or not, bumps the shared completed counter and
/// sends `(completed, total)` on `progress_tx`. A failing or panicking sync is
/// logged and counted, never propagated. A `threads` of 0 is treated as 1.
pub async fn refresh_all<S: ChannelSource>(
    source: Arc<S>,
    targets: Vec<(ItemType, String)>,
    threads: usize,
    progress_tx: mpsc::Sender<(usize, usize)>,
) -> RefreshReport {
    let total = targets.len();
    if total == 0 {
        let _ = progress_tx.send((0, 0)).await;
        return RefreshReport::default();
    }

    let completed = Arc::new(AtomicUsize::new(0));

    let outcomes: Vec<bool> = stream::iter(targets)
        .map(|(item_type, uuid)| {
            let source = Arc::clone(&source);
            let progress_tx = progress_tx.clone();
            let completed = Arc::clone(&completed);

            async move {
                let ok = match catch_task_panic(source.sync_channel(item_type, &uuid)).await {
                    Ok(Ok(inserted)) => {
                        tracing::debug!(uuid = %uuid, item_type = %item_type, inserted, "Sync finished");
                        true
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(uuid = %uuid, item_type = %item_type, error = %e, "Sync failed");
                        false
                    }
                    Err(panic_msg) => {
                        tracing::error!(uuid = %uuid, item_type = %item_type, error = %panic_msg, "Sync panicked");
                        false
                    }
                };

                let done = completed.fetch_add(1, Ordering::Relaxed).saturating_add(1);
                if let Err(e) = progress_tx.send((done, total)).await {
                    tracing::warn!(error = %e, done, total, "Progress channel send failed (receiver dropped)");
                }
                ok
            }
        })
        .buffer_unordered(threads.max(1))
        .collect()
        .await;

    let succeeded = outcomes.iter().filter(|ok| **ok).count();
    RefreshReport {
        total,
        succeeded,
        failed: total - succeeded,
    }
}
