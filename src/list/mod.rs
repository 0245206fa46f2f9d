//! The channel sidebar list and everything that mutates it.
//!
//! [`ChannelList`] owns a [`ChannelStore`] and a [`ChannelSource`]. It is
//! driven from one task: bus messages and refresh events arrive in
//! [`ChannelList::run`], user gestures call the methods directly. Viewers
//! watch [`ListView`] snapshots through [`ChannelList::subscribe_view`].
//!
//! - [`store`] - list state, unread merging, refresh progress
//! - [`counts`] - count-delta application
//! - [`reorder`] - drag moves and sort reindexing

mod counts;
mod reorder;
mod store;

pub use reorder::ReorderError;
pub use store::{ChannelStore, CountTraversal, ListView};

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

use crate::bus::{ReloadRequested, Subscription, SubscriptionError};
use crate::model::{ChannelEntity, CountDelta, ItemType};
use crate::refresh::{refresh_all, RefreshReport, DEFAULT_THREADS};
use crate::source::{ChannelSource, SourceError};
use crate::util::catch_task_panic;

/// Pause between the last sync finishing and the reload.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Messages from background refresh work back to the list owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEvent {
    /// (completed, total)
    RefreshProgress(usize, usize),
    /// All syncs settled and the settle delay elapsed
    RefreshComplete(RefreshReport),
    TaskPanicked { task: &'static str, error: String },
}

/// Result of a drag gesture ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropOutcome {
    /// Dragged and drop-target ids differ; nothing was saved
    Ignored,
    Persisted,
    /// Saving failed. The local order stays and the next reload reconciles.
    PersistFailed(String),
}

pub struct ChannelList<S: ChannelSource> {
    source: Arc<S>,
    store: ChannelStore,
    settle_delay: Duration,
    view_tx: watch::Sender<ListView>,
    events_tx: mpsc::Sender<ListEvent>,
    events_rx: mpsc::Receiver<ListEvent>,
}

impl<S: ChannelSource> ChannelList<S> {
    pub fn new(source: Arc<S>, traversal: CountTraversal, settle_delay: Duration) -> Self {
        let store = ChannelStore::new(traversal);
        let (view_tx, _) = watch::channel(store.view());
        let (events_tx, events_rx) = mpsc::channel(64);
        Self {
            source,
            store,
            settle_delay,
            view_tx,
            events_tx,
            events_rx,
        }
    }

    pub fn store(&self) -> &ChannelStore {
        &self.store
    }

    pub fn entities(&self) -> &[ChannelEntity] {
        self.store.entities()
    }

    pub fn is_refreshing(&self) -> bool {
        self.store.refreshing
    }

    /// Receive a fresh [`ListView`] after every change.
    pub fn subscribe_view(&self) -> watch::Receiver<ListView> {
        self.view_tx.subscribe()
    }

    fn notify(&self) {
        self.view_tx.send_replace(self.store.view());
    }

    // ========================================================================
    // Store Operations
    // ========================================================================

    /// Replace the list with the source's tree and unread totals.
    ///
    /// Both are fetched concurrently. If either fails the list is left as it
    /// was and the error is returned.
    pub async fn reload(&mut self) -> Result<(), SourceError> {
        let (entities, totals) = tokio::try_join!(
            self.source.fetch_all_channels(),
            self.source.fetch_unread_totals()
        )?;

        tracing::debug!(entities = entities.len(), "List reloaded");
        self.store.replace(entities, &totals);
        self.notify();
        Ok(())
    }

    /// Apply a count delta and notify viewers, matched or not.
    pub fn apply_count_delta(&mut self, delta: &CountDelta) -> bool {
        let matched = self
            .store
            .apply_count_delta(&delta.uuid, delta.action, delta.amount);
        self.notify();
        matched
    }

    /// Move a top-level entity locally. Nothing is persisted until
    /// [`ChannelList::drop_completed`].
    pub fn move_entity(
        &mut self,
        uuid: &str,
        target_index: usize,
        into_folder: bool,
    ) -> Result<(), ReorderError> {
        self.store.move_entity(uuid, target_index, into_folder)?;
        self.notify();
        Ok(())
    }

    /// Finish a drag: save the current order when the drop landed on the
    /// dragged entity itself.
    pub async fn drop_completed(&self, dragged_uuid: &str, target_uuid: &str) -> DropOutcome {
        if dragged_uuid != target_uuid {
            return DropOutcome::Ignored;
        }

        let entries = self.store.sort_entries();
        match self.source.persist_order(&entries).await {
            Ok(()) => DropOutcome::Persisted,
            Err(e) => {
                tracing::warn!(
                    uuid = %dragged_uuid,
                    error = %e,
                    "Failed to persist channel order; keeping local order until next reload"
                );
                DropOutcome::PersistFailed(e.to_string())
            }
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Start a background sync of every top-level entity.
    ///
    /// Returns `false` without doing anything when a refresh is already
    /// running. Progress and completion arrive as [`ListEvent`]s handled by
    /// [`ChannelList::run`] or [`ChannelList::refresh_and_wait`].
    pub fn start_refresh(&mut self) -> bool {
        if self.store.refreshing {
            tracing::debug!("Refresh already in progress");
            return false;
        }

        let targets: Vec<(ItemType, String)> = self
            .store
            .entities()
            .iter()
            .map(|entity| (entity.item_type(), entity.uuid().to_string()))
            .collect();

        self.store.begin_refresh(targets.len());
        self.notify();

        let source = Arc::clone(&self.source);
        let settle_delay = self.settle_delay;
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let tx_panic = tx.clone();
            if let Err(panic_msg) =
                catch_task_panic(run_refresh(source, targets, settle_delay, tx)).await
            {
                tracing::error!(error = %panic_msg, "Refresh task panicked");
                let _ = tx_panic
                    .send(ListEvent::TaskPanicked {
                        task: "refresh",
                        error: panic_msg,
                    })
                    .await;
            }
        });

        true
    }

    /// Apply one background event to the list.
    ///
    /// Completion (or a panicked refresh) clears the refreshing state, resets
    /// progress and reloads. Returns the report when a cycle completed.
    pub async fn handle_event(
        &mut self,
        event: ListEvent,
    ) -> Result<Option<RefreshReport>, SourceError> {
        match event {
            ListEvent::RefreshProgress(done, total) => {
                self.store.set_progress(done, total);
                self.notify();
                Ok(None)
            }
            ListEvent::RefreshComplete(report) => {
                self.store.finish_refresh();
                self.notify();
                self.reload().await?;
                Ok(Some(report))
            }
            ListEvent::TaskPanicked { task, error } => {
                tracing::warn!(task, error = %error, "Background task failed; reconciling list");
                self.store.finish_refresh();
                self.notify();
                self.reload().await?;
                Ok(None)
            }
        }
    }

    /// Run one full refresh cycle to completion, reload included.
    ///
    /// Returns `None` when a refresh was already running or the refresh task
    /// panicked.
    pub async fn refresh_and_wait(&mut self) -> Result<Option<RefreshReport>, SourceError> {
        if !self.start_refresh() {
            return Ok(None);
        }

        while let Some(event) = self.events_rx.recv().await {
            let finished = matches!(
                event,
                ListEvent::RefreshComplete(_) | ListEvent::TaskPanicked { .. }
            );
            let report = self.handle_event(event).await?;
            if finished {
                return Ok(report);
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Run Loop
    // ========================================================================

    /// Serve bus topics and background events.
    ///
    /// Subscriptions are held for the whole loop, so every delta acts on the
    /// current list. A lagged count subscription lost deltas, so the list is
    /// reloaded instead. Reload failures are logged and the stale list kept.
    /// Returns once every bus publisher is gone and no refresh is running.
    pub async fn run(
        &mut self,
        mut reloads: Subscription<ReloadRequested>,
        mut counts: Subscription<CountDelta>,
    ) {
        let mut reloads_open = true;
        let mut counts_open = true;

        while reloads_open || counts_open || self.store.refreshing {
            tokio::select! {
                biased;

                Some(event) = self.events_rx.recv() => {
                    if let Err(e) = self.handle_event(event).await {
                        tracing::warn!(error = %e, "Reload after refresh failed");
                    }
                }

                result = reloads.recv(), if reloads_open => match result {
                    Ok(ReloadRequested) | Err(SubscriptionError::Lagged(_)) => {
                        if let Err(e) = self.reload().await {
                            tracing::warn!(error = %e, "Requested reload failed");
                        }
                    }
                    Err(SubscriptionError::Closed) => reloads_open = false,
                },

                result = counts.recv(), if counts_open => match result {
                    Ok(delta) => {
                        self.apply_count_delta(&delta);
                    }
                    Err(SubscriptionError::Lagged(missed)) => {
                        tracing::warn!(missed, "Count deltas dropped; reloading list");
                        if let Err(e) = self.reload().await {
                            tracing::warn!(error = %e, "Reconciling reload failed");
                        }
                    }
                    Err(SubscriptionError::Closed) => counts_open = false,
                },
            }
        }
    }
}

async fn run_refresh<S: ChannelSource>(
    source: Arc<S>,
    targets: Vec<(ItemType, String)>,
    settle_delay: Duration,
    tx: mpsc::Sender<ListEvent>,
) {
    let threads = match source.fetch_user_config().await {
        Ok(config) => config.threads.unwrap_or(DEFAULT_THREADS),
        Err(e) => {
            tracing::warn!(error = %e, default = DEFAULT_THREADS, "Failed to read user config");
            DEFAULT_THREADS
        }
    };

    let (progress_tx, mut progress_rx) = mpsc::channel::<(usize, usize)>(32);
    let forward = async {
        while let Some((done, total)) = progress_rx.recv().await {
            if let Err(e) = tx.send(ListEvent::RefreshProgress(done, total)).await {
                tracing::warn!(error = %e, event = "RefreshProgress", "Channel send failed (receiver dropped)");
            }
        }
    };

    // refresh_all owns the only progress sender, so forward ends with it
    let (report, ()) = tokio::join!(refresh_all(source, targets, threads, progress_tx), forward);

    tracing::info!(
        total = report.total,
        succeeded = report.succeeded,
        failed = report.failed,
        threads,
        "Refresh cycle finished"
    );

    tokio::time::sleep(settle_delay).await;

    if let Err(e) = tx.send(ListEvent::RefreshComplete(report)).await {
        tracing::warn!(error = %e, event = "RefreshComplete", "Channel send failed (receiver dropped)");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::ChannelStore;
    use crate::model::{Channel, ChannelEntity, Folder};

    pub(crate) fn plain_channel(uuid: &str, unread: i64) -> Channel {
        Channel {
            uuid: uuid.to_string(),
            title: uuid.to_uppercase(),
            feed_url: format!("https://{uuid}.example/rss"),
            link: None,
            unread,
            sort: 0,
        }
    }

    pub(crate) fn channel(uuid: &str, unread: i64) -> ChannelEntity {
        ChannelEntity::Channel(plain_channel(uuid, unread))
    }

    pub(crate) fn folder(uuid: &str, unread: i64, children: Vec<(&str, i64)>) -> ChannelEntity {
        ChannelEntity::Folder(Folder {
            uuid: uuid.to_string(),
            title: uuid.to_uppercase(),
            unread,
            sort: 0,
            children: children
                .into_iter()
                .map(|(uuid, unread)| plain_channel(uuid, unread))
                .collect(),
        })
    }

    /// Unread count of a top-level entity or folder child.
    pub(crate) fn unread_of(store: &ChannelStore, uuid: &str) -> i64 {
        for entity in store.entities() {
            if entity.uuid() == uuid {
                return entity.unread();
            }
            if let ChannelEntity::Folder(f) = entity {
                if let Some(child) = f.children.iter().find(|c| c.uuid == uuid) {
                    return child.unread;
                }
            }
        }
        panic!("no entity {uuid}");
    }
}
