//! The data boundary of the channel list.
//!
//! [`ChannelSource`] is everything the list needs from the outside world:
//! loading the tree and its unread totals, syncing one entity, and saving a
//! new order. [`LocalSource`] implements it on top of the SQLite store and
//! the HTTP feed syncer.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::feed::{sync_target, FetchError, FetchOptions};
use crate::model::{ChannelEntity, ItemType, SortEntry, UserConfig};
use crate::storage::{Database, DatabaseError};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A folder sync where some children failed
    #[error("{failed} of {total} channels in folder {uuid} failed to sync")]
    Partial {
        uuid: String,
        failed: usize,
        total: usize,
    },

    /// Anything a non-local source wants to report
    #[error("{0}")]
    Other(String),
}

/// Data operations the channel list depends on.
#[async_trait]
pub trait ChannelSource: Send + Sync + 'static {
    /// The full sidebar tree, top level in display order.
    async fn fetch_all_channels(&self) -> Result<Vec<ChannelEntity>, SourceError>;

    /// Unread counts keyed by channel or folder uuid.
    async fn fetch_unread_totals(&self) -> Result<HashMap<String, i64>, SourceError>;

    async fn fetch_user_config(&self) -> Result<UserConfig, SourceError>;

    /// Sync one entity, returning how many new articles arrived.
    async fn sync_channel(&self, item_type: ItemType, uuid: &str) -> Result<usize, SourceError>;

    /// Save a top-level ordering.
    async fn persist_order(&self, entries: &[SortEntry]) -> Result<(), SourceError>;
}

/// [`ChannelSource`] backed by the local database and direct HTTP fetches.
#[derive(Clone)]
pub struct LocalSource {
    db: Database,
    client: reqwest::Client,
    options: FetchOptions,
}

impl LocalSource {
    pub fn new(db: Database, client: reqwest::Client, options: FetchOptions) -> Self {
        Self {
            db,
            client,
            options,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl ChannelSource for LocalSource {
    async fn fetch_all_channels(&self) -> Result<Vec<ChannelEntity>, SourceError> {
        Ok(self.db.get_channels().await?)
    }

    async fn fetch_unread_totals(&self) -> Result<HashMap<String, i64>, SourceError> {
        Ok(self.db.get_unread_totals().await?)
    }

    async fn fetch_user_config(&self) -> Result<UserConfig, SourceError> {
        Ok(self.db.get_user_config().await?)
    }

    async fn sync_channel(&self, item_type: ItemType, uuid: &str) -> Result<usize, SourceError> {
        let targets = self.db.get_sync_targets(item_type, uuid).await?;

        if item_type == ItemType::Channel {
            // get_sync_targets returns exactly one target for a channel
            let mut inserted = 0;
            for target in &targets {
                inserted += sync_target(&self.db, &self.client, target, self.options).await?;
            }
            return Ok(inserted);
        }

        // Folder children run one after another inside the folder's slot
        let total = targets.len();
        let mut inserted = 0;
        let mut failed = 0;
        for target in &targets {
            match sync_target(&self.db, &self.client, target, self.options).await {
                Ok(n) => inserted += n,
                Err(e) => {
                    tracing::debug!(
                        folder = %uuid,
                        uuid = %target.uuid,
                        error = %e,
                        "Folder child sync failed"
                    );
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            return Err(SourceError::Partial {
                uuid: uuid.to_string(),
                failed,
                total,
            });
        }
        Ok(inserted)
    }

    async fn persist_order(&self, entries: &[SortEntry]) -> Result<(), SourceError> {
        Ok(self.db.update_sort(entries).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><guid>a</guid><title>One</title></item>
    <item><guid>b</guid><title>Two</title></item>
</channel></rss>"#;

    async fn source() -> LocalSource {
        let db = Database::open(":memory:").await.unwrap();
        let options = FetchOptions {
            timeout: Duration::from_secs(5),
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
        };
        LocalSource::new(db, reqwest::Client::new(), options)
    }

    #[tokio::test]
    async fn test_folder_sync_runs_every_child() {
        let server = MockServer::start().await;
        Mock::given(path("/ok"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .mount(&server)
            .await;
        Mock::given(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let source = source().await;
        let folder = source.db().insert_folder("F").await.unwrap();
        let ok = source
            .db()
            .insert_channel(&format!("{}/ok", server.uri()), "Ok", None, Some(&folder))
            .await
            .unwrap();
        source
            .db()
            .insert_channel(&format!("{}/gone", server.uri()), "Gone", None, Some(&folder))
            .await
            .unwrap();

        let err = source
            .sync_channel(ItemType::Folder, &folder)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SourceError::Partial {
                failed: 1,
                total: 2,
                ..
            }
        ));

        // The healthy child was still stored
        let totals = source.fetch_unread_totals().await.unwrap();
        assert_eq!(totals[&ok], 2);
        assert_eq!(totals[&folder], 2);
    }

    #[tokio::test]
    async fn test_sync_unknown_uuid_is_not_found() {
        let source = source().await;
        let err = source
            .sync_channel(ItemType::Channel, "missing")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SourceError::Database(DatabaseError::NotFound { kind: "channel", .. })
        ));
    }
}
