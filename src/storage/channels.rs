use sqlx::QueryBuilder;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{ChannelRow, DatabaseError, FolderRow, SyncTarget};
use crate::model::{Channel, ChannelEntity, Folder, ItemType, SortEntry};
use crate::util::sanitize_title;

// 3 binds per entry keeps a chunk of 300 under SQLite's 999 limit
const SORT_CHUNK_SIZE: usize = 300;

impl Database {
    // ========================================================================
    // Channel List
    // ========================================================================

    /// Load the sidebar tree: top-level channels and folders ordered by `sort`,
    /// each folder carrying its children in their own `sort` order.
    ///
    /// Unread counters are left at zero; they come from
    /// [`Database::get_unread_totals`] and are merged by the list store.
    pub async fn get_channels(&self) -> Result<Vec<ChannelEntity>, DatabaseError> {
        let folders: Vec<FolderRow> =
            sqlx::query_as("SELECT uuid, title, sort FROM folders ORDER BY sort, title")
                .fetch_all(&self.pool)
                .await?;

        let channels: Vec<ChannelRow> = sqlx::query_as(
            "SELECT uuid, title, feed_url, link, folder_uuid, sort FROM channels ORDER BY sort, title",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut children: HashMap<String, Vec<Channel>> = HashMap::with_capacity(folders.len());
        let mut entities: Vec<ChannelEntity> = Vec::with_capacity(channels.len() + folders.len());

        for row in channels {
            let channel = Channel {
                uuid: row.uuid,
                title: row.title,
                feed_url: row.feed_url,
                link: row.link,
                unread: 0,
                sort: row.sort,
            };
            match row.folder_uuid {
                Some(folder) => children.entry(folder).or_default().push(channel),
                None => entities.push(ChannelEntity::Channel(channel)),
            }
        }

        for row in folders {
            let children = children.remove(&row.uuid).unwrap_or_default();
            entities.push(ChannelEntity::Folder(Folder {
                uuid: row.uuid,
                title: row.title,
                unread: 0,
                sort: row.sort,
                children,
            }));
        }

        // Stable: equal sort keys keep channels-before-folders, title order
        entities.sort_by_key(ChannelEntity::sort);
        Ok(entities)
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Subscribe to a feed, returning its uuid.
    ///
    /// Re-subscribing to a known `feed_url` updates title and link and keeps
    /// the existing uuid. New channels are appended after their siblings.
    pub async fn insert_channel(
        &self,
        feed_url: &str,
        title: &str,
        link: Option<&str>,
        folder_uuid: Option<&str>,
    ) -> Result<String, DatabaseError> {
        let title = sanitize_title(title)
            .ok_or_else(|| DatabaseError::InvalidInput("channel title is empty".into()))?;

        if let Some(folder) = folder_uuid {
            self.require_folder(folder).await?;
        }

        let sort = self.next_sort(folder_uuid).await?;
        let now = chrono::Utc::now().timestamp();

        let row: (String,) = sqlx::query_as(
            r#"
            INSERT INTO channels (uuid, title, feed_url, link, folder_uuid, sort, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(feed_url) DO UPDATE SET title = excluded.title, link = excluded.link
            RETURNING uuid
        "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&title)
        .bind(feed_url)
        .bind(link)
        .bind(folder_uuid)
        .bind(sort)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Create a folder at the end of the top level, returning its uuid.
    pub async fn insert_folder(&self, title: &str) -> Result<String, DatabaseError> {
        let title = sanitize_title(title)
            .ok_or_else(|| DatabaseError::InvalidInput("folder title is empty".into()))?;
        let uuid = uuid::Uuid::new_v4().to_string();
        let sort = self.next_sort(None).await?;

        sqlx::query("INSERT INTO folders (uuid, title, sort, created_at) VALUES (?, ?, ?, ?)")
            .bind(&uuid)
            .bind(&title)
            .bind(sort)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;

        Ok(uuid)
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Put a channel into a folder (appended after its children), or back at
    /// the end of the top level when `folder_uuid` is `None`.
    pub async fn move_channel_to_folder(
        &self,
        channel_uuid: &str,
        folder_uuid: Option<&str>,
    ) -> Result<(), DatabaseError> {
        if let Some(folder) = folder_uuid {
            self.require_folder(folder).await?;
        }
        let sort = self.next_sort(folder_uuid).await?;

        let result = sqlx::query("UPDATE channels SET folder_uuid = ?, sort = ? WHERE uuid = ?")
            .bind(folder_uuid)
            .bind(sort)
            .bind(channel_uuid)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound {
                kind: "channel",
                uuid: channel_uuid.to_string(),
            });
        }
        Ok(())
    }

    /// Persist a top-level ordering in one transaction.
    ///
    /// Entries whose uuid no longer exists are skipped; the order of the rest
    /// still applies.
    pub async fn update_sort(&self, entries: &[SortEntry]) -> Result<(), DatabaseError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for item_type in [ItemType::Channel, ItemType::Folder] {
            let batch: Vec<&SortEntry> =
                entries.iter().filter(|e| e.item_type == item_type).collect();
            if batch.is_empty() {
                continue;
            }

            // UPDATE <table> SET sort = CASE uuid WHEN ? THEN ? ... END WHERE uuid IN (...)
            let table = match item_type {
                ItemType::Channel => "channels",
                ItemType::Folder => "folders",
            };
            for chunk in batch.chunks(SORT_CHUNK_SIZE) {
                let mut builder: QueryBuilder<sqlx::Sqlite> =
                    QueryBuilder::new(format!("UPDATE {table} SET sort = CASE uuid "));
                for entry in chunk {
                    builder.push("WHEN ");
                    builder.push_bind(&entry.uuid);
                    builder.push(" THEN ");
                    builder.push_bind(entry.sort);
                    builder.push(" ");
                }
                builder.push("ELSE sort END WHERE uuid IN (");
                let mut separated = builder.separated(", ");
                for entry in chunk {
                    separated.push_bind(&entry.uuid);
                }
                separated.push_unseparated(")");

                builder.build().execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;

        tracing::debug!(entries = entries.len(), "Persisted channel order");
        Ok(())
    }

    // ========================================================================
    // Sync Support
    // ========================================================================

    /// Resolve what a sync of `(item_type, uuid)` must fetch: the channel
    /// itself, or every child of the folder in order.
    pub async fn get_sync_targets(
        &self,
        item_type: ItemType,
        uuid: &str,
    ) -> Result<Vec<SyncTarget>, DatabaseError> {
        match item_type {
            ItemType::Channel => {
                let row: Option<(String, String, String)> =
                    sqlx::query_as("SELECT uuid, title, feed_url FROM channels WHERE uuid = ?")
                        .bind(uuid)
                        .fetch_optional(&self.pool)
                        .await?;
                let (uuid, title, feed_url) = row.ok_or_else(|| DatabaseError::NotFound {
                    kind: "channel",
                    uuid: uuid.to_string(),
                })?;
                Ok(vec![SyncTarget {
                    uuid,
                    title,
                    feed_url,
                }])
            }
            ItemType::Folder => {
                self.require_folder(uuid).await?;
                let rows: Vec<(String, String, String)> = sqlx::query_as(
                    "SELECT uuid, title, feed_url FROM channels WHERE folder_uuid = ? ORDER BY sort, title",
                )
                .bind(uuid)
                .fetch_all(&self.pool)
                .await?;
                Ok(rows
                    .into_iter()
                    .map(|(uuid, title, feed_url)| SyncTarget {
                        uuid,
                        title,
                        feed_url,
                    })
                    .collect())
            }
        }
    }

    /// Record (or clear) the last sync error for a channel.
    pub async fn set_channel_error(
        &self,
        channel_uuid: &str,
        error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE channels SET error = ? WHERE uuid = ?")
            .bind(error)
            .bind(channel_uuid)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn require_folder(&self, uuid: &str) -> Result<(), DatabaseError> {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM folders WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        exists.map(|_| ()).ok_or_else(|| DatabaseError::NotFound {
            kind: "folder",
            uuid: uuid.to_string(),
        })
    }

    /// Next free sort slot among the siblings of `folder_uuid` (top level when `None`).
    async fn next_sort(&self, folder_uuid: Option<&str>) -> Result<i64, DatabaseError> {
        let row: (i64,) = match folder_uuid {
            Some(folder) => {
                sqlx::query_as(
                    "SELECT COALESCE(MAX(sort), -1) + 1 FROM channels WHERE folder_uuid = ?",
                )
                .bind(folder)
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT COALESCE(MAX(sort), -1) + 1 FROM (
                        SELECT sort FROM channels WHERE folder_uuid IS NULL
                        UNION ALL
                        SELECT sort FROM folders
                    )
                "#,
                )
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{ChannelEntity, ItemType, SortEntry};
    use crate::storage::{Database, DatabaseError};
    use pretty_assertions::assert_eq;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn uuids(entities: &[ChannelEntity]) -> Vec<&str> {
        entities.iter().map(ChannelEntity::uuid).collect()
    }

    #[tokio::test]
    async fn test_channels_appended_in_insert_order() {
        let db = test_db().await;
        let a = db
            .insert_channel("https://a.example/rss", "A", None, None)
            .await
            .unwrap();
        let folder = db.insert_folder("Folder").await.unwrap();
        let b = db
            .insert_channel("https://b.example/rss", "B", None, None)
            .await
            .unwrap();

        let list = db.get_channels().await.unwrap();
        assert_eq!(uuids(&list), vec![a.as_str(), folder.as_str(), b.as_str()]);
        let sorts: Vec<i64> = list.iter().map(ChannelEntity::sort).collect();
        assert_eq!(sorts, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_resubscribe_keeps_uuid() {
        let db = test_db().await;
        let first = db
            .insert_channel("https://a.example/rss", "Old", None, None)
            .await
            .unwrap();
        let second = db
            .insert_channel("https://a.example/rss", "New", None, None)
            .await
            .unwrap();
        assert_eq!(first, second);

        let list = db.get_channels().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].title(), "New");
    }

    #[tokio::test]
    async fn test_blank_title_rejected() {
        let db = test_db().await;
        let err = db
            .insert_channel("https://a.example/rss", " \n ", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_folder_children_nested() {
        let db = test_db().await;
        let folder = db.insert_folder("Tech").await.unwrap();
        let child = db
            .insert_channel("https://c.example/rss", "C", None, Some(&folder))
            .await
            .unwrap();

        let list = db.get_channels().await.unwrap();
        assert_eq!(list.len(), 1);
        match &list[0] {
            ChannelEntity::Folder(f) => {
                assert_eq!(f.children.len(), 1);
                assert_eq!(f.children[0].uuid, child);
            }
            ChannelEntity::Channel(_) => panic!("expected folder"),
        }
    }

    #[tokio::test]
    async fn test_insert_into_missing_folder_fails() {
        let db = test_db().await;
        let err = db
            .insert_channel("https://c.example/rss", "C", None, Some("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { kind: "folder", .. }));
    }

    #[tokio::test]
    async fn test_move_channel_into_and_out_of_folder() {
        let db = test_db().await;
        let a = db
            .insert_channel("https://a.example/rss", "A", None, None)
            .await
            .unwrap();
        let folder = db.insert_folder("F").await.unwrap();

        db.move_channel_to_folder(&a, Some(&folder)).await.unwrap();
        let list = db.get_channels().await.unwrap();
        assert_eq!(uuids(&list), vec![folder.as_str()]);

        db.move_channel_to_folder(&a, None).await.unwrap();
        let list = db.get_channels().await.unwrap();
        assert_eq!(uuids(&list), vec![folder.as_str(), a.as_str()]);
    }

    #[tokio::test]
    async fn test_move_unknown_channel_is_not_found() {
        let db = test_db().await;
        let err = db.move_channel_to_folder("ghost", None).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { kind: "channel", .. }));
    }

    #[tokio::test]
    async fn test_update_sort_reorders_mixed_entities() {
        let db = test_db().await;
        let a = db
            .insert_channel("https://a.example/rss", "A", None, None)
            .await
            .unwrap();
        let f = db.insert_folder("F").await.unwrap();
        let b = db
            .insert_channel("https://b.example/rss", "B", None, None)
            .await
            .unwrap();

        db.update_sort(&[
            SortEntry {
                uuid: b.clone(),
                item_type: ItemType::Channel,
                sort: 0,
            },
            SortEntry {
                uuid: f.clone(),
                item_type: ItemType::Folder,
                sort: 1,
            },
            SortEntry {
                uuid: a.clone(),
                item_type: ItemType::Channel,
                sort: 2,
            },
        ])
        .await
        .unwrap();

        let list = db.get_channels().await.unwrap();
        assert_eq!(uuids(&list), vec![b.as_str(), f.as_str(), a.as_str()]);
    }

    #[tokio::test]
    async fn test_update_sort_splits_large_batches() {
        let db = test_db().await;
        let a = db
            .insert_channel("https://a.example/rss", "A", None, None)
            .await
            .unwrap();
        let b = db
            .insert_channel("https://b.example/rss", "B", None, None)
            .await
            .unwrap();

        // Stale uuids push the batch past one statement's bind limit; the
        // real channels land in different chunks.
        let mut entries: Vec<SortEntry> = (0..700)
            .map(|i| SortEntry {
                uuid: format!("gone-{i}"),
                item_type: ItemType::Channel,
                sort: i,
            })
            .collect();
        entries.insert(
            0,
            SortEntry {
                uuid: b.clone(),
                item_type: ItemType::Channel,
                sort: 0,
            },
        );
        entries.push(SortEntry {
            uuid: a.clone(),
            item_type: ItemType::Channel,
            sort: 701,
        });

        db.update_sort(&entries).await.unwrap();

        let list = db.get_channels().await.unwrap();
        assert_eq!(uuids(&list), vec![b.as_str(), a.as_str()]);
    }

    #[tokio::test]
    async fn test_sync_targets_for_folder_lists_children() {
        let db = test_db().await;
        let folder = db.insert_folder("F").await.unwrap();
        db.insert_channel("https://x.example/rss", "X", None, Some(&folder))
            .await
            .unwrap();
        db.insert_channel("https://y.example/rss", "Y", None, Some(&folder))
            .await
            .unwrap();

        let targets = db
            .get_sync_targets(ItemType::Folder, &folder)
            .await
            .unwrap();
        let urls: Vec<&str> = targets.iter().map(|t| t.feed_url.as_str()).collect();
        assert_eq!(urls, vec!["https://x.example/rss", "https://y.example/rss"]);

        assert!(db
            .get_sync_targets(ItemType::Channel, "missing")
            .await
            .is_err());
    }
}
