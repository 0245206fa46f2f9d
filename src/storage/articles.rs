use sqlx::QueryBuilder;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{DatabaseError, ParsedArticle};

impl Database {
    // ========================================================================
    // Unread Totals
    // ========================================================================

    /// Unread article counts keyed by uuid.
    ///
    /// Every channel appears (zero when it has no unread articles). Every
    /// folder appears with the sum over its children.
    pub async fn get_unread_totals(&self) -> Result<HashMap<String, i64>, DatabaseError> {
        let rows: Vec<(String, Option<String>, i64)> = sqlx::query_as(
            r#"
                SELECT
                    c.uuid, c.folder_uuid,
                    COUNT(CASE WHEN a.read = 0 THEN 1 END) AS unread
                FROM channels c
                LEFT JOIN articles a ON a.channel_uuid = c.uuid
                GROUP BY c.uuid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let folders: Vec<(String,)> = sqlx::query_as("SELECT uuid FROM folders")
            .fetch_all(&self.pool)
            .await?;

        let mut totals: HashMap<String, i64> = HashMap::with_capacity(rows.len() + folders.len());
        for (uuid,) in folders {
            totals.insert(uuid, 0);
        }
        for (uuid, folder_uuid, unread) in rows {
            if let Some(folder) = folder_uuid {
                *totals.entry(folder).or_insert(0) += unread;
            }
            totals.insert(uuid, unread);
        }

        Ok(totals)
    }

    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Finish a channel sync atomically: store new articles, refresh metadata
    /// of known ones, clear the error and stamp `last_synced`.
    ///
    /// Read state of existing articles is preserved. Returns the number of
    /// newly inserted articles.
    pub async fn complete_channel_sync(
        &self,
        channel_uuid: &str,
        articles: &[ParsedArticle],
    ) -> Result<usize, DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // 7 binds per row keeps a chunk of 50 well under SQLite's 999 limit
        const BATCH_SIZE: usize = 50;
        let mut inserted: usize = 0;

        for chunk in articles.chunks(BATCH_SIZE) {
            // Phase 1: INSERT OR IGNORE, so changes() counts only new rows
            let mut insert: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR IGNORE INTO articles (channel_uuid, guid, title, url, published, summary, fetched_at) ",
            );
            push_article_values(&mut insert, channel_uuid, chunk, now);
            insert.build().execute(&mut *tx).await?;

            let changes: (i64,) = sqlx::query_as("SELECT changes()")
                .fetch_one(&mut *tx)
                .await?;
            inserted += changes.0 as usize;

            // Phase 2: refresh metadata of every row in the chunk, leaving read state alone
            let mut upsert: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO articles (channel_uuid, guid, title, url, published, summary, fetched_at) ",
            );
            push_article_values(&mut upsert, channel_uuid, chunk, now);
            upsert.push(
                " ON CONFLICT(channel_uuid, guid) DO UPDATE SET \
                 title = excluded.title, url = excluded.url, \
                 published = excluded.published, summary = excluded.summary",
            );
            upsert.build().execute(&mut *tx).await?;
        }

        sqlx::query("UPDATE channels SET last_synced = ?, error = NULL WHERE uuid = ?")
            .bind(now)
            .bind(channel_uuid)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    /// Mark every article of a channel read. Returns how many changed.
    pub async fn mark_channel_read(&self, channel_uuid: &str) -> Result<u64, DatabaseError> {
        let result =
            sqlx::query("UPDATE articles SET read = 1 WHERE channel_uuid = ? AND read = 0")
                .bind(channel_uuid)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }
}

fn push_article_values<'a>(
    builder: &mut QueryBuilder<'a, sqlx::Sqlite>,
    channel_uuid: &'a str,
    chunk: &'a [ParsedArticle],
    now: i64,
) {
    builder.push_values(chunk, |mut b, article| {
        b.push_bind(channel_uuid)
            .push_bind(&article.guid)
            .push_bind(&article.title)
            .push_bind(&article.url)
            .push_bind(article.published)
            .push_bind(&article.summary)
            .push_bind(now);
    });
}

#[cfg(test)]
mod tests {
    use crate::storage::{Database, ParsedArticle};

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    fn test_article(guid: &str) -> ParsedArticle {
        ParsedArticle {
            guid: guid.to_string(),
            title: format!("Article {guid}"),
            url: Some(format!("https://example.com/{guid}")),
            published: Some(1704067200),
            summary: None,
        }
    }

    #[tokio::test]
    async fn test_unread_totals_include_empty_channels_and_folders() {
        let db = test_db().await;
        let folder = db.insert_folder("F").await.unwrap();
        let a = db
            .insert_channel("https://a.example/rss", "A", None, None)
            .await
            .unwrap();

        let totals = db.get_unread_totals().await.unwrap();
        assert_eq!(totals.get(&a), Some(&0));
        assert_eq!(totals.get(&folder), Some(&0));
    }

    #[tokio::test]
    async fn test_folder_total_sums_children() {
        let db = test_db().await;
        let folder = db.insert_folder("F").await.unwrap();
        let x = db
            .insert_channel("https://x.example/rss", "X", None, Some(&folder))
            .await
            .unwrap();
        let y = db
            .insert_channel("https://y.example/rss", "Y", None, Some(&folder))
            .await
            .unwrap();

        db.complete_channel_sync(&x, &[test_article("1"), test_article("2")])
            .await
            .unwrap();
        db.complete_channel_sync(&y, &[test_article("1")])
            .await
            .unwrap();

        let totals = db.get_unread_totals().await.unwrap();
        assert_eq!(totals[&x], 2);
        assert_eq!(totals[&y], 1);
        assert_eq!(totals[&folder], 3);
    }

    #[tokio::test]
    async fn test_complete_sync_counts_only_new_articles() {
        let db = test_db().await;
        let a = db
            .insert_channel("https://a.example/rss", "A", None, None)
            .await
            .unwrap();

        let first = db
            .complete_channel_sync(&a, &[test_article("1"), test_article("2")])
            .await
            .unwrap();
        assert_eq!(first, 2);

        let mut updated = test_article("1");
        updated.title = "Retitled".to_string();
        let second = db
            .complete_channel_sync(&a, &[updated, test_article("3")])
            .await
            .unwrap();
        assert_eq!(second, 1);

        let titles: Vec<(String,)> =
            sqlx::query_as("SELECT title FROM articles WHERE guid = '1'")
                .fetch_all(&db.pool)
                .await
                .unwrap();
        assert_eq!(titles[0].0, "Retitled");
    }

    #[tokio::test]
    async fn test_complete_sync_empty_stamps_channel() {
        let db = test_db().await;
        let a = db
            .insert_channel("https://a.example/rss", "A", None, None)
            .await
            .unwrap();
        db.set_channel_error(&a, Some("boom")).await.unwrap();

        assert_eq!(db.complete_channel_sync(&a, &[]).await.unwrap(), 0);

        let row: (Option<i64>, Option<String>) =
            sqlx::query_as("SELECT last_synced, error FROM channels WHERE uuid = ?")
                .bind(&a)
                .fetch_one(&db.pool)
                .await
                .unwrap();
        assert!(row.0.is_some());
        assert_eq!(row.1, None);
    }

    #[tokio::test]
    async fn test_mark_channel_read_zeroes_total() {
        let db = test_db().await;
        let a = db
            .insert_channel("https://a.example/rss", "A", None, None)
            .await
            .unwrap();
        db.complete_channel_sync(&a, &[test_article("1"), test_article("2")])
            .await
            .unwrap();

        assert_eq!(db.mark_channel_read(&a).await.unwrap(), 2);
        assert_eq!(db.get_unread_totals().await.unwrap()[&a], 0);
        assert_eq!(db.mark_channel_read(&a).await.unwrap(), 0);
    }
}
