use super::schema::Database;
use super::types::DatabaseError;
use crate::model::UserConfig;

/// Preference key holding the refresh concurrency.
pub(crate) const THREADS_KEY: &str = "sync.threads";

impl Database {
    // ========================================================================
    // User Preferences Operations
    // ========================================================================

    /// Get a single preference value by key, `None` if unset.
    pub async fn get_preference(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM user_preferences WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a preference value (UPSERT), bumping `updated_at`.
    pub async fn set_preference(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO user_preferences (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read the per-user sync settings.
    ///
    /// A stored value that does not parse as a positive integer is treated as
    /// unset (and logged), so the caller's default applies.
    pub async fn get_user_config(&self) -> Result<UserConfig, DatabaseError> {
        let threads = match self.get_preference(THREADS_KEY).await? {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    tracing::warn!(key = THREADS_KEY, value = %raw, "Ignoring invalid thread count");
                    None
                }
            },
            None => None,
        };

        Ok(UserConfig { threads })
    }

    pub async fn set_sync_threads(&self, threads: usize) -> Result<(), DatabaseError> {
        if threads == 0 {
            return Err(DatabaseError::InvalidInput(
                "thread count must be at least 1".into(),
            ));
        }
        self.set_preference(THREADS_KEY, &threads.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::THREADS_KEY;
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_preference_missing() {
        let db = test_db().await;
        assert_eq!(db.get_preference("nonexistent.key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_preference_upsert() {
        let db = test_db().await;
        db.set_preference("sync.threads", "3").await.unwrap();
        db.set_preference("sync.threads", "8").await.unwrap();
        assert_eq!(
            db.get_preference("sync.threads").await.unwrap(),
            Some("8".to_string())
        );
    }

    #[tokio::test]
    async fn test_user_config_defaults_to_unset() {
        let db = test_db().await;
        assert_eq!(db.get_user_config().await.unwrap().threads, None);
    }

    #[tokio::test]
    async fn test_user_config_reads_threads() {
        let db = test_db().await;
        db.set_sync_threads(3).await.unwrap();
        assert_eq!(db.get_user_config().await.unwrap().threads, Some(3));
    }

    #[tokio::test]
    async fn test_invalid_thread_values_are_ignored() {
        let db = test_db().await;
        for raw in ["zero", "0", "-2"] {
            db.set_preference(THREADS_KEY, raw).await.unwrap();
            assert_eq!(db.get_user_config().await.unwrap().threads, None, "{raw}");
        }
        assert!(db.set_sync_threads(0).await.is_err());
    }
}
