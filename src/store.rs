// Typed access to the event store (flat and activity rows) and the
// relations store. Grounded on the teacher's `database.rs` (connection
// setup, PRAGMA tuning, versioned migrations embedded with `include_str!`)
// and `broker.rs` (typed query helpers returning our own row structs rather
// than raw tuples).
use sqlx::sqlite::SqlitePool;
use tracing::info;

use crate::error::CoreError;
use crate::models::{ActivityItem, ConsumeItem, FlatItem};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "create_core_tables",
    sql: include_str!("../migrations/001_create_core_tables.sql"),
}];

/// Connects to the SQLite database at `db_file`, tunes it for the
/// write-heavy fan-out workload, and applies any migration that hasn't run
/// yet.
pub async fn init_store(db_file: &str) -> Result<Store, CoreError> {
    let pool = SqlitePool::connect(&format!("sqlite:{db_file}?mode=rwc")).await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    run_migrations(&pool).await?;
    Ok(Store { pool })
}

/// Runs the store against an already-configured pool, skipping the PRAGMA
/// tuning above. Used by tests, which build a single-connection in-memory
/// pool so every query hits the same database (a multi-connection pool over
/// `sqlite::memory:` would give every connection its own empty database).
pub async fn init_store_with_pool(pool: SqlitePool) -> Result<Store, CoreError> {
    run_migrations(&pool).await?;
    Ok(Store { pool })
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), CoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    for migration in MIGRATIONS {
        let applied =
            sqlx::query_as::<_, (i64,)>("SELECT version FROM schema_migrations WHERE version = ?")
                .bind(migration.version)
                .fetch_optional(pool)
                .await?
                .is_some();

        if applied {
            continue;
        }

        info!("running migration {}: {}", migration.version, migration.name);
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO schema_migrations (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    Ok(())
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn health_check(&self) -> Result<(), CoreError> {
        self.pool.acquire().await?;
        Ok(())
    }

    // -- Relations ---------------------------------------------------------

    /// Idempotent: a duplicate `(feed_name, producer_id, consumer_id)`
    /// leaves the relation set unchanged, per the Idempotency invariant.
    pub async fn insert_relation(
        &self,
        feed_name: &str,
        producer_id: &str,
        consumer_id: &str,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO relations (feed_name, producer_id, consumer_id)
             VALUES (?, ?, ?)",
        )
        .bind(feed_name)
        .bind(producer_id)
        .bind(consumer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_relation(
        &self,
        feed_name: &str,
        producer_id: &str,
        consumer_id: &str,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "DELETE FROM relations WHERE feed_name = ? AND producer_id = ? AND consumer_id = ?",
        )
        .bind(feed_name)
        .bind(producer_id)
        .bind(consumer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn subscribers_of(
        &self,
        feed_name: &str,
        producer_id: &str,
    ) -> Result<Vec<String>, CoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT consumer_id FROM relations WHERE feed_name = ? AND producer_id = ?",
        )
        .bind(feed_name)
        .bind(producer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    // -- Flat events ---------------------------------------------------------

    pub async fn insert_flat_item(&self, feed_name: &str, item: &FlatItem) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO flat_events (feed_name, item_id, producer_id, verb, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(feed_name)
        .bind(&item.item_id)
        .bind(&item.producer_id)
        .bind(&item.verb)
        .bind(item.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_flat_item(
        &self,
        feed_name: &str,
        producer_id: &str,
        item_id: &str,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "DELETE FROM flat_events WHERE feed_name = ? AND producer_id = ? AND item_id = ?",
        )
        .bind(feed_name)
        .bind(producer_id)
        .bind(item_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All of one producer's items in a flat feed, for subscribe backfill
    /// and unsubscribe removal.
    pub async fn flat_items_by_producer(
        &self,
        feed_name: &str,
        producer_id: &str,
    ) -> Result<Vec<FlatItem>, CoreError> {
        let items = sqlx::query_as::<_, FlatItem>(
            "SELECT item_id, producer_id, verb, timestamp FROM flat_events
             WHERE feed_name = ? AND producer_id = ?",
        )
        .bind(feed_name)
        .bind(producer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Rebuild a flat consumer timeline: join relations and items for
    /// `consumer_id`, newest first, capped at `max_cache`.
    pub async fn rebuild_flat_timeline(
        &self,
        feed_name: &str,
        consumer_id: &str,
        max_cache: i64,
    ) -> Result<Vec<FlatItem>, CoreError> {
        let items = sqlx::query_as::<_, FlatItem>(
            "SELECT f.item_id, f.producer_id, f.verb, f.timestamp FROM flat_events f
             JOIN relations r ON r.feed_name = f.feed_name AND r.producer_id = f.producer_id
             WHERE f.feed_name = ? AND r.consumer_id = ?
             ORDER BY f.timestamp DESC
             LIMIT ?",
        )
        .bind(feed_name)
        .bind(consumer_id)
        .bind(max_cache)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Projects a set of flat item ids to `{item_id, verb}`, for the final
    /// store join in `consume`. Order is not meaningful here: the caller
    /// re-orders by the cache's score-descending order.
    pub async fn project_flat_verbs(
        &self,
        feed_name: &str,
        item_ids: &[String],
    ) -> Result<Vec<ConsumeItem>, CoreError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; item_ids.len()].join(", ");
        let sql = format!(
            "SELECT item_id, verb FROM flat_events WHERE feed_name = ? AND item_id IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, (String, String)>(&sql).bind(feed_name);
        for id in item_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(item_id, verb)| ConsumeItem { item_id, verb })
            .collect())
    }

    /// Every flat row in a feed, in insertion order, for the preloader.
    pub async fn all_flat_items(&self, feed_name: &str) -> Result<Vec<FlatItem>, CoreError> {
        let items = sqlx::query_as::<_, FlatItem>(
            "SELECT item_id, producer_id, verb, timestamp FROM flat_events
             WHERE feed_name = ? ORDER BY id ASC",
        )
        .bind(feed_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    // -- Activity events ---------------------------------------------------

    pub async fn insert_activity_item(
        &self,
        feed_name: &str,
        item: &ActivityItem,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO activity_events
                (feed_name, item_id, consumer_id, producer_id, verb, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(feed_name)
        .bind(&item.item_id)
        .bind(&item.consumer_id)
        .bind(&item.producer_id)
        .bind(&item.verb)
        .bind(item.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_activity_item(
        &self,
        feed_name: &str,
        producer_id: &str,
        item_id: &str,
        verb: &str,
        consumer_id: &str,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "DELETE FROM activity_events
             WHERE feed_name = ? AND producer_id = ? AND item_id = ? AND verb = ? AND consumer_id = ?",
        )
        .bind(feed_name)
        .bind(producer_id)
        .bind(item_id)
        .bind(verb)
        .bind(consumer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rows addressed from `producer_id` to `consumer_id`, for subscribe
    /// backfill and unsubscribe removal.
    pub async fn activity_items_by_producer_consumer(
        &self,
        feed_name: &str,
        producer_id: &str,
        consumer_id: &str,
    ) -> Result<Vec<ActivityItem>, CoreError> {
        let items = sqlx::query_as::<_, ActivityItem>(
            "SELECT item_id, producer_id, consumer_id, verb, timestamp FROM activity_events
             WHERE feed_name = ? AND producer_id = ? AND consumer_id = ?",
        )
        .bind(feed_name)
        .bind(producer_id)
        .bind(consumer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Rebuild an activity consumer timeline: all rows addressed to
    /// `consumer_id`, newest first, capped at `max_cache`.
    pub async fn rebuild_activity_timeline(
        &self,
        feed_name: &str,
        consumer_id: &str,
        max_cache: i64,
    ) -> Result<Vec<ActivityItem>, CoreError> {
        let items = sqlx::query_as::<_, ActivityItem>(
            "SELECT item_id, producer_id, consumer_id, verb, timestamp FROM activity_events
             WHERE feed_name = ? AND consumer_id = ?
             ORDER BY timestamp DESC
             LIMIT ?",
        )
        .bind(feed_name)
        .bind(consumer_id)
        .bind(max_cache)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    pub async fn project_activity_verbs(
        &self,
        feed_name: &str,
        consumer_id: &str,
        item_ids: &[String],
    ) -> Result<Vec<ConsumeItem>, CoreError> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; item_ids.len()].join(", ");
        let sql = format!(
            "SELECT item_id, verb FROM activity_events
             WHERE feed_name = ? AND consumer_id = ? AND item_id IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, (String, String)>(&sql)
            .bind(feed_name)
            .bind(consumer_id);
        for id in item_ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(item_id, verb)| ConsumeItem { item_id, verb })
            .collect())
    }

    /// Every activity row in a feed, in insertion order, for the preloader.
    pub async fn all_activity_items(&self, feed_name: &str) -> Result<Vec<ActivityItem>, CoreError> {
        let items = sqlx::query_as::<_, ActivityItem>(
            "SELECT item_id, producer_id, consumer_id, verb, timestamp FROM activity_events
             WHERE feed_name = ? ORDER BY id ASC",
        )
        .bind(feed_name)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }
}
