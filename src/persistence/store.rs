//! SQLite-based history store

use crate::persistence::{HistoryBackend, PassStatus, PassSummary};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const SELECT_COLUMNS: &str =
    "SELECT id, pipeline_name, status, started_at, finished_at, error_count, warning_count, asset_count FROM passes";

/// SQLite pass history
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open (or create) the database at `db_path`
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("packline");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        let db_path = db_dir.join("history.db");
        let db_path = db_path
            .to_str()
            .ok_or_else(|| anyhow!("History path is not valid UTF-8: {}", db_path.display()))?;
        Self::new(db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS passes (
                id TEXT PRIMARY KEY,
                pipeline_name TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                error_count INTEGER NOT NULL DEFAULT 0,
                warning_count INTEGER NOT NULL DEFAULT 0,
                asset_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_pipeline_name ON passes(pipeline_name);
            CREATE INDEX IF NOT EXISTS idx_started_at ON passes(started_at);
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn from_row(row: &SqliteRow) -> Result<PassSummary> {
        Ok(PassSummary {
            pass_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            status: row
                .get::<String, _>("status")
                .parse::<PassStatus>()
                .map_err(|e| anyhow!(e))?,
            started_at: Self::from_naive(row.get("started_at")),
            finished_at: Self::from_naive(row.get("finished_at")),
            error_count: Self::count(row, "error_count")?,
            warning_count: Self::count(row, "warning_count")?,
            asset_count: Self::count(row, "asset_count")?,
        })
    }

    fn count(row: &SqliteRow, column: &str) -> Result<usize> {
        let raw = row.get::<i64, _>(column);
        usize::try_from(raw).with_context(|| format!("Stored {} is out of range: {}", column, raw))
    }
}

#[async_trait::async_trait]
impl HistoryBackend for SqliteHistory {
    async fn save_pass(&self, pass: &PassSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO passes
            (id, pipeline_name, status, started_at, finished_at, error_count, warning_count, asset_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(pass.pass_id.to_string())
        .bind(&pass.pipeline_name)
        .bind(pass.status.to_string())
        .bind(Self::to_naive(pass.started_at))
        .bind(Self::to_naive(pass.finished_at))
        .bind(pass.error_count as i64)
        .bind(pass.warning_count as i64)
        .bind(pass.asset_count as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save pass")?;

        Ok(())
    }

    async fn load_pass(&self, pass_id: Uuid) -> Result<Option<PassSummary>> {
        let row = sqlx::query(&format!("{} WHERE id = ?1", SELECT_COLUMNS))
            .bind(pass_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load pass")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_passes(&self, pipeline_name: &str, limit: usize) -> Result<Vec<PassSummary>> {
        let rows = sqlx::query(&format!(
            "{} WHERE pipeline_name = ?1 ORDER BY started_at DESC LIMIT ?2",
            SELECT_COLUMNS
        ))
        .bind(pipeline_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list passes")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn recent_passes(&self, limit: usize) -> Result<Vec<PassSummary>> {
        let rows = sqlx::query(&format!("{} ORDER BY started_at DESC LIMIT ?1", SELECT_COLUMNS))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list passes")?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn list_pipelines(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT pipeline_name
            FROM passes
            ORDER BY pipeline_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pipelines")?;

        Ok(rows.iter().map(|row| row.get("pipeline_name")).collect())
    }
}
