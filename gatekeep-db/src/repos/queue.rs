//! Review queue repository
//!
//! Every mutating call awaits its statement before returning, so a restart
//! reconstructs the queue exactly as of the last call that returned.

use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::models::{
    format_timestamp, parse_timestamp, NewQueueItem, QueueItem, QueueStats, QueueStatus,
    SubmittedTests,
};
use crate::{Error, Result};

const SELECT_COLUMNS: &str = "SELECT id, commit_id, branch, author_agent, diff, files_changed, \
     test_results, status, created_at, reviewed_at, review_result, retry_count, priority \
     FROM review_queue";

/// `?, ?, ?` for an `IN` list of `n` values
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Raw row as stored in SQLite
#[derive(Debug, sqlx::FromRow)]
struct QueueRow {
    id: String,
    commit_id: String,
    branch: String,
    author_agent: String,
    diff: String,
    files_changed: String,
    test_results: Option<String>,
    status: String,
    created_at: String,
    reviewed_at: Option<String>,
    review_result: Option<String>,
    retry_count: i64,
    priority: i64,
}

impl TryFrom<QueueRow> for QueueItem {
    type Error = Error;

    fn try_from(row: QueueRow) -> Result<Self> {
        let test_results = row
            .test_results
            .as_deref()
            .map(serde_json::from_str::<SubmittedTests>)
            .transpose()?;
        let review_result = row
            .review_result
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?;

        Ok(QueueItem {
            files_changed: serde_json::from_str(&row.files_changed)?,
            status: row.status.parse()?,
            created_at: parse_timestamp(&row.created_at)?,
            reviewed_at: row.reviewed_at.as_deref().map(parse_timestamp).transpose()?,
            retry_count: u32::try_from(row.retry_count).map_err(|_| {
                Error::InvalidData(format!("Negative retry count for {}", row.id))
            })?,
            id: row.id,
            commit_id: row.commit_id,
            branch: row.branch,
            author_agent: row.author_agent,
            diff: row.diff,
            test_results,
            review_result,
            priority: row.priority,
        })
    }
}

fn into_items(rows: Vec<QueueRow>) -> Result<Vec<QueueItem>> {
    rows.into_iter().map(QueueItem::try_from).collect()
}

/// Repository for the durable review queue
#[derive(Debug, Clone)]
pub struct ReviewQueue {
    pool: SqlitePool,
}

impl ReviewQueue {
    /// Create a new queue repository over a pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Submit a change for review; returns the new queue id
    pub async fn submit(&self, item: NewQueueItem) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let files_json = serde_json::to_string(&item.files_changed)?;
        let tests_json = item
            .test_results
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO review_queue (
                id, commit_id, branch, author_agent, diff, files_changed,
                test_results, status, created_at, retry_count, priority
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&id)
        .bind(&item.commit_id)
        .bind(&item.branch)
        .bind(&item.author_agent)
        .bind(&item.diff)
        .bind(&files_json)
        .bind(&tests_json)
        .bind(QueueStatus::Pending.as_str())
        .bind(format_timestamp(&Utc::now()))
        .bind(item.priority)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            queue_id = %id,
            commit = %item.commit_id,
            author = %item.author_agent,
            priority = item.priority,
            "Commit submitted for review"
        );

        Ok(id)
    }

    /// Next reviewable items: priority descending, then oldest first
    pub async fn get_pending_items(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!(
            "{} WHERE status IN ({}) \
             ORDER BY priority DESC, created_at ASC, rowid ASC LIMIT ?",
            SELECT_COLUMNS,
            placeholders(QueueStatus::REVIEWABLE.len())
        );
        let mut query = sqlx::query_as::<_, QueueRow>(&sql);
        for status in QueueStatus::REVIEWABLE {
            query = query.bind(status.as_str());
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;

        into_items(rows)
    }

    /// Rewrite status (and result, when given) plus `reviewed_at`
    ///
    /// Returns `false` when the id is unknown. Moving an item out of a
    /// terminal status is refused with [`Error::InvalidTransition`].
    pub async fn update_status(
        &self,
        id: &str,
        status: QueueStatus,
        review_result: Option<&serde_json::Value>,
    ) -> Result<bool> {
        let result_json = review_result.map(serde_json::to_string).transpose()?;

        let sql = format!(
            "UPDATE review_queue \
             SET status = ?, reviewed_at = ?, review_result = COALESCE(?, review_result) \
             WHERE id = ? AND status NOT IN ({})",
            placeholders(QueueStatus::TERMINAL.len())
        );
        let mut query = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(format_timestamp(&Utc::now()))
            .bind(&result_json)
            .bind(id);
        for terminal in QueueStatus::TERMINAL {
            query = query.bind(terminal.as_str());
        }
        let affected = query.execute(&self.pool).await?.rows_affected();

        if affected > 0 {
            tracing::debug!(queue_id = %id, %status, "Queue item status updated");
            return Ok(true);
        }

        match self.current_status(id).await? {
            None => {
                tracing::warn!(queue_id = %id, "Queue item not found");
                Ok(false)
            }
            Some(from) if from.is_terminal() => Err(Error::InvalidTransition {
                id: id.to_string(),
                from: from.to_string(),
                to: status.to_string(),
            }),
            Some(from) => Err(Error::InvalidData(format!(
                "Update of queue item {} from {} matched no row",
                id, from
            ))),
        }
    }

    /// Increment and return the retry counter; status is left untouched
    pub async fn increment_retry(&self, id: &str) -> Result<u32> {
        let count: Option<i64> = sqlx::query_scalar(
            "UPDATE review_queue SET retry_count = retry_count + 1 WHERE id = ? RETURNING retry_count",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let count =
            count.ok_or_else(|| Error::NotFound(format!("Queue item {} not found", id)))?;
        u32::try_from(count)
            .map_err(|_| Error::InvalidData(format!("Negative retry count for {}", id)))
    }

    /// Get a single item
    pub async fn get_item(&self, id: &str) -> Result<Option<QueueItem>> {
        let row = sqlx::query_as::<_, QueueRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(QueueItem::try_from).transpose()
    }

    /// Count items per status
    pub async fn count_by_status(&self) -> Result<Vec<(QueueStatus, i64)>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) as count FROM review_queue GROUP BY status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(status, count)| Ok((status.parse()?, count)))
            .collect()
    }

    /// Aggregate queue statistics
    pub async fn get_stats(&self) -> Result<QueueStats> {
        Ok(QueueStats::from_counts(&self.count_by_status().await?))
    }

    /// Delete merged items created more than `days` ago
    pub async fn cleanup_old_items(&self, days: u32) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(i64::from(days));

        let removed = sqlx::query("DELETE FROM review_queue WHERE status = ? AND created_at < ?")
            .bind(QueueStatus::Merged.as_str())
            .bind(format_timestamp(&cutoff))
            .execute(&self.pool)
            .await?
            .rows_affected();

        if removed > 0 {
            tracing::info!(removed, days, "Cleaned up old merged queue items");
        }

        Ok(removed)
    }

    /// Most recently reviewed items, newest first
    pub async fn recently_reviewed(&self, limit: usize) -> Result<Vec<QueueItem>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, QueueRow>(&format!(
            "{} WHERE reviewed_at IS NOT NULL ORDER BY reviewed_at DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_items(rows)
    }

    /// Items by one author that carry a review result recorded since `since`
    pub async fn reviewed_by_author_since(
        &self,
        author_agent: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query_as::<_, QueueRow>(&format!(
            "{} WHERE author_agent = ? AND reviewed_at >= ? AND review_result IS NOT NULL \
             ORDER BY reviewed_at ASC",
            SELECT_COLUMNS
        ))
        .bind(author_agent)
        .bind(format_timestamp(&since))
        .fetch_all(&self.pool)
        .await?;

        into_items(rows)
    }

    async fn current_status(&self, id: &str) -> Result<Option<QueueStatus>> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM review_queue WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        status.map(|s| s.parse()).transpose()
    }
}
