use chrono::Utc;
use rusqlite::OptionalExtension;

use super::{parse_ts, to_ts};
use crate::db::Database;
use crate::error::DealflowError;
use crate::models::run::{Confidence, Run, RunStatus, WorkflowType};

/// Persistence for the `workflows` table (one row per run).
#[derive(Debug, Clone)]
pub struct RunStore {
    db: Database,
}

const RUN_COLUMNS: &str =
    "id, user_query, workflow_type, status, rationale, confidence, deal_id, created_at, updated_at";

impl RunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create(&self, run: &Run) -> Result<(), DealflowError> {
        let r = run.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflows (id, user_query, workflow_type, status, rationale,
                     confidence, deal_id, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        r.id,
                        r.query,
                        r.workflow_type.map(|t| t.as_str()),
                        r.status.as_str(),
                        r.rationale,
                        r.confidence.map(|c| c.as_str()),
                        r.deal_id,
                        to_ts(&r.created_at),
                        to_ts(&r.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Run>, DealflowError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM workflows WHERE id = ?1", RUN_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_run(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list_recent(&self, limit: usize) -> Result<Vec<Run>, DealflowError> {
        let limit = limit as i64;
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM workflows ORDER BY created_at DESC, rowid DESC LIMIT ?1",
                    RUN_COLUMNS
                ))?;
                let rows = stmt
                    .query_map(rusqlite::params![limit], |row| Ok(row_to_run(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Move a run to `status`, refusing edges the run state machine forbids.
    pub async fn set_status(&self, id: &str, status: RunStatus) -> Result<(), DealflowError> {
        let Some(current) = self.get(id).await? else {
            return Err(DealflowError::NotFound(format!("Run {} not found", id)));
        };
        if current.status == status {
            return Ok(());
        }
        if !current.status.can_transition_to(status) {
            return Err(DealflowError::Conflict(format!(
                "Run {} cannot move from {} to {}",
                id, current.status, status
            )));
        }

        let id = id.to_string();
        let from = current.status.as_str();
        let now = to_ts(&Utc::now());
        let changed = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE workflows SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status = ?4",
                    rusqlite::params![id, status.as_str(), now, from],
                )
            })
            .await?;
        if changed == 0 {
            return Err(DealflowError::Conflict(
                "Run status changed concurrently".to_string(),
            ));
        }
        Ok(())
    }

    /// Record the classification. The workflow type can be set once; setting
    /// the same value again is a no-op, a different value is a conflict.
    pub async fn set_workflow_type(
        &self,
        id: &str,
        workflow_type: WorkflowType,
        rationale: &str,
        confidence: Confidence,
    ) -> Result<(), DealflowError> {
        let run_id = id.to_string();
        let rationale = rationale.to_string();
        let now = to_ts(&Utc::now());
        let changed = self
            .db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE workflows SET workflow_type = ?2, rationale = ?3, confidence = ?4,
                     updated_at = ?5
                     WHERE id = ?1 AND workflow_type IS NULL",
                    rusqlite::params![
                        run_id,
                        workflow_type.as_str(),
                        rationale,
                        confidence.as_str(),
                        now
                    ],
                )
            })
            .await?;
        if changed > 0 {
            return Ok(());
        }

        match self.get(id).await? {
            None => Err(DealflowError::NotFound(format!("Run {} not found", id))),
            Some(run) if run.workflow_type == Some(workflow_type) => Ok(()),
            Some(run) => Err(DealflowError::Conflict(format!(
                "Run {} is already classified as {}",
                id,
                run.workflow_type.map(|t| t.as_str()).unwrap_or("unknown")
            ))),
        }
    }
}

/// Column order: id(0), user_query(1), workflow_type(2), status(3), rationale(4),
///               confidence(5), deal_id(6), created_at(7), updated_at(8)
fn row_to_run(row: &rusqlite::Row<'_>) -> Run {
    Run {
        id: row.get(0).unwrap_or_default(),
        query: row.get(1).unwrap_or_default(),
        workflow_type: row
            .get::<_, Option<String>>(2)
            .unwrap_or(None)
            .and_then(|s| WorkflowType::from_str(&s)),
        status: RunStatus::from_str(&row.get::<_, String>(3).unwrap_or_default())
            .unwrap_or(RunStatus::Pending),
        rationale: row.get(4).unwrap_or(None),
        confidence: row
            .get::<_, Option<String>>(5)
            .unwrap_or(None)
            .and_then(|s| Confidence::from_str(&s)),
        deal_id: row.get(6).unwrap_or(None),
        created_at: parse_ts(row.get(7).ok()),
        updated_at: parse_ts(row.get(8).ok()),
    }
}
