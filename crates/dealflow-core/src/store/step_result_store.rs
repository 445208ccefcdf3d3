use super::{is_constraint_violation, parse_ts, to_ts};
use crate::db::Database;
use crate::error::DealflowError;
use crate::models::agent::AgentId;
use crate::models::step_result::{StepResult, StepStatus};

/// Persistence for the `workflow_results` table.
#[derive(Debug, Clone)]
pub struct StepResultStore {
    db: Database,
}

impl StepResultStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a step result. A second row for the same sequence index or the
    /// same agent within a run is rejected as a conflict.
    pub async fn append(&self, result: &StepResult) -> Result<(), DealflowError> {
        let r = result.clone();
        let output = serde_json::to_string(&r.output)
            .map_err(|e| DealflowError::Internal(format!("Failed to encode step output: {}", e)))?;
        let outcome = self
            .db
            .with_conn_async(move |conn| {
                match conn.execute(
                    "INSERT INTO workflow_results (workflow_id, agent_name, sequence_index, status,
                     result_data, execution_ms, attempts, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        r.run_id,
                        r.agent.as_str(),
                        r.sequence_index,
                        r.status.as_str(),
                        output,
                        r.duration_ms as i64,
                        r.attempts,
                        to_ts(&r.created_at),
                    ],
                ) {
                    Ok(_) => Ok(true),
                    Err(e) if is_constraint_violation(&e) => Ok(false),
                    Err(e) => Err(e),
                }
            })
            .await?;

        if outcome {
            Ok(())
        } else {
            Err(DealflowError::Conflict(format!(
                "Run {} already has a result for step {} ({})",
                result.run_id, result.sequence_index, result.agent
            )))
        }
    }

    /// All step results for a run, in sequence order.
    pub async fn list_by_run(&self, run_id: &str) -> Result<Vec<StepResult>, DealflowError> {
        let run_id = run_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT workflow_id, agent_name, sequence_index, status, result_data,
                     execution_ms, attempts, created_at
                     FROM workflow_results WHERE workflow_id = ?1 ORDER BY sequence_index ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![run_id], |row| Ok(row_to_step_result(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows.into_iter().flatten().collect())
            })
            .await
    }
}

/// Rows whose agent name is not a known `AgentId` are skipped.
fn row_to_step_result(row: &rusqlite::Row<'_>) -> Option<StepResult> {
    let agent = AgentId::from_str(&row.get::<_, String>(1).unwrap_or_default())?;
    let output = row
        .get::<_, String>(4)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or(serde_json::Value::Null);

    Some(StepResult {
        run_id: row.get(0).unwrap_or_default(),
        agent,
        sequence_index: row.get(2).unwrap_or(0),
        status: StepStatus::from_str(&row.get::<_, String>(3).unwrap_or_default())
            .unwrap_or(StepStatus::Pending),
        output,
        duration_ms: row.get::<_, i64>(5).unwrap_or(0).max(0) as u64,
        attempts: row.get(6).unwrap_or(1),
        created_at: parse_ts(row.get(7).ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::run::Run;
    use crate::store::RunStore;

    async fn setup() -> StepResultStore {
        let db = Database::open_in_memory().unwrap();
        RunStore::new(db.clone())
            .create(&Run::new("run-1".to_string(), "q".to_string(), None))
            .await
            .unwrap();
        StepResultStore::new(db)
    }

    #[tokio::test]
    async fn test_append_and_list_in_sequence_order() {
        let store = setup().await;
        let second = StepResult::success("run-1", AgentId::Valuer, 1, "valuation".into(), 20, 1);
        let first =
            StepResult::success("run-1", AgentId::TargetFinder, 0, "targets".into(), 10, 1);
        store.append(&second).await.unwrap();
        store.append(&first).await.unwrap();

        let results = store.list_by_run("run-1").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].agent, AgentId::TargetFinder);
        assert_eq!(results[0].content(), Some("targets"));
        assert_eq!(results[1].agent, AgentId::Valuer);
        assert_eq!(results[1].duration_ms, 20);
    }

    #[tokio::test]
    async fn test_duplicate_sequence_index_is_conflict() {
        let store = setup().await;
        let a = StepResult::success("run-1", AgentId::TargetFinder, 0, "x".into(), 1, 1);
        store.append(&a).await.unwrap();

        let same_index = StepResult::success("run-1", AgentId::Valuer, 0, "y".into(), 1, 1);
        assert!(matches!(
            store.append(&same_index).await.unwrap_err(),
            DealflowError::Conflict(_)
        ));

        let same_agent = StepResult::success("run-1", AgentId::TargetFinder, 1, "z".into(), 1, 1);
        assert!(matches!(
            store.append(&same_agent).await.unwrap_err(),
            DealflowError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_result_keeps_error_payload() {
        let store = setup().await;
        let failed = StepResult::failed(
            "run-1",
            AgentId::TargetFinder,
            0,
            "timed out".into(),
            "timeout",
            5,
            2,
        );
        store.append(&failed).await.unwrap();
        let results = store.list_by_run("run-1").await.unwrap();
        assert_eq!(results[0].status, StepStatus::Failed);
        assert_eq!(results[0].error(), Some("timed out"));
        assert_eq!(results[0].attempts, 2);
    }
}
