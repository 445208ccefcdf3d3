use chrono::Utc;
use rusqlite::OptionalExtension;
use std::collections::HashMap;
use uuid::Uuid;

use super::{parse_ts, to_ts};
use crate::db::Database;
use crate::error::DealflowError;
use crate::models::deal::{CompanyContext, Deal, DealStatus};
use crate::models::run::WorkflowType;

#[derive(Debug, Clone)]
pub struct DealStore {
    db: Database,
}

const DEAL_COLUMNS: &str =
    "id, deal_type, company_name, industry, deal_size, status, metadata, created_at, updated_at";

impl DealStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a deal from the company details supplied with a query.
    pub async fn create(&self, company: &CompanyContext) -> Result<Deal, DealflowError> {
        let now = Utc::now();
        let deal = Deal {
            id: Uuid::new_v4().to_string(),
            deal_type: None,
            company_name: company.company_name.clone(),
            industry: company.industry.clone(),
            deal_size: company.deal_size.clone(),
            status: DealStatus::Active,
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        };
        let d = deal.clone();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO deals (id, deal_type, company_name, industry, deal_size, status,
                     metadata, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        d.id,
                        d.deal_type.map(|t| t.as_str()),
                        d.company_name,
                        d.industry,
                        d.deal_size,
                        d.status.as_str(),
                        serde_json::to_string(&d.metadata).unwrap_or_else(|_| "{}".to_string()),
                        to_ts(&d.created_at),
                        to_ts(&d.updated_at),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(deal)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Deal>, DealflowError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM deals WHERE id = ?1", DEAL_COLUMNS),
                    rusqlite::params![id],
                    |row| Ok(row_to_deal(row)),
                )
                .optional()
            })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Deal>, DealflowError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM deals ORDER BY created_at DESC",
                    DEAL_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_deal(row)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Fill in the deal type if it has not been set yet.
    pub async fn set_type_if_unset(
        &self,
        id: &str,
        deal_type: WorkflowType,
    ) -> Result<(), DealflowError> {
        let id = id.to_string();
        let now = to_ts(&Utc::now());
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "UPDATE deals SET deal_type = ?2, updated_at = ?3
                     WHERE id = ?1 AND deal_type IS NULL",
                    rusqlite::params![id, deal_type.as_str(), now],
                )?;
                Ok(())
            })
            .await
    }
}

fn row_to_deal(row: &rusqlite::Row<'_>) -> Deal {
    let metadata: HashMap<String, String> = row
        .get::<_, String>(6)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Deal {
        id: row.get(0).unwrap_or_default(),
        deal_type: row
            .get::<_, Option<String>>(1)
            .unwrap_or(None)
            .and_then(|s| WorkflowType::from_str(&s)),
        company_name: row.get(2).unwrap_or(None),
        industry: row.get(3).unwrap_or(None),
        deal_size: row.get(4).unwrap_or(None),
        status: DealStatus::from_str(&row.get::<_, String>(5).unwrap_or_default()),
        metadata,
        created_at: parse_ts(row.get(7).ok()),
        updated_at: parse_ts(row.get(8).ok()),
    }
}
