//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the PostgreSQL implementation of the
//! store ports from the `core` crate. Every batch write is a single multi-row
//! statement, so it either lands completely or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flashcard_core::domain::{
    Collection, NewProposal, NewStudyItem, Proposal, ProposalEdit, ProposalStatus, Schedule,
    SessionId, StudyItem, StudyStatus,
};
use flashcard_core::ports::{
    AuthSessionStore, CollectionStore, PortError, PortResult, ProposalStore, StudyItemStore,
};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const PROPOSAL_COLUMNS: &str =
    "id, owner_id, question, answer, image_url, domain, session_id, status, created_at, updated_at";

/// Batch rows share one `created_at`; `seq` breaks the tie in insertion order.
const INSERTION_ORDER: &str = "ORDER BY created_at ASC, seq ASC";

const ITEM_COLUMNS: &str = "id, collection_id, question, answer, image_url, status, due_date, \
     interval_days, consecutive_correct, created_at, updated_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct ProposalRecord {
    id: Uuid,
    owner_id: Uuid,
    question: String,
    answer: String,
    image_url: Option<String>,
    domain: Option<String>,
    session_id: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProposalRecord {
    fn to_domain(self) -> PortResult<Proposal> {
        let session_id = SessionId::parse(&self.session_id).ok_or_else(|| {
            PortError::Unexpected(format!("Proposal {} has an empty session id", self.id))
        })?;
        let status = self
            .status
            .parse::<ProposalStatus>()
            .map_err(PortError::Unexpected)?;
        Ok(Proposal {
            id: self.id,
            owner_id: self.owner_id,
            question: self.question,
            answer: self.answer,
            image_url: self.image_url,
            domain: self.domain,
            session_id,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct CollectionRecord {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl CollectionRecord {
    fn to_domain(self) -> Collection {
        Collection {
            id: self.id,
            owner_id: self.owner_id,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct StudyItemRecord {
    id: Uuid,
    collection_id: Uuid,
    question: String,
    answer: String,
    image_url: Option<String>,
    status: String,
    due_date: DateTime<Utc>,
    interval_days: i32,
    consecutive_correct: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StudyItemRecord {
    fn to_domain(self) -> PortResult<StudyItem> {
        let status = self
            .status
            .parse::<StudyStatus>()
            .map_err(PortError::Unexpected)?;
        let schedule = Schedule::from_raw(
            status,
            self.due_date,
            i64::from(self.interval_days),
            i64::from(self.consecutive_correct),
        )
        .map_err(|e| PortError::Unexpected(format!("Study item {}: {}", self.id, e)))?;
        Ok(StudyItem {
            id: self.id,
            collection_id: self.collection_id,
            question: self.question,
            answer: self.answer,
            image_url: self.image_url,
            schedule,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn proposals_to_domain(records: Vec<ProposalRecord>) -> PortResult<Vec<Proposal>> {
    records.into_iter().map(ProposalRecord::to_domain).collect()
}

fn items_to_domain(records: Vec<StudyItemRecord>) -> PortResult<Vec<StudyItem>> {
    records.into_iter().map(StudyItemRecord::to_domain).collect()
}

fn to_db_int(value: u32, what: &str) -> PortResult<i32> {
    i32::try_from(value).map_err(|_| PortError::Unexpected(format!("{} {} is out of range", what, value)))
}

//=========================================================================================
// `ProposalStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl ProposalStore for DbAdapter {
    async fn insert_batch(&self, proposals: Vec<NewProposal>) -> PortResult<Vec<Proposal>> {
        if proposals.is_empty() {
            return Ok(Vec::new());
        }
        let now = Utc::now();
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO proposals ({}) ",
            PROPOSAL_COLUMNS
        ));
        builder.push_values(proposals, |mut row, p| {
            row.push_bind(Uuid::new_v4())
                .push_bind(p.owner_id)
                .push_bind(p.question)
                .push_bind(p.answer)
                .push_bind(p.image_url)
                .push_bind(p.domain)
                .push_bind(p.session_id.as_str().to_string())
                .push_bind(ProposalStatus::Pending.as_str())
                .push_bind(now)
                .push_bind(now);
        });
        builder.push(format!(" RETURNING {}", PROPOSAL_COLUMNS));

        let records = builder
            .build_query_as::<ProposalRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;
        proposals_to_domain(records)
    }

    async fn list_by_session(
        &self,
        owner_id: Uuid,
        session_id: &SessionId,
    ) -> PortResult<Vec<Proposal>> {
        let records = sqlx::query_as::<_, ProposalRecord>(&format!(
            "SELECT {} FROM proposals \
             WHERE session_id = $1 AND owner_id = $2 AND status = 'pending' {}",
            PROPOSAL_COLUMNS, INSERTION_ORDER
        ))
        .bind(session_id.as_str())
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        proposals_to_domain(records)
    }

    async fn list_pending(&self, owner_id: Uuid, ids: &[Uuid]) -> PortResult<Vec<Proposal>> {
        let records = sqlx::query_as::<_, ProposalRecord>(&format!(
            "SELECT {} FROM proposals \
             WHERE id = ANY($1) AND owner_id = $2 AND status = 'pending' {}",
            PROPOSAL_COLUMNS, INSERTION_ORDER
        ))
        .bind(ids)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        proposals_to_domain(records)
    }

    async fn update(&self, owner_id: Uuid, id: Uuid, edit: ProposalEdit) -> PortResult<Proposal> {
        let record = sqlx::query_as::<_, ProposalRecord>(&format!(
            "UPDATE proposals SET \
                question = COALESCE($3, question), \
                answer = COALESCE($4, answer), \
                image_url = COALESCE($5, image_url), \
                updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2 AND status = 'pending' \
             RETURNING {}",
            PROPOSAL_COLUMNS
        ))
        .bind(id)
        .bind(owner_id)
        .bind(edit.question)
        .bind(edit.answer)
        .bind(edit.image_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Pending proposal {} not found", id)))?;
        record.to_domain()
    }

    async fn update_domain_for_session(
        &self,
        owner_id: Uuid,
        session_id: &SessionId,
        domain: Option<&str>,
    ) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE proposals SET domain = $3, updated_at = NOW() \
             WHERE session_id = $1 AND owner_id = $2 AND status = 'pending'",
        )
        .bind(session_id.as_str())
        .bind(owner_id)
        .bind(domain)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn bulk_set_status(
        &self,
        owner_id: Uuid,
        ids: &[Uuid],
        status: ProposalStatus,
    ) -> PortResult<u64> {
        let result = sqlx::query(
            "UPDATE proposals SET status = $3, updated_at = NOW() \
             WHERE id = ANY($1) AND owner_id = $2 AND status = 'pending'",
        )
        .bind(ids)
        .bind(owner_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }

    async fn bulk_delete(&self, owner_id: Uuid, ids: &[Uuid]) -> PortResult<u64> {
        let result = sqlx::query(
            "DELETE FROM proposals WHERE id = ANY($1) AND owner_id = $2 AND status = 'pending'",
        )
        .bind(ids)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(result.rows_affected())
    }
}

//=========================================================================================
// `CollectionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CollectionStore for DbAdapter {
    async fn get_collection(&self, collection_id: Uuid) -> PortResult<Collection> {
        let record = sqlx::query_as::<_, CollectionRecord>(
            "SELECT id, owner_id, name, created_at FROM collections WHERE id = $1",
        )
        .bind(collection_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Collection {} not found", collection_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn create_collection(&self, owner_id: Uuid, name: &str) -> PortResult<Collection> {
        let record = sqlx::query_as::<_, CollectionRecord>(
            "INSERT INTO collections (id, owner_id, name) VALUES ($1, $2, $3) \
             RETURNING id, owner_id, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }
}

//=========================================================================================
// `StudyItemStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl StudyItemStore for DbAdapter {
    async fn insert_items(&self, items: Vec<NewStudyItem>) -> PortResult<Vec<StudyItem>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let rows = items
            .into_iter()
            .map(|item| {
                let interval = to_db_int(item.schedule.interval, "interval")?;
                let streak = to_db_int(item.schedule.consecutive_correct, "consecutive correct count")?;
                Ok((item, interval, streak))
            })
            .collect::<PortResult<Vec<_>>>()?;

        let now = Utc::now();
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "INSERT INTO study_items ({}) ",
            ITEM_COLUMNS
        ));
        builder.push_values(rows, |mut row, (item, interval, streak)| {
            row.push_bind(Uuid::new_v4())
                .push_bind(item.collection_id)
                .push_bind(item.question)
                .push_bind(item.answer)
                .push_bind(item.image_url)
                .push_bind(item.schedule.status.as_str())
                .push_bind(item.schedule.due_date)
                .push_bind(interval)
                .push_bind(streak)
                .push_bind(now)
                .push_bind(now);
        });
        builder.push(format!(" RETURNING {}", ITEM_COLUMNS));

        let records = builder
            .build_query_as::<StudyItemRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    PortError::NotFound("Collection not found".to_string())
                }
                _ => unexpected(e),
            })?;
        items_to_domain(records)
    }

    async fn get_item(&self, item_id: Uuid) -> PortResult<StudyItem> {
        let record = sqlx::query_as::<_, StudyItemRecord>(&format!(
            "SELECT {} FROM study_items WHERE id = $1",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Study item {} not found", item_id)))?;
        record.to_domain()
    }

    async fn list_items(&self, collection_id: Uuid) -> PortResult<Vec<StudyItem>> {
        let records = sqlx::query_as::<_, StudyItemRecord>(&format!(
            "SELECT {} FROM study_items WHERE collection_id = $1 {}",
            ITEM_COLUMNS, INSERTION_ORDER
        ))
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        items_to_domain(records)
    }

    async fn save_schedule(&self, item_id: Uuid, schedule: &Schedule) -> PortResult<StudyItem> {
        let record = sqlx::query_as::<_, StudyItemRecord>(&format!(
            "UPDATE study_items SET \
                status = $2, due_date = $3, interval_days = $4, consecutive_correct = $5, \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .bind(schedule.status.as_str())
        .bind(schedule.due_date)
        .bind(to_db_int(schedule.interval, "interval")?)
        .bind(to_db_int(schedule.consecutive_correct, "consecutive correct count")?)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Study item {} not found", item_id)))?;
        record.to_domain()
    }
}

//=========================================================================================
// `AuthSessionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthSessionStore for DbAdapter {
    async fn validate_auth_session(&self, token: &str) -> PortResult<Uuid> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > NOW()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        user_id.ok_or(PortError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = include_str!("../../migrations/20240301000000_initial_schema.sql");

    fn table_definition(table: &str) -> &'static str {
        let start = SCHEMA
            .find(&format!("CREATE TABLE IF NOT EXISTS {} (", table))
            .unwrap();
        let end = start + SCHEMA[start..].find(");").unwrap();
        &SCHEMA[start..end]
    }

    #[test]
    fn ordered_tables_carry_the_insertion_sequence() {
        assert!(INSERTION_ORDER.ends_with("seq ASC"));
        for table in ["proposals", "study_items"] {
            assert!(
                table_definition(table).contains("seq BIGSERIAL"),
                "{} has no seq column",
                table
            );
        }
    }
}
