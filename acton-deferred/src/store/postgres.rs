//! `PostgreSQL` store using `sqlx`.

use super::{Claim, ClaimDecision, ClaimOutcome, JobStore, RouterStore};
use crate::jobs::{
    JobError, JobId, JobRecord, JobResult, JobStatus, TaskDescriptor, TrackingId,
};
use crate::router::{StepArgs, StoredRouter};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

const JOB_COLUMNS: &str = "id, key, status, payload, result, callback_target, external_job_id, \
                           queued_at, finished_at, created_at, updated_at";

#[derive(Debug, FromRow)]
struct JobRow {
    id: Uuid,
    key: String,
    status: String,
    payload: Json<TaskDescriptor>,
    result: Option<Json<Value>>,
    callback_target: Option<String>,
    external_job_id: Option<String>,
    queued_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for JobRecord {
    type Error = JobError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row.status.parse().map_err(JobError::Other)?;
        Ok(Self {
            id: row.id.into(),
            key: row.key,
            status,
            payload: row.payload.0,
            result: row.result.map(|json| json.0),
            callback_target: row.callback_target,
            external_job_id: row.external_job_id.map(TrackingId::from),
            queued_at: row.queued_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RouterRow {
    key: String,
    current_step: Json<Value>,
    args: Json<StepArgs>,
    initial_step: Json<Value>,
    initial_args: Json<StepArgs>,
    awaiting: Option<Uuid>,
    jobs: Json<Vec<JobId>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RouterRow> for StoredRouter {
    fn from(row: RouterRow) -> Self {
        Self {
            key: row.key,
            current_step: row.current_step.0,
            args: row.args.0,
            initial_step: row.initial_step.0,
            initial_args: row.initial_args.0,
            awaiting: row.awaiting.map(JobId::from),
            jobs: row.jobs.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Job and router store backed by `PostgreSQL`.
///
/// Claims and rollbacks lock the row with `SELECT ... FOR UPDATE` inside a
/// transaction; finishing is a single conditional `UPDATE`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `url` with at most `max_connections` connections.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is unreachable.
    pub async fn connect(url: &str, max_connections: u32) -> JobResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "connected to job database");
        Ok(Self::new(pool))
    }

    /// Create the job and router tables if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub async fn migrate(&self) -> JobResult<()> {
        sqlx::raw_sql(include_str!("../../migrations/0001_deferred.sql"))
            .execute(&self.pool)
            .await?;
        debug!("applied deferred schema");
        Ok(())
    }

    /// Underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn lock_row(conn: &mut PgConnection, id: JobId) -> JobResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM deferred_jobs WHERE id = $1 FOR UPDATE"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        row.try_into()
    }

    async fn write_row(conn: &mut PgConnection, record: &JobRecord) -> JobResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r"
            UPDATE deferred_jobs
            SET status = $2, payload = $3, result = $4, callback_target = $5,
                external_job_id = $6, queued_at = $7, finished_at = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(Uuid::from(record.id))
        .bind(record.status.name())
        .bind(Json(&record.payload))
        .bind(record.result.as_ref().map(Json))
        .bind(&record.callback_target)
        .bind(record.external_job_id.as_ref().map(TrackingId::as_str))
        .bind(record.queued_at)
        .bind(record.finished_at)
        .fetch_one(&mut *conn)
        .await?;
        row.try_into()
    }

    async fn update_returning(&self, sql: &str, id: JobId) -> JobResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(sql)
            .bind(Uuid::from(id))
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        row.try_into()
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn get(&self, id: JobId) -> JobResult<Option<JobRecord>> {
        sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM deferred_jobs WHERE id = $1"
        ))
        .bind(Uuid::from(id))
        .fetch_optional(&self.pool)
        .await?
        .map(JobRecord::try_from)
        .transpose()
    }

    async fn find_by_key(&self, key: &str) -> JobResult<Option<JobRecord>> {
        sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM deferred_jobs WHERE key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .map(JobRecord::try_from)
        .transpose()
    }

    async fn get_or_create(&self, key: &str, payload: &TaskDescriptor) -> JobResult<JobRecord> {
        let inserted = sqlx::query(
            r"
            INSERT INTO deferred_jobs (id, key, status, payload)
            VALUES ($1, $2, 'idle', $3)
            ON CONFLICT (key) DO NOTHING
            ",
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(Json(payload))
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() > 0 {
            debug!(key, "created job record");
        }

        self.find_by_key(key)
            .await?
            .ok_or_else(|| JobError::NotFound(key.to_string()))
    }

    async fn claim(&self, id: JobId, claim: &Claim) -> JobResult<ClaimOutcome> {
        let mut tx = self.pool.begin().await?;
        let prior = Self::lock_row(&mut tx, id).await?;

        let outcome = match claim.decide(&prior) {
            ClaimDecision::Claim => {
                let mut next = prior.clone();
                claim.apply(&mut next);
                let record = Self::write_row(&mut tx, &next).await?;
                ClaimOutcome::Claimed { prior, record }
            }
            ClaimDecision::AlreadyQueued => ClaimOutcome::AlreadyQueued(prior),
            ClaimDecision::Finished => ClaimOutcome::Finished(prior),
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn release(&self, prior: &JobRecord, tracking_id: &TrackingId) -> JobResult<bool> {
        let mut tx = self.pool.begin().await?;
        let current = Self::lock_row(&mut tx, prior.id).await?;

        if !current.is_queued_as(tracking_id) {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::write_row(&mut tx, prior).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn finish(
        &self,
        id: JobId,
        tracking_id: &TrackingId,
        result: Value,
    ) -> JobResult<Option<JobRecord>> {
        sqlx::query_as::<_, JobRow>(&format!(
            r"
            UPDATE deferred_jobs
            SET status = 'finished', result = $3, finished_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'queued' AND external_job_id = $2
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(Uuid::from(id))
        .bind(tracking_id.as_str())
        .bind(Json(result))
        .fetch_optional(&self.pool)
        .await?
        .map(JobRecord::try_from)
        .transpose()
    }

    async fn reset(&self, id: JobId) -> JobResult<JobRecord> {
        self.update_returning(
            &format!(
                r"
                UPDATE deferred_jobs
                SET status = 'idle', result = NULL, external_job_id = NULL,
                    queued_at = NULL, finished_at = NULL, updated_at = NOW()
                WHERE id = $1
                RETURNING {JOB_COLUMNS}
                "
            ),
            id,
        )
        .await
    }

    async fn set_callback(&self, id: JobId, callback: Option<String>) -> JobResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r"
            UPDATE deferred_jobs
            SET callback_target = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(Uuid::from(id))
        .bind(callback)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        row.try_into()
    }

    async fn set_payload(&self, id: JobId, payload: &TaskDescriptor) -> JobResult<JobRecord> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r"
            UPDATE deferred_jobs
            SET payload = CASE WHEN status = 'idle' THEN $2 ELSE payload END,
                updated_at = CASE WHEN status = 'idle' THEN NOW() ELSE updated_at END
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(Uuid::from(id))
        .bind(Json(payload))
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| JobError::NotFound(id.to_string()))?;
        row.try_into()
    }
}

#[async_trait]
impl RouterStore for PgStore {
    async fn load(&self, key: &str) -> JobResult<Option<StoredRouter>> {
        let row = sqlx::query_as::<_, RouterRow>(
            r"
            SELECT key, current_step, args, initial_step, initial_args, awaiting, jobs,
                   created_at, updated_at
            FROM deferred_routers
            WHERE key = $1
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StoredRouter::from))
    }

    async fn save(&self, router: &StoredRouter) -> JobResult<()> {
        sqlx::query(
            r"
            INSERT INTO deferred_routers
                (key, current_step, args, initial_step, initial_args, awaiting, jobs, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (key) DO UPDATE SET
                current_step = EXCLUDED.current_step,
                args = EXCLUDED.args,
                initial_step = EXCLUDED.initial_step,
                initial_args = EXCLUDED.initial_args,
                awaiting = EXCLUDED.awaiting,
                jobs = EXCLUDED.jobs,
                updated_at = NOW()
            ",
        )
        .bind(&router.key)
        .bind(Json(&router.current_step))
        .bind(Json(&router.args))
        .bind(Json(&router.initial_step))
        .bind(Json(&router.initial_args))
        .bind(router.awaiting.map(Uuid::from))
        .bind(Json(&router.jobs))
        .bind(router.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
