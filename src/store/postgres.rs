//! PostgreSQL record store.
//!
//! Jobs, bids and profiles live in three tables. Each row carries the
//! columns queries filter on plus the full record as a JSONB `doc`. A commit runs in one
//! transaction: preconditions lock their rows with `SELECT ... FOR UPDATE`,
//! writes follow, and change notifications go out after `COMMIT`.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{JobOrder, JobQuery, Precondition, RecordStore, StoreChange, Write, WriteBatch};
use crate::config::DatabaseConfig;
use crate::domain::{Bid, BidId, EventBus, Job, JobId, Profile, Uid};
use crate::error::MarketError;

/// Idempotent schema, applied in order at startup.
const SCHEMA: [&str; 8] = [
    "CREATE TABLE IF NOT EXISTS jobs (
        id UUID PRIMARY KEY,
        user_uid TEXT NOT NULL,
        assigned_bidder_uid TEXT,
        status TEXT NOT NULL,
        created_at_millis BIGINT NOT NULL,
        expires_at TIMESTAMPTZ,
        doc JSONB NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS jobs_user_uid_idx ON jobs (user_uid)",
    "CREATE INDEX IF NOT EXISTS jobs_assigned_bidder_uid_idx ON jobs (assigned_bidder_uid)",
    "CREATE INDEX IF NOT EXISTS jobs_status_expires_at_idx ON jobs (status, expires_at)",
    "CREATE TABLE IF NOT EXISTS bids (
        id UUID PRIMARY KEY,
        job_id UUID NOT NULL REFERENCES jobs (id) ON DELETE CASCADE,
        bidder_uid TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at_millis BIGINT NOT NULL,
        doc JSONB NOT NULL,
        UNIQUE (job_id, bidder_uid)
    )",
    "CREATE INDEX IF NOT EXISTS bids_job_id_idx ON bids (job_id, created_at_millis)",
    "CREATE INDEX IF NOT EXISTS bids_bidder_uid_idx ON bids (bidder_uid, created_at_millis)",
    "CREATE TABLE IF NOT EXISTS profiles (
        uid TEXT PRIMARY KEY,
        updated_at TIMESTAMPTZ NOT NULL,
        doc JSONB NOT NULL
    )",
];

/// Record store backed by a `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    changes: EventBus<StoreChange>,
}

impl PostgresStore {
    /// Wraps an existing pool. Call [`PostgresStore::ensure_schema`] before
    /// first use.
    #[must_use]
    pub fn new(pool: PgPool, change_capacity: usize) -> Self {
        Self {
            pool,
            changes: EventBus::new(change_capacity),
        }
    }

    /// Connects to the database and applies the schema.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] if the database is unreachable or the
    /// schema cannot be applied.
    pub async fn connect(
        config: &DatabaseConfig,
        change_capacity: usize,
    ) -> Result<Self, MarketError> {
        let url = config.url.as_deref().ok_or_else(|| {
            MarketError::Store("DATABASE_URL is required for the postgres backend".to_string())
        })?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await?;
        let store = Self::new(pool, change_capacity);
        store.ensure_schema().await?;
        info!(
            max_connections = config.max_connections,
            "postgres record store ready"
        );
        Ok(store)
    }

    /// Creates tables and indexes that do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`MarketError::Store`] on database failure.
    pub async fn ensure_schema(&self) -> Result<(), MarketError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn get_job(&self, job_id: JobId) -> Result<Option<Job>, MarketError> {
        let row = sqlx::query_scalar::<_, Json<Job>>("SELECT doc FROM jobs WHERE id = $1")
            .bind(*job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|Json(job)| job))
    }

    async fn get_bid(&self, job_id: JobId, bid_id: BidId) -> Result<Option<Bid>, MarketError> {
        let row = sqlx::query_scalar::<_, Json<Bid>>(
            "SELECT doc FROM bids WHERE id = $1 AND job_id = $2",
        )
        .bind(*bid_id.as_uuid())
        .bind(*job_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(bid)| bid))
    }

    async fn query_jobs(&self, query: &JobQuery) -> Result<Vec<Job>, MarketError> {
        let rows = select_jobs(query)
            .build_query_scalar::<Json<Job>>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|Json(job)| job).collect())
    }

    async fn list_bids(&self, job_id: JobId) -> Result<Vec<Bid>, MarketError> {
        let rows = sqlx::query_scalar::<_, Json<Bid>>(
            "SELECT doc FROM bids WHERE job_id = $1 ORDER BY created_at_millis, id",
        )
        .bind(*job_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(bid)| bid).collect())
    }

    async fn bids_by_bidder(&self, bidder: &Uid) -> Result<Vec<Bid>, MarketError> {
        let rows = sqlx::query_scalar::<_, Json<Bid>>(
            "SELECT doc FROM bids WHERE bidder_uid = $1 ORDER BY created_at_millis DESC, id",
        )
        .bind(bidder.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|Json(bid)| bid).collect())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), MarketError> {
        let (preconditions, writes) = batch.into_parts();
        let mut tx = self.pool.begin().await?;

        for precondition in &preconditions {
            if !holds(&mut tx, precondition).await? {
                debug!(precondition = %precondition, "commit rejected");
                return Err(precondition.conflict());
            }
        }
        for write in &writes {
            apply(&mut tx, write)
                .await
                .map_err(|err| write_error(err, write))?;
        }
        tx.commit().await?;

        // TODO: relay changes through LISTEN/NOTIFY so that several gateway
        // instances sharing one database see each other's commits.
        for write in &writes {
            self.changes.publish(write.change());
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    async fn get_profile(&self, uid: &Uid) -> Result<Option<Profile>, MarketError> {
        let row = sqlx::query_scalar::<_, Json<Profile>>("SELECT doc FROM profiles WHERE uid = $1")
            .bind(uid.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|Json(profile)| profile))
    }

    async fn put_profile(&self, profile: Profile) -> Result<(), MarketError> {
        sqlx::query(
            "INSERT INTO profiles (uid, updated_at, doc) VALUES ($1, $2, $3) \
             ON CONFLICT (uid) DO UPDATE SET updated_at = EXCLUDED.updated_at, doc = EXCLUDED.doc",
        )
        .bind(profile.uid.as_str())
        .bind(profile.updated_at)
        .bind(Json(&profile))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Builds the job query for `query`, with every filter bound as a parameter.
fn select_jobs(query: &JobQuery) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("SELECT doc FROM jobs WHERE TRUE");
    if let Some(poster) = &query.poster {
        builder
            .push(" AND user_uid = ")
            .push_bind(poster.as_str().to_owned());
    }
    if let Some(bidder) = &query.assigned_bidder {
        builder
            .push(" AND assigned_bidder_uid = ")
            .push_bind(bidder.as_str().to_owned());
    }
    if !query.statuses.is_empty() {
        let statuses: Vec<String> = query
            .statuses
            .iter()
            .map(|status| status.as_str().to_owned())
            .collect();
        builder
            .push(" AND status = ANY(")
            .push_bind(statuses)
            .push(")");
    }
    if let Some(after) = query.expires_after {
        builder.push(" AND expires_at > ").push_bind(after);
    }
    builder.push(match query.order {
        JobOrder::NewestFirst => " ORDER BY created_at_millis DESC, id",
        JobOrder::SoonestExpiry => " ORDER BY expires_at ASC NULLS FIRST, created_at_millis, id",
    });
    if let Some(limit) = query.limit {
        builder
            .push(" LIMIT ")
            .push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    builder
}

async fn holds(conn: &mut PgConnection, precondition: &Precondition) -> Result<bool, sqlx::Error> {
    match precondition {
        Precondition::JobStatus { job_id, expected } => {
            let status = sqlx::query_scalar::<_, String>(
                "SELECT status FROM jobs WHERE id = $1 FOR UPDATE",
            )
            .bind(*job_id.as_uuid())
            .fetch_optional(conn)
            .await?;
            Ok(status.as_deref() == Some(expected.as_str()))
        }
        Precondition::BidStatus {
            job_id,
            bid_id,
            expected,
        } => {
            let status = sqlx::query_scalar::<_, String>(
                "SELECT status FROM bids WHERE id = $1 AND job_id = $2 FOR UPDATE",
            )
            .bind(*bid_id.as_uuid())
            .bind(*job_id.as_uuid())
            .fetch_optional(conn)
            .await?;
            Ok(status.as_deref() == Some(expected.as_str()))
        }
        Precondition::NoBidFrom { job_id, bidder } => {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM bids WHERE job_id = $1 AND bidder_uid = $2)",
            )
            .bind(*job_id.as_uuid())
            .bind(bidder.as_str())
            .fetch_one(conn)
            .await?;
            Ok(!exists)
        }
    }
}

/// Applies one write. Missing targets surface as `RowNotFound`.
async fn apply(conn: &mut PgConnection, write: &Write) -> Result<(), sqlx::Error> {
    let affected = match write {
        Write::PutJob(job) => sqlx::query(
            "INSERT INTO jobs (id, user_uid, assigned_bidder_uid, status, created_at_millis, expires_at, doc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (id) DO UPDATE SET \
                assigned_bidder_uid = EXCLUDED.assigned_bidder_uid, \
                status = EXCLUDED.status, \
                expires_at = EXCLUDED.expires_at, \
                doc = EXCLUDED.doc",
        )
        .bind(*job.id.as_uuid())
        .bind(job.user_uid.as_str())
        .bind(job.assigned_bidder_uid.as_ref().map(Uid::as_str))
        .bind(job.status.as_str())
        .bind(job.created_at_millis)
        .bind(job.expires_at)
        .bind(Json(job))
        .execute(&mut *conn)
        .await?
        .rows_affected(),
        Write::PutBid(bid) => sqlx::query(
            "INSERT INTO bids (id, job_id, bidder_uid, status, created_at_millis, doc) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET status = EXCLUDED.status, doc = EXCLUDED.doc",
        )
        .bind(*bid.id.as_uuid())
        .bind(*bid.job_id.as_uuid())
        .bind(bid.bidder_uid.as_str())
        .bind(bid.status.as_str())
        .bind(bid.created_at_millis)
        .bind(Json(bid))
        .execute(&mut *conn)
        .await?
        .rows_affected(),
        Write::SetBidStatus {
            job_id,
            bid_id,
            status,
        } => sqlx::query(
            "UPDATE bids SET status = $3, doc = jsonb_set(doc, '{status}', to_jsonb($3::text)) \
             WHERE id = $1 AND job_id = $2",
        )
        .bind(*bid_id.as_uuid())
        .bind(*job_id.as_uuid())
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?
        .rows_affected(),
        Write::DeleteJob(job_id) => sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(*job_id.as_uuid())
            .execute(&mut *conn)
            .await?
            .rows_affected(),
    };
    if affected == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Maps a failed write to the domain error it stands for.
fn write_error(err: sqlx::Error, write: &Write) -> MarketError {
    let (job_id, bid_id) = match write {
        Write::PutJob(job) => (job.id, None),
        Write::PutBid(bid) => (bid.job_id, Some(bid.id)),
        Write::SetBidStatus { job_id, bid_id, .. } => (*job_id, Some(*bid_id)),
        Write::DeleteJob(job_id) => (*job_id, None),
    };
    match &err {
        sqlx::Error::RowNotFound => match (write, bid_id) {
            (Write::SetBidStatus { .. }, Some(bid_id)) => MarketError::BidNotFound(bid_id),
            _ => MarketError::JobNotFound(job_id),
        },
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            MarketError::Conflict(format!("bidder already has a bid on job {job_id}"))
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            MarketError::JobNotFound(job_id)
        }
        _ => MarketError::from(err),
    }
}
