//! `PostgreSQL` order store for lab orders.
//!
//! Implements [`OrderStore`] over three tables (`lab_orders`, `lab_tests`, `lab_results`) and
//! the `lab_order_number_seq` sequence created by the bundled migrations.
//!
//! Result ingestion runs in one transaction that holds a row lock on the order
//! (`SELECT ... FOR UPDATE`), so concurrent submissions for the same order are serialized and
//! exactly one of them observes the order becoming ready.
//!
//! # Example
//!
//! ```ignore
//! use lab_orders_postgres::{PoolSettings, PostgresOrderStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store =
//!         PostgresOrderStore::connect("postgres://localhost/lab", &PoolSettings::default()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;

use chrono::{DateTime, Utc};
use lab_orders_core::lifecycle::apply_result;
use lab_orders_core::store::{OrderStore, RecordedResult, StoreError, StoreFuture};
use lab_orders_core::types::{
    LabOrder, LabTest, OrderId, OrderNumber, OrderStatus, ResultSubmission, UserId,
};
use rows::{ORDER_COLUMNS, attach_tests, db_error, load_tests, order_from_row};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Name of the unique constraint guarding order numbers.
const ORDER_NUMBER_CONSTRAINT: &str = "lab_orders_order_number_key";

/// Errors raised while setting up the store.
#[derive(Error, Debug)]
pub enum PostgresSetupError {
    /// The pool could not connect.
    #[error("Failed to connect to database: {0}")]
    Connect(#[source] sqlx::Error),

    /// A migration failed to apply.
    #[error("Migration failed: {0}")]
    Migrate(#[source] sqlx::migrate::MigrateError),
}

/// Connection pool sizing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    /// Upper bound on open connections
    pub max_connections: u32,
    /// Idle connections kept warm
    pub min_connections: u32,
    /// How long to wait for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl PoolSettings {
    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
    }
}

/// `PostgreSQL`-backed [`OrderStore`].
#[derive(Clone, Debug)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url` sized by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresSetupError::Connect`] if the database is unreachable.
    pub async fn connect(
        database_url: &str,
        settings: &PoolSettings,
    ) -> Result<Self, PostgresSetupError> {
        let pool = settings
            .options()
            .connect(database_url)
            .await
            .map_err(PostgresSetupError::Connect)?;
        tracing::info!(
            max_connections = settings.max_connections,
            min_connections = settings.min_connections,
            "Connected to order database"
        );
        Ok(Self::new(pool))
    }

    /// Apply the bundled schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresSetupError::Migrate`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), PostgresSetupError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(PostgresSetupError::Migrate)?;
        tracing::info!("Order schema up to date");
        Ok(())
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert(&self, order: &LabOrder) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(|e| db_error(&e))?;

        let inserted = sqlx::query(
            r"
            INSERT INTO lab_orders
                (id, order_number, patient_id, provider_id, encounter_id,
                 priority, status, clinical_notes, created_at, resulted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.patient_id.as_uuid())
        .bind(order.provider_id.as_uuid())
        .bind(order.encounter_id.as_uuid())
        .bind(order.priority.as_str())
        .bind(order.status.as_str())
        .bind(order.clinical_notes.as_deref())
        .bind(order.created_at)
        .bind(order.resulted_at)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            if let sqlx::Error::Database(db_err) = &e {
                if db_err.constraint() == Some(ORDER_NUMBER_CONSTRAINT) {
                    return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
                }
            }
            return Err(db_error(&e));
        }

        for (position, test) in order.tests.iter().enumerate() {
            let position = i32::try_from(position)
                .map_err(|_| StoreError::DatabaseError("too many tests on one order".into()))?;
            sqlx::query(
                r"
                INSERT INTO lab_tests
                    (id, order_id, position, test_code, test_name, specimen_type, status, performed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
            )
            .bind(test.id.as_uuid())
            .bind(order.id.as_uuid())
            .bind(position)
            .bind(&test.test_code)
            .bind(&test.test_name)
            .bind(test.specimen_type.as_deref())
            .bind(test.status.as_str())
            .bind(test.performed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(&e))?;

            if test.result.is_some() {
                write_result(&mut *tx, test).await?;
            }
        }

        tx.commit().await.map_err(|e| db_error(&e))?;
        tracing::debug!(order_id = %order.id, order_number = %order.order_number, "Order inserted");
        Ok(())
    }

    async fn load(&self, order_id: OrderId) -> Result<Option<LabOrder>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(|e| db_error(&e))?;
        load_order(&mut *conn, order_id, false).await
    }

    async fn list(&self, statuses: &[OrderStatus]) -> Result<Vec<LabOrder>, StoreError> {
        let statuses: Vec<&str> = statuses.iter().map(OrderStatus::as_str).collect();
        let mut conn = self.pool.acquire().await.map_err(|e| db_error(&e))?;

        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM lab_orders \
             WHERE status = ANY($1) \
             ORDER BY created_at, order_number"
        ))
        .bind(&statuses)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| db_error(&e))?;

        let mut orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        if orders.is_empty() {
            return Ok(orders);
        }

        let ids: Vec<Uuid> = orders.iter().map(|o| *o.id.as_uuid()).collect();
        let tests = load_tests(&mut *conn, &ids).await?;
        attach_tests(&mut orders, tests)?;
        Ok(orders)
    }

    async fn record(
        &self,
        order_id: OrderId,
        submission: ResultSubmission,
        verified_by: UserId,
        now: DateTime<Utc>,
    ) -> Result<RecordedResult, StoreError> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await.map_err(|e| db_error(&e))?;

        let mut order = load_order(&mut *tx, order_id, true)
            .await?
            .ok_or(StoreError::OrderNotFound(order_id))?;

        // On error the transaction is dropped and rolled back.
        let applied = apply_result(&mut order, &submission, verified_by, now)?;

        let test = order
            .test(applied.test_id)
            .ok_or_else(|| StoreError::CorruptRow(format!("test {} vanished", applied.test_id)))?;
        write_result(&mut *tx, test).await?;

        sqlx::query("UPDATE lab_tests SET status = $2, performed_at = $3 WHERE id = $1")
            .bind(test.id.as_uuid())
            .bind(test.status.as_str())
            .bind(test.performed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(&e))?;

        sqlx::query("UPDATE lab_orders SET status = $2, resulted_at = $3 WHERE id = $1")
            .bind(order.id.as_uuid())
            .bind(order.status.as_str())
            .bind(order.resulted_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(&e))?;

        tx.commit().await.map_err(|e| db_error(&e))?;

        metrics::histogram!("lab_orders.store.record_result.duration_seconds")
            .record(started.elapsed().as_secs_f64());

        Ok(RecordedResult { order, applied })
    }
}

/// Load one order with its tests, optionally taking the row lock.
async fn load_order(
    conn: &mut PgConnection,
    order_id: OrderId,
    for_update: bool,
) -> Result<Option<LabOrder>, StoreError> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row = sqlx::query(&format!(
        "SELECT {ORDER_COLUMNS} FROM lab_orders WHERE id = $1{lock}"
    ))
    .bind(order_id.as_uuid())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| db_error(&e))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut orders = vec![order_from_row(&row)?];
    let tests = load_tests(conn, &[*order_id.as_uuid()]).await?;
    attach_tests(&mut orders, tests)?;
    Ok(orders.pop())
}

/// Upsert the result row of `test`. A test without a result is a no-op.
async fn write_result(conn: &mut PgConnection, test: &LabTest) -> Result<(), StoreError> {
    let Some(result) = &test.result else {
        return Ok(());
    };

    sqlx::query(
        r"
        INSERT INTO lab_results
            (test_id, value, unit, reference_range, abnormal_flag, comment, verified_by, verified_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (test_id) DO UPDATE SET
            value = EXCLUDED.value,
            unit = EXCLUDED.unit,
            reference_range = EXCLUDED.reference_range,
            abnormal_flag = EXCLUDED.abnormal_flag,
            comment = EXCLUDED.comment,
            verified_by = EXCLUDED.verified_by,
            verified_at = EXCLUDED.verified_at
        ",
    )
    .bind(test.id.as_uuid())
    .bind(&result.value)
    .bind(&result.unit)
    .bind(result.reference_range.as_deref())
    .bind(result.abnormal_flag.as_str())
    .bind(result.comment.as_deref())
    .bind(result.verified_by.as_uuid())
    .bind(result.verified_at)
    .execute(&mut *conn)
    .await
    .map_err(|e| db_error(&e))?;
    Ok(())
}

impl OrderStore for PostgresOrderStore {
    fn insert_order<'a>(&'a self, order: &'a LabOrder) -> StoreFuture<'a, ()> {
        Box::pin(self.insert(order))
    }

    fn get_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<LabOrder>> {
        Box::pin(self.load(order_id))
    }

    fn order_number_exists<'a>(&'a self, order_number: &'a OrderNumber) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM lab_orders WHERE order_number = $1)",
            )
            .bind(order_number.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(&e))
        })
    }

    fn next_order_sequence(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let value: i64 = sqlx::query_scalar("SELECT nextval('lab_order_number_seq')")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| db_error(&e))?;
            u64::try_from(value)
                .map_err(|_| StoreError::CorruptRow(format!("negative order sequence {value}")))
        })
    }

    fn list_orders_by_status<'a>(
        &'a self,
        statuses: &'a [OrderStatus],
    ) -> StoreFuture<'a, Vec<LabOrder>> {
        Box::pin(self.list(statuses))
    }

    fn record_result(
        &self,
        order_id: OrderId,
        submission: ResultSubmission,
        verified_by: UserId,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, RecordedResult> {
        Box::pin(self.record(order_id, submission, verified_by, now))
    }
}
