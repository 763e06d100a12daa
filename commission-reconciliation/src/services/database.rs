//! Postgres-backed transaction store.

use crate::models::{Transaction, TransactionFilter};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{InsertReport, StoreError, TransactionStore};
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

const SELECT_COLUMNS: &str = r#"
    SELECT transaction_id, policy_number, customer, carrier, mga, transaction_type,
           effective_date, policy_origination_date, prior_policy_number, original_effective_date,
           premium, agent_rate, broker_fee_agent_comm, commission_due, amount_paid,
           statement_date, reconciliation_id, reverses_transaction_id, notes, created_utc
    FROM transactions
"#;

fn unavailable(context: &str, e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {}", context, e))
}

/// Transaction store over a Postgres connection pool.
#[derive(Clone)]
pub struct PgTransactionStore {
    pool: PgPool,
}

impl PgTransactionStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "commission-reconciliation"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    #[instrument(skip(self))]
    async fn query(&self, filter: &TransactionFilter) -> Result<Vec<Transaction>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["query_transactions"])
            .start_timer();

        let sql = format!(
            r#"{}
            WHERE ($1::TEXT IS NULL OR LOWER(TRIM(policy_number)) = LOWER(TRIM($1)))
              AND ($2::TEXT IS NULL OR LOWER(TRIM(customer)) = LOWER(TRIM($2)))
              AND ($3::TEXT IS NULL OR reconciliation_id = $3)
              AND ($4::TEXT IS NULL OR reverses_transaction_id = $4)
              AND ($5::DATE IS NULL OR statement_date >= $5)
              AND ($6::DATE IS NULL OR statement_date <= $6)
            ORDER BY transaction_id
            "#,
            SELECT_COLUMNS
        );

        let transactions = sqlx::query_as::<_, Transaction>(&sql)
            .bind(filter.policy_number.as_deref())
            .bind(filter.customer.as_deref())
            .bind(filter.reconciliation_id.as_deref())
            .bind(filter.reverses_transaction_id.as_deref())
            .bind(filter.statement_from)
            .bind(filter.statement_to)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| unavailable("Failed to query transactions", e))?;

        timer.observe_duration();
        Ok(transactions)
    }

    #[instrument(skip(self), fields(transaction_id = %transaction_id))]
    async fn get(&self, transaction_id: &str) -> Result<Option<Transaction>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_transaction"])
            .start_timer();

        let sql = format!("{} WHERE transaction_id = $1", SELECT_COLUMNS);
        let transaction = sqlx::query_as::<_, Transaction>(&sql)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| unavailable("Failed to get transaction", e))?;

        timer.observe_duration();
        Ok(transaction)
    }

    /// One database transaction for the whole batch; an existing id is
    /// reported as a conflict and left untouched.
    #[instrument(skip(self, records), fields(count = records.len()))]
    async fn insert_many(&self, records: &[Transaction]) -> Result<InsertReport, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_transactions"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| unavailable("Failed to begin transaction", e))?;

        let mut report = InsertReport::default();
        for record in records {
            let result = sqlx::query(
                r#"
                INSERT INTO transactions (
                    transaction_id, policy_number, customer, carrier, mga, transaction_type,
                    effective_date, policy_origination_date, prior_policy_number,
                    original_effective_date, premium, agent_rate, broker_fee_agent_comm,
                    commission_due, amount_paid, statement_date, reconciliation_id,
                    reverses_transaction_id, notes, created_utc
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                        $16, $17, $18, $19, COALESCE($20, NOW()))
                ON CONFLICT (transaction_id) DO NOTHING
                "#,
            )
            .bind(&record.transaction_id)
            .bind(&record.policy_number)
            .bind(&record.customer)
            .bind(&record.carrier)
            .bind(&record.mga)
            .bind(&record.transaction_type)
            .bind(record.effective_date)
            .bind(record.policy_origination_date)
            .bind(&record.prior_policy_number)
            .bind(record.original_effective_date)
            .bind(record.premium)
            .bind(record.agent_rate)
            .bind(record.broker_fee_agent_comm)
            .bind(record.commission_due)
            .bind(record.amount_paid)
            .bind(record.statement_date)
            .bind(&record.reconciliation_id)
            .bind(&record.reverses_transaction_id)
            .bind(&record.notes)
            .bind(record.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::WriteRejected {
                // The transaction rolls back on drop.
                persisted: Vec::new(),
                reason: format!("insert of {} failed: {}", record.transaction_id, e),
            })?;

            if result.rows_affected() == 0 {
                report.conflicts.push(record.transaction_id.clone());
            } else {
                report.inserted.push(record.transaction_id.clone());
            }
        }

        tx.commit().await.map_err(|e| StoreError::WriteRejected {
            persisted: Vec::new(),
            reason: format!("commit failed: {}", e),
        })?;

        timer.observe_duration();
        info!(
            inserted = report.inserted.len(),
            conflicts = report.conflicts.len(),
            "Transactions inserted"
        );
        Ok(report)
    }

    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| unavailable("Health check failed", e))?;

        timer.observe_duration();
        Ok(())
    }
}
