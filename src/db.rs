// src/db.rs

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bb8::Pool;
use bb8_postgres::PostgresConnectionManager;
use log::{debug, info, warn};
use tokio_postgres::{Config, NoTls, Row as PgRow};
use uuid::Uuid;

use crate::models::{
    CustomerId, ImportErrorEntry, ImportJob, ImportJobId, JobProgress, JobStatus, ProductId,
    ReconstructedInvoice, ServiceId, StaffId, TenantId,
};
use crate::repo::{
    CatalogRepository, CustomerDirectory, InvoiceRepository, JobRepository, ProductRecord,
    ServiceRecord, StaffRecord,
};

pub type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// Reads environment variables and constructs a PostgreSQL config.
fn build_pg_config() -> Config {
    let mut config = Config::new();
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port_str = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
    let port = port_str.parse::<u16>().unwrap_or(5432);
    let dbname = std::env::var("POSTGRES_DB").unwrap_or_else(|_| "salon".to_string());
    let user = std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = std::env::var("POSTGRES_PASSWORD").unwrap_or_default();

    info!(
        "DB Config: Host={}, Port={}, DB={}, User={}",
        host, port, dbname, user
    );
    config
        .host(&host)
        .port(port)
        .dbname(&dbname)
        .user(&user)
        .password(&password);
    config.application_name("transaction_import_pipeline");
    config.connect_timeout(Duration::from_secs(10));
    config
}

/// Initializes the database connection pool. One sequential job needs few
/// connections; the pool is sized for several jobs running side by side.
pub async fn connect() -> Result<PgPool> {
    let config = build_pg_config();
    info!("Connecting to PostgreSQL database...");
    let manager = PostgresConnectionManager::new(config, NoTls);

    let pool = Pool::builder()
        .max_size(8)
        .min_idle(Some(1))
        .idle_timeout(Some(Duration::from_secs(180)))
        .connection_timeout(Duration::from_secs(15))
        .build(manager)
        .await
        .context("Failed to build database connection pool")?;

    // Test connection
    let conn = pool
        .get()
        .await
        .context("Failed to get test connection from pool")?;
    conn.query_one("SELECT 1", &[])
        .await
        .context("Test query 'SELECT 1' failed")?;
    info!("Database connection pool initialized successfully.");
    Ok(pool.clone())
}

/// Loads environment variables from a .env file.
pub fn load_env_from_file(file_path: &str) -> Result<()> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    match File::open(file_path) {
        Ok(file) => {
            let reader = BufReader::new(file);
            for line in reader.lines() {
                let line = line.context("Failed to read line from env file")?;
                if line.starts_with('#') || line.trim().is_empty() {
                    continue;
                }
                if let Some(idx) = line.find('=') {
                    let key = line[..idx].trim();
                    let value = line[idx + 1..].trim().trim_matches('"');
                    if std::env::var(key).is_err() {
                        // Set only if not already set
                        std::env::set_var(key, value);
                        debug!(
                            "Set env var from file: {} = {}",
                            key,
                            if key.contains("PASSWORD") || key.contains("KEY") {
                                "[hidden]"
                            } else {
                                value
                            }
                        );
                    }
                }
            }
            info!("Loaded environment variables from {}", file_path);
        }
        Err(e) => {
            warn!(
                "Could not open env file '{}': {}. Proceeding with system environment variables.",
                file_path, e
            );
        }
    }
    Ok(())
}

//------------------------------------------------------------------------------
// IMPORT JOB REPOSITORY
//------------------------------------------------------------------------------

const FIND_JOB_SQL: &str = "
    SELECT id, tenant_id, status, progress, error_log, report_message, created_at, updated_at
    FROM import_job
    WHERE id = $1";

const INSERT_JOB_SQL: &str = "
    INSERT INTO import_job
(id, tenant_id, status, progress, error_log, report_message, created_at, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)";

const UPDATE_JOB_SQL: &str = "
    UPDATE import_job
    SET status = $2, progress = $3, error_log = $4, report_message = $5, updated_at = $6
    WHERE id = $1";

pub struct PgJobRepository {
    pool: PgPool,
}

impl PgJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_job(row: &PgRow) -> Result<ImportJob> {
    let status_str: String = row.get("status");
    let status = JobStatus::from_str(&status_str)
        .ok_or_else(|| anyhow!("unknown import job status '{}'", status_str))?;
    let progress: JobProgress = serde_json::from_value(row.get("progress"))
        .context("import_job.progress is not valid progress JSON")?;
    let error_log: Vec<ImportErrorEntry> = serde_json::from_value(row.get("error_log"))
        .context("import_job.error_log is not a valid error list")?;
    Ok(ImportJob {
        id: ImportJobId(row.get("id")),
        tenant_id: TenantId(row.get("tenant_id")),
        status,
        progress,
        error_log,
        report_message: row.get("report_message"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn find(&self, id: &ImportJobId) -> Result<Option<ImportJob>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Jobs: failed to get DB connection for find")?;
        let row = conn
            .query_opt(FIND_JOB_SQL, &[&id.0])
            .await
            .context("Jobs: failed to query import_job")?;
        row.as_ref().map(row_to_job).transpose()
    }

    async fn insert(&self, job: &ImportJob) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Jobs: failed to get DB connection for insert")?;
        let progress =
            serde_json::to_value(&job.progress).context("Jobs: failed to serialize progress")?;
        let error_log =
            serde_json::to_value(&job.error_log).context("Jobs: failed to serialize error log")?;
        conn.execute(
            INSERT_JOB_SQL,
            &[
                &job.id.0,
                &job.tenant_id.0,
                &job.status.as_str(),
                &progress,
                &error_log,
                &job.report_message,
                &job.created_at,
                &job.updated_at,
            ],
        )
        .await
        .context("Jobs: failed to insert import_job record")?;
        Ok(())
    }

    async fn update(&self, job: &ImportJob) -> Result<()> {
        let conn = self
            .pool
            .get()
            .await
            .context("Jobs: failed to get DB connection for update")?;
        let progress =
            serde_json::to_value(&job.progress).context("Jobs: failed to serialize progress")?;
        let error_log =
            serde_json::to_value(&job.error_log).context("Jobs: failed to serialize error log")?;
        let updated = conn
            .execute(
                UPDATE_JOB_SQL,
                &[
                    &job.id.0,
                    &job.status.as_str(),
                    &progress,
                    &error_log,
                    &job.report_message,
                    &job.updated_at,
                ],
            )
            .await
            .context("Jobs: failed to update import_job record")?;
        if updated == 0 {
            return Err(anyhow!("import job '{}' vanished during update", job.id.0));
        }
        Ok(())
    }
}

//------------------------------------------------------------------------------
// CATALOG REPOSITORY
//------------------------------------------------------------------------------

const LOAD_SERVICES_SQL: &str = "
    SELECT id, name FROM service
    WHERE tenant_id = $1 AND name IS NOT NULL AND name != ''";

const LOAD_PRODUCTS_SQL: &str = "
    SELECT id, name, sku FROM product
    WHERE tenant_id = $1 AND name IS NOT NULL AND name != ''";

const LOAD_STAFF_SQL: &str = "
    SELECT id, name, staff_code FROM staff
    WHERE tenant_id = $1 AND name IS NOT NULL AND name != ''";

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn load_services(&self, tenant: &TenantId) -> Result<Vec<ServiceRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Catalog: failed to get DB connection for services")?;
        let rows = conn
            .query(LOAD_SERVICES_SQL, &[&tenant.0])
            .await
            .context("Catalog: failed to query services")?;
        Ok(rows
            .iter()
            .map(|row| ServiceRecord {
                id: ServiceId(row.get("id")),
                name: row.get("name"),
            })
            .collect())
    }

    async fn load_products(&self, tenant: &TenantId) -> Result<Vec<ProductRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Catalog: failed to get DB connection for products")?;
        let rows = conn
            .query(LOAD_PRODUCTS_SQL, &[&tenant.0])
            .await
            .context("Catalog: failed to query products")?;
        Ok(rows
            .iter()
            .map(|row| ProductRecord {
                id: ProductId(row.get("id")),
                name: row.get("name"),
                sku: row.get("sku"),
            })
            .collect())
    }

    async fn load_staff(&self, tenant: &TenantId) -> Result<Vec<StaffRecord>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Catalog: failed to get DB connection for staff")?;
        let rows = conn
            .query(LOAD_STAFF_SQL, &[&tenant.0])
            .await
            .context("Catalog: failed to query staff")?;
        Ok(rows
            .iter()
            .map(|row| StaffRecord {
                id: StaffId(row.get("id")),
                name: row.get("name"),
                staff_code: row.get("staff_code"),
            })
            .collect())
    }
}

//------------------------------------------------------------------------------
// CUSTOMER DIRECTORY
//------------------------------------------------------------------------------

const FIND_CUSTOMER_SQL: &str = "
    SELECT id FROM customer
    WHERE tenant_id = $1 AND phone_blind_index = $2";

pub struct PgCustomerDirectory {
    pool: PgPool,
}

impl PgCustomerDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CustomerDirectory for PgCustomerDirectory {
    async fn find_by_blind_index(
        &self,
        tenant: &TenantId,
        token: &str,
    ) -> Result<Option<CustomerId>> {
        let conn = self
            .pool
            .get()
            .await
            .context("Customers: failed to get DB connection")?;
        let row = conn
            .query_opt(FIND_CUSTOMER_SQL, &[&tenant.0, &token])
            .await
            .context("Customers: failed to query by blind index")?;
        Ok(row.map(|r| CustomerId(r.get("id"))))
    }
}

//------------------------------------------------------------------------------
// INVOICE REPOSITORY
//------------------------------------------------------------------------------

const INSERT_INVOICE_SQL: &str = "
    INSERT INTO invoice
(id, tenant_id, invoice_number, customer_id, primary_staff_id, line_items,
 service_total, product_total, subtotal, grand_total, payment_details,
 is_imported, occurred_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)";

pub struct PgInvoiceRepository {
    pool: PgPool,
}

impl PgInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvoiceRepository for PgInvoiceRepository {
    async fn insert(&self, invoice: &ReconstructedInvoice) -> Result<String> {
        let conn = self
            .pool
            .get()
            .await
            .context("Invoices: failed to get DB connection")?;
        let id = Uuid::new_v4().to_string();
        let line_items = serde_json::to_value(&invoice.line_items)
            .context("Invoices: failed to serialize line items")?;
        let payment = serde_json::to_value(&invoice.payment)
            .context("Invoices: failed to serialize payment details")?;
        conn.execute(
            INSERT_INVOICE_SQL,
            &[
                &id,
                &invoice.tenant_id.0,
                &invoice.invoice_number,
                &invoice.customer_id.0,
                &invoice.primary_staff_id.0,
                &line_items,
                &invoice.service_total,
                &invoice.product_total,
                &invoice.subtotal,
                &invoice.grand_total,
                &payment,
                &invoice.is_imported,
                &invoice.occurred_at,
            ],
        )
        .await
        .context("Invoices: failed to insert invoice record")?;
        Ok(id)
    }
}
