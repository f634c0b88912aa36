// src/main.rs
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::info;
use uuid::Uuid;

use salon_import_lib::{
    config::ImportConfig,
    db,
    models::{ImportJob, ImportJobId, TenantId},
    pipeline::{run_import_job, PipelineDeps},
    repo::{JobRepository, KeyedBlindIndexer},
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting historical transaction import worker");

    let env_paths = [".env", ".env.local", "../.env"];
    for path in env_paths.iter() {
        if Path::new(path).exists() {
            db::load_env_from_file(path)?;
            break;
        }
    }

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 || args.len() > 4 {
        bail!(
            "usage: {} <tenant_id> <spreadsheet.xlsx> [job_id]",
            args.first().map(String::as_str).unwrap_or("salon_import")
        );
    }
    let tenant_id = TenantId(args[1].clone());
    let file_path = PathBuf::from(&args[2]);

    let config = ImportConfig::from_env();
    let pool = db::connect()
        .await
        .context("Failed to connect to database")?;

    let jobs = db::PgJobRepository::new(pool.clone());
    let catalogs = db::PgCatalogRepository::new(pool.clone());
    let customers = db::PgCustomerDirectory::new(pool.clone());
    let invoices = db::PgInvoiceRepository::new(pool);
    let blind_indexer = KeyedBlindIndexer::new(config.blind_index_key.clone());

    // Normally the upload handler queues the job; when invoked ad hoc from
    // the command line, create one here.
    let job_id = match args.get(3) {
        Some(id) => ImportJobId(id.clone()),
        None => {
            let job = ImportJob::new_queued(
                ImportJobId(Uuid::new_v4().to_string()),
                tenant_id.clone(),
                Utc::now().naive_utc(),
            );
            jobs.insert(&job)
                .await
                .context("Failed to create import job record")?;
            info!("Created import job '{}'", job.id.0);
            job.id
        }
    };

    let deps = PipelineDeps {
        jobs: &jobs,
        catalogs: &catalogs,
        customers: &customers,
        invoices: &invoices,
        blind_indexer: &blind_indexer,
        config: &config,
    };

    let outcome = run_import_job(&deps, &job_id, &file_path).await?;
    info!(
        "Import job '{}' finished: {} imported, {} failed of {} groups",
        job_id.0, outcome.processed, outcome.failed, outcome.total
    );
    Ok(())
}
