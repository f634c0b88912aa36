// src/repo.rs
//! Persistence boundary of the pipeline. The orchestrator only ever talks
//! to these traits; Postgres implementations live in `db`, tests inject
//! in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::models::{
    CustomerId, ImportJob, ImportJobId, ProductId, ReconstructedInvoice, ServiceId, StaffId,
    TenantId,
};

/// Bulk catalog row for a service.
#[derive(Debug, Clone)]
pub struct ServiceRecord {
    pub id: ServiceId,
    pub name: String,
}

/// Bulk catalog row for a retail product. SKU is optional in the catalog,
/// same as in the legacy sheets.
#[derive(Debug, Clone)]
pub struct ProductRecord {
    pub id: ProductId,
    pub name: String,
    pub sku: Option<String>,
}

/// Bulk catalog row for a staff member. `staff_code` is the short
/// identifier printed on legacy receipts.
#[derive(Debug, Clone)]
pub struct StaffRecord {
    pub id: StaffId,
    pub name: String,
    pub staff_code: Option<String>,
}

/// Find/insert/update access to the import job document.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn find(&self, id: &ImportJobId) -> Result<Option<ImportJob>>;
    async fn insert(&self, job: &ImportJob) -> Result<()>;
    async fn update(&self, job: &ImportJob) -> Result<()>;
}

/// One bulk read per entity type, scoped to the tenant. Customers are
/// deliberately absent: they are resolved per invoice through the blind
/// index, so preloading would materialize that index in memory for no
/// benefit.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn load_services(&self, tenant: &TenantId) -> Result<Vec<ServiceRecord>>;
    async fn load_products(&self, tenant: &TenantId) -> Result<Vec<ProductRecord>>;
    async fn load_staff(&self, tenant: &TenantId) -> Result<Vec<StaffRecord>>;
}

/// Privacy-preserving customer lookup by blind-index token.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn find_by_blind_index(
        &self,
        tenant: &TenantId,
        token: &str,
    ) -> Result<Option<CustomerId>>;
}

/// Persists one reconstructed invoice, returning the stored id.
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    async fn insert(&self, invoice: &ReconstructedInvoice) -> Result<String>;
}

/// Opaque one-way `blind_index(plaintext) -> token` primitive. Input is the
/// digits-only phone; output must match whatever tokens the customer store
/// was written with.
pub trait BlindIndexer: Send + Sync {
    fn token_for(&self, phone_digits: &str) -> String;
}

/// Keyed SHA-256 blind indexer used by the worker binary. Real deployments
/// wire in their platform's indexer instead.
pub struct KeyedBlindIndexer {
    key: String,
}

impl KeyedBlindIndexer {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl BlindIndexer for KeyedBlindIndexer {
    fn token_for(&self, phone_digits: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.key.as_bytes());
        hasher.update(b":");
        hasher.update(phone_digits.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyed_blind_indexer_is_deterministic() {
        let indexer = KeyedBlindIndexer::new("k1");
        assert_eq!(indexer.token_for("9876543210"), indexer.token_for("9876543210"));
        assert_ne!(indexer.token_for("9876543210"), indexer.token_for("9876543211"));
    }

    #[test]
    fn test_keyed_blind_indexer_depends_on_key() {
        let a = KeyedBlindIndexer::new("k1");
        let b = KeyedBlindIndexer::new("k2");
        assert_ne!(a.token_for("9876543210"), b.token_for("9876543210"));
    }
}
