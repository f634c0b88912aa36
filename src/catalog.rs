// src/catalog.rs
//! In-memory lookup structures built once per job from one bulk read per
//! entity type, then shared across every group in the batch.

use std::collections::HashMap;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::models::{ProductId, ServiceId, StaffId, TenantId};
use crate::normalize::normalize;
use crate::repo::CatalogRepository;

/// A catalog entry keyed by normalized name. The original display name is
/// kept for "did you mean" suggestions.
#[derive(Debug, Clone)]
pub struct CatalogEntry<I> {
    pub id: I,
    pub display_name: String,
}

/// Normalized-name index for one entity type.
pub type NameIndex<I> = HashMap<String, CatalogEntry<I>>;

/// The tenant's full reference data, loaded once per job.
pub struct ReferenceCatalogs {
    pub services_by_name: NameIndex<ServiceId>,
    pub products_by_name: NameIndex<ProductId>,
    /// Normalized SKU -> product. SKU hits take priority over name lookups.
    pub products_by_sku: HashMap<String, ProductId>,
    pub staff_by_name: NameIndex<StaffId>,
    /// Normalized legacy staff code -> staff.
    pub staff_by_code: HashMap<String, StaffId>,
}

impl ReferenceCatalogs {
    pub async fn load(repo: &dyn CatalogRepository, tenant: &TenantId) -> Result<Self> {
        let services = repo
            .load_services(tenant)
            .await
            .context("Catalog: failed to load services")?;
        let products = repo
            .load_products(tenant)
            .await
            .context("Catalog: failed to load products")?;
        let staff = repo
            .load_staff(tenant)
            .await
            .context("Catalog: failed to load staff")?;

        let mut services_by_name: NameIndex<ServiceId> = HashMap::new();
        for record in services {
            let key = normalize(&record.name);
            if key.is_empty() {
                continue;
            }
            services_by_name.insert(
                key,
                CatalogEntry {
                    id: record.id,
                    display_name: record.name,
                },
            );
        }

        let mut products_by_name: NameIndex<ProductId> = HashMap::new();
        let mut products_by_sku: HashMap<String, ProductId> = HashMap::new();
        for record in products {
            if let Some(sku) = record.sku.as_deref() {
                let sku_key = normalize(sku);
                if !sku_key.is_empty() {
                    if let Some(previous) =
                        products_by_sku.insert(sku_key.clone(), record.id.clone())
                    {
                        debug!(
                            "Catalog: duplicate SKU '{}' ({} shadowed by {})",
                            sku_key, previous.0, record.id.0
                        );
                    }
                }
            }
            let key = normalize(&record.name);
            if key.is_empty() {
                continue;
            }
            products_by_name.insert(
                key,
                CatalogEntry {
                    id: record.id,
                    display_name: record.name,
                },
            );
        }

        let mut staff_by_name: NameIndex<StaffId> = HashMap::new();
        let mut staff_by_code: HashMap<String, StaffId> = HashMap::new();
        for record in staff {
            if let Some(code) = record.staff_code.as_deref() {
                let code_key = normalize(code);
                if !code_key.is_empty() {
                    staff_by_code.insert(code_key, record.id.clone());
                }
            }
            let key = normalize(&record.name);
            if key.is_empty() {
                continue;
            }
            staff_by_name.insert(
                key,
                CatalogEntry {
                    id: record.id,
                    display_name: record.name,
                },
            );
        }

        info!(
            "Loaded catalogs for tenant {}: {} services, {} products ({} SKUs), {} staff",
            tenant.0,
            services_by_name.len(),
            products_by_name.len(),
            products_by_sku.len(),
            staff_by_name.len()
        );

        Ok(Self {
            services_by_name,
            products_by_name,
            products_by_sku,
            staff_by_name,
            staff_by_code,
        })
    }
}
