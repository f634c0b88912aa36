// src/reconstruct.rs
//! Rebuilds one structured invoice from one group of legacy rows. Any hard
//! failure aborts reconstruction for that group only; no partial invoice
//! is ever produced, and sibling groups are unaffected.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use log::debug;
use thiserror::Error;

use crate::catalog::ReferenceCatalogs;
use crate::models::{
    GroupKey, InvoiceGroup, InvoiceLineItem, ItemType, PaymentBreakdown, RawDate,
    ReconstructedInvoice, SourceRow, StaffId, TenantId,
};
use crate::normalize::{normalize_opt, phone_digits};
use crate::repo::{BlindIndexer, CustomerDirectory};
use crate::resolve::{self, EntityKind};

/// Day zero of the spreadsheet date-serial scheme.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// Largest serial still inside chrono's representable range; anything
/// beyond it is garbage input, not a date.
const MAX_SERIAL: f64 = 2_958_465.0; // 9999-12-31

/// A group-local failure. Recorded in the job's error log; never aborts
/// the batch.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("group '{group_key}': {message}")]
pub struct GroupError {
    pub group_key: String,
    pub message: String,
}

impl GroupError {
    fn new(key: &GroupKey, message: impl Into<String>) -> Self {
        Self {
            group_key: key.as_str().to_string(),
            message: message.into(),
        }
    }
}

/// Everything `reconstruct` needs besides the group itself. Catalogs are
/// shared across the whole batch; the customer directory is consulted once
/// per group.
pub struct ReconstructContext<'a> {
    pub tenant_id: &'a TenantId,
    pub catalogs: &'a ReferenceCatalogs,
    pub customers: &'a dyn CustomerDirectory,
    pub blind_indexer: &'a dyn BlindIndexer,
    pub fuzzy_suggestion_threshold: f64,
}

/// Parses the transaction date from either a spreadsheet serial or a
/// `DD-MM-YYYY[ HH:mm]` text token. Errors echo the raw value so the
/// operator can find the offending cell.
pub fn parse_txn_date(raw: &RawDate) -> Result<NaiveDateTime, String> {
    match raw {
        RawDate::Missing => Err("transaction date is missing".to_string()),
        RawDate::Serial(serial) => {
            if !serial.is_finite() || *serial <= 0.0 || *serial > MAX_SERIAL {
                return Err(format!("invalid transaction date serial '{}'", serial));
            }
            let (y, m, d) = SERIAL_EPOCH;
            let epoch = NaiveDate::from_ymd_opt(y, m, d)
                .expect("serial epoch is a valid date")
                .and_hms_opt(0, 0, 0)
                .expect("midnight is a valid time");
            let days = serial.trunc() as i64;
            let seconds = (serial.fract() * 86_400.0).round() as i64;
            Ok(epoch + Duration::days(days) + Duration::seconds(seconds))
        }
        RawDate::Text(text) => {
            let token = text.trim();
            for format in ["%d-%m-%Y %H:%M:%S", "%d-%m-%Y %H:%M", "%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"] {
                if let Ok(parsed) = NaiveDateTime::parse_from_str(token, format) {
                    return Ok(parsed);
                }
            }
            for format in ["%d-%m-%Y", "%d/%m/%Y"] {
                if let Ok(parsed) = NaiveDate::parse_from_str(token, format) {
                    return Ok(parsed.and_hms_opt(0, 0, 0).expect("midnight is a valid time"));
                }
            }
            Err(format!("unparseable transaction date '{}'", token))
        }
    }
}

/// Reconstructs a normalized invoice from one group, short-circuiting on
/// the first hard failure.
pub async fn reconstruct(
    group: &InvoiceGroup,
    ctx: &ReconstructContext<'_>,
) -> Result<ReconstructedInvoice, GroupError> {
    let key = &group.group_key;
    let first_row = group
        .rows
        .first()
        .ok_or_else(|| GroupError::new(key, "group contains no rows"))?;

    // 1. Resolve the customer via the blind-index lookup. One customer per
    //    legacy invoice; the phone comes from the group's first row.
    let digits = phone_digits(&normalize_opt(first_row.customer_phone.as_deref()));
    if digits.is_empty() {
        return Err(GroupError::new(
            key,
            "customer not found: customer phone is missing or has no digits",
        ));
    }
    let token = ctx.blind_indexer.token_for(&digits);
    let customer_id = ctx
        .customers
        .find_by_blind_index(ctx.tenant_id, &token)
        .await
        .map_err(|e| GroupError::new(key, format!("customer lookup failed: {:#}", e)))?
        .ok_or_else(|| {
            GroupError::new(
                key,
                format!("customer not found for phone ending '{}'", tail(&digits)),
            )
        })?;

    // 2. Validate required fields on every row before resolving anything;
    //    a legacy invoice with one malformed line is not partially imported.
    for row in &group.rows {
        validate_row(row).map_err(|message| GroupError::new(key, message))?;
    }

    // 3. Resolve references row by row and accumulate totals.
    let mut line_items: Vec<InvoiceLineItem> = Vec::with_capacity(group.rows.len());
    let mut service_total = 0.0;
    let mut product_total = 0.0;
    let mut primary_staff_id: Option<StaffId> = None;

    for row in &group.rows {
        // Presence and spelling were checked above
        let item_type = ItemType::from_raw(row.txn_type.as_deref().unwrap_or_default())
            .ok_or_else(|| {
                GroupError::new(key, format!("row {}: unknown transaction type", row.ordinal))
            })?;
        let item_name = row.item_name.as_deref().unwrap_or_default();
        let staff_name = row.staff_name.as_deref().unwrap_or_default();
        let quantity = row.quantity.unwrap_or_default();
        let unit_price = row.unit_price.unwrap_or_default();

        let staff = resolve::resolve_staff(staff_name, ctx.catalogs, ctx.fuzzy_suggestion_threshold)
            .map_err(|e| GroupError::new(key, format!("row {}: {}", row.ordinal, e)))?;
        if primary_staff_id.is_none() {
            primary_staff_id = Some(staff.entity_id.clone());
        }

        let (item_id, final_price) = match item_type {
            ItemType::Service => {
                let resolved = resolve::resolve_name(
                    item_name,
                    &ctx.catalogs.services_by_name,
                    EntityKind::Service,
                    ctx.fuzzy_suggestion_threshold,
                )
                .map_err(|e| GroupError::new(key, format!("row {}: {}", row.ordinal, e)))?;
                let final_price = quantity * unit_price;
                service_total += final_price;
                (resolved.entity_id.0, final_price)
            }
            ItemType::Product => {
                let resolved = resolve::resolve_product(
                    item_name,
                    row.item_sku.as_deref(),
                    ctx.catalogs,
                    ctx.fuzzy_suggestion_threshold,
                )
                .map_err(|e| GroupError::new(key, format!("row {}: {}", row.ordinal, e)))?;
                let final_price = quantity * unit_price;
                product_total += final_price;
                (resolved.entity_id.0, final_price)
            }
        };

        line_items.push(InvoiceLineItem {
            item_type,
            item_id,
            name: item_name.trim().to_string(),
            quantity,
            unit_price,
            final_price,
            staff_id: staff.entity_id,
        });
    }

    let primary_staff_id =
        primary_staff_id.ok_or_else(|| GroupError::new(key, "no staff reference resolved"))?;

    // 4. Transaction date from the first row.
    let occurred_at =
        parse_txn_date(&first_row.txn_date).map_err(|message| GroupError::new(key, message))?;

    // 5. Payment breakdown from the declared total and payment mode.
    let grand_total = first_row.total_amount.ok_or_else(|| {
        GroupError::new(key, "total amount is missing or not numeric")
    })?;
    if !grand_total.is_finite() {
        return Err(GroupError::new(key, "total amount is missing or not numeric"));
    }
    let payment = PaymentBreakdown::from_mode(first_row.payment_mode.as_deref(), grand_total);

    // 6. Assemble. Synthesized groups get no invoice number; the
    //    persistence layer assigns one.
    let invoice_number = match key {
        GroupKey::Supplied(number) => Some(number.clone()),
        GroupKey::Synthesized(_) => None,
    };

    debug!(
        "Reconstructed invoice for group '{}': {} line items, subtotal {:.2}",
        key.as_str(),
        line_items.len(),
        service_total + product_total
    );

    Ok(ReconstructedInvoice {
        tenant_id: ctx.tenant_id.clone(),
        invoice_number,
        customer_id,
        primary_staff_id,
        line_items,
        service_total,
        product_total,
        subtotal: service_total + product_total,
        grand_total,
        payment,
        is_imported: true,
        occurred_at,
    })
}

fn validate_row(row: &SourceRow) -> Result<(), String> {
    let missing = |field: &str| format!("row {}: missing required field '{}'", row.ordinal, field);

    match row.txn_type.as_deref() {
        None => return Err(missing("transaction type")),
        Some(raw) if ItemType::from_raw(raw).is_none() => {
            return Err(format!(
                "row {}: unknown transaction type '{}' (expected service or product)",
                row.ordinal,
                raw.trim()
            ));
        }
        Some(_) => {}
    }
    if row.item_name.as_deref().map_or(true, |s| s.trim().is_empty()) {
        return Err(missing("item name"));
    }
    if row.staff_name.as_deref().map_or(true, |s| s.trim().is_empty()) {
        return Err(missing("staff name"));
    }
    let quantity = row.quantity.ok_or_else(|| missing("quantity"))?;
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(format!("row {}: invalid quantity '{}'", row.ordinal, quantity));
    }
    let unit_price = row.unit_price.ok_or_else(|| missing("unit price"))?;
    if !unit_price.is_finite() || unit_price < 0.0 {
        return Err(format!(
            "row {}: invalid unit price '{}'",
            row.ordinal, unit_price
        ));
    }
    Ok(())
}

/// Last four digits, for log/error text that must not leak a full phone.
fn tail(digits: &str) -> &str {
    let len = digits.len();
    &digits[len.saturating_sub(4)..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, NameIndex};
    use crate::models::{CustomerId, ProductId, ServiceId};
    use crate::normalize::normalize;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct DigitsIndexer;

    impl BlindIndexer for DigitsIndexer {
        fn token_for(&self, phone_digits: &str) -> String {
            format!("tok-{}", phone_digits)
        }
    }

    struct MapDirectory(HashMap<String, CustomerId>);

    #[async_trait]
    impl CustomerDirectory for MapDirectory {
        async fn find_by_blind_index(
            &self,
            _tenant: &TenantId,
            token: &str,
        ) -> Result<Option<CustomerId>> {
            Ok(self.0.get(token).cloned())
        }
    }

    fn catalogs() -> ReferenceCatalogs {
        let mut services_by_name: NameIndex<ServiceId> = HashMap::new();
        services_by_name.insert(
            normalize("Hair Spa"),
            CatalogEntry {
                id: ServiceId("svc-1".into()),
                display_name: "Hair Spa".into(),
            },
        );
        let mut products_by_name: NameIndex<ProductId> = HashMap::new();
        products_by_name.insert(
            normalize("Argan Oil Shampoo"),
            CatalogEntry {
                id: ProductId("prod-1".into()),
                display_name: "Argan Oil Shampoo".into(),
            },
        );
        let mut products_by_sku = HashMap::new();
        products_by_sku.insert(normalize("SH-001"), ProductId("prod-1".into()));
        let mut staff_by_name: NameIndex<StaffId> = HashMap::new();
        staff_by_name.insert(
            normalize("Priyanka"),
            CatalogEntry {
                id: StaffId("staff-1".into()),
                display_name: "Priyanka".into(),
            },
        );
        ReferenceCatalogs {
            services_by_name,
            products_by_name,
            products_by_sku,
            staff_by_name,
            staff_by_code: HashMap::new(),
        }
    }

    fn directory() -> MapDirectory {
        let mut map = HashMap::new();
        map.insert("tok-9876543210".to_string(), CustomerId("cust-1".into()));
        MapDirectory(map)
    }

    fn row(ordinal: usize, txn_type: &str, item: &str, qty: f64, price: f64) -> SourceRow {
        SourceRow {
            ordinal,
            txn_type: Some(txn_type.into()),
            item_name: Some(item.into()),
            item_sku: None,
            quantity: Some(qty),
            unit_price: Some(price),
            staff_name: Some("Priyanka".into()),
            customer_phone: Some("+91 98765 43210".into()),
            total_amount: Some(700.0),
            payment_mode: Some("cash".into()),
            txn_date: RawDate::Text("15-03-2024 14:30".into()),
            invoice_number: Some("INV-100".into()),
        }
    }

    async fn run(group: InvoiceGroup) -> Result<ReconstructedInvoice, GroupError> {
        let tenant = TenantId("t1".into());
        let catalogs = catalogs();
        let customers = directory();
        let ctx = ReconstructContext {
            tenant_id: &tenant,
            catalogs: &catalogs,
            customers: &customers,
            blind_indexer: &DigitsIndexer,
            fuzzy_suggestion_threshold: 0.7,
        };
        reconstruct(&group, &ctx).await
    }

    #[tokio::test]
    async fn test_two_row_invoice_totals_and_payment() {
        let group = InvoiceGroup {
            group_key: GroupKey::Supplied("INV-100".into()),
            rows: vec![
                row(0, "service", "Hair Spa", 1.0, 500.0),
                row(1, "product", "Argan Oil Shampoo", 1.0, 200.0),
            ],
        };
        let invoice = run(group).await.unwrap();

        assert_eq!(invoice.invoice_number.as_deref(), Some("INV-100"));
        assert_eq!(invoice.customer_id, CustomerId("cust-1".into()));
        assert_eq!(invoice.primary_staff_id, StaffId("staff-1".into()));
        assert_eq!(invoice.line_items.len(), 2);
        assert_eq!(invoice.service_total, 500.0);
        assert_eq!(invoice.product_total, 200.0);
        assert_eq!(invoice.subtotal, 700.0);
        assert_eq!(invoice.grand_total, 700.0);
        assert_eq!(
            invoice.payment,
            PaymentBreakdown {
                cash: 700.0,
                card: 0.0,
                upi: 0.0,
                other: 0.0
            }
        );
        assert!(invoice.is_imported);
    }

    #[tokio::test]
    async fn test_synthesized_group_gets_no_invoice_number() {
        let group = InvoiceGroup {
            group_key: GroupKey::Synthesized("auto-job-1-0".into()),
            rows: vec![row(0, "service", "Hair Spa", 1.0, 500.0)],
        };
        let invoice = run(group).await.unwrap();
        assert_eq!(invoice.invoice_number, None);
    }

    #[tokio::test]
    async fn test_missing_phone_is_customer_not_found() {
        let mut bad = row(0, "service", "Hair Spa", 1.0, 500.0);
        bad.customer_phone = None;
        let group = InvoiceGroup {
            group_key: GroupKey::Supplied("INV-1".into()),
            rows: vec![bad],
        };
        let err = run(group).await.unwrap_err();
        assert!(err.message.contains("customer not found"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_unknown_phone_is_customer_not_found() {
        let mut bad = row(0, "service", "Hair Spa", 1.0, 500.0);
        bad.customer_phone = Some("1112223334".into());
        let group = InvoiceGroup {
            group_key: GroupKey::Supplied("INV-1".into()),
            rows: vec![bad],
        };
        let err = run(group).await.unwrap_err();
        assert!(err.message.contains("customer not found"), "{}", err.message);
        // Only the tail of the phone may appear in the message
        assert!(!err.message.contains("1112223334"));
    }

    #[tokio::test]
    async fn test_staff_near_miss_fails_with_both_names() {
        let mut bad = row(0, "service", "Hair Spa", 1.0, 500.0);
        bad.staff_name = Some("Priya".into());
        let group = InvoiceGroup {
            group_key: GroupKey::Supplied("INV-1".into()),
            rows: vec![bad],
        };
        let err = run(group).await.unwrap_err();
        assert!(err.message.contains("Priya"), "{}", err.message);
        assert!(err.message.contains("Priyanka"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_one_malformed_row_fails_the_whole_group() {
        let mut bad = row(1, "product", "Argan Oil Shampoo", 1.0, 200.0);
        bad.quantity = None;
        let group = InvoiceGroup {
            group_key: GroupKey::Supplied("INV-100".into()),
            rows: vec![row(0, "service", "Hair Spa", 1.0, 500.0), bad],
        };
        let err = run(group).await.unwrap_err();
        assert!(err.message.contains("quantity"), "{}", err.message);
        assert!(err.message.contains("row 1"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_missing_total_amount_is_hard_failure() {
        let mut bad = row(0, "service", "Hair Spa", 1.0, 500.0);
        bad.total_amount = None;
        let group = InvoiceGroup {
            group_key: GroupKey::Supplied("INV-1".into()),
            rows: vec![bad],
        };
        let err = run(group).await.unwrap_err();
        assert!(err.message.contains("total amount"), "{}", err.message);
    }

    #[test]
    fn test_parse_text_date_with_time() {
        let parsed = parse_txn_date(&RawDate::Text("15-03-2024 14:30".into())).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_text_date_without_time_and_slashes() {
        let parsed = parse_txn_date(&RawDate::Text("01/12/2023".into())).unwrap();
        let expected = NaiveDate::from_ymd_opt(2023, 12, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_parse_serial_date() {
        // 45366 = 2024-03-15; .604166... = 14:30
        let parsed = parse_txn_date(&RawDate::Serial(45366.604166666664)).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_unparseable_date_echoes_raw_value() {
        let err = parse_txn_date(&RawDate::Text("sometime in march".into())).unwrap_err();
        assert!(err.contains("sometime in march"));
        let err = parse_txn_date(&RawDate::Serial(-3.0)).unwrap_err();
        assert!(err.contains("-3"));
        assert!(parse_txn_date(&RawDate::Missing).is_err());
    }
}
