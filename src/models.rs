// src/models.rs

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

//------------------------------------------------------------------------------
// IDENTIFIER TYPES
//------------------------------------------------------------------------------
// Using newtype pattern for type safety to prevent mixing different ID types

/// Strongly typed identifier for a tenant (salon)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

/// Strongly typed identifier for an import job record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportJobId(pub String);

/// Strongly typed identifier for a customer record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

/// Strongly typed identifier for a staff record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaffId(pub String);

/// Strongly typed identifier for a service catalog record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub String);

/// Strongly typed identifier for a product catalog record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

//------------------------------------------------------------------------------
// IMPORT JOB
//------------------------------------------------------------------------------

/// Lifecycle states of an import job.
///
/// The upload handler creates the job in `Queued`; the pipeline moves it to
/// `Processing` and sets exactly one terminal state at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Progress counters persisted after every processed group so the UI can
/// poll a crash-visible snapshot.
///
/// Invariant: `processed + failed <= total`, and `total` never changes once
/// grouping has completed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
}

/// One captured group-local failure. `raw_rows` keeps the offending source
/// rows verbatim so operators can fix and re-upload just those invoices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportErrorEntry {
    pub group_key: String,
    pub message: String,
    pub raw_rows: serde_json::Value,
}

/// The import job document. This is the sole feedback channel the UI polls;
/// there is no separate event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: ImportJobId,
    pub tenant_id: TenantId,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub error_log: Vec<ImportErrorEntry>,
    pub report_message: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ImportJob {
    /// A fresh job in `Queued`, as the upload handler would create it.
    pub fn new_queued(id: ImportJobId, tenant_id: TenantId, now: NaiveDateTime) -> Self {
        Self {
            id,
            tenant_id,
            status: JobStatus::Queued,
            progress: JobProgress::default(),
            error_log: Vec::new(),
            report_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_success(&mut self) {
        self.progress.processed += 1;
        debug_assert!(self.progress.processed + self.progress.failed <= self.progress.total);
    }

    pub fn record_failure(&mut self, entry: ImportErrorEntry) {
        self.progress.failed += 1;
        self.error_log.push(entry);
        debug_assert!(self.progress.processed + self.progress.failed <= self.progress.total);
    }
}

//------------------------------------------------------------------------------
// SOURCE ROWS AND GROUPS
//------------------------------------------------------------------------------

/// Transaction date as it appeared in the cell. Spreadsheet exports mix
/// numeric date serials with `DD-MM-YYYY[ HH:mm]` text; the reconstructor
/// decides how to parse once, with the raw value preserved for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawDate {
    Serial(f64),
    Text(String),
    Missing,
}

/// Validated-intermediate mirror of one spreadsheet row. Loose cells become
/// `Option`s here; presence is enforced per row during reconstruction, not
/// trusted at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRow {
    /// Zero-based position in the sheet (below the header), used for
    /// synthesized group keys and error messages.
    pub ordinal: usize,
    pub txn_type: Option<String>,
    pub item_name: Option<String>,
    pub item_sku: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub staff_name: Option<String>,
    pub customer_phone: Option<String>,
    pub total_amount: Option<f64>,
    pub payment_mode: Option<String>,
    pub txn_date: RawDate,
    pub invoice_number: Option<String>,
}

/// Key an invoice group was formed under. Synthesized keys mark rows that
/// carried no original invoice number, so the persistence layer knows to
/// assign a fresh number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKey {
    Supplied(String),
    Synthesized(String),
}

impl GroupKey {
    pub fn as_str(&self) -> &str {
        match self {
            GroupKey::Supplied(s) | GroupKey::Synthesized(s) => s,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, GroupKey::Synthesized(_))
    }
}

/// One legacy invoice worth of rows. Row order inside a group preserves the
/// original sheet order (the first row's staff becomes the primary staff).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceGroup {
    pub group_key: GroupKey,
    pub rows: Vec<SourceRow>,
}

//------------------------------------------------------------------------------
// ENTITY RESOLUTION
//------------------------------------------------------------------------------

/// How a raw textual reference was matched against the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// Normalized text hit a catalog key directly
    Exact,
    /// Accepted via similarity ranking (currently advisory-only for
    /// services, products and staff)
    Fuzzy,
}

/// Successful resolution of a raw reference to a canonical entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReference<I> {
    pub entity_id: I,
    pub match_kind: MatchKind,
}

//------------------------------------------------------------------------------
// RECONSTRUCTED INVOICES
//------------------------------------------------------------------------------

/// Line item category, parsed from the `Transaction Type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Service,
    Product,
}

impl ItemType {
    pub fn from_raw(raw: &str) -> Option<Self> {
        match crate::normalize::normalize(raw).as_str() {
            "service" => Some(ItemType::Service),
            "product" => Some(ItemType::Product),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Service => "service",
            ItemType::Product => "product",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub item_type: ItemType,
    pub item_id: String,
    pub name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub final_price: f64,
    pub staff_id: StaffId,
}

/// Single-mode payment breakdown. Legacy records carry exactly one payment
/// mode, so exactly one bucket is non-zero and equals the grand total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentBreakdown {
    pub cash: f64,
    pub card: f64,
    pub upi: f64,
    pub other: f64,
}

impl PaymentBreakdown {
    /// Maps a case-insensitive payment-mode keyword to the one non-zero
    /// bucket. `gpay` and `phonepe` are folded into `upi`; anything
    /// unrecognized lands in `other`.
    pub fn from_mode(raw_mode: Option<&str>, amount: f64) -> Self {
        let mode = crate::normalize::normalize_opt(raw_mode);
        let mut breakdown = PaymentBreakdown::default();
        match mode.as_str() {
            "cash" => breakdown.cash = amount,
            "card" | "credit card" | "debit card" => breakdown.card = amount,
            "upi" | "gpay" | "phonepe" => breakdown.upi = amount,
            _ => breakdown.other = amount,
        }
        breakdown
    }
}

/// A normalized invoice assembled from one group, ready for insertion.
/// Never mutated after persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconstructedInvoice {
    pub tenant_id: TenantId,
    /// `None` for synthesized groups; the persistence layer assigns a
    /// number in that case.
    pub invoice_number: Option<String>,
    pub customer_id: CustomerId,
    pub primary_staff_id: StaffId,
    pub line_items: Vec<InvoiceLineItem>,
    pub service_total: f64,
    pub product_total: f64,
    pub subtotal: f64,
    pub grand_total: f64,
    pub payment: PaymentBreakdown,
    pub is_imported: bool,
    pub occurred_at: NaiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert!(JobStatus::from_str("bogus").is_none());
        assert!(JobStatus::Completed.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_item_type_from_raw() {
        assert_eq!(ItemType::from_raw("  Service "), Some(ItemType::Service));
        assert_eq!(ItemType::from_raw("PRODUCT"), Some(ItemType::Product));
        assert_eq!(ItemType::from_raw("membership"), None);
    }

    #[test]
    fn test_payment_breakdown_single_bucket() {
        let cash = PaymentBreakdown::from_mode(Some("Cash"), 700.0);
        assert_eq!(cash.cash, 700.0);
        assert_eq!(cash.card + cash.upi + cash.other, 0.0);

        let upi = PaymentBreakdown::from_mode(Some("GPay"), 150.0);
        assert_eq!(upi.upi, 150.0);

        let other = PaymentBreakdown::from_mode(Some("cheque"), 99.0);
        assert_eq!(other.other, 99.0);

        let missing = PaymentBreakdown::from_mode(None, 10.0);
        assert_eq!(missing.other, 10.0);
    }
}
