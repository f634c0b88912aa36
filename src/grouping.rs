// src/grouping.rs
//! Partitions the flat row list into invoice groups. Rows sharing an
//! original invoice number merge into one group; rows without one each get
//! a synthesized key so two identifier-less rows are never merged.

use std::collections::HashMap;

use log::debug;

use crate::models::{GroupKey, ImportJobId, InvoiceGroup, SourceRow};
use crate::normalize::normalize;

/// Deterministically partitions rows into invoice groups.
///
/// Groups appear in first-seen order and rows keep their original order
/// inside each group, so the "primary" staff selection stays stable.
pub fn group_rows(job_id: &ImportJobId, rows: Vec<SourceRow>) -> Vec<InvoiceGroup> {
    let mut groups: Vec<InvoiceGroup> = Vec::new();
    let mut index_by_key: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let supplied = row
            .invoice_number
            .as_deref()
            .map(normalize)
            .filter(|k| !k.is_empty());

        match supplied {
            Some(key) => {
                if let Some(&idx) = index_by_key.get(&key) {
                    groups[idx].rows.push(row);
                } else {
                    // Keep the trimmed original spelling as the group key;
                    // the normalized form only drives the partition.
                    let display = row
                        .invoice_number
                        .as_deref()
                        .map(str::trim)
                        .unwrap_or_default()
                        .to_string();
                    index_by_key.insert(key, groups.len());
                    groups.push(InvoiceGroup {
                        group_key: GroupKey::Supplied(display),
                        rows: vec![row],
                    });
                }
            }
            None => {
                let key = format!("auto-{}-{}", job_id.0, row.ordinal);
                groups.push(InvoiceGroup {
                    group_key: GroupKey::Synthesized(key),
                    rows: vec![row],
                });
            }
        }
    }

    debug!(
        "Grouped rows into {} invoice groups for job {}",
        groups.len(),
        job_id.0
    );
    groups
}
