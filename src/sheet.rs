// src/sheet.rs
//! Reads the uploaded spreadsheet into `SourceRow`s. Only the first
//! worksheet is consulted (multi-sheet workbooks are out of scope). Any
//! problem at this level (unreadable file, no worksheet, missing required
//! headers) is pipeline-fatal; per-row data problems are not detected
//! here, they surface later as group-local failures.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use log::{debug, info};

use crate::models::{RawDate, SourceRow};
use crate::normalize::normalize;

/// Accepted spellings for each logical column, compared after
/// normalization. The canonical export uses the first alias of each list.
const COLUMN_ALIASES: &[(&str, &[&str])] = &[
    ("transaction_type", &["transaction type", "type"]),
    ("item_name", &["item name", "item"]),
    ("item_sku", &["item sku (optional)", "item sku", "sku"]),
    ("quantity", &["quantity", "qty"]),
    ("unit_price", &["unit price", "rate"]),
    ("staff_name", &["staff name", "staff"]),
    ("customer_phone", &["customer phone", "phone"]),
    ("total_amount", &["total amount", "total"]),
    ("payment_mode", &["payment mode", "payment"]),
    ("transaction_date", &["transaction date", "date"]),
    (
        "invoice_number",
        &[
            "original invoice number (optional)",
            "original invoice number",
            "invoice number",
        ],
    ),
];

/// Column positions resolved from the header row. SKU and invoice number
/// are optional columns; everything else must be present.
#[derive(Debug)]
struct HeaderMap {
    txn_type: usize,
    item_name: usize,
    item_sku: Option<usize>,
    quantity: usize,
    unit_price: usize,
    staff_name: usize,
    customer_phone: usize,
    total_amount: usize,
    payment_mode: usize,
    txn_date: usize,
    invoice_number: Option<usize>,
}

fn find_column(headers: &[String], field: &str) -> Option<usize> {
    let aliases = COLUMN_ALIASES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, aliases)| *aliases)
        .unwrap_or_default();
    headers
        .iter()
        .position(|h| aliases.contains(&h.as_str()))
}

fn build_header_map(header_row: &[Data]) -> Result<HeaderMap> {
    let headers: Vec<String> = header_row
        .iter()
        .map(|cell| normalize(&cell.to_string()))
        .collect();

    let mut missing: Vec<&str> = Vec::new();
    let mut required = |field: &'static str| -> usize {
        match find_column(&headers, field) {
            Some(idx) => idx,
            None => {
                missing.push(field);
                0
            }
        }
    };

    let map = HeaderMap {
        txn_type: required("transaction_type"),
        item_name: required("item_name"),
        item_sku: find_column(&headers, "item_sku"),
        quantity: required("quantity"),
        unit_price: required("unit_price"),
        staff_name: required("staff_name"),
        customer_phone: required("customer_phone"),
        total_amount: required("total_amount"),
        payment_mode: required("payment_mode"),
        txn_date: required("transaction_date"),
        invoice_number: find_column(&headers, "invoice_number"),
    };

    if !missing.is_empty() {
        bail!("spreadsheet is missing required columns: {}", missing.join(", "));
    }
    Ok(map)
}

fn float_to_text(f: f64) -> String {
    // Phone numbers and SKUs typed as numbers must not grow a ".0" suffix
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        f.to_string()
    }
}

fn cell_text(cell: Option<&Data>) -> Option<String> {
    match cell? {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Data::Float(f) => Some(float_to_text(*f)),
        Data::Int(i) => Some(i.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => Some(float_to_text(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.clone()),
    }
}

fn cell_number(cell: Option<&Data>) -> Option<f64> {
    match cell? {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse::<f64>().ok(),
        Data::DateTime(dt) => Some(dt.as_f64()),
        _ => None,
    }
}

fn cell_date(cell: Option<&Data>) -> RawDate {
    match cell {
        None => RawDate::Missing,
        Some(Data::Float(f)) => RawDate::Serial(*f),
        Some(Data::Int(i)) => RawDate::Serial(*i as f64),
        Some(Data::DateTime(dt)) => RawDate::Serial(dt.as_f64()),
        Some(Data::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                RawDate::Missing
            } else {
                RawDate::Text(trimmed.to_string())
            }
        }
        Some(Data::DateTimeIso(s)) => RawDate::Text(s.clone()),
        Some(_) => RawDate::Missing,
    }
}

fn row_to_source(ordinal: usize, row: &[Data], map: &HeaderMap) -> SourceRow {
    let at = |idx: usize| row.get(idx);
    SourceRow {
        ordinal,
        txn_type: cell_text(at(map.txn_type)),
        item_name: cell_text(at(map.item_name)),
        item_sku: map.item_sku.and_then(|idx| cell_text(at(idx))),
        quantity: cell_number(at(map.quantity)),
        unit_price: cell_number(at(map.unit_price)),
        staff_name: cell_text(at(map.staff_name)),
        customer_phone: cell_text(at(map.customer_phone)),
        total_amount: cell_number(at(map.total_amount)),
        payment_mode: cell_text(at(map.payment_mode)),
        txn_date: cell_date(at(map.txn_date)),
        invoice_number: map.invoice_number.and_then(|idx| cell_text(at(idx))),
    }
}

fn is_blank(row: &[Data]) -> bool {
    row.iter()
        .all(|cell| matches!(cell, Data::Empty) || cell.to_string().trim().is_empty())
}

/// Reads the first worksheet of the uploaded file into source rows.
pub fn read_rows(path: &Path) -> Result<Vec<SourceRow>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("failed to open spreadsheet '{}'", path.display()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| anyhow!("spreadsheet '{}' contains no worksheets", path.display()))?;
    debug!("Reading worksheet '{}'", sheet_name);

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("failed to read worksheet '{}'", sheet_name))?;

    let mut rows_iter = range.rows();
    let header_row = rows_iter
        .next()
        .ok_or_else(|| anyhow!("worksheet '{}' is empty", sheet_name))?;
    let header_map = build_header_map(header_row)?;

    let mut rows = Vec::new();
    for (ordinal, raw_row) in rows_iter.enumerate() {
        if is_blank(raw_row) {
            continue;
        }
        rows.push(row_to_source(ordinal, raw_row, &header_map));
    }
    info!(
        "Read {} data rows from '{}' (sheet '{}')",
        rows.len(),
        path.display(),
        sheet_name
    );
    Ok(rows)
}
