// src/resolve.rs
//! Multi-strategy entity resolution: exact normalized lookup first, then a
//! Jaro-Winkler ranking over the catalog's display names. Fuzzy results are
//! advisory only for business entities (services, products, staff): a near
//! miss fails the group with a "did you mean" hint instead of silently
//! misattributing a sale.

use strsim::jaro_winkler;
use thiserror::Error;

use crate::catalog::{NameIndex, ReferenceCatalogs};
use crate::models::{MatchKind, ProductId, ResolvedReference};
use crate::normalize::normalize;

/// Entity type being resolved, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Service,
    Product,
    Staff,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Service => "service",
            EntityKind::Product => "product",
            EntityKind::Staff => "staff",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a reference failed to resolve. `Suggestion` carries the closest
/// catalog name so the operator can correct the sheet and re-upload.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("{kind} '{raw}' not found")]
    NotFound { kind: EntityKind, raw: String },
    #[error("{kind} '{raw}' not found, did you mean '{candidate}'? (similarity {score:.2})")]
    Suggestion {
        kind: EntityKind,
        raw: String,
        candidate: String,
        score: f64,
    },
}

/// Resolves a raw textual reference against a normalized-name index.
///
/// Exact normalized hits succeed with `MatchKind::Exact`. Anything else
/// fails: when the best similarity reaches `suggestion_threshold` the error
/// proposes that name as a correction, otherwise it is a plain not-found.
pub fn resolve_name<I: Clone>(
    raw: &str,
    index: &NameIndex<I>,
    kind: EntityKind,
    suggestion_threshold: f64,
) -> Result<ResolvedReference<I>, ResolveError> {
    let key = normalize(raw);
    if key.is_empty() {
        return Err(ResolveError::NotFound {
            kind,
            raw: raw.trim().to_string(),
        });
    }

    if let Some(entry) = index.get(&key) {
        return Ok(ResolvedReference {
            entity_id: entry.id.clone(),
            match_kind: MatchKind::Exact,
        });
    }

    // Similarity ranking over the full candidate list. The index keys are
    // already normalized, so the comparison is case/whitespace-insensitive.
    let mut best: Option<(f64, &str)> = None;
    for (candidate_key, entry) in index {
        let score = jaro_winkler(&key, candidate_key);
        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, entry.display_name.as_str()));
        }
    }

    match best {
        Some((score, candidate)) if score >= suggestion_threshold => {
            Err(ResolveError::Suggestion {
                kind,
                raw: raw.trim().to_string(),
                candidate: candidate.trim().to_string(),
                score,
            })
        }
        _ => Err(ResolveError::NotFound {
            kind,
            raw: raw.trim().to_string(),
        }),
    }
}

/// Product resolution: SKU lookup takes priority when a SKU value is
/// present (SKUs are more reliable identifiers than free-text names), then
/// falls back to name resolution.
pub fn resolve_product(
    raw_name: &str,
    raw_sku: Option<&str>,
    catalogs: &ReferenceCatalogs,
    suggestion_threshold: f64,
) -> Result<ResolvedReference<ProductId>, ResolveError> {
    if let Some(sku) = raw_sku {
        let sku_key = normalize(sku);
        if !sku_key.is_empty() {
            if let Some(id) = catalogs.products_by_sku.get(&sku_key) {
                return Ok(ResolvedReference {
                    entity_id: id.clone(),
                    match_kind: MatchKind::Exact,
                });
            }
        }
    }
    resolve_name(
        raw_name,
        &catalogs.products_by_name,
        EntityKind::Product,
        suggestion_threshold,
    )
}

/// Staff resolution: the legacy `Staff Name` column sometimes carries the
/// short staff code from printed receipts instead of a name, so an exact
/// code hit is accepted first, then normal name resolution.
pub fn resolve_staff(
    raw: &str,
    catalogs: &ReferenceCatalogs,
    suggestion_threshold: f64,
) -> Result<ResolvedReference<crate::models::StaffId>, ResolveError> {
    let key = normalize(raw);
    if !key.is_empty() {
        if let Some(id) = catalogs.staff_by_code.get(&key) {
            return Ok(ResolvedReference {
                entity_id: id.clone(),
                match_kind: MatchKind::Exact,
            });
        }
    }
    resolve_name(
        raw,
        &catalogs.staff_by_name,
        EntityKind::Staff,
        suggestion_threshold,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::config::DEFAULT_FUZZY_SUGGESTION_THRESHOLD;
    use crate::models::{ServiceId, StaffId};
    use std::collections::HashMap;

    fn service_index(entries: &[(&str, &str)]) -> NameIndex<ServiceId> {
        entries
            .iter()
            .map(|(id, name)| {
                (
                    normalize(name),
                    CatalogEntry {
                        id: ServiceId((*id).to_string()),
                        display_name: (*name).to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_exact_match_is_case_and_whitespace_insensitive() {
        let index = service_index(&[("svc-1", "Hair Spa"), ("svc-2", "Gel Polish")]);
        let resolved = resolve_name(
            "  hair   SPA ",
            &index,
            EntityKind::Service,
            DEFAULT_FUZZY_SUGGESTION_THRESHOLD,
        )
        .unwrap();
        assert_eq!(resolved.entity_id, ServiceId("svc-1".into()));
        assert_eq!(resolved.match_kind, MatchKind::Exact);
    }

    #[test]
    fn test_near_miss_fails_with_suggestion_never_silent_success() {
        let index = service_index(&[("svc-1", "Hair Spa")]);
        // Transposition with high similarity: must fail, not fuzzy-accept
        let err = resolve_name(
            "Hair Sap",
            &index,
            EntityKind::Service,
            DEFAULT_FUZZY_SUGGESTION_THRESHOLD,
        )
        .unwrap_err();
        match err {
            ResolveError::Suggestion { candidate, score, .. } => {
                assert_eq!(candidate, "Hair Spa");
                assert!(score >= DEFAULT_FUZZY_SUGGESTION_THRESHOLD);
            }
            other => panic!("expected suggestion, got {:?}", other),
        }
    }

    #[test]
    fn test_staff_suggestion_message_names_both_sides() {
        let mut index: NameIndex<StaffId> = HashMap::new();
        index.insert(
            normalize("Priyanka"),
            CatalogEntry {
                id: StaffId("staff-1".into()),
                display_name: "Priyanka".into(),
            },
        );
        let err = resolve_name(
            "Priya",
            &index,
            EntityKind::Staff,
            DEFAULT_FUZZY_SUGGESTION_THRESHOLD,
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Priya"), "message: {}", message);
        assert!(message.contains("Priyanka"), "message: {}", message);
    }

    #[test]
    fn test_low_similarity_is_plain_not_found() {
        let index = service_index(&[("svc-1", "Hair Spa")]);
        let err = resolve_name(
            "Quarterly Tax Filing",
            &index,
            EntityKind::Service,
            DEFAULT_FUZZY_SUGGESTION_THRESHOLD,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn test_empty_input_is_not_found() {
        let index = service_index(&[("svc-1", "Hair Spa")]);
        let err = resolve_name(
            "   ",
            &index,
            EntityKind::Service,
            DEFAULT_FUZZY_SUGGESTION_THRESHOLD,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::NotFound { .. }));
    }

    #[test]
    fn test_product_sku_takes_priority_over_name() {
        let mut catalogs = ReferenceCatalogs {
            services_by_name: HashMap::new(),
            products_by_name: HashMap::new(),
            products_by_sku: HashMap::new(),
            staff_by_name: HashMap::new(),
            staff_by_code: HashMap::new(),
        };
        catalogs.products_by_sku.insert(
            normalize("SH-001"),
            crate::models::ProductId("prod-sku".into()),
        );
        catalogs.products_by_name.insert(
            normalize("Argan Oil Shampoo"),
            CatalogEntry {
                id: crate::models::ProductId("prod-name".into()),
                display_name: "Argan Oil Shampoo".into(),
            },
        );

        // Name would resolve to prod-name, but the SKU wins
        let resolved = resolve_product(
            "Argan Oil Shampoo",
            Some("sh-001"),
            &catalogs,
            DEFAULT_FUZZY_SUGGESTION_THRESHOLD,
        )
        .unwrap();
        assert_eq!(resolved.entity_id.0, "prod-sku");

        // Unknown SKU falls back to the name
        let resolved = resolve_product(
            "Argan Oil Shampoo",
            Some("ZZ-999"),
            &catalogs,
            DEFAULT_FUZZY_SUGGESTION_THRESHOLD,
        )
        .unwrap();
        assert_eq!(resolved.entity_id.0, "prod-name");
    }

    #[test]
    fn test_staff_code_accepted_before_name() {
        let mut catalogs = ReferenceCatalogs {
            services_by_name: HashMap::new(),
            products_by_name: HashMap::new(),
            products_by_sku: HashMap::new(),
            staff_by_name: HashMap::new(),
            staff_by_code: HashMap::new(),
        };
        catalogs
            .staff_by_code
            .insert(normalize("EMP01"), StaffId("staff-1".into()));
        catalogs.staff_by_name.insert(
            normalize("Priyanka"),
            CatalogEntry {
                id: StaffId("staff-1".into()),
                display_name: "Priyanka".into(),
            },
        );

        let by_code =
            resolve_staff("emp01", &catalogs, DEFAULT_FUZZY_SUGGESTION_THRESHOLD).unwrap();
        assert_eq!(by_code.entity_id, StaffId("staff-1".into()));
        assert_eq!(by_code.match_kind, MatchKind::Exact);

        let by_name =
            resolve_staff("Priyanka", &catalogs, DEFAULT_FUZZY_SUGGESTION_THRESHOLD).unwrap();
        assert_eq!(by_name.entity_id, StaffId("staff-1".into()));
    }
}
