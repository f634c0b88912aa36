// src/config.rs

use log::warn;

/// Minimum normalized similarity (0.0-1.0) at which a failed lookup still
/// surfaces the closest catalog name as a "did you mean" suggestion.
/// Empirically tuned; override with `IMPORT_FUZZY_SUGGESTION_THRESHOLD`.
pub const DEFAULT_FUZZY_SUGGESTION_THRESHOLD: f64 = 0.7;

/// Runtime configuration for the import pipeline, read from the
/// environment with sensible defaults.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Acceptance threshold for advisory fuzzy suggestions.
    pub fuzzy_suggestion_threshold: f64,
    /// Secret key for the keyed blind-index derivation used by the worker
    /// binary. Deployments supply their own indexer; this only feeds the
    /// built-in one.
    pub blind_index_key: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            fuzzy_suggestion_threshold: DEFAULT_FUZZY_SUGGESTION_THRESHOLD,
            blind_index_key: String::new(),
        }
    }
}

impl ImportConfig {
    pub fn from_env() -> Self {
        let fuzzy_suggestion_threshold = std::env::var("IMPORT_FUZZY_SUGGESTION_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .map(|v| {
                if (0.0..=1.0).contains(&v) {
                    v
                } else {
                    warn!(
                        "IMPORT_FUZZY_SUGGESTION_THRESHOLD {} outside 0.0-1.0, using default {}",
                        v, DEFAULT_FUZZY_SUGGESTION_THRESHOLD
                    );
                    DEFAULT_FUZZY_SUGGESTION_THRESHOLD
                }
            })
            .unwrap_or(DEFAULT_FUZZY_SUGGESTION_THRESHOLD);

        let blind_index_key = std::env::var("BLIND_INDEX_KEY").unwrap_or_default();
        if blind_index_key.is_empty() {
            warn!("BLIND_INDEX_KEY not set; built-in blind indexer will use an empty key");
        }

        Self {
            fuzzy_suggestion_threshold,
            blind_index_key,
        }
    }
}
