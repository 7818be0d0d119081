//! Config validation: unknown-key detection with Levenshtein suggestions.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use super::defaults::MAX_SUGGESTION_DISTANCE;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Sections whose children are user-chosen names (channel names), not fields.
const OPEN_SECTIONS: [&str; 2] = ["imputation.means", "features.scaling"];

/// Returns the complete set of valid dotted key paths for `AnalysisConfig`.
///
/// Array-of-table entries (`[[ensemble.rules]]`) contribute their keys under
/// the array's path. Any new field added to `AnalysisConfig` must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [channels]
        "channels",
        "channels.names",
        "channels.id_column",
        "channels.reject_missing",
        // [imputation]
        "imputation",
        "imputation.strategy",
        "imputation.default_value",
        "imputation.means",
        // [features]
        "features",
        "features.scaling",
        "features.derived",
        "features.derived.name",
        "features.derived.kind",
        "features.derived.left",
        "features.derived.right",
        // [ensemble]
        "ensemble",
        "ensemble.rules_path",
        "ensemble.max_contributing_factors",
        "ensemble.rules",
        "ensemble.rules.name",
        "ensemble.rules.mode",
        "ensemble.rules.vote",
        "ensemble.rules.conditions",
        "ensemble.rules.conditions.feature",
        "ensemble.rules.conditions.op",
        "ensemble.rules.conditions.threshold",
        // [pipeline]
        "pipeline",
        "pipeline.require_samples",
        "pipeline.parallel_threshold",
        "pipeline.worker_threads",
        // [synthetic]
        "synthetic",
        "synthetic.rows",
        "synthetic.seed",
        "synthetic.failure_rate",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`. Tables inside arrays are walked under the array's
/// own path, each distinct key reported once.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    collect_keys(value, prefix, &mut keys);
    keys
}

fn collect_keys(value: &toml::Value, prefix: &str, keys: &mut Vec<String>) {
    match value {
        toml::Value::Table(table) => {
            for (k, v) in table {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                if !keys.contains(&path) {
                    keys.push(path.clone());
                }
                collect_keys(v, &path, keys);
            }
        }
        toml::Value::Array(items) => {
            for item in items {
                if item.is_table() {
                    collect_keys(item, prefix, keys);
                }
            }
        }
        _ => {}
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let b_len = b_chars.len();
    if a.is_empty() {
        return b_len;
    }
    if b_len == 0 {
        return a.chars().count();
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the alphabetically first key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= MAX_SUGGESTION_DISTANCE)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

fn is_open_section_child(key: &str) -> bool {
    OPEN_SECTIONS.iter().any(|section| {
        key.len() > section.len()
            && key.starts_with(section)
            && key.as_bytes()[section.len()] == b'.'
    })
}

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys; it only warns. Existing configs
/// always continue to work.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()) && !is_open_section_child(key))
        .map(|key| {
            let suggestion = suggest_correction(&key, &known);
            ValidationWarning {
                message: format!("Unknown config key '{key}'"),
                field: key,
                suggestion,
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
