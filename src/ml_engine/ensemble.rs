//! Threshold-rule ensemble
//!
//! Each rule is an independent voter: when its predicate holds it casts its
//! configured label, otherwise the opposite one. The ensemble label is the
//! majority; a tie resolves to `normal`. Confidence is the share of rules
//! agreeing with the final label.
//!
//! Rules are compiled once against the feature schema, so classification is
//! an index lookup and a comparison per condition.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use super::Classifier;
use crate::config::{Comparison, EnsembleConfig, MatchMode, RuleConfig, RuleFile};
use crate::types::{FeatureSchema, FeatureVector, Label, Prediction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// The rule set could not be loaded or is unusable
    #[error("Rule set unavailable: {0}")]
    Unavailable(String),

    /// A rule names a feature the preparer does not produce
    #[error("Rule '{rule}' references unknown feature '{feature}'")]
    UnknownFeature { rule: String, feature: String },
}

// ============================================================================
// Rule Loading
// ============================================================================

/// Load the rule set: the file at `rules_path` when set, the inline rules otherwise.
///
/// # Errors
/// [`ModelError::Unavailable`] when the file cannot be read or parsed, the
/// set is empty, a rule has no conditions, or a threshold is not finite.
pub fn load_rules(config: &EnsembleConfig) -> Result<Vec<RuleConfig>, ModelError> {
    let rules = match config.rules_path {
        Some(ref path) => read_rule_file(path)?,
        None => config.rules.clone(),
    };

    if rules.is_empty() {
        return Err(ModelError::Unavailable("rule set is empty".to_string()));
    }
    for rule in &rules {
        if rule.conditions.is_empty() {
            return Err(ModelError::Unavailable(format!(
                "rule '{}' has no conditions",
                rule.name
            )));
        }
        if let Some(cond) = rule.conditions.iter().find(|c| !c.threshold.is_finite()) {
            return Err(ModelError::Unavailable(format!(
                "rule '{}' has a non-finite threshold for '{}'",
                rule.name, cond.feature
            )));
        }
    }
    Ok(rules)
}

fn read_rule_file(path: &Path) -> Result<Vec<RuleConfig>, ModelError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        ModelError::Unavailable(format!("cannot read {}: {e}", path.display()))
    })?;
    let file: RuleFile = toml::from_str(&contents).map_err(|e| {
        ModelError::Unavailable(format!("cannot parse {}: {e}", path.display()))
    })?;
    Ok(file.rules)
}

/// MD5 of the canonical TOML form of a rule set.
pub fn fingerprint(rules: &[RuleConfig]) -> String {
    let canonical = toml::to_string(&RuleFile {
        rules: rules.to_vec(),
    })
    .unwrap_or_else(|_| format!("{rules:?}"));
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

// ============================================================================
// Compiled Rules
// ============================================================================

#[derive(Debug, Clone)]
struct Condition {
    feature: usize,
    op: Comparison,
    threshold: f64,
}

#[derive(Debug, Clone)]
struct Rule {
    name: String,
    mode: MatchMode,
    vote: Label,
    conditions: Vec<Condition>,
    /// Distinct features referenced, in condition order
    features: Vec<usize>,
}

impl Rule {
    fn holds(&self, read: impl Fn(usize) -> Option<f64>) -> bool {
        let check = |c: &Condition| read(c.feature).is_some_and(|v| c.op.holds(v, c.threshold));
        match self.mode {
            MatchMode::All => self.conditions.iter().all(check),
            MatchMode::Any => self.conditions.iter().any(check),
        }
    }
}

/// Majority-vote ensemble over threshold rules.
#[derive(Debug, Clone)]
pub struct RuleEnsemble {
    schema: Arc<FeatureSchema>,
    rules: Vec<Rule>,
    /// First-appearance rank of each feature across the rule set
    feature_rank: Vec<usize>,
    max_factors: usize,
    fingerprint: String,
}

impl RuleEnsemble {
    /// Load and compile the configured rule set against a feature schema.
    pub fn from_config(
        config: &EnsembleConfig,
        schema: Arc<FeatureSchema>,
    ) -> Result<Self, ModelError> {
        let rules = load_rules(config)?;
        Self::compile(&rules, schema, config.max_contributing_factors)
    }

    /// Resolve every condition to a feature index.
    ///
    /// # Errors
    /// [`ModelError::UnknownFeature`] when a condition names a feature absent
    /// from `schema`; [`ModelError::Unavailable`] for an empty rule set.
    pub fn compile(
        rules: &[RuleConfig],
        schema: Arc<FeatureSchema>,
        max_factors: usize,
    ) -> Result<Self, ModelError> {
        if rules.is_empty() {
            return Err(ModelError::Unavailable("rule set is empty".to_string()));
        }

        let mut feature_rank = vec![usize::MAX; schema.len()];
        let mut next_rank = 0;
        let mut compiled = Vec::with_capacity(rules.len());

        for rule in rules {
            let mut conditions = Vec::with_capacity(rule.conditions.len());
            let mut features = Vec::new();
            for cond in &rule.conditions {
                let idx = schema
                    .index_of(&cond.feature)
                    .ok_or_else(|| ModelError::UnknownFeature {
                        rule: rule.name.clone(),
                        feature: cond.feature.clone(),
                    })?;
                if feature_rank[idx] == usize::MAX {
                    feature_rank[idx] = next_rank;
                    next_rank += 1;
                }
                if !features.contains(&idx) {
                    features.push(idx);
                }
                conditions.push(Condition {
                    feature: idx,
                    op: cond.op,
                    threshold: cond.threshold,
                });
            }
            compiled.push(Rule {
                name: rule.name.clone(),
                mode: rule.mode,
                vote: rule.vote,
                conditions,
                features,
            });
        }

        let fingerprint = fingerprint(rules);
        info!(
            rules = compiled.len(),
            fingerprint = %fingerprint,
            "Rule ensemble loaded"
        );

        Ok(Self {
            schema,
            rules: compiled,
            feature_rank,
            max_factors,
            fingerprint,
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    /// MD5 of the rule set this ensemble was compiled from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Every feature referenced by a failure-voting rule, whether or not its
    /// own condition held; most referenced first.
    fn contributing_factors(&self, failure_voters: &[&Rule]) -> Vec<String> {
        let mut counts = vec![0usize; self.schema.len()];
        for rule in failure_voters {
            for &f in &rule.features {
                counts[f] += 1;
            }
        }
        let mut ranked: Vec<usize> = (0..counts.len()).filter(|&f| counts[f] > 0).collect();
        ranked.sort_by(|&a, &b| {
            counts[b]
                .cmp(&counts[a])
                .then(self.feature_rank[a].cmp(&self.feature_rank[b]))
        });
        ranked
            .into_iter()
            .take(self.max_factors)
            .map(|f| self.schema.names()[f].clone())
            .collect()
    }
}

impl Classifier for RuleEnsemble {
    fn name(&self) -> &str {
        "rule-ensemble"
    }

    fn classify(&self, features: &FeatureVector) -> Prediction {
        let same_schema = Arc::ptr_eq(features.schema(), &self.schema);
        let read = |idx: usize| {
            if same_schema {
                features.value_at(idx)
            } else {
                features.get(&self.schema.names()[idx])
            }
        };

        let failure_voters: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|rule| {
                let cast = if rule.holds(read) { rule.vote } else { rule.vote.opposite() };
                cast == Label::Failure
            })
            .collect();

        let total = self.rules.len();
        let failure_votes = failure_voters.len();
        let normal_votes = total - failure_votes;

        // Ties resolve to normal
        let (label, agreeing) = if failure_votes > normal_votes {
            (Label::Failure, failure_votes)
        } else {
            (Label::Normal, normal_votes)
        };

        let factors = if label == Label::Failure {
            self.contributing_factors(&failure_voters)
        } else {
            Vec::new()
        };

        #[allow(clippy::cast_precision_loss)]
        let confidence = agreeing as f64 / total as f64;

        Prediction::new(features.id(), label, confidence, failure_votes, total, factors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConditionConfig;
    use crate::types::RecordId;
    use std::io::Write;

    fn schema() -> Arc<FeatureSchema> {
        Arc::new(FeatureSchema::new(vec![
            "temperature".to_string(),
            "vibration".to_string(),
            "pressure".to_string(),
        ]))
    }

    fn vector(schema: &Arc<FeatureSchema>, values: [f64; 3]) -> FeatureVector {
        FeatureVector::new(RecordId::Row(0), Arc::clone(schema), values.to_vec())
    }

    fn cond(feature: &str, op: Comparison, threshold: f64) -> ConditionConfig {
        ConditionConfig {
            feature: feature.to_string(),
            op,
            threshold,
        }
    }

    fn rule(name: &str, conditions: Vec<ConditionConfig>) -> RuleConfig {
        RuleConfig {
            name: name.to_string(),
            mode: MatchMode::All,
            vote: Label::Failure,
            conditions,
        }
    }

    fn hot_and_shaking() -> RuleConfig {
        rule(
            "hot_and_shaking",
            vec![
                cond("temperature", Comparison::Greater, 80.0),
                cond("vibration", Comparison::Greater, 5.0),
            ],
        )
    }

    #[test]
    fn test_single_rule_scenario() {
        let s = schema();
        let ens = RuleEnsemble::compile(&[hot_and_shaking()], Arc::clone(&s), 3).unwrap();
        let labels: Vec<Label> = [[90.0, 8.0, 0.0], [40.0, 1.0, 0.0], [85.0, 6.0, 0.0]]
            .into_iter()
            .map(|v| ens.classify(&vector(&s, v)).label())
            .collect();
        assert_eq!(labels, vec![Label::Failure, Label::Normal, Label::Failure]);
    }

    #[test]
    fn test_majority_and_confidence() {
        let s = schema();
        let rules = vec![
            rule("hot", vec![cond("temperature", Comparison::Greater, 80.0)]),
            rule("shaking", vec![cond("vibration", Comparison::Greater, 5.0)]),
            rule("pressurised", vec![cond("pressure", Comparison::Greater, 120.0)]),
        ];
        let ens = RuleEnsemble::compile(&rules, Arc::clone(&s), 3).unwrap();
        let p = ens.classify(&vector(&s, [90.0, 8.0, 100.0]));
        assert_eq!(p.label(), Label::Failure);
        assert!((p.confidence() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(p.votes_for_failure(), 2);
        assert_eq!(p.votes_total(), 3);
    }

    #[test]
    fn test_tie_goes_to_normal() {
        let s = schema();
        let rules = vec![
            rule("hot", vec![cond("temperature", Comparison::Greater, 80.0)]),
            rule("shaking", vec![cond("vibration", Comparison::Greater, 5.0)]),
        ];
        let ens = RuleEnsemble::compile(&rules, Arc::clone(&s), 3).unwrap();
        let p = ens.classify(&vector(&s, [90.0, 1.0, 0.0]));
        assert_eq!(p.label(), Label::Normal);
        assert!((p.confidence() - 0.5).abs() < 1e-12);
        assert!(p.contributing_factors().is_empty());
    }

    #[test]
    fn test_normal_vote_rule_and_any_mode() {
        let s = schema();
        let mut calm = rule(
            "calm",
            vec![
                cond("vibration", Comparison::LessOrEqual, 1.0),
                cond("temperature", Comparison::Less, 30.0),
            ],
        );
        calm.vote = Label::Normal;
        calm.mode = MatchMode::Any;
        let ens = RuleEnsemble::compile(&[calm], Arc::clone(&s), 3).unwrap();

        assert_eq!(ens.classify(&vector(&s, [50.0, 0.5, 0.0])).label(), Label::Normal);
        let p = ens.classify(&vector(&s, [50.0, 3.0, 0.0]));
        assert_eq!(p.label(), Label::Failure);
        assert!((p.confidence() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_contributing_factors_ranked_and_truncated() {
        let s = schema();
        let rules = vec![
            rule("p", vec![cond("pressure", Comparison::Greater, 100.0)]),
            hot_and_shaking(),
            rule("v", vec![cond("vibration", Comparison::Greater, 4.0)]),
        ];
        let ens = RuleEnsemble::compile(&rules, Arc::clone(&s), 2).unwrap();
        let p = ens.classify(&vector(&s, [90.0, 8.0, 150.0]));
        assert_eq!(p.contributing_factors(), ["vibration", "pressure"]);
    }

    #[test]
    fn test_any_mode_factors_include_every_referenced_feature() {
        let s = schema();
        let mut either = rule(
            "hot_or_pressurised",
            vec![
                cond("temperature", Comparison::Greater, 80.0),
                cond("pressure", Comparison::Greater, 120.0),
            ],
        );
        either.mode = MatchMode::Any;
        let ens = RuleEnsemble::compile(&[either], Arc::clone(&s), 3).unwrap();

        // Only temperature holds; pressure is still a referenced feature
        let p = ens.classify(&vector(&s, [90.0, 0.0, 100.0]));
        assert_eq!(p.label(), Label::Failure);
        assert_eq!(p.contributing_factors(), ["temperature", "pressure"]);
    }

    #[test]
    fn test_same_vector_same_prediction() {
        let s = schema();
        let ens = RuleEnsemble::compile(&[hot_and_shaking()], Arc::clone(&s), 3).unwrap();
        let v = vector(&s, [85.0, 6.0, 0.0]);
        assert_eq!(ens.classify(&v), ens.classify(&v));
    }

    #[test]
    fn test_unknown_feature_rejected() {
        let err = RuleEnsemble::compile(
            &[rule("x", vec![cond("humidity", Comparison::Greater, 1.0)])],
            schema(),
            3,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownFeature {
                rule: "x".to_string(),
                feature: "humidity".to_string()
            }
        );
    }

    #[test]
    fn test_empty_and_conditionless_rule_sets_unavailable() {
        let empty = EnsembleConfig {
            rules: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(load_rules(&empty), Err(ModelError::Unavailable(_))));

        let bare = EnsembleConfig {
            rules: vec![rule("bare", Vec::new())],
            ..Default::default()
        };
        assert!(matches!(load_rules(&bare), Err(ModelError::Unavailable(_))));
    }

    #[test]
    fn test_rules_path_replaces_inline_rules() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[[rules]]
name = "from_file"
conditions = [{{ feature = "pressure", op = ">", threshold = 1.0 }}]
"#
        )
        .unwrap();
        let config = EnsembleConfig {
            rules_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let ens = RuleEnsemble::from_config(&config, schema()).unwrap();
        assert_eq!(ens.rule_names().collect::<Vec<_>>(), vec!["from_file"]);
    }

    #[test]
    fn test_missing_or_corrupt_rule_file_unavailable() {
        let config = EnsembleConfig {
            rules_path: Some("/nonexistent/rules.toml".into()),
            ..Default::default()
        };
        assert!(matches!(load_rules(&config), Err(ModelError::Unavailable(_))));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[[rules]\nname = ").unwrap();
        let config = EnsembleConfig {
            rules_path: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(load_rules(&config), Err(ModelError::Unavailable(_))));
    }

    #[test]
    fn test_fingerprint_tracks_rule_changes() {
        let a = vec![hot_and_shaking()];
        let mut b = a.clone();
        b[0].conditions[0].threshold = 81.0;
        assert_eq!(fingerprint(&a), fingerprint(&a.clone()));
        assert_ne!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a).len(), 32);
    }
}
