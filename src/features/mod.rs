//! Feature preparation
//!
//! Maps each validated [`SensorRecord`] to a [`FeatureVector`]:
//!
//! 1. Missing channel values are imputed (`constant` or per-channel `mean`)
//! 2. One base feature per channel: `(imputed - center) / scale`
//! 3. Derived features (`ratio`, `difference`, `product`) computed from the
//!    imputed, unscaled channel values
//!
//! Every definition is resolved to channel indices once, at setup, so
//! [`FeaturePreparer::prepare`] cannot fail and never looks up a name.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::{DerivedKind, FeatureConfig, ImputationConfig, ImputationStrategy};
use crate::types::{ChannelSet, FeatureSchema, FeatureVector, SensorRecord};

/// Setup errors: the declared feature set cannot be computed from the channels.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureConfigError {
    #[error("Derived feature '{feature}' references undeclared channel '{channel}'")]
    UndeclaredChannel { feature: String, channel: String },

    #[error("Feature name '{0}' is defined more than once")]
    DuplicateFeature(String),

    #[error("Scaling for channel '{channel}' is invalid: {reason}")]
    InvalidScaling { channel: String, reason: String },

    #[error("Scaling configured for undeclared channel '{0}'")]
    UnknownScalingChannel(String),

    #[error("Imputation mean configured for undeclared channel '{0}'")]
    UnknownMeanChannel(String),

    #[error("Imputation value for '{channel}' must be finite (got {value})")]
    InvalidImputation { channel: String, value: f64 },
}

#[derive(Debug, Clone, Copy)]
struct DerivedFeature {
    kind: DerivedKind,
    left: usize,
    right: usize,
}

impl DerivedFeature {
    fn compute(self, filled: &[f64]) -> f64 {
        let (l, r) = (filled[self.left], filled[self.right]);
        match self.kind {
            DerivedKind::Ratio => {
                if r == 0.0 {
                    0.0
                } else {
                    l / r
                }
            }
            DerivedKind::Difference => l - r,
            DerivedKind::Product => l * r,
        }
    }
}

/// Replace non-finite results with 0.0.
fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Per-record feature transform, fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct FeaturePreparer {
    channels: Arc<ChannelSet>,
    schema: Arc<FeatureSchema>,
    /// Replacement for a missing value, by channel index
    fill: Vec<f64>,
    /// `(center, scale)` by channel index
    scaling: Vec<(f64, f64)>,
    derived: Vec<DerivedFeature>,
}

impl FeaturePreparer {
    /// Resolve imputation and feature definitions against the channel set.
    ///
    /// # Errors
    /// [`FeatureConfigError`] when a definition names an undeclared channel,
    /// a feature name repeats, or a scaling/imputation value is unusable.
    pub fn new(
        channels: Arc<ChannelSet>,
        imputation: &ImputationConfig,
        features: &FeatureConfig,
    ) -> Result<Self, FeatureConfigError> {
        let fill = Self::resolve_fill(&channels, imputation)?;
        let scaling = Self::resolve_scaling(&channels, features)?;

        let mut names: Vec<String> = channels.names().to_vec();
        let mut derived = Vec::with_capacity(features.derived.len());
        for def in &features.derived {
            let name = def.name.trim();
            if name.is_empty() || names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                return Err(FeatureConfigError::DuplicateFeature(def.name.clone()));
            }
            let lookup = |channel: &str| {
                channels
                    .index_of(channel)
                    .ok_or_else(|| FeatureConfigError::UndeclaredChannel {
                        feature: def.name.clone(),
                        channel: channel.to_string(),
                    })
            };
            derived.push(DerivedFeature {
                kind: def.kind,
                left: lookup(&def.left)?,
                right: lookup(&def.right)?,
            });
            names.push(name.to_string());
        }

        debug!(
            channels = channels.len(),
            derived = derived.len(),
            strategy = ?imputation.strategy,
            "Feature preparer ready"
        );

        Ok(Self {
            channels,
            schema: Arc::new(FeatureSchema::new(names)),
            fill,
            scaling,
            derived,
        })
    }

    fn resolve_fill(
        channels: &ChannelSet,
        imputation: &ImputationConfig,
    ) -> Result<Vec<f64>, FeatureConfigError> {
        if let Some(channel) = imputation.means.keys().find(|c| !channels.contains(c)) {
            return Err(FeatureConfigError::UnknownMeanChannel(channel.clone()));
        }

        channels
            .names()
            .iter()
            .map(|channel| {
                let value = match imputation.strategy {
                    ImputationStrategy::Constant => imputation.default_value,
                    ImputationStrategy::Mean => imputation
                        .means
                        .iter()
                        .find(|(k, _)| k.eq_ignore_ascii_case(channel))
                        .map_or(imputation.default_value, |(_, v)| *v),
                };
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(FeatureConfigError::InvalidImputation {
                        channel: channel.clone(),
                        value,
                    })
                }
            })
            .collect()
    }

    fn resolve_scaling(
        channels: &ChannelSet,
        features: &FeatureConfig,
    ) -> Result<Vec<(f64, f64)>, FeatureConfigError> {
        let mut scaling = vec![(0.0, 1.0); channels.len()];
        for (channel, s) in &features.scaling {
            let idx = channels
                .index_of(channel)
                .ok_or_else(|| FeatureConfigError::UnknownScalingChannel(channel.clone()))?;
            if !s.center.is_finite() {
                return Err(FeatureConfigError::InvalidScaling {
                    channel: channel.clone(),
                    reason: format!("center must be finite (got {})", s.center),
                });
            }
            if !s.scale.is_finite() || s.scale == 0.0 {
                return Err(FeatureConfigError::InvalidScaling {
                    channel: channel.clone(),
                    reason: format!("scale must be finite and non-zero (got {})", s.scale),
                });
            }
            scaling[idx] = (s.center, s.scale);
        }
        Ok(scaling)
    }

    pub const fn schema(&self) -> &Arc<FeatureSchema> {
        &self.schema
    }

    pub const fn channels(&self) -> &Arc<ChannelSet> {
        &self.channels
    }

    /// Build the feature vector for one record.
    ///
    /// Records built over a different channel set are read by channel name.
    pub fn prepare(&self, record: &SensorRecord) -> FeatureVector {
        let same_layout = Arc::ptr_eq(record.channels(), &self.channels);
        let filled: Vec<f64> = self
            .channels
            .names()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let raw = if same_layout {
                    record.value_at(i)
                } else {
                    record.value(name)
                };
                raw.unwrap_or(self.fill[i])
            })
            .collect();

        let mut values = Vec::with_capacity(self.schema.len());
        values.extend(
            filled
                .iter()
                .zip(&self.scaling)
                .map(|(&v, &(center, scale))| finite_or_zero((v - center) / scale)),
        );
        values.extend(self.derived.iter().map(|d| finite_or_zero(d.compute(&filled))));

        FeatureVector::new(record.id(), Arc::clone(&self.schema), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DerivedFeatureConfig, ScalingConfig};
    use crate::types::RecordId;

    fn channels() -> Arc<ChannelSet> {
        Arc::new(ChannelSet::new(["temperature", "vibration", "pressure"]).unwrap())
    }

    fn derived(name: &str, kind: DerivedKind, left: &str, right: &str) -> DerivedFeatureConfig {
        DerivedFeatureConfig {
            name: name.to_string(),
            kind,
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    fn record(set: &Arc<ChannelSet>, values: Vec<Option<f64>>) -> SensorRecord {
        SensorRecord::new(RecordId::Row(0), Arc::clone(set), values)
    }

    fn plain_features() -> FeatureConfig {
        FeatureConfig {
            scaling: Default::default(),
            derived: Vec::new(),
        }
    }

    /// Preparer with default (zero) imputation.
    fn preparer(
        set: Arc<ChannelSet>,
        features: &FeatureConfig,
    ) -> Result<FeaturePreparer, FeatureConfigError> {
        FeaturePreparer::new(set, &ImputationConfig::default(), features)
    }

    #[test]
    fn test_zero_imputation_of_missing_vibration() {
        let set = channels();
        let prep = preparer(Arc::clone(&set), &plain_features()).unwrap();
        let fv = prep.prepare(&record(&set, vec![Some(90.0), None, Some(100.0)]));
        assert_eq!(fv.get("vibration"), Some(0.0));
        assert_eq!(fv.get("temperature"), Some(90.0));
        assert_eq!(fv.id(), RecordId::Row(0));
    }

    #[test]
    fn test_mean_imputation_with_fallback() {
        let set = channels();
        let mut imputation = ImputationConfig {
            strategy: ImputationStrategy::Mean,
            default_value: -1.0,
            ..Default::default()
        };
        imputation.means.insert("vibration".to_string(), 2.5);
        let prep = FeaturePreparer::new(Arc::clone(&set), &imputation, &plain_features()).unwrap();
        let fv = prep.prepare(&record(&set, vec![None, None, Some(1.0)]));
        assert_eq!(fv.get("vibration"), Some(2.5));
        assert_eq!(fv.get("temperature"), Some(-1.0));
    }

    #[test]
    fn test_scaling_applies_to_base_features_only() {
        let set = channels();
        let mut features = FeatureConfig {
            scaling: Default::default(),
            derived: vec![derived("heat_ratio", DerivedKind::Ratio, "temperature", "pressure")],
        };
        features
            .scaling
            .insert("temperature".to_string(), ScalingConfig { center: 60.0, scale: 10.0 });
        let prep = preparer(Arc::clone(&set), &features).unwrap();
        let fv = prep.prepare(&record(&set, vec![Some(80.0), Some(1.0), Some(40.0)]));
        assert_eq!(fv.get("temperature"), Some(2.0));
        assert_eq!(fv.get("heat_ratio"), Some(2.0));
        assert_eq!(prep.schema().names().len(), 4);
    }

    #[test]
    fn test_derived_kinds() {
        let set = channels();
        let features = FeatureConfig {
            scaling: Default::default(),
            derived: vec![
                derived("r", DerivedKind::Ratio, "temperature", "vibration"),
                derived("d", DerivedKind::Difference, "temperature", "vibration"),
                derived("p", DerivedKind::Product, "temperature", "vibration"),
            ],
        };
        let prep = preparer(Arc::clone(&set), &features).unwrap();
        let fv = prep.prepare(&record(&set, vec![Some(9.0), Some(3.0), Some(0.0)]));
        assert_eq!(fv.get("r"), Some(3.0));
        assert_eq!(fv.get("d"), Some(6.0));
        assert_eq!(fv.get("p"), Some(27.0));
    }

    #[test]
    fn test_zero_denominator_ratio_is_zero() {
        let set = channels();
        let features = FeatureConfig {
            scaling: Default::default(),
            derived: vec![derived("r", DerivedKind::Ratio, "temperature", "vibration")],
        };
        let prep = preparer(Arc::clone(&set), &features).unwrap();
        let fv = prep.prepare(&record(&set, vec![Some(9.0), None, Some(0.0)]));
        assert_eq!(fv.get("r"), Some(0.0));
    }

    #[test]
    fn test_overflow_becomes_zero() {
        let set = channels();
        let features = FeatureConfig {
            scaling: Default::default(),
            derived: vec![derived("p", DerivedKind::Product, "temperature", "pressure")],
        };
        let prep = preparer(Arc::clone(&set), &features).unwrap();
        let fv = prep.prepare(&record(&set, vec![Some(1e300), Some(1.0), Some(1e300)]));
        assert_eq!(fv.get("p"), Some(0.0));
        assert!(fv.iter().all(|(_, v)| v.is_finite()));
    }

    #[test]
    fn test_undeclared_channel_rejected_at_setup() {
        let features = FeatureConfig {
            scaling: Default::default(),
            derived: vec![derived("x", DerivedKind::Product, "temperature", "humidity")],
        };
        let err = preparer(channels(), &features).unwrap_err();
        assert_eq!(
            err,
            FeatureConfigError::UndeclaredChannel {
                feature: "x".to_string(),
                channel: "humidity".to_string()
            }
        );
    }

    #[test]
    fn test_derived_name_colliding_with_channel_rejected() {
        let features = FeatureConfig {
            scaling: Default::default(),
            derived: vec![derived("Pressure", DerivedKind::Product, "temperature", "vibration")],
        };
        let err = preparer(channels(), &features).unwrap_err();
        assert!(matches!(err, FeatureConfigError::DuplicateFeature(_)));
    }

    #[test]
    fn test_unknown_mean_and_scaling_channels_rejected() {
        let mut imputation = ImputationConfig::default();
        imputation.means.insert("humidity".to_string(), 1.0);
        assert!(matches!(
            FeaturePreparer::new(channels(), &imputation, &plain_features()),
            Err(FeatureConfigError::UnknownMeanChannel(_))
        ));

        let mut features = plain_features();
        features.scaling.insert("humidity".to_string(), ScalingConfig::default());
        assert!(matches!(
            preparer(channels(), &features),
            Err(FeatureConfigError::UnknownScalingChannel(_))
        ));
    }

    #[test]
    fn test_zero_scale_rejected() {
        let mut features = plain_features();
        features
            .scaling
            .insert("vibration".to_string(), ScalingConfig { center: 0.0, scale: 0.0 });
        assert!(matches!(
            preparer(channels(), &features),
            Err(FeatureConfigError::InvalidScaling { .. })
        ));
    }

    #[test]
    fn test_foreign_channel_layout_read_by_name() {
        let prep = preparer(channels(), &plain_features()).unwrap();
        let other = Arc::new(ChannelSet::new(["pressure", "temperature", "vibration"]).unwrap());
        let fv = prep.prepare(&record(&other, vec![Some(100.0), Some(70.0), Some(3.0)]));
        assert_eq!(fv.get("temperature"), Some(70.0));
        assert_eq!(fv.get("pressure"), Some(100.0));
    }

    #[test]
    fn test_default_feature_config_builds_thermal_load() {
        let set = Arc::new(
            ChannelSet::new(["temperature", "vibration", "pressure", "rotational_speed"]).unwrap(),
        );
        let prep = preparer(Arc::clone(&set), &FeatureConfig::default()).unwrap();
        let fv = prep.prepare(&record(
            &set,
            vec![Some(80.0), Some(6.0), Some(100.0), Some(1500.0)],
        ));
        assert_eq!(fv.get("thermal_load"), Some(480.0));
    }
}
