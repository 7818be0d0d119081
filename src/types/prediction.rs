//! Prediction types

use serde::{Deserialize, Serialize};
use std::fmt;

use super::RecordId;

/// Classification outcome for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Failure,
    Normal,
}

impl Label {
    /// The other label.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Failure => Self::Normal,
            Self::Normal => Self::Failure,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Failure => "failure",
            Self::Normal => "normal",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label and confidence for one feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    id: RecordId,
    label: Label,
    /// Fraction of voters agreeing with `label`, in [0, 1]
    confidence: f64,
    votes_for_failure: usize,
    votes_total: usize,
    /// Features that drove a failure label, strongest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    contributing_factors: Vec<String>,
}

impl Prediction {
    pub fn new(
        id: RecordId,
        label: Label,
        confidence: f64,
        votes_for_failure: usize,
        votes_total: usize,
        contributing_factors: Vec<String>,
    ) -> Self {
        Self {
            id,
            label,
            confidence: confidence.clamp(0.0, 1.0),
            votes_for_failure,
            votes_total,
            contributing_factors,
        }
    }

    pub const fn id(&self) -> RecordId {
        self.id
    }

    pub const fn label(&self) -> Label {
        self.label
    }

    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    pub const fn votes_for_failure(&self) -> usize {
        self.votes_for_failure
    }

    pub const fn votes_total(&self) -> usize {
        self.votes_total
    }

    pub fn contributing_factors(&self) -> &[String] {
        &self.contributing_factors
    }

    pub const fn is_failure(&self) -> bool {
        matches!(self.label, Label::Failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_display() {
        assert_eq!(format!("{}", Label::Failure), "failure");
        assert_eq!(format!("{}", Label::Normal), "normal");
        assert_eq!(Label::Failure.opposite(), Label::Normal);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let p = Prediction::new(RecordId::Row(0), Label::Normal, 1.5, 0, 1, Vec::new());
        assert!((p.confidence() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_serialization_skips_empty_factors() {
        let p = Prediction::new(RecordId::Row(2), Label::Normal, 1.0, 0, 1, Vec::new());
        let json = serde_json::to_string(&p).unwrap();
        assert!(json.contains(r#""label":"normal""#));
        assert!(!json.contains("contributing_factors"));
    }
}
