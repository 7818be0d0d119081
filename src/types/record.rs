//! Sensor record types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Ordered, duplicate-free set of sensor channel names.
///
/// Shared by `Arc` between every record of a run so each record only stores
/// its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSet {
    names: Vec<String>,
}

impl ChannelSet {
    /// Build a channel set, rejecting empty or duplicate names.
    pub fn new<I, S>(names: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for name in names {
            let name = name.into().trim().to_string();
            if name.is_empty() {
                return Err("channel names must not be empty".to_string());
            }
            if out.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                return Err(format!("channel '{name}' is declared more than once"));
            }
            out.push(name);
        }
        if out.is_empty() {
            return Err("at least one channel must be declared".to_string());
        }
        Ok(Self { names: out })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a channel, matched case-insensitively.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }
}

/// Identifier of one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordId {
    /// Zero-based data-row index
    Row(u64),
    /// Unix timestamp in seconds, taken from the configured id column
    Timestamp(i64),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row(i) => write!(f, "row {i}"),
            Self::Timestamp(ts) => write!(f, "t={ts}"),
        }
    }
}

/// One observation of every declared channel.
///
/// Values are either finite numbers or `None` (missing). Records are
/// immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    id: RecordId,
    channels: Arc<ChannelSet>,
    values: Vec<Option<f64>>,
}

impl SensorRecord {
    /// Build a record. Non-finite values are stored as missing.
    ///
    /// `values` is matched positionally against `channels`; surplus values are
    /// dropped and absent trailing values are treated as missing.
    pub fn new(id: RecordId, channels: Arc<ChannelSet>, values: Vec<Option<f64>>) -> Self {
        let values = (0..channels.len())
            .map(|i| values.get(i).copied().flatten().filter(|v| v.is_finite()))
            .collect();
        Self {
            id,
            channels,
            values,
        }
    }

    pub const fn id(&self) -> RecordId {
        self.id
    }

    pub fn channels(&self) -> &Arc<ChannelSet> {
        &self.channels
    }

    /// Value of a channel by name; `None` if missing or undeclared.
    pub fn value(&self, channel: &str) -> Option<f64> {
        self.channels
            .index_of(channel)
            .and_then(|i| self.values[i])
    }

    /// Value of a channel by position.
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied().flatten()
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}
