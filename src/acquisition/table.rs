//! Tabular telemetry ingestion
//!
//! Parses comma-separated text with a header row into [`SensorRecord`]s.
//!
//! Header names are matched case-insensitively against the declared channel
//! set; extra columns are ignored. Fields may be double-quoted (`""` escapes a
//! quote). Quoted fields spanning several lines are not supported.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::defaults::MISSING_MARKERS;
use crate::config::{ChannelConfig, ConfigError};
use crate::types::{ChannelSet, RecordId, SensorRecord};

/// Ingestion errors. Both are terminal for the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// Header absent or malformed, column count mismatch, bad identifier,
    /// or a missing value while missing values are rejected
    #[error("Format error on line {line}: {message}")]
    Format { line: usize, message: String },

    #[error("Input contains no data rows")]
    EmptyInput,
}

impl IngestError {
    fn format(line: usize, message: impl Into<String>) -> Self {
        Self::Format {
            line,
            message: message.into(),
        }
    }
}

// ============================================================================
// CSV Quote-Aware Parsing
// ============================================================================

/// Split a CSV line respecting quoted fields (handles commas inside quotes).
/// Returns owned strings because quoted fields need unquoting.
fn csv_split(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes {
                    // Check for escaped quote ("")
                    if chars.peek() == Some(&'"') {
                        current.push('"');
                        chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    in_quotes = true;
                }
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    fields.push(current);
    fields
}

/// Quote a field if it would not survive `csv_split` unquoted.
fn csv_escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ============================================================================
// Field Parsing
// ============================================================================

/// Parse a numeric field; anything that is not a finite number is missing.
fn parse_value(field: &str) -> Option<f64> {
    let s = field.trim();
    if s.is_empty() || MISSING_MARKERS.iter().any(|m| s.eq_ignore_ascii_case(m)) {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Naive datetime layouts, read as UTC.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an identifier as Unix epoch seconds, RFC 3339, or a naive UTC datetime.
fn parse_timestamp(s: &str) -> Result<i64, String> {
    let s = s.trim();

    // Try direct numeric parsing first (already epoch)
    if let Ok(epoch) = s.parse::<i64>() {
        return Ok(epoch);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).timestamp());
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc().timestamp())
        .ok_or_else(|| format!("cannot parse identifier '{s}' as a timestamp"))
}

// ============================================================================
// Ingestor
// ============================================================================

/// Turns raw tabular text into validated sensor records.
///
/// Pure: no file or network access, no state between calls.
#[derive(Debug, Clone)]
pub struct TableIngestor {
    channels: Arc<ChannelSet>,
    id_column: Option<String>,
    reject_missing: bool,
}

/// Column positions resolved from the header row.
struct ColumnMap {
    width: usize,
    channels: Vec<usize>,
    id: Option<usize>,
}

impl TableIngestor {
    pub const fn new(channels: Arc<ChannelSet>) -> Self {
        Self {
            channels,
            id_column: None,
            reject_missing: false,
        }
    }

    /// Build from the `[channels]` config section.
    pub fn from_config(config: &ChannelConfig) -> Result<Self, ConfigError> {
        let channels = ChannelSet::new(config.names.iter().cloned())
            .map_err(|e| ConfigError::Validation(vec![format!("channels.names: {e}")]))?;
        let mut ingestor = Self::new(Arc::new(channels)).reject_missing(config.reject_missing);
        if let Some(ref id) = config.id_column {
            ingestor = ingestor.with_id_column(id.clone());
        }
        Ok(ingestor)
    }

    /// Take record identifiers from this column instead of the row index.
    #[must_use]
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    /// Fail on missing channel values instead of leaving them for imputation.
    #[must_use]
    pub const fn reject_missing(mut self, reject: bool) -> Self {
        self.reject_missing = reject;
        self
    }

    pub const fn channels(&self) -> &Arc<ChannelSet> {
        &self.channels
    }

    /// Parse `raw` into one record per data row, in input order.
    ///
    /// # Errors
    /// - [`IngestError::Format`] for an absent/malformed header, a row whose
    ///   column count differs from the header, an unparseable identifier, or a
    ///   missing value when missing values are rejected
    /// - [`IngestError::EmptyInput`] when the header is followed by no data rows
    pub fn ingest(&self, raw: &str) -> Result<Vec<SensorRecord>, IngestError> {
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
        let mut lines = raw
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| !l.trim().is_empty());

        let (header_line, header) = lines
            .next()
            .ok_or_else(|| IngestError::format(1, "missing header row"))?;
        let columns = self.map_header(header_line, header)?;

        let mut records = Vec::new();
        for (line_num, line) in lines {
            let fields = csv_split(line);
            if fields.len() != columns.width {
                return Err(IngestError::format(
                    line_num,
                    format!(
                        "expected {} columns (from header), found {}",
                        columns.width,
                        fields.len()
                    ),
                ));
            }

            let id = match columns.id {
                Some(idx) => RecordId::Timestamp(
                    parse_timestamp(&fields[idx]).map_err(|e| IngestError::format(line_num, e))?,
                ),
                None => RecordId::Row(records.len() as u64),
            };

            let mut values = Vec::with_capacity(columns.channels.len());
            for (channel_idx, &col) in columns.channels.iter().enumerate() {
                let value = parse_value(&fields[col]);
                if value.is_none() && self.reject_missing {
                    return Err(IngestError::format(
                        line_num,
                        format!(
                            "missing value for required channel '{}'",
                            self.channels.names()[channel_idx]
                        ),
                    ));
                }
                values.push(value);
            }

            records.push(SensorRecord::new(id, Arc::clone(&self.channels), values));
        }

        if records.is_empty() {
            return Err(IngestError::EmptyInput);
        }

        debug!(
            rows = records.len(),
            missing = records.iter().map(SensorRecord::missing_count).sum::<usize>(),
            "Ingested telemetry table"
        );
        Ok(records)
    }

    fn map_header(&self, line: usize, header: &str) -> Result<ColumnMap, IngestError> {
        let names: Vec<String> = csv_split(header)
            .into_iter()
            .map(|n| n.trim().to_string())
            .collect();

        if let Some(pos) = names.iter().position(String::is_empty) {
            return Err(IngestError::format(
                line,
                format!("header column {} has no name", pos + 1),
            ));
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].iter().any(|n| n.eq_ignore_ascii_case(name)) {
                return Err(IngestError::format(
                    line,
                    format!("header declares column '{name}' more than once"),
                ));
            }
        }

        let find = |wanted: &str| names.iter().position(|n| n.eq_ignore_ascii_case(wanted));

        let mut channels = Vec::with_capacity(self.channels.len());
        let mut absent = Vec::new();
        for channel in self.channels.names() {
            match find(channel) {
                Some(idx) => channels.push(idx),
                None => absent.push(format!("'{channel}'")),
            }
        }
        if !absent.is_empty() {
            return Err(IngestError::format(
                line,
                format!("header does not declare required channel(s) {}", absent.join(", ")),
            ));
        }

        let id = match self.id_column {
            Some(ref col) => Some(find(col).ok_or_else(|| {
                IngestError::format(line, format!("header does not declare id column '{col}'"))
            })?),
            None => None,
        };

        Ok(ColumnMap {
            width: names.len(),
            channels,
            id,
        })
    }
}

/// Render records as a table the ingestor reads back unchanged.
///
/// Missing values become empty fields. Timestamp identifiers are written to
/// a leading `timestamp` column when every record carries one.
pub fn write_table(channels: &ChannelSet, records: &[SensorRecord]) -> String {
    let with_ts = !records.is_empty()
        && records
            .iter()
            .all(|r| matches!(r.id(), RecordId::Timestamp(_)));

    let mut header: Vec<String> = Vec::with_capacity(channels.len() + 1);
    if with_ts {
        header.push("timestamp".to_string());
    }
    header.extend(channels.names().iter().map(|n| csv_escape(n)));

    let mut out = header.join(",");
    out.push('\n');

    for record in records {
        let mut row: Vec<String> = Vec::with_capacity(header.len());
        if let RecordId::Timestamp(ts) = record.id() {
            if with_ts {
                row.push(ts.to_string());
            }
        }
        row.extend(
            channels
                .names()
                .iter()
                .map(|c| record.value(c).map(|v| v.to_string()).unwrap_or_default()),
        );
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}
