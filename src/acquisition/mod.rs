//! Sensor data acquisition module
//!
//! Turns raw telemetry into validated [`SensorRecord`](crate::types::SensorRecord)s:
//! - `table`: header + rows text (CSV dialect), with schema validation
//! - `synthetic`: fixed-seed demonstration data obeying the same invariants

pub mod synthetic;
pub mod table;

pub use synthetic::SyntheticGenerator;
pub use table::{write_table, IngestError, TableIngestor};
