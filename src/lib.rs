//! Logistics KPIs for dropshipping order exports.
//!
//! Load a CSV with [`loader::load_path`] (or build a [`loader::RawTable`] and
//! [`loader::normalize`] it), then compute everything at once with
//! [`kpi::kpi_report`] and project it to one exportable row with
//! [`types::KpiReport::flatten`].
pub mod config;
pub mod error;
pub mod kpi;
pub mod loader;
pub mod output;
pub mod types;
pub mod util;

pub use config::{ColumnMap, Config};
pub use error::{KpiError, Result};
pub use kpi::{kpi_report, KpiConfig};
pub use loader::{load_path, normalize, read_csv, LoadOptions, LoadReport, RawTable};
pub use types::{FlatRow, KpiReport, OrderRecord, OrderTable, Scalar};
