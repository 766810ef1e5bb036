//! CSV export of the lookup history.
//!
//! Rows are written in insertion order (ascending id), the order of an
//! unfiltered scan, so repeated exports of an unchanged store are identical.

use csv::Writer;
use std::path::{Path, PathBuf};

use crate::dao::HistoryStore;
use crate::error::{Result, TrackerError};
use crate::model::QueryOrder;

pub const EXPORT_HEADER: [&str; 6] = [
    "IP Address",
    "Country",
    "City",
    "Latitude",
    "Longitude",
    "Timestamp",
];

/// Write every stored record to `path`, replacing any existing file.
///
/// Best effort: a failure part-way leaves whatever was written so far.
/// Returns the path written on success.
pub fn export_csv(store: &HistoryStore, path: &Path) -> Result<PathBuf> {
    let records = store.query_all(QueryOrder::InsertionAsc)?;

    let export_err = |e: csv::Error| TrackerError::Export(format!("{}: {}", path.display(), e));
    let mut writer = Writer::from_path(path).map_err(export_err)?;

    writer.write_record(EXPORT_HEADER).map_err(export_err)?;
    for record in &records {
        let latitude = record.latitude.to_string();
        let longitude = record.longitude.to_string();
        let timestamp = record.formatted_timestamp();
        writer
            .write_record([
                record.ip.as_str(),
                record.country.as_str(),
                record.city.as_str(),
                latitude.as_str(),
                longitude.as_str(),
                timestamp.as_str(),
            ])
            .map_err(export_err)?;
    }

    writer
        .flush()
        .map_err(|e| TrackerError::Export(format!("{}: {}", path.display(), e)))?;

    Ok(path.to_path_buf())
}
