use chrono::NaiveDateTime;

use super::GeoLocation;

/// Storage and export format for history timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A persisted successful lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub id: i64,
    pub ip: String,
    pub country: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: NaiveDateTime,
}

impl HistoryRecord {
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Fields of a record before the store assigns `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub ip: String,
    pub country: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&GeoLocation> for NewHistoryEntry {
    fn from(location: &GeoLocation) -> Self {
        Self {
            ip: location.ip.clone(),
            country: location.country.clone(),
            city: location.city.clone(),
            latitude: location.lat,
            longitude: location.lon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    /// Newest first; ties broken by descending id
    RecencyDesc,
    /// Insertion order (ascending id), used for export
    InsertionAsc,
}
