use chrono::{DateTime, Local};
use std::fmt;

/// Placeholder for optional provider fields that were absent.
pub const NOT_AVAILABLE: &str = "N/A";

/// Reason sent with a provider reply whose `status` is not `success`.
pub const LOOKUP_FAILED_MESSAGE: &str = "Unable to retrieve location information";

/// Reason attached to a `ValidationError`.
pub const INVALID_IP_MESSAGE: &str = "Invalid IP address format";

#[derive(Debug, Clone, PartialEq)]
pub struct GeoLocation {
    pub ip: String,
    pub country: String,
    pub city: String,
    pub lat: f64,
    pub lon: f64,
    pub isp: String,
    pub org: String,
    pub timezone: String,
}

impl GeoLocation {
    /// Multi-line block shown in the result panel.
    pub fn display_text(&self) -> String {
        format!(
            "IP: {}\nCountry: {}\nCity: {}\nLatitude: {}\nLongitude: {}\nISP: {}\nOrganization: {}\nTimezone: {}",
            self.ip, self.country, self.city, self.lat, self.lon, self.isp, self.org, self.timezone
        )
    }
}

#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub ip: String,
    pub submitted_at: DateTime<Local>,
}

impl LookupRequest {
    pub fn new(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            submitted_at: Local::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    Transport,
    Timeout,
    HttpStatus,
    MalformedBody,
    /// Provider answered but reported a non-success status
    ProviderRejected,
    Cancelled,
    /// The lookup task itself failed (panicked)
    TaskFailed,
}

/// Terminal outcome of exactly one lookup request.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    Success(GeoLocation),
    ValidationError {
        ip: String,
        reason: String,
    },
    NetworkError {
        ip: String,
        message: String,
        kind: NetworkErrorKind,
    },
}

/// Coarse classification used for status bar text and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    Success,
    InvalidInput,
    LookupFailed,
    NetworkError,
}

impl LookupResult {
    pub fn invalid(ip: impl Into<String>) -> Self {
        LookupResult::ValidationError {
            ip: ip.into(),
            reason: INVALID_IP_MESSAGE.to_string(),
        }
    }

    pub fn network(ip: impl Into<String>, message: impl Into<String>, kind: NetworkErrorKind) -> Self {
        LookupResult::NetworkError {
            ip: ip.into(),
            message: message.into(),
            kind,
        }
    }

    pub fn ip(&self) -> &str {
        match self {
            LookupResult::Success(location) => &location.ip,
            LookupResult::ValidationError { ip, .. } => ip,
            LookupResult::NetworkError { ip, .. } => ip,
        }
    }

    pub fn status(&self) -> LookupStatus {
        match self {
            LookupResult::Success(_) => LookupStatus::Success,
            LookupResult::ValidationError { .. } => LookupStatus::InvalidInput,
            LookupResult::NetworkError {
                kind: NetworkErrorKind::ProviderRejected,
                ..
            } => LookupStatus::LookupFailed,
            LookupResult::NetworkError { .. } => LookupStatus::NetworkError,
        }
    }

    pub fn display_text(&self) -> String {
        match self {
            LookupResult::Success(location) => location.display_text(),
            LookupResult::ValidationError { reason, .. } => reason.clone(),
            LookupResult::NetworkError { message, .. } => message.clone(),
        }
    }
}

impl fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LookupStatus::Success => "success",
            LookupStatus::InvalidInput => "invalid_input",
            LookupStatus::LookupFailed => "lookup_failed",
            LookupStatus::NetworkError => "network_error",
        };
        f.write_str(label)
    }
}
