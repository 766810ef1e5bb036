mod geo;
mod history;

pub use geo::{
    GeoLocation, LookupRequest, LookupResult, LookupStatus, NetworkErrorKind, INVALID_IP_MESSAGE,
    LOOKUP_FAILED_MESSAGE, NOT_AVAILABLE,
};
pub use history::{HistoryRecord, NewHistoryEntry, QueryOrder, TIMESTAMP_FORMAT};
