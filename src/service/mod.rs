pub mod channel;
pub mod export_service;
pub mod geo_service;
pub mod session;
pub mod validator;

pub use channel::{result_channel, ResultPoller, ResultReceiver, ResultSender};
pub use export_service::export_csv;
pub use geo_service::{GeoService, LookupHandle};
pub use session::{LookupState, Presenter, ResultNotification, Session, SubmitOutcome};
pub use validator::validate;
