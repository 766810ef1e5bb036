pub mod cli;
pub mod config;
pub mod dao;
pub mod error;
pub mod i18n;
pub mod metrics;
pub mod model;
pub mod service;
pub mod terminal;

#[cfg(test)]
mod test_support;

pub use error::{Result, TrackerError};
