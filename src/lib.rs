pub mod analyzers;
pub mod bundles;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod output;
pub mod parser;
pub mod store;

pub use error::{HistoryError, Result};
