pub mod config;
pub mod error;
pub mod types;

pub use config::{ClassifierProvider, Config};
pub use error::TrendwatchError;
pub use types::*;
