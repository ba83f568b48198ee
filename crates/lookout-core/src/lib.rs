pub mod config;
pub mod error;

pub use config::LookoutConfig;
pub use error::{LookoutError, Result};
