pub mod config;
pub mod error;

pub use config::PaystreamConfig;
pub use error::{PaystreamError, Result};
