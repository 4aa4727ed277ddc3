pub mod config;
pub mod error;
pub mod models;
pub mod storage;
pub mod utils;
pub mod web;

pub use config::Config;
pub use error::{Error, Result};
pub use models::*;
pub use storage::Storage;
pub use utils::*;

use tracing_subscriber::EnvFilter;

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "bowlpool=info,tower_http=info";

/// Set up the tracing subscriber, honoring `RUST_LOG`
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
