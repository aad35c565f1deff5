//! Shared helpers: logging setup, environment, time and timeouts

pub mod env;
pub mod logging;
pub mod time;
pub mod timeout;

pub use env::{env_bool, env_bool_opt, env_int, env_opt};
#[cfg(feature = "json-logging")]
pub use logging::init_json_logging;
pub use logging::{init_logging, init_logging_from_config, resolve_filter};
pub use time::current_timestamp;
pub use timeout::{with_custom_timeout, with_loader_timeout};
