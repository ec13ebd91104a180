//! Common infrastructure shared by the callflow crates.
//!
//! - [`errors`]: base error type and context helpers
//! - [`logging`]: `tracing-subscriber` setup
//! - [`settings`]: layered configuration loading (file + environment)

pub mod errors;
pub mod logging;
pub mod settings;

pub use errors::{Error, ErrorContext, ErrorExt, Result};
pub use logging::{setup_logging, LoggingConfig};
pub use settings::{from_toml_str, load_settings};
