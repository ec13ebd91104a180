//! Layered settings loading.
//!
//! A settings file (format chosen by extension) is overlaid with environment
//! variables named `<PREFIX>__<SECTION>__<KEY>`. Every section is expected to
//! carry `#[serde(default)]` so a missing file still yields a usable value.

use crate::errors::{Error, ErrorExt, Result};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Load settings of type `T` from an optional file plus environment overrides.
pub fn load_settings<T: DeserializeOwned>(path: Option<&Path>, env_prefix: &str) -> Result<T> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::config(format!("settings file not found: {}", path.display())));
        }
        builder = builder.add_source(config::File::from(path).required(true));
    }

    builder = builder.add_source(
        config::Environment::with_prefix(env_prefix)
            .prefix_separator("__")
            .separator("__"),
    );

    let settings = builder
        .build()
        .map_err(|e| Error::config(e.to_string()).with_context("settings", "build"))?;

    settings
        .try_deserialize::<T>()
        .map_err(|e| Error::config(e.to_string()).with_context("settings", "deserialize"))
}

/// Parse settings from an in-memory TOML document.
pub fn from_toml_str<T: DeserializeOwned>(source: &str) -> Result<T> {
    toml::from_str(source).map_err(|e| Error::config(e.to_string()).with_context("settings", "parse toml"))
}
