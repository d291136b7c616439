//! Prefixed environment variable lookup.

use std::str::FromStr;

use crate::{Error, Result};

pub const ENV_PREFIX: &str = "LLM_GATE_";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads `LLM_GATE_*` variables.
///
/// Environment variables are treated as read-only; tests inject a lookup
/// function with [`EnvSource::from_fn`] instead of mutating the process
/// environment.
pub struct EnvSource {
    prefix: String,
    lookup: Lookup,
}

impl EnvSource {
    pub fn new() -> Self {
        Self {
            prefix: ENV_PREFIX.to_string(),
            lookup: Box::new(|name| std::env::var(name).ok()),
        }
    }

    pub fn from_fn(lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            prefix: ENV_PREFIX.to_string(),
            lookup: Box::new(lookup),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Full variable name for `key`, e.g. `max_concurrent` becomes
    /// `LLM_GATE_MAX_CONCURRENT`.
    pub fn var_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.to_uppercase().replace('.', "_"))
    }

    /// Raw value, with blank values treated as unset.
    pub fn get_raw(&self, key: &str) -> Option<String> {
        (self.lookup)(&self.var_name(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn get<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get_raw(key)
            .map(|raw| {
                raw.parse::<T>().map_err(|e| {
                    Error::Config(format!("{}={:?}: {}", self.var_name(key), raw, e))
                })
            })
            .transpose()
    }
}

impl Default for EnvSource {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSource")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
