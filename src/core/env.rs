//! Environment/override lookup abstractions

use crate::core::error::{RatesError, Result};
use std::collections::HashMap;

/// Key to string lookup. Undefined keys read as the empty string.
pub trait EnvLookup: Send + Sync {
    fn get(&self, key: &str) -> Result<String>;
}

/// Reads the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn get(&self, key: &str) -> Result<String> {
        match std::env::var(key) {
            Ok(value) => Ok(value),
            Err(std::env::VarError::NotPresent) => Ok(String::new()),
            Err(e) => Err(RatesError::Lookup {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Fixed set of values, for embedding callers and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticEnv {
    values: HashMap<String, String>,
}

impl StaticEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl EnvLookup for StaticEnv {
    fn get(&self, key: &str) -> Result<String> {
        Ok(self.values.get(key).cloned().unwrap_or_default())
    }
}
