//! Compile-time constants handed to the front-end compile.
//!
//! The front-end reads these with `option_env!`, so every value is resolved
//! once per build mode and embedded in the artifact.

use std::collections::BTreeMap;

use crate::config::{AppConfig, ConfigError, Mode, API_ENDPOINT_VAR};

/// Name of the define carrying the active build mode.
pub const MODE_VAR: &str = "VOICERAG_MODE";

/// Ordered set of `NAME = value` constants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defines {
    values: BTreeMap<String, String>,
}

impl Defines {
    pub fn from_config(config: &AppConfig, mode: &Mode) -> Result<Self, ConfigError> {
        let mut defines = Self::default();
        defines.insert(API_ENDPOINT_VAR, config.api.resolved_base_url()?);
        defines.insert(MODE_VAR, mode.as_str());
        Ok(defines)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
