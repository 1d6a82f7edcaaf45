//! Constants, client configuration and first-run defaults.

use std::time::Duration;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use secrecy::{ExposeSecret, SecretString};
use url::Url;
use crate::utils::kv::Persistence;

/// Storage key of the completion endpoint credential.
pub const API_KEY_STORAGE_KEY: &str = "groq_api";

/// Storage key prefix of template records: `template_<name>`.
pub const TEMPLATE_KEY_PREFIX: &str = "template_";

/// Quiet period after the last keystroke before an input value is persisted.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

pub const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";

lazy_static! {
    static ref DEFAULT_API_BASE_URL: Url = Url::parse(DEFAULT_API_BASE).unwrap();
}

pub const ENV_API_KEY: &str = "GROQ_API_KEY";
pub const ENV_MODEL: &str = "GROQ_MODEL";
pub const ENV_API_BASE: &str = "GROQ_API_BASE";

/// Storage key of a template record.
pub fn template_key(template_name: &str) -> String {
    format!("{}{}", TEMPLATE_KEY_PREFIX, template_name)
}

/// Storage key prefix shared by all persisted input values of a template: `__<template>__`.
pub fn input_key_prefix(template_name: &str) -> String {
    format!("__{}__", template_name)
}

/// Storage key of one persisted input value: `__<template>__<param>`.
pub fn input_key(template_name: &str, param_name: &str) -> String {
    format!("{}{}", input_key_prefix(template_name), param_name)
}

/// Write the first-run defaults. Existing values are never overwritten.
pub fn seed_defaults(persistence: &Persistence) {
    persistence.set(API_KEY_STORAGE_KEY, "", false);
}

/// Everything needed to construct a completion client. Rebuild the client whenever this changes.
#[derive(Debug)]
pub struct ClientConfig {
    pub api_base: Url,
    pub model: String,
    api_key: SecretString,
}

impl ClientConfig {
    /// Config for the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_API_BASE_URL.clone(),
            model: DEFAULT_MODEL.to_string(),
            api_key: SecretString::from(api_key.into()),
        }
    }

    /// Read `GROQ_API_KEY`, `GROQ_MODEL` and `GROQ_API_BASE`, loading a `.env` file first if there is one.
    /// Only the key is required.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var(ENV_API_KEY).with_context(|| format!("{} is not set", ENV_API_KEY))?;
        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var(ENV_MODEL) {
            config = config.with_model(model);
        }
        if let Ok(api_base) = std::env::var(ENV_API_BASE) {
            config = config.with_api_base(&api_base)?;
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, api_base: &str) -> Result<Self> {
        self.api_base = Url::parse(api_base).with_context(|| format!("invalid api base {}", api_base))?;
        Ok(self)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = SecretString::from(api_key.into());
        self
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key().trim().is_empty()
    }
}
