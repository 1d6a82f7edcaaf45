//! # Template Store
//!
//! CRUD over [Template]s keyed by name, stored under `template_<name>`. Deleting a template also deletes every input
//! value persisted for it under `__<name>__`.
//!
//! Saving is a full replace; there is no partial update. Templates are listed in name order.

use std::fs;
use std::path::Path;
use anyhow::{Context, Result};
use log::{info, warn};
use serde_json::Value;
use crate::config::{input_key_prefix, template_key, TEMPLATE_KEY_PREFIX};
use crate::prompt::errors::ValidationError;
use crate::prompt::Template;
use crate::store::errors::ImportError;
use crate::utils::kv::Persistence;

#[derive(Clone)]
pub struct TemplateStore {
    persistence: Persistence,
}

impl TemplateStore {
    pub fn new(persistence: Persistence) -> Self {
        Self { persistence }
    }

    /// Write `template` under its name, replacing any template of the same name.
    ///
    /// Invalid templates are refused. Lint warnings are logged but do not stop the save.
    pub fn save(&self, template: &Template) -> Result<(), ValidationError> {
        template.validate()?;
        for warning in template.lint() {
            warn!("template {}: {}", template.name, warning);
        }
        self.persistence.set(&template_key(&template.name), template, true);
        Ok(())
    }

    /// Every decodable template, sorted by name. Undecodable records are skipped.
    pub fn list(&self) -> Vec<Template> {
        let mut templates: Vec<Template> = self.persistence
            .find_by_prefix(TEMPLATE_KEY_PREFIX, false)
            .iter()
            .filter_map(|(key, raw)| Persistence::decode_document::<Template>(key, raw))
            .collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }

    pub fn get(&self, name: &str) -> Option<Template> {
        if name.is_empty() {
            return None;
        }
        self.persistence.get_document(&template_key(name))
    }

    /// Remove the template record and all input values persisted for it. Returns whether a record existed.
    pub fn delete(&self, name: &str) -> bool {
        if name.is_empty() {
            return false;
        }
        let record = self.persistence.find_by_prefix(&template_key(name), true);
        self.persistence.delete(record.keys());
        let values = self.persistence.find_by_prefix(&input_key_prefix(name), false);
        self.persistence.delete(values.keys());
        info!("deleted template {} and {} stored input values", name, values.len());
        !record.is_empty()
    }

    /// All templates as a pretty-printed JSON array.
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.list())?)
    }

    /// Save every template of a JSON array, overwriting by name. Returns how many were saved.
    ///
    /// Every element is checked before anything is written, so a bad element leaves the store untouched.
    pub fn import_json(&self, text: &str) -> Result<usize, ImportError> {
        let templates = parse_import(text)?;
        for (index, template) in templates.iter().enumerate() {
            self.save(template).map_err(|e| ImportError::InvalidElement { index, reason: e.to_string() })?;
        }
        info!("imported {} templates", templates.len());
        Ok(templates.len())
    }

    pub fn export_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.export_json()?).with_context(|| format!("failed to write templates to {}", path.display()))
    }

    pub fn import_from_path(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).with_context(|| format!("failed to read templates from {}", path.display()))?;
        Ok(self.import_json(&text)?)
    }
}

fn parse_import(text: &str) -> Result<Vec<Template>, ImportError> {
    let parsed: Value = serde_json::from_str(text).map_err(|e| ImportError::Malformed(e.to_string()))?;
    let Value::Array(elements) = parsed else {
        return Err(ImportError::NotAnArray);
    };
    elements.into_iter()
        .enumerate()
        .map(|(index, element)| {
            let invalid = |reason: String| ImportError::InvalidElement { index, reason };
            for field in ["name", "params", "body"] {
                if element.get(field).is_none() {
                    return Err(invalid(format!("missing field {}", field)));
                }
            }
            let template: Template = serde_json::from_value(element).map_err(|e| invalid(e.to_string()))?;
            template.validate().map_err(|e| invalid(e.to_string()))?;
            Ok(template)
        })
        .collect()
}

pub mod errors {
    use std::error::Error;
    use std::fmt;
    use std::fmt::Formatter;

    /// Why a template import was refused. Nothing is written when an import fails.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ImportError {
        /// The text is not JSON.
        Malformed(String),
        /// The JSON is not an array.
        NotAnArray,
        InvalidElement { index: usize, reason: String },
    }

    impl fmt::Display for ImportError {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            match self {
                ImportError::Malformed(reason) => write!(f, "ImportError: not valid JSON: {}", reason),
                ImportError::NotAnArray => write!(f, "ImportError: expected a JSON array of templates"),
                ImportError::InvalidElement { index, reason } =>
                    write!(f, "ImportError: template at index {} is invalid: {}", index, reason),
            }
        }
    }

    impl Error for ImportError {}
}
