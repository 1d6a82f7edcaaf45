//! Application state: the selected template, its bound inputs, the credential and the latest generation.
//!
//! A [Session] wires a [TemplateStore], a [ParameterBinder] and a [Generator] over one [Persistence] adapter, the way a
//! front end drives them.

use std::sync::Arc;
use log::info;
use crate::binder::errors::UnknownParameter;
use crate::binder::{BoundValue, ParameterBinder};
use crate::config::{seed_defaults, API_KEY_STORAGE_KEY};
use crate::pipeline::errors::GenerationError;
use crate::pipeline::{Generator, Outcome, ResultBoard};
use crate::prompt::errors::ValidationError;
use crate::prompt::Template;
use crate::store::TemplateStore;
use crate::utils::kv::Persistence;
use crate::utils::llm::Complete;

pub struct Session {
    persistence: Persistence,
    store: TemplateStore,
    binder: ParameterBinder,
    generator: Generator,
}

impl Session {
    /// Seed first-run defaults and start with no template selected.
    pub fn new(persistence: Persistence, client: Arc<dyn Complete>) -> Self {
        Self::with_binder(ParameterBinder::new(persistence.clone()), persistence, client)
    }

    pub fn with_binder(binder: ParameterBinder, persistence: Persistence, client: Arc<dyn Complete>) -> Self {
        seed_defaults(&persistence);
        Self {
            store: TemplateStore::new(persistence.clone()),
            persistence,
            binder,
            generator: Generator::new(client),
        }
    }

    pub fn store(&self) -> &TemplateStore {
        &self.store
    }

    pub fn templates(&self) -> Vec<Template> {
        self.store.list()
    }

    pub fn active_template(&self) -> Option<Template> {
        self.binder.active_template()
    }

    /// Make the template called `name` active and return its hydrated inputs. `None` if there is no such template.
    pub fn select(&mut self, name: &str) -> Option<Vec<BoundValue>> {
        let template = self.store.get(name)?;
        self.generator.invalidate();
        Some(self.binder.select(template))
    }

    /// Save (or replace) a template. Replacing the active template re-binds its inputs to the new definition.
    pub fn save_template(&mut self, template: &Template) -> Result<(), ValidationError> {
        self.store.save(template)?;
        let replaces_active = self.binder.active_template().is_some_and(|active| active.name == template.name);
        if replaces_active {
            self.binder.select(template.clone());
        }
        Ok(())
    }

    /// Delete a template and its stored inputs. Deleting the active template deselects it.
    pub fn delete_template(&mut self, name: &str) -> bool {
        let is_active = self.binder.active_template().is_some_and(|active| active.name == name);
        if is_active {
            self.binder.discard();
            self.generator.invalidate();
        }
        self.store.delete(name)
    }

    pub fn edit(&mut self, param: &str, value: impl Into<String>) -> Result<(), UnknownParameter> {
        self.binder.on_edit(param, value)
    }

    pub fn inputs(&self) -> Vec<BoundValue> {
        self.binder.inputs()
    }

    pub fn stored_credential(&self) -> String {
        self.persistence.get(API_KEY_STORAGE_KEY)
    }

    /// Store a new credential, switch to `client` (built for that credential) and validate it.
    pub async fn set_credential(&mut self, api_key: &str, client: Arc<dyn Complete>) -> bool {
        self.persistence.set(API_KEY_STORAGE_KEY, api_key, true);
        self.generator.replace_client(client);
        let valid = self.generator.validate_credential().await;
        info!("credential updated, valid = {}", valid);
        valid
    }

    /// Generate outputs for the active template with its current inputs.
    pub async fn generate(&self) -> Result<Outcome, GenerationError> {
        let Some(template) = self.binder.active_template() else {
            return Err(GenerationError::Render { message: "no template selected".to_string() });
        };
        self.generator.generate(&template, &self.binder).await
    }

    pub fn board(&self) -> ResultBoard {
        self.generator.board()
    }

    pub fn dismiss_error(&self) {
        self.generator.dismiss_error();
    }

    /// Persist any pending input edit now.
    pub fn flush(&mut self) {
        self.binder.flush();
    }
}
