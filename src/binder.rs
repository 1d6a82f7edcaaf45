//! # Parameter Binder
//!
//! Binds the Input parameters of the selected [Template] to live values.
//!
//! Values are hydrated from storage (key `__<template>__<param>`) when a template is selected. An edit updates the
//! in-memory value at once and (re)starts a single debounce timer; when the timer expires without another edit, the
//! value is persisted and the whole input set is re-hydrated. A burst of keystrokes therefore costs one write, and the
//! last keystroke always wins.
//!
//! The timer runs on the ambient Tokio runtime. Without one, edits are persisted immediately.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use anyhow::Result;
use log::{debug, warn};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use crate::binder::errors::UnknownParameter;
use crate::config::{input_key, DEFAULT_DEBOUNCE};
use crate::filler::{Fill, FillPlaceholders};
use crate::prompt::{PartialPrompt, Template};
use crate::utils::kv::Persistence;

/// The live value of one Input parameter of one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundValue {
    pub template: String,
    pub param: String,
    pub value: String,
}

#[derive(Debug)]
struct PendingWrite {
    seq: u64,
    key: String,
    value: String,
}

#[derive(Debug, Default)]
struct BinderState {
    template: Option<Template>,
    values: HashMap<String, BoundValue>,
    /// Bumped on every edit; a timer only fires for the edit that armed it.
    edit_seq: u64,
    pending: Option<PendingWrite>,
}

fn lock(state: &Mutex<BinderState>) -> MutexGuard<'_, BinderState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn hydrate_with(persistence: &Persistence, template: &Template) -> HashMap<String, BoundValue> {
    template.inputs()
        .map(|param| {
            let bound = BoundValue {
                template: template.name.clone(),
                param: param.name.clone(),
                value: persistence.get(&input_key(&template.name, &param.name)),
            };
            (param.name.clone(), bound)
        })
        .collect()
}

async fn expire(state: Arc<Mutex<BinderState>>, persistence: Persistence, seq: u64, delay: Duration) {
    tokio::time::sleep(delay).await;
    let mut state = lock(&state);
    match state.pending.take() {
        Some(pending) if pending.seq == seq => {
            debug!("persisting {} after quiet period", pending.key);
            persistence.set(&pending.key, &pending.value, true);
            if let Some(template) = state.template.clone() {
                state.values = hydrate_with(&persistence, &template);
            }
        }
        superseded => state.pending = superseded,
    }
}

pub struct ParameterBinder {
    persistence: Persistence,
    debounce: Duration,
    state: Arc<Mutex<BinderState>>,
    timer: Option<JoinHandle<()>>,
}

impl ParameterBinder {
    pub fn new(persistence: Persistence) -> Self {
        Self::with_debounce(persistence, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(persistence: Persistence, debounce: Duration) -> Self {
        Self {
            persistence,
            debounce,
            state: Arc::new(Mutex::new(BinderState::default())),
            timer: None,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Persisted values of every Input parameter of `template`, `""` where nothing is stored.
    /// Output parameters are never hydrated.
    pub fn hydrate(&self, template: &Template) -> HashMap<String, BoundValue> {
        hydrate_with(&self.persistence, template)
    }

    /// Make `template` the active one, replacing the bound set with a fresh hydration.
    /// A pending write of the previous template is flushed first.
    pub fn select(&mut self, template: Template) -> Vec<BoundValue> {
        self.flush();
        let values = self.hydrate(&template);
        let mut state = lock(&self.state);
        state.values = values;
        state.template = Some(template);
        Self::ordered(&state)
    }

    /// Drop the active template together with any pending write, e.g. because the template was deleted.
    pub fn discard(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let mut state = lock(&self.state);
        if let Some(pending) = state.pending.take() {
            debug!("dropping pending write of {}", pending.key);
        }
        state.template = None;
        state.values.clear();
    }

    /// Record a keystroke: the in-memory value changes now, the persisted one after the debounce period.
    ///
    /// A pending write of a different parameter is flushed rather than dropped.
    pub fn on_edit(&mut self, param: &str, value: impl Into<String>) -> Result<(), UnknownParameter> {
        let value = value.into();
        let seq = {
            let mut state = lock(&self.state);
            let template_name = match &state.template {
                Some(template) if template.has_input(param) => template.name.clone(),
                Some(template) => return Err(UnknownParameter::new(param, Some(template.name.as_str()))),
                None => return Err(UnknownParameter::new(param, None)),
            };
            let key = input_key(&template_name, param);
            if let Some(pending) = state.pending.take() {
                if pending.key != key {
                    self.persistence.set(&pending.key, &pending.value, true);
                }
            }
            state.edit_seq += 1;
            let seq = state.edit_seq;
            state.values.insert(param.to_string(), BoundValue {
                template: template_name,
                param: param.to_string(),
                value: value.clone(),
            });
            state.pending = Some(PendingWrite { seq, key, value });
            seq
        };

        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        match Handle::try_current() {
            Ok(handle) => {
                let task = expire(self.state.clone(), self.persistence.clone(), seq, self.debounce);
                self.timer = Some(handle.spawn(task));
            }
            Err(_) => {
                warn!("no async runtime for the debounce timer, persisting {} immediately", param);
                self.flush();
            }
        }
        Ok(())
    }

    /// Persist the pending value, if any, right now.
    pub fn flush(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        let pending = lock(&self.state).pending.take();
        if let Some(pending) = pending {
            self.persistence.set(&pending.key, &pending.value, true);
        }
    }

    pub fn has_pending_write(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    pub fn active_template(&self) -> Option<Template> {
        lock(&self.state).template.clone()
    }

    pub fn value(&self, param: &str) -> Option<String> {
        lock(&self.state).values.get(param).map(|bound| bound.value.clone())
    }

    /// Bound values in the order the template declares its Input parameters.
    pub fn inputs(&self) -> Vec<BoundValue> {
        Self::ordered(&lock(&self.state))
    }

    fn ordered(state: &BinderState) -> Vec<BoundValue> {
        let Some(template) = &state.template else {
            return Vec::new();
        };
        template.inputs()
            .filter_map(|param| state.values.get(&param.name).cloned())
            .collect()
    }
}

impl Drop for ParameterBinder {
    fn drop(&mut self) {
        self.flush();
    }
}

impl FillPlaceholders for ParameterBinder {
    fn placeholders_to_fill(&self) -> Vec<String> {
        self.inputs().into_iter().map(|bound| bound.param).collect()
    }
}

impl Fill for ParameterBinder {
    fn fill(&self, partial_prompt: &mut PartialPrompt) -> Result<()> {
        for bound in self.inputs() {
            if partial_prompt.accepts(&bound.param) {
                partial_prompt.try_fill(bound.param, bound.value)?;
            }
        }
        Ok(())
    }
}

pub mod errors {
    use std::error::Error;
    use std::fmt;
    use std::fmt::Formatter;

    /// Error when editing a parameter that is not an Input of the active template.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct UnknownParameter {
        pub param: String,
        pub template: Option<String>,
    }

    impl UnknownParameter {
        pub(crate) fn new(param: &str, template: Option<&str>) -> Self {
            Self {
                param: param.to_string(),
                template: template.map(str::to_string),
            }
        }
    }

    impl fmt::Display for UnknownParameter {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            match &self.template {
                Some(template) => write!(f, "UnknownParameter: {} is not an Input parameter of template {}", self.param, template),
                None => write!(f, "UnknownParameter: cannot edit {}, no template is selected", self.param),
            }
        }
    }

    impl Error for UnknownParameter {}
}
