//! # Prompt
//! A prompt is simply a string, rendered from a [Template].
//!
//! ## Template
//! A template has a unique name, a body with placeholders and an ordered list of [Parameter]s. Each parameter is either
//! an [ParamKind::Input], whose value the user types in and which fills the placeholder of the same name, or an
//! [ParamKind::Output], which names a key expected in the structured JSON reply of the model.
//!
//! Templates serialize to the same JSON shape they are stored and exported in:
//! ```json
//! {"params": [{"name": "cv", "type": "Input"}], "body": "CV: {{cv}}", "name": "cover"}
//! ```
//!
//! ## Placeholder
//! A placeholder is a string in the format of `{{name}}`. Only Input parameters can fill placeholders. A placeholder
//! that no Input parameter fills is not an error: it renders as an empty string. [Template::lint] reports such
//! mismatches as warnings.
//!
//! ## PartialPrompt
//! A partial prompt is a template with some placeholders filled. It can only be constructed via
//! [Template::construct_prompt]. Fill it with [PartialPrompt::try_fill] or any [Fill](crate::filler::Fill)er, then
//! [PartialPrompt::render] it.

use std::collections::{HashMap, HashSet};
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::prompt::errors::{PlaceholderNotExist, ValidationError};
use crate::utils::prompt_processing::{get_placeholders, replace_all_placeholders};

/// Whether a parameter is typed in by the user or read back from the model reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    Input,
    Output,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamKind::Input => write!(f, "Input"),
            ParamKind::Output => write!(f, "Output"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
}

impl Parameter {
    pub fn input(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ParamKind::Input }
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ParamKind::Output }
    }
}

/// A reusable prompt template. The name is its primary key in the [TemplateStore](crate::store::TemplateStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub params: Vec<Parameter>,
    pub body: String,
    pub name: String,
}

/// Non-fatal inconsistencies between a template body and its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateWarning {
    /// The body has no placeholder at all.
    NoPlaceholders,
    /// `{{name}}` appears in the body but no Input parameter is called `name`. Renders as empty.
    UnboundPlaceholder(String),
    /// An Input parameter that the body never references.
    UnusedInput(String),
}

impl fmt::Display for TemplateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateWarning::NoPlaceholders => write!(f, "template body has no placeholder"),
            TemplateWarning::UnboundPlaceholder(name) =>
                write!(f, "placeholder {{{{{}}}}} has no matching Input parameter and will render empty", name),
            TemplateWarning::UnusedInput(name) => write!(f, "Input parameter {} is never referenced in the body", name),
        }
    }
}

impl Template {
    pub fn new(name: impl Into<String>, body: impl Into<String>, params: Vec<Parameter>) -> Self {
        Self {
            params,
            body: body.into(),
            name: name.into(),
        }
    }

    pub fn inputs(&self) -> impl Iterator<Item=&Parameter> {
        self.params.iter().filter(|p| p.kind == ParamKind::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item=&Parameter> {
        self.params.iter().filter(|p| p.kind == ParamKind::Output)
    }

    pub fn has_input(&self, name: &str) -> bool {
        self.inputs().any(|p| p.name == name)
    }

    /// Placeholder names in the body, in order of first appearance.
    pub fn placeholders(&self) -> Vec<String> {
        get_placeholders(&self.body)
    }

    /// Checks the invariants the editor enforces: non-empty name and body, non-empty and unique parameter names.
    /// Template names may not contain `__` or end with `_`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyTemplateName);
        }
        // input values live under `__<name>__<param>`; these names would share that prefix with another template
        if self.name.contains("__") || self.name.ends_with('_') {
            return Err(ValidationError::ReservedTemplateName(self.name.clone()));
        }
        if self.body.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        let mut seen = HashSet::new();
        for param in &self.params {
            if param.name.is_empty() {
                return Err(ValidationError::EmptyParamName);
            }
            if !seen.insert(param.name.as_str()) {
                return Err(ValidationError::DuplicateParam(param.name.clone()));
            }
        }
        Ok(())
    }

    /// Reports placeholders without an Input parameter and Input parameters without a placeholder.
    pub fn lint(&self) -> Vec<TemplateWarning> {
        let placeholders = self.placeholders();
        if placeholders.is_empty() {
            let mut warnings = vec![TemplateWarning::NoPlaceholders];
            warnings.extend(self.inputs().map(|p| TemplateWarning::UnusedInput(p.name.clone())));
            return warnings;
        }
        let mut warnings: Vec<TemplateWarning> = placeholders
            .iter()
            .filter(|name| !self.has_input(name))
            .map(|name| TemplateWarning::UnboundPlaceholder(name.clone()))
            .collect();
        warnings.extend(
            self.inputs()
                .filter(|p| !placeholders.contains(&p.name))
                .map(|p| TemplateWarning::UnusedInput(p.name.clone()))
        );
        warnings
    }

    /// Construct a partial prompt whose fillable placeholders are those backed by an Input parameter.
    pub fn construct_prompt(&self) -> PartialPrompt {
        let fillable: HashSet<String> = self.placeholders()
            .into_iter()
            .filter(|name| self.has_input(name))
            .collect();
        PartialPrompt {
            template: self.clone(),
            placeholder_to_vals: fillable.iter().map(|p| (p.clone(), None)).collect(),
            unfilled_placeholders: fillable,
        }
    }
}

/// A template with some placeholders filled. A partial prompt can be only constructed via [Template::construct_prompt].
#[derive(Debug, Clone)]
#[readonly::make]
pub struct PartialPrompt {
    /// The template of the partial prompt, readonly
    #[readonly]
    pub template: Template,

    /// Mapping from fillable placeholder name to its filling value
    pub(crate) placeholder_to_vals: HashMap<String, Option<String>>,

    /// Record the placeholders that are not filled yet
    pub(crate) unfilled_placeholders: HashSet<String>,
}

impl PartialPrompt {
    /// Whether `placeholder` is backed by an Input parameter and can be filled.
    pub fn accepts(&self, placeholder: &str) -> bool {
        self.placeholder_to_vals.contains_key(placeholder)
    }

    /// Fill a placeholder, or update its value if already filled.
    /// Returns an error if the placeholder does not exist or is not backed by an Input parameter.
    pub fn try_fill(&mut self, placeholder: impl Into<String>, value: impl Into<String>) -> Result<&mut Self, PlaceholderNotExist> {
        let placeholder = placeholder.into();
        if self.accepts(&placeholder) {
            self.unfilled_placeholders.remove(&placeholder);
            self.placeholder_to_vals.insert(placeholder, Some(value.into()));
            Ok(self)
        } else {
            Err(PlaceholderNotExist::new(placeholder, value, self.placeholder_to_vals.keys()))
        }
    }

    /// Fillable placeholders that have not been filled yet.
    pub fn unfilled(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.unfilled_placeholders.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Substitute every placeholder. Unfilled placeholders, and placeholders no Input parameter backs, render empty.
    pub fn render(&self) -> String {
        if !self.unfilled_placeholders.is_empty() {
            log::debug!("rendering template {} with unfilled placeholders {:?}", self.template.name, self.unfilled());
        }
        replace_all_placeholders(&self.template.body, &self.placeholder_to_vals)
    }
}

pub mod errors {
    use std::error::Error;
    use std::fmt;
    use std::fmt::Formatter;

    /// Error when trying to fill a placeholder that the partial prompt cannot accept.
    #[derive(Debug)]
    pub struct PlaceholderNotExist {
        pub try_fill_placeholder: String,
        pub value: String,
        pub available_placeholders: Vec<String>,
    }

    impl PlaceholderNotExist {
        pub(crate) fn new<'a>(try_fill_placeholder: impl Into<String>,
                              value: impl Into<String>,
                              available_placeholders: impl Iterator<Item=&'a String>) -> Self {
            let mut available_placeholders: Vec<String> = available_placeholders.cloned().collect();
            available_placeholders.sort_unstable();
            PlaceholderNotExist {
                try_fill_placeholder: try_fill_placeholder.into(),
                value: value.into(),
                available_placeholders,
            }
        }
    }

    impl fmt::Display for PlaceholderNotExist {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            write!(f, "PlaceholderNotExist: try to fill placeholder = {} with value = {}, but available placeholders are {:?}",
                   self.try_fill_placeholder,
                   self.value,
                   self.available_placeholders)
        }
    }

    impl Error for PlaceholderNotExist {}

    /// A template that the editor would not let through.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum ValidationError {
        EmptyTemplateName,
        /// The name would make the stored inputs of two templates share a key prefix.
        ReservedTemplateName(String),
        EmptyBody,
        EmptyParamName,
        /// A parameter was staged without choosing Input or Output.
        MissingParamKind,
        DuplicateParam(String),
    }

    impl fmt::Display for ValidationError {
        fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
            match self {
                ValidationError::EmptyTemplateName => write!(f, "ValidationError: template name is empty"),
                ValidationError::ReservedTemplateName(name) =>
                    write!(f, "ValidationError: template name {} must not contain `__` or end with `_`", name),
                ValidationError::EmptyBody => write!(f, "ValidationError: template body is empty"),
                ValidationError::EmptyParamName => write!(f, "ValidationError: parameter name is empty"),
                ValidationError::MissingParamKind => write!(f, "ValidationError: parameter kind is not chosen"),
                ValidationError::DuplicateParam(name) => write!(f, "ValidationError: parameter {} is declared twice", name),
            }
        }
    }

    impl Error for ValidationError {}
}
