//! Editor form state for creating or editing a [Template].
//!
//! The draft mirrors the form: a name, a body, the parameters added so far, and a staged parameter (name and kind)
//! waiting to be added. Actions are refused, never half-applied: [TemplateDraft::can_add_param] and
//! [TemplateDraft::can_save] tell a front end which buttons to disable.

use crate::prompt::errors::ValidationError;
use crate::prompt::{ParamKind, Parameter, Template};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateDraft {
    pub name: String,
    pub body: String,
    params: Vec<Parameter>,
    staged_name: String,
    staged_kind: Option<ParamKind>,
}

impl TemplateDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start editing an existing template. Saving under the same name replaces it.
    pub fn from_template(template: &Template) -> Self {
        Self {
            name: template.name.clone(),
            body: template.body.clone(),
            params: template.params.clone(),
            ..Self::default()
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn set_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Stage the parameter the next [TemplateDraft::add_param] adds.
    pub fn stage_param(&mut self, name: impl Into<String>, kind: Option<ParamKind>) -> &mut Self {
        self.staged_name = name.into();
        self.staged_kind = kind;
        self
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    fn check_staged(&self) -> Result<ParamKind, ValidationError> {
        let name = self.staged_name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyParamName);
        }
        if self.params.iter().any(|p| p.name == name) {
            return Err(ValidationError::DuplicateParam(name.to_string()));
        }
        self.staged_kind.ok_or(ValidationError::MissingParamKind)
    }

    pub fn can_add_param(&self) -> bool {
        self.check_staged().is_ok()
    }

    /// Append the staged parameter and clear the staging fields.
    pub fn add_param(&mut self) -> Result<&Parameter, ValidationError> {
        let kind = self.check_staged()?;
        let name = self.staged_name.trim().to_string();
        self.staged_name.clear();
        self.staged_kind = None;
        self.params.push(Parameter { name, kind });
        let index = self.params.len() - 1;
        Ok(&self.params[index])
    }

    /// Remove the parameter at `index`. Out of range is a no-op.
    pub fn remove_param(&mut self, index: usize) -> Option<Parameter> {
        (index < self.params.len()).then(|| self.params.remove(index))
    }

    pub fn can_save(&self) -> bool {
        !self.name.trim().is_empty() && !self.body.trim().is_empty()
    }

    /// The template this draft describes, if it is valid.
    pub fn build(&self) -> Result<Template, ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyTemplateName);
        }
        if self.body.trim().is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        let template = Template::new(self.name.trim(), self.body.clone(), self.params.clone());
        template.validate()?;
        Ok(template)
    }
}

#[cfg(test)]
mod test_editor {
    use super::TemplateDraft;
    use crate::prompt::errors::ValidationError;
    use crate::prompt::{ParamKind, Parameter, Template};

    #[test]
    fn test_add_param_needs_name_and_kind() {
        let mut draft = TemplateDraft::new();
        assert!(!draft.can_add_param());
        draft.stage_param("cv", None);
        assert!(!draft.can_add_param());
        assert_eq!(draft.add_param(), Err(ValidationError::MissingParamKind));
        draft.stage_param("  ", Some(ParamKind::Input));
        assert_eq!(draft.add_param(), Err(ValidationError::EmptyParamName));
        draft.stage_param("cv", Some(ParamKind::Input));
        assert!(draft.can_add_param());
        assert_eq!(draft.add_param(), Ok(&Parameter::input("cv")));
        assert!(!draft.can_add_param());

        draft.stage_param("cv", Some(ParamKind::Output));
        assert_eq!(draft.add_param(), Err(ValidationError::DuplicateParam("cv".to_string())));
        assert_eq!(draft.params().len(), 1);
    }

    #[test]
    fn test_save_needs_name_and_body() {
        let mut draft = TemplateDraft::new();
        assert!(!draft.can_save());
        assert_eq!(draft.build(), Err(ValidationError::EmptyTemplateName));
        draft.set_name("cover");
        assert!(!draft.can_save());
        assert_eq!(draft.build(), Err(ValidationError::EmptyBody));
        draft.set_body("CV: {{cv}}");
        assert!(draft.can_save());
        draft.stage_param("cv", Some(ParamKind::Input));
        draft.add_param().unwrap();
        draft.stage_param("coverLetter", Some(ParamKind::Output));
        draft.add_param().unwrap();
        let template = draft.build().unwrap();
        assert_eq!(template, Template::new(
            "cover",
            "CV: {{cv}}",
            vec![Parameter::input("cv"), Parameter::output("coverLetter")],
        ));
    }

    #[test]
    fn test_edit_existing() {
        let template = Template::new("t", "{{a}}", vec![Parameter::input("a"), Parameter::output("o")]);
        let mut draft = TemplateDraft::from_template(&template);
        assert_eq!(draft.remove_param(1), Some(Parameter::output("o")));
        assert_eq!(draft.remove_param(5), None);
        draft.set_body("{{a}}!");
        let edited = draft.build().unwrap();
        assert_eq!(edited.name, "t");
        assert_eq!(edited.params, vec![Parameter::input("a")]);
        assert_eq!(edited.body, "{{a}}!");
    }
}
