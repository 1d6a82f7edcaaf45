use std::collections::HashMap;
use crate::prompt::PartialPrompt;
use anyhow::Result;

pub trait FillPlaceholders {
    /// Names of the placeholders this filler has values for.
    fn placeholders_to_fill(&self) -> Vec<String>;
}

/// Anything that fills one or more placeholders of a [PartialPrompt].
///
/// Implementations should skip names the partial prompt does not [accept](PartialPrompt::accepts) rather than fail,
/// because a value bound to an Input parameter the body never mentions is legitimate.
pub trait Fill: FillPlaceholders {
    fn fill(&self, partial_prompt: &mut PartialPrompt) -> Result<()>;
}

impl FillPlaceholders for HashMap<String, String> {
    fn placeholders_to_fill(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }
}

impl Fill for HashMap<String, String> {
    fn fill(&self, partial_prompt: &mut PartialPrompt) -> Result<()> {
        for (name, value) in self {
            if partial_prompt.accepts(name) {
                partial_prompt.try_fill(name.as_str(), value.as_str())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test_filler {
    use std::collections::HashMap;
    use super::Fill;
    use crate::prompt::{Parameter, Template};

    #[test]
    fn test_map_filler_skips_unknown() {
        let template = Template::new("t", "{{a}}-{{b}}", vec![Parameter::input("a"), Parameter::output("b")]);
        let values = HashMap::from([
            ("a".to_string(), "x".to_string()),
            ("b".to_string(), "y".to_string()),
            ("c".to_string(), "z".to_string()),
        ]);
        let mut prompt = template.construct_prompt();
        values.fill(&mut prompt).unwrap();
        assert_eq!(prompt.render(), "x-");
    }
}
