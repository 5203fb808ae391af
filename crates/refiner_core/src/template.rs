use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::Step;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{(draft|savedMessages)\}\}").expect("placeholder pattern is valid")
});

static MACRO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("macro pattern is valid"));

/// Host-level macro pass applied after the pipeline's own placeholders.
pub trait MacroExpander: Send + Sync {
    fn expand(&self, text: &str) -> String;
}

/// Leaves text untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMacros;

impl MacroExpander for NoMacros {
    fn expand(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Replaces `{{name}}` with a fixed value for every configured name. Unknown
/// names are left as written and values are never re-expanded.
#[derive(Debug, Default, Clone)]
pub struct MacroTable {
    values: BTreeMap<String, String>,
}

impl MacroTable {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }
}

impl MacroExpander for MacroTable {
    fn expand(&self, text: &str) -> String {
        MACRO
            .replace_all(text, |caps: &Captures| match self.values.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

/// Substitutes `{{draft}}` and `{{savedMessages}}` in one pass, so text coming
/// from either value is never re-scanned for the other placeholder.
pub fn substitute_placeholders(template: &str, draft: &str, saved_messages: &str) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "draft" => draft.to_string(),
            _ => saved_messages.to_string(),
        })
        .into_owned()
}

/// A step's prompt after all substitutions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepPrompt {
    pub system: String,
    pub user: String,
}

impl StepPrompt {
    /// Single-string form: non-empty parts joined by a blank line.
    pub fn combined(&self) -> String {
        [self.system.as_str(), self.user.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub fn render_step_prompt(
    step: &Step,
    draft: &str,
    saved_messages: &str,
    macros: &dyn MacroExpander,
) -> StepPrompt {
    let system = substitute_placeholders(&step.system_prompt, draft, saved_messages);
    let user = substitute_placeholders(&step.user_message, draft, saved_messages);
    StepPrompt {
        system: macros.expand(&system),
        user: macros.expand(&user),
    }
}
