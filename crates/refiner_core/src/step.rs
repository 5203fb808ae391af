use std::fmt;

use serde::{Deserialize, Serialize};

const DEFAULT_BACKEND: &str = "default";
const LEGACY_DEFAULT_BACKEND: &str = "current";

/// Which generation backend a step talks to.
///
/// Stored as a plain string: `"default"` (or the older `"current"`) selects the
/// active session, anything else is the id of a named backend profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BackendRef {
    #[default]
    Default,
    Named(String),
}

impl From<String> for BackendRef {
    fn from(value: String) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed == DEFAULT_BACKEND || trimmed == LEGACY_DEFAULT_BACKEND {
            BackendRef::Default
        } else {
            BackendRef::Named(trimmed.to_string())
        }
    }
}

impl From<&str> for BackendRef {
    fn from(value: &str) -> Self {
        BackendRef::from(value.to_string())
    }
}

impl From<BackendRef> for String {
    fn from(value: BackendRef) -> Self {
        match value {
            BackendRef::Default => DEFAULT_BACKEND.to_string(),
            BackendRef::Named(id) => id,
        }
    }
}

impl fmt::Display for BackendRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendRef::Default => write!(f, "{DEFAULT_BACKEND}"),
            BackendRef::Named(id) => write!(f, "{id}"),
        }
    }
}

/// One configured stage of the refinement pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub backend: BackendRef,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_message: String,
    #[serde(default)]
    pub skip_if_no_changes: bool,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            backend: BackendRef::Default,
            system_prompt: String::new(),
            user_message: String::new(),
            skip_if_no_changes: false,
        }
    }

    pub fn with_backend(mut self, backend: impl Into<BackendRef>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    pub fn skip_if_no_changes(mut self, skip: bool) -> Self {
        self.skip_if_no_changes = skip;
        self
    }
}
