use serde::{Deserialize, Serialize};

use crate::{BackendRef, Step};

pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that refines and improves text.";
pub const DEFAULT_USER_MESSAGE: &str = "Please refine the following text using the search and replace format:\n\n{{draft}}\n\nUse <search>text to find</search><replace>replacement text</replace> tags to indicate changes.";
pub const DEFAULT_SAVED_MESSAGES_COUNT: i64 = 3;

/// User-configured pipeline: the ordered step list plus context-window options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub enabled: bool,
    pub enable_saved_messages: bool,
    /// Number of prior turns for `{{savedMessages}}`; `-1` means all of them.
    pub saved_messages_count: i64,
    /// Max-output hint of the active session, used when a named backend has none.
    pub default_max_tokens: Option<u32>,
    pub steps: Vec<Step>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            enable_saved_messages: false,
            saved_messages_count: DEFAULT_SAVED_MESSAGES_COUNT,
            default_max_tokens: None,
            steps: vec![Step {
                id: "refinement-step".to_string(),
                name: "Refinement Step".to_string(),
                backend: BackendRef::Default,
                system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
                user_message: DEFAULT_USER_MESSAGE.to_string(),
                skip_if_no_changes: false,
            }],
        }
    }
}
