//! Refiner core: pure pipeline algorithms and the data they operate on.
mod context;
mod edits;
mod message;
mod reasoning;
mod settings;
mod step;
mod template;

pub use context::{build_saved_messages, saved_messages_for};
pub use edits::{apply_edit, apply_edits, parse_edits, Edit, EditReport};
pub use message::{Message, Role};
pub use reasoning::{strip_reasoning, ReasoningSplit, ReasoningTemplate};
pub use settings::{
    PipelineSettings, DEFAULT_SAVED_MESSAGES_COUNT, DEFAULT_SYSTEM_PROMPT, DEFAULT_USER_MESSAGE,
};
pub use step::{BackendRef, Step};
pub use template::{
    render_step_prompt, substitute_placeholders, MacroExpander, MacroTable, NoMacros, StepPrompt,
};
