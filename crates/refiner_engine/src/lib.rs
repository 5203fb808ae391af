//! Refiner engine: generation backends, collaborators and the step pipeline.
mod backend;
mod error;
mod events;
mod hook;
mod http;
mod persist;
mod profile;
mod reasoning;
mod refiner;
mod store;

pub use backend::{
    BackendReply, BackendRegistry, BackendResolver, BackendSet, ChatMessage, DefaultSessionBackend,
    GenerationBackend, NamedProfileBackend, QuietGenerator, RequestOptions,
};
pub use error::{FailureKind, GenerationError, RefineError, StoreError};
pub use events::{ChannelProgressSink, NullSink, ProgressSink, RefineEvent, StepOutcome};
pub use hook::{AnalysisHook, HookError};
pub use http::{HttpBackendSettings, OpenAiCompatBackends};
pub use profile::{ApiFamily, BackendProfile, GenerationPreset, NamedReasoningTemplate, ProfileSet};
pub use persist::{write_atomically, AtomicFileWriter, PersistError};
pub use reasoning::{ReasoningParser, ReasoningResolver, ReasoningTemplates, TemplateParser};
pub use refiner::{RefineOutcome, Refiner};
pub use store::{ConversationStore, MemoryConversation};
