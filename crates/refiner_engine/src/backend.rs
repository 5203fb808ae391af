use std::sync::Arc;

use refiner_core::{BackendRef, Role, StepPrompt};
use refiner_logging::refiner_debug;
use serde::Serialize;

use crate::GenerationError;

/// Something that turns a rendered step prompt into raw reply text.
#[async_trait::async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Name used in logs and error reports.
    fn label(&self) -> String;

    async fn dispatch(&self, prompt: &StepPrompt) -> Result<String, GenerationError>;
}

/// The active session's quiet (non-streaming, invisible) generation call.
#[async_trait::async_trait]
pub trait QuietGenerator: Send + Sync {
    async fn generate_quiet(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub include_generation_preset: bool,
    pub stream: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            include_generation_preset: true,
            stream: false,
        }
    }
}

/// Registries may hand back a structured reply or bare text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendReply {
    Content { content: String },
    Text(String),
}

impl BackendReply {
    pub fn into_text(self) -> String {
        match self {
            BackendReply::Content { content } => content,
            BackendReply::Text(text) => text,
        }
    }
}

/// Named generation backends, addressed by profile id.
#[async_trait::async_trait]
pub trait BackendRegistry: Send + Sync {
    fn resolve_max_tokens(&self, backend_id: &str) -> Option<u32>;

    async fn request(
        &self,
        backend_id: &str,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
        options: RequestOptions,
    ) -> Result<BackendReply, GenerationError>;
}

pub struct DefaultSessionBackend {
    generator: Arc<dyn QuietGenerator>,
}

impl DefaultSessionBackend {
    pub fn new(generator: Arc<dyn QuietGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait::async_trait]
impl GenerationBackend for DefaultSessionBackend {
    fn label(&self) -> String {
        BackendRef::Default.to_string()
    }

    async fn dispatch(&self, prompt: &StepPrompt) -> Result<String, GenerationError> {
        self.generator.generate_quiet(&prompt.combined()).await
    }
}

pub struct NamedProfileBackend {
    id: String,
    registry: Arc<dyn BackendRegistry>,
    fallback_max_tokens: Option<u32>,
}

impl NamedProfileBackend {
    pub fn new(
        id: impl Into<String>,
        registry: Arc<dyn BackendRegistry>,
        fallback_max_tokens: Option<u32>,
    ) -> Self {
        Self {
            id: id.into(),
            registry,
            fallback_max_tokens,
        }
    }

    fn messages(prompt: &StepPrompt) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if !prompt.system.is_empty() {
            messages.push(ChatMessage::new(Role::System, prompt.system.clone()));
        }
        messages.push(ChatMessage::new(Role::User, prompt.user.clone()));
        messages
    }
}

#[async_trait::async_trait]
impl GenerationBackend for NamedProfileBackend {
    fn label(&self) -> String {
        self.id.clone()
    }

    async fn dispatch(&self, prompt: &StepPrompt) -> Result<String, GenerationError> {
        let max_tokens = self
            .registry
            .resolve_max_tokens(&self.id)
            .or(self.fallback_max_tokens);
        refiner_debug!("Backend {} max_tokens={:?}", self.id, max_tokens);
        let reply = self
            .registry
            .request(
                &self.id,
                &Self::messages(prompt),
                max_tokens,
                RequestOptions::default(),
            )
            .await?;
        Ok(reply.into_text())
    }
}

/// Maps a step's backend reference to a concrete backend.
pub trait BackendResolver: Send + Sync {
    fn resolve(&self, backend: &BackendRef) -> Arc<dyn GenerationBackend>;
}

/// The default session plus a registry of named profiles.
pub struct BackendSet {
    default: Arc<dyn GenerationBackend>,
    registry: Arc<dyn BackendRegistry>,
    default_max_tokens: Option<u32>,
}

impl BackendSet {
    pub fn new(
        default: Arc<dyn GenerationBackend>,
        registry: Arc<dyn BackendRegistry>,
        default_max_tokens: Option<u32>,
    ) -> Self {
        Self {
            default,
            registry,
            default_max_tokens,
        }
    }
}

impl BackendResolver for BackendSet {
    fn resolve(&self, backend: &BackendRef) -> Arc<dyn GenerationBackend> {
        match backend {
            BackendRef::Default => self.default.clone(),
            BackendRef::Named(id) => Arc::new(NamedProfileBackend::new(
                id.clone(),
                self.registry.clone(),
                self.default_max_tokens,
            )),
        }
    }
}
