use std::sync::Arc;
use std::time::Duration;

use refiner_core::Role;
use refiner_logging::{refiner_debug, refiner_warn};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::{
    BackendProfile, BackendRegistry, BackendReply, ChatMessage, FailureKind, GenerationError,
    ProfileSet, QuietGenerator, RequestOptions,
};

#[derive(Debug, Clone)]
pub struct HttpBackendSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpBackendSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// OpenAI-compatible `/chat/completions` client for every configured profile.
///
/// Also serves as the default session when an active profile is set.
#[derive(Debug, Clone)]
pub struct OpenAiCompatBackends {
    profiles: Arc<ProfileSet>,
    active: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatBackends {
    pub fn new(
        profiles: Arc<ProfileSet>,
        active: Option<String>,
        settings: &HttpBackendSettings,
    ) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| GenerationError::new(FailureKind::Network, "http", err.to_string()))?;
        Ok(Self {
            profiles,
            active,
            client,
        })
    }

    fn profile(&self, id: &str) -> Result<&BackendProfile, GenerationError> {
        self.profiles.profile(id).ok_or_else(|| {
            GenerationError::new(FailureKind::UnknownBackend, id, "no such backend profile")
        })
    }

    fn request_body(
        profile: &BackendProfile,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
        options: RequestOptions,
    ) -> Value {
        let mut body = json!({
            "model": profile.model,
            "messages": messages,
            "stream": options.stream,
        });
        if let Some(max_tokens) = max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if options.include_generation_preset {
            if let Some(preset) = &profile.preset {
                if let Some(temperature) = preset.temperature {
                    body["temperature"] = json!(temperature);
                }
                if let Some(top_p) = preset.top_p {
                    body["top_p"] = json!(top_p);
                }
            }
        }
        body
    }
}

#[async_trait::async_trait]
impl BackendRegistry for OpenAiCompatBackends {
    fn resolve_max_tokens(&self, backend_id: &str) -> Option<u32> {
        self.profiles.max_tokens(backend_id)
    }

    async fn request(
        &self,
        backend_id: &str,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
        options: RequestOptions,
    ) -> Result<BackendReply, GenerationError> {
        let profile = self.profile(backend_id)?;
        let url = format!(
            "{}/chat/completions",
            profile.base_url.trim_end_matches('/')
        );
        let body = Self::request_body(profile, messages, max_tokens, options);
        let payload = serde_json::to_vec(&body).map_err(|err| {
            GenerationError::new(FailureKind::InvalidResponse, backend_id, err.to_string())
        })?;

        let mut request = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(var) = profile.api_key_env.as_deref() {
            match std::env::var(var) {
                Ok(key) => request = request.header(AUTHORIZATION, format!("Bearer {key}")),
                Err(_) => refiner_warn!("API key variable {} is not set for {}", var, backend_id),
            }
        }

        refiner_debug!("POST {} model={} messages={}", url, profile.model, messages.len());
        let response = request
            .send()
            .await
            .map_err(|err| map_reqwest_error(backend_id, err))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GenerationError::new(
                FailureKind::HttpStatus(status.as_u16()),
                backend_id,
                format!("{status}: {detail}"),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(backend_id, err))?;
        parse_reply(backend_id, &bytes)
    }
}

#[async_trait::async_trait]
impl QuietGenerator for OpenAiCompatBackends {
    async fn generate_quiet(&self, prompt: &str) -> Result<String, GenerationError> {
        let Some(active) = self.active.as_deref() else {
            return Err(GenerationError::new(
                FailureKind::UnknownBackend,
                "default",
                "no active profile configured",
            ));
        };
        let messages = [ChatMessage::new(Role::User, prompt)];
        let max_tokens = self.profiles.max_tokens(active);
        let reply = self
            .request(active, &messages, max_tokens, RequestOptions::default())
            .await?;
        Ok(reply.into_text())
    }
}

fn parse_reply(backend_id: &str, bytes: &[u8]) -> Result<BackendReply, GenerationError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|err| {
        GenerationError::new(FailureKind::InvalidResponse, backend_id, err.to_string())
    })?;

    if let Some(content) = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return Ok(BackendReply::Content {
            content: content.to_string(),
        });
    }
    if let Some(content) = value.get("content").and_then(Value::as_str) {
        return Ok(BackendReply::Content {
            content: content.to_string(),
        });
    }
    if let Some(text) = value.as_str() {
        return Ok(BackendReply::Text(text.to_string()));
    }
    Err(GenerationError::new(
        FailureKind::InvalidResponse,
        backend_id,
        "reply has no message content",
    ))
}

fn map_reqwest_error(backend_id: &str, err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        return GenerationError::new(FailureKind::Timeout, backend_id, err.to_string());
    }
    GenerationError::new(FailureKind::Network, backend_id, err.to_string())
}
