//! Named backend profiles and the lookups the pipeline needs from them.

use refiner_core::ReasoningTemplate;
use serde::{Deserialize, Serialize};

use crate::ReasoningTemplates;

/// How an API family names its max-output field inside a generation preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFamily {
    ChatCompletion,
    Kobold,
    TextGeneration,
    Novel,
    Other,
}

const CHAT_COMPLETION_APIS: &[&str] = &[
    "openai",
    "openrouter",
    "claude",
    "windowai",
    "scale",
    "ai21",
    "makersuite",
    "vertexai",
    "mistralai",
    "custom",
    "cohere",
    "perplexity",
    "groq",
    "01ai",
    "nanogpt",
    "deepseek",
    "aimlapi",
    "xai",
    "pollinations",
];

impl ApiFamily {
    pub fn from_api(api: &str) -> Self {
        let api = api.trim().to_ascii_lowercase();
        match api.as_str() {
            "kobold" | "koboldhorde" => ApiFamily::Kobold,
            "textgenerationwebui" => ApiFamily::TextGeneration,
            "novel" => ApiFamily::Novel,
            other if CHAT_COMPLETION_APIS.contains(&other) => ApiFamily::ChatCompletion,
            _ => ApiFamily::Other,
        }
    }
}

/// Sampling preset attached to a profile. Field names follow the hosts that define them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationPreset {
    pub openai_max_tokens: Option<u32>,
    pub genamt: Option<u32>,
    pub max_length: Option<u32>,
    pub max_new_tokens: Option<u32>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
}

impl GenerationPreset {
    pub fn max_tokens_for(&self, family: ApiFamily) -> Option<u32> {
        match family {
            ApiFamily::ChatCompletion => self.openai_max_tokens,
            ApiFamily::Kobold => self.genamt.or(self.max_length),
            ApiFamily::TextGeneration => self.max_new_tokens.or(self.max_length),
            ApiFamily::Novel => self.max_length,
            ApiFamily::Other => self.max_tokens.or(self.max_length).or(self.genamt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub api: String,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the bearer token, if the endpoint needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub preset: Option<GenerationPreset>,
    #[serde(default)]
    pub reasoning_template: Option<String>,
}

impl BackendProfile {
    pub fn family(&self) -> ApiFamily {
        ApiFamily::from_api(&self.api)
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.preset
            .as_ref()
            .and_then(|preset| preset.max_tokens_for(self.family()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedReasoningTemplate {
    pub name: String,
    pub prefix: String,
    pub suffix: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    profiles: Vec<BackendProfile>,
    templates: Vec<NamedReasoningTemplate>,
}

impl ProfileSet {
    pub fn new(profiles: Vec<BackendProfile>, templates: Vec<NamedReasoningTemplate>) -> Self {
        Self {
            profiles,
            templates,
        }
    }

    pub fn profile(&self, id: &str) -> Option<&BackendProfile> {
        self.profiles.iter().find(|profile| profile.id == id)
    }

    pub fn max_tokens(&self, id: &str) -> Option<u32> {
        self.profile(id).and_then(BackendProfile::max_tokens)
    }
}

impl ReasoningTemplates for ProfileSet {
    fn lookup(&self, backend_id: &str) -> Option<ReasoningTemplate> {
        let name = self.profile(backend_id)?.reasoning_template.as_deref()?;
        self.templates
            .iter()
            .find(|template| template.name == name)
            .map(|template| ReasoningTemplate::new(&template.prefix, &template.suffix))
    }
}
