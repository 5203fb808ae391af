use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use refiner_core::{PipelineSettings, ReasoningTemplate};
use refiner_engine::{BackendProfile, HttpBackendSettings, NamedReasoningTemplate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            request_timeout_secs: 120,
        }
    }
}

impl HttpConfig {
    pub fn settings(&self) -> HttpBackendSettings {
        HttpBackendSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}

/// Everything the binary reads from `refiner.ron`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineSettings,
    /// Profile used for steps on the `default` backend.
    pub active_profile: Option<String>,
    pub profiles: Vec<BackendProfile>,
    pub reasoning_templates: Vec<NamedReasoningTemplate>,
    /// Host-level parser for replies whose backend has no registered template.
    pub fallback_reasoning: Option<ReasoningTemplate>,
    pub macros: BTreeMap<String, String>,
    /// Program and arguments run before each refinement; failures are ignored.
    pub analysis_command: Option<Vec<String>>,
    pub http: HttpConfig,
}

impl AppConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: AppConfig = ron::from_str(text).context("invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_ron(&self) -> anyhow::Result<String> {
        let pretty = ron::ser::PrettyConfig::new();
        ron::ser::to_string_pretty(self, pretty).context("failed to serialize configuration")
    }

    fn validate(&self) -> anyhow::Result<()> {
        let known = |id: &str| self.profiles.iter().any(|profile| profile.id == id);
        if let Some(active) = self.active_profile.as_deref() {
            if !known(active) {
                bail!("active_profile `{active}` is not a configured profile");
            }
        }
        for step in &self.pipeline.steps {
            if let refiner_core::BackendRef::Named(id) = &step.backend {
                if !known(id) {
                    bail!("step `{}` uses unknown backend `{id}`", step.name);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refiner_core::BackendRef;

    const SAMPLE: &str = r#"(
        pipeline: (
            enable_saved_messages: true,
            saved_messages_count: -1,
            steps: [
                (
                    id: "grammar",
                    name: "Grammar",
                    backend: "current",
                    user_message: "Fix grammar:\n{{draft}}",
                ),
                (
                    id: "style",
                    name: "Style",
                    backend: "r1",
                    system_prompt: "Context:\n{{savedMessages}}",
                    user_message: "{{draft}}",
                    skip_if_no_changes: true,
                ),
            ],
        ),
        active_profile: Some("local"),
        profiles: [
            (id: "local", api: "textgenerationwebui", base_url: "http://127.0.0.1:5000/v1", model: "local"),
            (
                id: "r1",
                api: "deepseek",
                base_url: "https://api.deepseek.com",
                model: "deepseek-reasoner",
                api_key_env: Some("DEEPSEEK_API_KEY"),
                preset: Some((openai_max_tokens: Some(4096))),
                reasoning_template: Some("DeepSeek"),
            ),
        ],
        reasoning_templates: [(name: "DeepSeek", prefix: "<think>", suffix: "</think>")],
        macros: { "user": "Ana", "char": "Narrator" },
    )"#;

    #[test]
    fn parses_sample_config() {
        let config = AppConfig::parse(SAMPLE).expect("sample parses");
        assert!(config.pipeline.enabled);
        assert_eq!(config.pipeline.saved_messages_count, -1);
        assert_eq!(config.pipeline.steps[0].backend, BackendRef::Default);
        assert_eq!(config.pipeline.steps[1].backend, BackendRef::Named("r1".into()));
        assert_eq!(config.profiles[1].max_tokens(), Some(4096));
        assert_eq!(config.macros["char"], "Narrator");
        assert_eq!(config.http, HttpConfig::default());
    }

    #[test]
    fn default_config_survives_a_write_and_read() {
        let text = AppConfig::default().to_ron().unwrap();
        assert_eq!(AppConfig::parse(&text).unwrap(), AppConfig::default());
    }

    #[test]
    fn rejects_steps_with_unknown_backends() {
        let text = r#"(pipeline: (steps: [(id: "a", name: "A", backend: "ghost")]))"#;
        let err = AppConfig::parse(text).unwrap_err();
        assert!(format!("{err:#}").contains("unknown backend `ghost`"));
    }
}
