use std::sync::Arc;

use refiner_core::{strip_reasoning, BackendRef, ReasoningSplit, ReasoningTemplate};
use refiner_logging::{refiner_debug, refiner_trace};

/// Per-backend reasoning template registry.
pub trait ReasoningTemplates: Send + Sync {
    fn lookup(&self, backend_id: &str) -> Option<ReasoningTemplate>;
}

/// Host-level reasoning parser consulted when no template is registered.
pub trait ReasoningParser: Send + Sync {
    fn parse(&self, text: &str, strict: bool) -> Option<ReasoningSplit>;
}

/// Fallback parser driven by one fixed template.
#[derive(Debug, Clone)]
pub struct TemplateParser {
    template: ReasoningTemplate,
}

impl TemplateParser {
    pub fn new(template: ReasoningTemplate) -> Self {
        Self { template }
    }
}

impl ReasoningParser for TemplateParser {
    fn parse(&self, text: &str, strict: bool) -> Option<ReasoningSplit> {
        strip_reasoning(text, Some(&self.template), strict)
    }
}

/// Picks the reasoning delimiters for a backend and strips them from replies.
#[derive(Clone, Default)]
pub struct ReasoningResolver {
    templates: Option<Arc<dyn ReasoningTemplates>>,
    fallback: Option<Arc<dyn ReasoningParser>>,
}

impl ReasoningResolver {
    pub fn new(
        templates: Option<Arc<dyn ReasoningTemplates>>,
        fallback: Option<Arc<dyn ReasoningParser>>,
    ) -> Self {
        Self {
            templates,
            fallback,
        }
    }

    /// A registered template decides on its own; without one the fallback parser
    /// gets the text.
    pub fn split(&self, backend: &BackendRef, raw: &str, strict: bool) -> Option<ReasoningSplit> {
        if let BackendRef::Named(id) = backend {
            if let Some(template) = self.templates.as_ref().and_then(|t| t.lookup(id)) {
                refiner_trace!("Using reasoning template {:?} for {}", template.prefix, id);
                return strip_reasoning(raw, Some(&template), strict);
            }
        }
        self.fallback
            .as_ref()
            .and_then(|parser| parser.parse(raw, strict))
    }

    /// Reply content with any reasoning segment removed.
    pub fn content(&self, backend: &BackendRef, raw: String) -> String {
        match self.split(backend, &raw, false) {
            Some(split) => {
                if !split.reasoning.is_empty() {
                    refiner_debug!(
                        "Stripped {} chars of reasoning from {} reply",
                        split.reasoning.chars().count(),
                        backend
                    );
                }
                split.content
            }
            None => raw,
        }
    }
}
