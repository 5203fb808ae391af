use regex::Regex;
use serde::{Deserialize, Serialize};

/// Delimiters around a backend's "thinking" output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningTemplate {
    pub prefix: String,
    pub suffix: String,
}

impl ReasoningTemplate {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    fn pattern(&self, strict: bool) -> Option<Regex> {
        let anchor = if strict { r"^\s*?" } else { "" };
        let pattern = format!(
            "(?s){anchor}{prefix}(.*?){suffix}",
            prefix = regex::escape(&self.prefix),
            suffix = regex::escape(&self.suffix),
        );
        Regex::new(&pattern).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningSplit {
    pub reasoning: String,
    pub content: String,
}

/// Separates the first delimited reasoning segment from the answer.
///
/// `strict` anchors the segment to the start of `raw` (leading whitespace
/// allowed). Returns `None` when there is no template, the template is empty,
/// or nothing matches.
pub fn strip_reasoning(
    raw: &str,
    template: Option<&ReasoningTemplate>,
    strict: bool,
) -> Option<ReasoningSplit> {
    let template = template?;
    if template.prefix.is_empty() && template.suffix.is_empty() {
        return None;
    }
    let regex = template.pattern(strict)?;
    let caps = regex.captures(raw)?;
    let whole = caps.get(0)?;
    let reasoning = caps.get(1).map_or("", |m| m.as_str());

    let mut content = String::with_capacity(raw.len() - whole.len());
    content.push_str(&raw[..whole.start()]);
    content.push_str(&raw[whole.end()..]);

    Some(ReasoningSplit {
        reasoning: reasoning.trim().to_string(),
        content: content.trim().to_string(),
    })
}
