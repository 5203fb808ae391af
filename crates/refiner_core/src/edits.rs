//! Search/replace edit blocks embedded in a backend reply.
//!
//! The grammar is `<search>…</search>` immediately followed (whitespace
//! allowed) by `<replace>…</replace>`. Parsing is tolerant: anything that does
//! not form a complete pair is ignored rather than reported.

const SEARCH_OPEN: &str = "<search>";
const SEARCH_CLOSE: &str = "</search>";
const REPLACE_OPEN: &str = "<replace>";
const REPLACE_CLOSE: &str = "</replace>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub search: String,
    pub replace: String,
}

impl Edit {
    pub fn new(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            replace: replace.into(),
        }
    }
}

/// Result of folding a list of edits over a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditReport {
    pub text: String,
    pub applied: usize,
    /// Indices (into the edit list) whose search text was not found.
    pub missed: Vec<usize>,
}

/// Extracts every well-formed edit block in document order, trimming both spans.
///
/// A `</search>` must be followed, after optional whitespace, by `<replace>`;
/// otherwise that block is dropped and scanning resumes after it. A search span
/// never contains another `<search>` tag: an unclosed one restarts at the
/// innermost. So `<search>A</search> x <search>B</search><replace>C</replace>`
/// yields only `B -> C`.
pub fn parse_edits(reply: &str) -> Vec<Edit> {
    let mut edits = Vec::new();
    let mut rest = reply;

    while let Some(open) = rest.find(SEARCH_OPEN) {
        let body = &rest[open + SEARCH_OPEN.len()..];
        let Some(close) = body.find(SEARCH_CLOSE) else {
            break;
        };
        let search = &body[..close];

        // An earlier `<search>` that was never closed: resume at the innermost one.
        if let Some(inner) = search.rfind(SEARCH_OPEN) {
            rest = &body[inner..];
            continue;
        }

        let after_search = &body[close + SEARCH_CLOSE.len()..];
        let Some(replace_body) = after_search.trim_start().strip_prefix(REPLACE_OPEN) else {
            rest = after_search;
            continue;
        };
        let Some(end) = replace_body.find(REPLACE_CLOSE) else {
            break;
        };

        edits.push(Edit {
            search: search.trim().to_string(),
            replace: replace_body[..end].trim().to_string(),
        });
        rest = &replace_body[end + REPLACE_CLOSE.len()..];
    }

    edits
}

/// Replaces the first occurrence of `edit.search`. Returns `None` when the
/// search text does not occur; an empty search never matches.
pub fn apply_edit(content: &str, edit: &Edit) -> Option<String> {
    if edit.search.is_empty() || !content.contains(edit.search.as_str()) {
        return None;
    }
    Some(content.replacen(edit.search.as_str(), &edit.replace, 1))
}

/// Applies `edits` left to right; each edit sees the output of the previous one.
pub fn apply_edits(draft: &str, edits: &[Edit]) -> EditReport {
    let mut text = draft.to_string();
    let mut applied = 0;
    let mut missed = Vec::new();
    for (index, edit) in edits.iter().enumerate() {
        match apply_edit(&text, edit) {
            Some(next) => {
                text = next;
                applied += 1;
            }
            None => missed.push(index),
        }
    }
    EditReport {
        text,
        applied,
        missed,
    }
}
