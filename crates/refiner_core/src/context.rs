use crate::{Message, PipelineSettings};

/// Formats the `count` turns strictly before `target_index` as
/// `"<Role>: <text>"` paragraphs. `count == -1` takes the whole prior history,
/// `0` disables the window and anything below `-1` behaves like `-1`.
/// Whitespace-only turns are skipped.
pub fn build_saved_messages(history: &[Message], target_index: usize, count: i64) -> String {
    if count == 0 || history.is_empty() {
        return String::new();
    }

    let total = history.len() as i64;
    let clamped_target = (target_index as i64 - 1).min(total - 1);
    if clamped_target < 0 {
        return String::new();
    }

    let count = count.max(-1);
    let start = if count == -1 {
        0
    } else {
        (clamped_target - count + 1).max(0)
    };

    history[start as usize..=clamped_target as usize]
        .iter()
        .filter(|message| !message.text.trim().is_empty())
        .map(|message| format!("{}: {}", message.role.label(), message.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Settings-aware wrapper: empty when the saved-messages feature is off.
pub fn saved_messages_for(
    settings: &PipelineSettings,
    history: &[Message],
    target_index: usize,
) -> String {
    if !settings.enable_saved_messages {
        return String::new();
    }
    build_saved_messages(history, target_index, settings.saved_messages_count)
}
