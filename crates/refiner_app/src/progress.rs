//! Terminal reporting of refinement progress events.

use std::sync::mpsc;
use std::thread;

use refiner_engine::{RefineEvent, StepOutcome};
use refiner_logging::preview;

/// One line per event worth showing, `None` for the rest.
pub fn describe(event: &RefineEvent) -> Option<String> {
    match event {
        RefineEvent::StepStarted {
            index,
            name,
            backend,
        } => Some(format!("Step {} \"{name}\" on {backend}", index + 1)),
        RefineEvent::EditMissed { step_index, search } => Some(format!(
            "  step {}: search text not found: {}",
            step_index + 1,
            preview(search, 60)
        )),
        RefineEvent::StepFinished { index, outcome } => {
            let what = match outcome {
                StepOutcome::NoResponse => "no response".to_string(),
                StepOutcome::SkippedNoEdits => "no edits, skipped".to_string(),
                StepOutcome::ReplacedDraft => "reply used as new draft".to_string(),
                StepOutcome::Edited { applied, missed } => {
                    format!("{applied} edit(s) applied, {missed} not found")
                }
            };
            Some(format!("  step {}: {what}", index + 1))
        }
        RefineEvent::RunStarted { .. }
        | RefineEvent::Committed { .. }
        | RefineEvent::Unchanged { .. } => None,
    }
}

/// Prints events until every sender is dropped.
pub fn spawn_printer(rx: mpsc::Receiver<RefineEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for line in rx.iter().filter_map(|event| describe(&event)) {
            println!("{line}");
        }
    })
}
