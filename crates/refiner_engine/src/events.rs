use std::sync::mpsc;

/// What happened to the draft in one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The backend returned nothing usable.
    NoResponse,
    /// No edit blocks and the step skips in that case.
    SkippedNoEdits,
    /// No edit blocks; the whole reply became the draft.
    ReplacedDraft,
    Edited { applied: usize, missed: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineEvent {
    RunStarted {
        message_id: usize,
        steps: usize,
    },
    StepStarted {
        index: usize,
        name: String,
        backend: String,
    },
    EditMissed {
        step_index: usize,
        search: String,
    },
    StepFinished {
        index: usize,
        outcome: StepOutcome,
    },
    Committed {
        message_id: usize,
    },
    Unchanged {
        message_id: usize,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: RefineEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: RefineEvent) {}
}

pub struct ChannelProgressSink {
    tx: mpsc::Sender<RefineEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::Sender<RefineEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: RefineEvent) {
        let _ = self.tx.send(event);
    }
}
