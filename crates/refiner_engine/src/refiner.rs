//! The step pipeline: one refinement run over one assistant message.
//!
//! A run reads the conversation once, threads a private draft through every
//! configured step and writes the message back at most once, after the last
//! step succeeded. Any generation failure abandons the draft.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use refiner_core::{
    apply_edits, parse_edits, render_step_prompt, saved_messages_for, MacroExpander, NoMacros,
    PipelineSettings, Role, Step,
};
use refiner_logging::{preview, refiner_error, refiner_info, refiner_warn};

use crate::{
    AnalysisHook, BackendResolver, ConversationStore, NullSink, ProgressSink, ReasoningResolver,
    RefineError, RefineEvent, StepOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefineOutcome {
    Committed,
    Unchanged,
}

/// Holds the run flag for the lifetime of one run; dropping it returns to idle.
struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

pub struct Refiner {
    settings: PipelineSettings,
    store: Arc<dyn ConversationStore>,
    backends: Arc<dyn BackendResolver>,
    reasoning: ReasoningResolver,
    macros: Arc<dyn MacroExpander>,
    hook: Option<Arc<dyn AnalysisHook>>,
    sink: Arc<dyn ProgressSink>,
    running: AtomicBool,
}

impl Refiner {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<dyn ConversationStore>,
        backends: Arc<dyn BackendResolver>,
    ) -> Self {
        Self {
            settings,
            store,
            backends,
            reasoning: ReasoningResolver::default(),
            macros: Arc::new(NoMacros),
            hook: None,
            sink: Arc::new(NullSink),
            running: AtomicBool::new(false),
        }
    }

    pub fn with_reasoning(mut self, reasoning: ReasoningResolver) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn with_macros(mut self, macros: Arc<dyn MacroExpander>) -> Self {
        self.macros = macros;
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn AnalysisHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs every configured step over message `message_id`.
    ///
    /// Preconditions (a run already active, bad id, non-assistant target) are
    /// rejected before the run flag is taken. A generation error aborts the run
    /// and leaves the message untouched.
    pub async fn refine(&self, message_id: usize) -> Result<RefineOutcome, RefineError> {
        if self.is_running() {
            refiner_warn!("Refinement of {} rejected: another run is active", message_id);
            return Err(RefineError::AlreadyRunning);
        }

        let history = self.store.history().await?;
        let target = history
            .get(message_id)
            .ok_or(RefineError::InvalidMessageId {
                index: message_id,
                len: history.len(),
            })?;
        if target.role != Role::Assistant {
            return Err(RefineError::NotAssistantMessage {
                index: message_id,
                role: target.role,
            });
        }

        let _guard = RunGuard::acquire(&self.running).ok_or(RefineError::AlreadyRunning)?;
        refiner_info!(
            "Refining message {} through {} step(s)",
            message_id,
            self.settings.steps.len()
        );
        self.sink.emit(RefineEvent::RunStarted {
            message_id,
            steps: self.settings.steps.len(),
        });

        self.run_hook().await;

        let original = target.text.clone();
        let saved_messages = saved_messages_for(&self.settings, &history, message_id);
        let mut draft = original.clone();

        for (index, step) in self.settings.steps.iter().enumerate() {
            let outcome = self.run_step(index, step, &mut draft, &saved_messages).await?;
            self.sink.emit(RefineEvent::StepFinished { index, outcome });
        }

        if draft == original {
            refiner_info!("No changes made to message {}", message_id);
            self.sink.emit(RefineEvent::Unchanged { message_id });
            return Ok(RefineOutcome::Unchanged);
        }

        self.store.commit(message_id, draft).await?;
        // The message is already written; a stale view must not turn that into a failure.
        if let Err(err) = self.store.refresh_view().await {
            refiner_warn!("Message {} updated but view refresh failed: {}", message_id, err);
        }
        refiner_info!("Message {} updated", message_id);
        self.sink.emit(RefineEvent::Committed { message_id });
        Ok(RefineOutcome::Committed)
    }

    async fn run_step(
        &self,
        index: usize,
        step: &Step,
        draft: &mut String,
        saved_messages: &str,
    ) -> Result<StepOutcome, RefineError> {
        let backend = self.backends.resolve(&step.backend);
        refiner_info!("Running step \"{}\" on backend {}", step.name, backend.label());
        self.sink.emit(RefineEvent::StepStarted {
            index,
            name: step.name.clone(),
            backend: backend.label(),
        });

        let prompt = render_step_prompt(step, draft, saved_messages, self.macros.as_ref());
        let raw = backend.dispatch(&prompt).await.map_err(|source| {
            refiner_error!("Step \"{}\" failed: {}", step.name, source);
            RefineError::Generation {
                step: step.name.clone(),
                source,
            }
        })?;

        let reply = self.reasoning.content(&step.backend, raw);
        if reply.trim().is_empty() {
            refiner_info!("No response from step \"{}\"", step.name);
            return Ok(StepOutcome::NoResponse);
        }

        let edits = parse_edits(&reply);
        if edits.is_empty() {
            if step.skip_if_no_changes {
                refiner_info!("No edits from \"{}\" and skip enabled", step.name);
                return Ok(StepOutcome::SkippedNoEdits);
            }
            refiner_info!("No edits from \"{}\", using reply as new draft", step.name);
            *draft = reply.trim().to_string();
            return Ok(StepOutcome::ReplacedDraft);
        }

        let report = apply_edits(draft, &edits);
        for &missed in &report.missed {
            let search = &edits[missed].search;
            refiner_warn!("Search text not found: {}", preview(search, 80));
            self.sink.emit(RefineEvent::EditMissed {
                step_index: index,
                search: search.clone(),
            });
        }
        *draft = report.text;
        Ok(StepOutcome::Edited {
            applied: report.applied,
            missed: report.missed.len(),
        })
    }

    async fn run_hook(&self) {
        let Some(hook) = &self.hook else {
            return;
        };
        match hook.analyze().await {
            Ok(()) => refiner_info!("Analysis hook {} complete", hook.name()),
            Err(err) => refiner_warn!("Analysis hook {} failed: {}", hook.name(), err),
        }
    }
}
