use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use pretty_assertions::assert_eq;
use refiner_core::{
    BackendRef, MacroTable, Message, PipelineSettings, ReasoningTemplate, Step, StepPrompt,
};
use refiner_engine::{
    AnalysisHook, BackendResolver, ChannelProgressSink, ConversationStore, FailureKind,
    GenerationBackend, GenerationError, HookError, MemoryConversation, ProgressSink,
    ReasoningResolver, RefineError, RefineEvent, RefineOutcome, Refiner, StepOutcome, StoreError,
    TemplateParser,
};
use tokio::sync::Notify;

/// Replies from a queue and records every prompt it saw.
#[derive(Default)]
struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    prompts: Mutex<Vec<StepPrompt>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Result<String, GenerationError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    fn prompts(&self) -> Vec<StepPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl GenerationBackend for ScriptedBackend {
    fn label(&self) -> String {
        "scripted".to_string()
    }

    async fn dispatch(&self, prompt: &StepPrompt) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Every step reference resolves to the same scripted backend.
struct SingleResolver(Arc<ScriptedBackend>);

impl BackendResolver for SingleResolver {
    fn resolve(&self, _backend: &BackendRef) -> Arc<dyn GenerationBackend> {
        self.0.clone()
    }
}

#[derive(Default)]
struct TestSink {
    events: Mutex<Vec<RefineEvent>>,
}

impl TestSink {
    fn take(&self) -> Vec<RefineEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl ProgressSink for TestSink {
    fn emit(&self, event: RefineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

fn chat() -> Vec<Message> {
    vec![
        Message::user("Tell me about the cat."),
        Message::assistant("The cat sat on the mat."),
        Message::user("And then?"),
        Message::assistant("The cat sat."),
    ]
}

fn step(name: &str) -> Step {
    Step::new(name, name).with_user_message("Refine:\n{{draft}}")
}

fn settings(steps: Vec<Step>) -> PipelineSettings {
    PipelineSettings {
        steps,
        ..PipelineSettings::default()
    }
}

fn refiner(
    steps: Vec<Step>,
    backend: Arc<ScriptedBackend>,
) -> (Refiner, Arc<MemoryConversation>) {
    let store = Arc::new(MemoryConversation::new(chat()));
    let refiner = Refiner::new(settings(steps), store.clone(), Arc::new(SingleResolver(backend)));
    (refiner, store)
}

#[tokio::test]
async fn edits_are_applied_and_committed_once() {
    let backend =
        ScriptedBackend::replying(&["<search>cat</search><replace>dog</replace>"]);
    let (refiner, store) = refiner(vec![step("one")], backend.clone());

    let outcome = refiner.refine(3).await.unwrap();

    assert_eq!(outcome, RefineOutcome::Committed);
    assert_eq!(store.snapshot()[3].text, "The dog sat.");
    assert_eq!(store.commit_count(), 1);
    assert_eq!(store.refresh_count(), 1);
    assert_eq!(backend.prompts()[0].user, "Refine:\nThe cat sat.");
    assert!(!refiner.is_running());
}

#[tokio::test]
async fn draft_threads_through_steps_in_order() {
    let backend = ScriptedBackend::replying(&[
        "<search>cat</search><replace>dog</replace>",
        "<search>sat</search><replace>ran</replace>",
    ]);
    let (refiner, store) = refiner(vec![step("one"), step("two")], backend.clone());

    refiner.refine(3).await.unwrap();

    let prompts = backend.prompts();
    assert_eq!(prompts[1].user, "Refine:\nThe dog sat.");
    assert_eq!(store.snapshot()[3].text, "The dog ran.");
}

#[tokio::test]
async fn plain_reply_skips_when_configured() {
    let backend = ScriptedBackend::replying(&["Looks good to me."]);
    let (refiner, store) = refiner(vec![step("one").skip_if_no_changes(true)], backend);

    let outcome = refiner.refine(3).await.unwrap();

    assert_eq!(outcome, RefineOutcome::Unchanged);
    assert_eq!(store.snapshot()[3].text, "The cat sat.");
    assert_eq!(store.commit_count(), 0);
    assert_eq!(store.refresh_count(), 0);
}

#[tokio::test]
async fn plain_reply_replaces_draft_when_not_skipping() {
    let backend = ScriptedBackend::replying(&["  \nA cat was sitting.\n  "]);
    let (refiner, store) = refiner(vec![step("one")], backend);

    refiner.refine(3).await.unwrap();

    assert_eq!(store.snapshot()[3].text, "A cat was sitting.");
}

#[tokio::test]
async fn edits_apply_even_when_skip_is_enabled() {
    let backend = ScriptedBackend::replying(&["<search>sat</search><replace>slept</replace>"]);
    let (refiner, store) = refiner(vec![step("one").skip_if_no_changes(true)], backend);

    refiner.refine(3).await.unwrap();

    assert_eq!(store.snapshot()[3].text, "The cat slept.");
}

#[tokio::test]
async fn empty_reply_leaves_draft_for_next_step() {
    let backend = ScriptedBackend::replying(&["", "<search>cat</search><replace>owl</replace>"]);
    let sink = Arc::new(TestSink::default());
    let (refiner, store) = refiner(vec![step("one"), step("two")], backend.clone());
    let refiner = refiner.with_sink(sink.clone());

    refiner.refine(3).await.unwrap();

    assert_eq!(backend.prompts()[1].user, "Refine:\nThe cat sat.");
    assert_eq!(store.snapshot()[3].text, "The owl sat.");
    let outcomes: Vec<_> = sink
        .take()
        .into_iter()
        .filter_map(|event| match event {
            RefineEvent::StepFinished { outcome, .. } => Some(outcome),
            _ => None,
        })
        .collect();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::NoResponse,
            StepOutcome::Edited {
                applied: 1,
                missed: 0
            }
        ]
    );
}

#[tokio::test]
async fn generation_error_aborts_without_mutation() {
    let backend = ScriptedBackend::new(vec![
        Ok("<search>cat</search><replace>dog</replace>".to_string()),
        Err(GenerationError::new(
            FailureKind::HttpStatus(503),
            "claude-profile",
            "overloaded",
        )),
        Ok("<search>dog</search><replace>wolf</replace>".to_string()),
    ]);
    let (refiner, store) = refiner(vec![step("one"), step("two"), step("three")], backend.clone());

    let err = refiner.refine(3).await.unwrap_err();

    match err {
        RefineError::Generation { step, source } => {
            assert_eq!(step, "two");
            assert_eq!(source.backend, "claude-profile");
            assert_eq!(source.kind, FailureKind::HttpStatus(503));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(backend.prompts().len(), 2);
    assert_eq!(store.snapshot(), chat());
    assert_eq!(store.commit_count(), 0);
    assert!(!refiner.is_running());
}

#[tokio::test]
async fn missed_edits_are_reported_and_run_continues() {
    let backend = ScriptedBackend::replying(&[
        "<search>horse</search><replace>pony</replace><search>sat</search><replace>sits</replace>",
    ]);
    let sink = Arc::new(TestSink::default());
    let (refiner, store) = refiner(vec![step("one")], backend);
    let refiner = refiner.with_sink(sink.clone());

    refiner.refine(3).await.unwrap();

    assert_eq!(store.snapshot()[3].text, "The cat sits.");
    let events = sink.take();
    assert!(events.contains(&RefineEvent::EditMissed {
        step_index: 0,
        search: "horse".to_string(),
    }));
    assert_eq!(events.last(), Some(&RefineEvent::Committed { message_id: 3 }));
}

#[tokio::test]
async fn preconditions_are_rejected_before_running() {
    let backend = ScriptedBackend::replying(&[]);
    let (refiner, store) = refiner(vec![step("one")], backend.clone());

    let err = refiner.refine(9).await.unwrap_err();
    assert!(matches!(err, RefineError::InvalidMessageId { index: 9, len: 4 }));
    assert!(err.is_precondition());

    let err = refiner.refine(2).await.unwrap_err();
    assert!(matches!(err, RefineError::NotAssistantMessage { index: 2, .. }));

    assert!(backend.prompts().is_empty());
    assert_eq!(store.commit_count(), 0);
}

#[tokio::test]
async fn saved_messages_and_macros_are_substituted() {
    let backend = ScriptedBackend::replying(&["<search>cat</search><replace>cat</replace>"]);
    let store = Arc::new(MemoryConversation::new(chat()));
    let mut settings = settings(vec![Step::new("ctx", "Context")
        .with_system_prompt("You assist {{user}}.")
        .with_user_message("History:\n{{savedMessages}}\n---\n{{draft}}")]);
    settings.enable_saved_messages = true;
    settings.saved_messages_count = 2;
    let macros = MacroTable::new([("user".to_string(), "Ana".to_string())].into());
    let refiner = Refiner::new(settings, store.clone(), Arc::new(SingleResolver(backend.clone())))
        .with_macros(Arc::new(macros));

    let outcome = refiner.refine(3).await.unwrap();

    assert_eq!(outcome, RefineOutcome::Unchanged);
    let prompt = &backend.prompts()[0];
    assert_eq!(prompt.system, "You assist Ana.");
    assert_eq!(
        prompt.user,
        "History:\nAssistant: The cat sat on the mat.\n\nUser: And then?\n---\nThe cat sat."
    );
}

#[tokio::test]
async fn reasoning_is_stripped_before_parsing() {
    let backend = ScriptedBackend::replying(&["<think>Maybe replace the whole thing</think>The cat rested."]);
    let (refiner, store) = refiner(vec![step("one")], backend);
    let reasoning = ReasoningResolver::new(
        None,
        Some(Arc::new(TemplateParser::new(ReasoningTemplate::new("<think>", "</think>")))),
    );
    let refiner = refiner.with_reasoning(reasoning);

    refiner.refine(3).await.unwrap();

    assert_eq!(store.snapshot()[3].text, "The cat rested.");
}

struct FailingHook;

#[async_trait::async_trait]
impl AnalysisHook for FailingHook {
    fn name(&self) -> &str {
        "prose-analysis"
    }

    async fn analyze(&self) -> Result<(), HookError> {
        Err(HookError("analysis service offline".to_string()))
    }
}

#[tokio::test]
async fn hook_failure_does_not_affect_run() {
    refiner_logging::initialize_for_tests();
    let backend = ScriptedBackend::replying(&["<search>cat</search><replace>dog</replace>"]);
    let (refiner, store) = refiner(vec![step("one")], backend);
    let refiner = refiner.with_hook(Arc::new(FailingHook));

    assert_eq!(refiner.refine(3).await.unwrap(), RefineOutcome::Committed);
    assert_eq!(store.snapshot()[3].text, "The dog sat.");
}

/// Parks inside `dispatch` until released.
struct GateBackend {
    entered: Notify,
    release: Notify,
}

#[async_trait::async_trait]
impl GenerationBackend for GateBackend {
    fn label(&self) -> String {
        "gate".to_string()
    }

    async fn dispatch(&self, _prompt: &StepPrompt) -> Result<String, GenerationError> {
        self.entered.notify_one();
        self.release.notified().await;
        Ok("<search>cat</search><replace>lynx</replace>".to_string())
    }
}

struct GateResolver(Arc<GateBackend>);

impl BackendResolver for GateResolver {
    fn resolve(&self, _backend: &BackendRef) -> Arc<dyn GenerationBackend> {
        self.0.clone()
    }
}

#[tokio::test]
async fn second_run_is_rejected_while_first_is_running() {
    let gate = Arc::new(GateBackend {
        entered: Notify::new(),
        release: Notify::new(),
    });
    let store = Arc::new(MemoryConversation::new(chat()));
    let refiner = Arc::new(Refiner::new(
        settings(vec![step("one")]),
        store.clone(),
        Arc::new(GateResolver(gate.clone())),
    ));

    let first = tokio::spawn({
        let refiner = refiner.clone();
        async move { refiner.refine(3).await }
    });
    gate.entered.notified().await;
    assert!(refiner.is_running());

    let err = refiner.refine(1).await.unwrap_err();
    assert!(matches!(err, RefineError::AlreadyRunning));
    assert!(refiner.is_running());
    assert_eq!(store.snapshot(), chat());

    gate.release.notify_one();
    let outcome = first.await.unwrap().unwrap();
    assert_eq!(outcome, RefineOutcome::Committed);
    assert!(!refiner.is_running());
    assert_eq!(store.snapshot()[3].text, "The lynx sat.");
    assert_eq!(store.snapshot()[1].text, "The cat sat on the mat.");
}

/// Numbers the prior user turn with each history read, so a re-read shows up in prompts.
struct ChangingHistoryStore {
    inner: MemoryConversation,
    reads: AtomicUsize,
}

#[async_trait::async_trait]
impl ConversationStore for ChangingHistoryStore {
    async fn history(&self) -> Result<Vec<Message>, StoreError> {
        let read = self.reads.fetch_add(1, Ordering::Relaxed);
        let mut history = self.inner.history().await?;
        history[2].text = format!("And then? #{read}");
        Ok(history)
    }

    async fn commit(&self, index: usize, text: String) -> Result<(), StoreError> {
        self.inner.commit(index, text).await
    }

    async fn refresh_view(&self) -> Result<(), StoreError> {
        self.inner.refresh_view().await
    }
}

#[tokio::test]
async fn context_window_is_computed_once_per_run() {
    let backend = ScriptedBackend::replying(&[
        "<search>cat</search><replace>dog</replace>",
        "<search>sat</search><replace>ran</replace>",
    ]);
    let store = Arc::new(ChangingHistoryStore {
        inner: MemoryConversation::new(chat()),
        reads: AtomicUsize::new(0),
    });
    let context_step = |name: &str| {
        Step::new(name, name).with_user_message("{{savedMessages}}\n---\n{{draft}}")
    };
    let mut settings = settings(vec![context_step("one"), context_step("two")]);
    settings.enable_saved_messages = true;
    settings.saved_messages_count = 1;
    let refiner = Refiner::new(settings, store.clone(), Arc::new(SingleResolver(backend.clone())));

    refiner.refine(3).await.unwrap();

    let prompts = backend.prompts();
    assert_eq!(prompts[0].user, "User: And then? #0\n---\nThe cat sat.");
    assert_eq!(prompts[1].user, "User: And then? #0\n---\nThe dog sat.");
    assert_eq!(store.reads.load(Ordering::Relaxed), 1);
    assert_eq!(store.inner.snapshot()[3].text, "The dog ran.");
}

/// Commits like the in-memory store but can never redraw.
struct StaleViewStore {
    inner: MemoryConversation,
}

#[async_trait::async_trait]
impl ConversationStore for StaleViewStore {
    async fn history(&self) -> Result<Vec<Message>, StoreError> {
        self.inner.history().await
    }

    async fn commit(&self, index: usize, text: String) -> Result<(), StoreError> {
        self.inner.commit(index, text).await
    }

    async fn refresh_view(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("view gone".to_string()))
    }
}

#[tokio::test]
async fn refresh_failure_after_commit_still_reports_success() {
    refiner_logging::initialize_for_tests();
    let backend = ScriptedBackend::replying(&["<search>cat</search><replace>dog</replace>"]);
    let store = Arc::new(StaleViewStore {
        inner: MemoryConversation::new(chat()),
    });
    let refiner = Refiner::new(
        settings(vec![step("one")]),
        store.clone(),
        Arc::new(SingleResolver(backend)),
    );

    let outcome = refiner.refine(3).await.unwrap();

    assert_eq!(outcome, RefineOutcome::Committed);
    assert_eq!(store.inner.snapshot()[3].text, "The dog sat.");
    assert_eq!(store.inner.commit_count(), 1);
    assert!(!refiner.is_running());
}

#[tokio::test]
async fn channel_sink_delivers_events_in_order() {
    let backend = ScriptedBackend::replying(&["<search>mouse</search><replace>rat</replace>"]);
    let (tx, rx) = mpsc::channel();
    let (refiner, _store) = refiner(vec![step("one")], backend);
    let refiner = refiner.with_sink(Arc::new(ChannelProgressSink::new(tx)));

    refiner.refine(3).await.unwrap();
    drop(refiner);

    let events: Vec<RefineEvent> = rx.iter().collect();
    assert_eq!(
        events,
        vec![
            RefineEvent::RunStarted {
                message_id: 3,
                steps: 1
            },
            RefineEvent::StepStarted {
                index: 0,
                name: "one".to_string(),
                backend: "scripted".to_string(),
            },
            RefineEvent::EditMissed {
                step_index: 0,
                search: "mouse".to_string(),
            },
            RefineEvent::StepFinished {
                index: 0,
                outcome: StepOutcome::Edited {
                    applied: 0,
                    missed: 1
                },
            },
            RefineEvent::Unchanged { message_id: 3 },
        ]
    );
}
