use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use refiner_core::Message;

use crate::StoreError;

/// Host conversation store. The pipeline reads it once per run and writes at most once.
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    async fn history(&self) -> Result<Vec<Message>, StoreError>;

    async fn commit(&self, index: usize, text: String) -> Result<(), StoreError>;

    /// Persist and redraw after a commit.
    async fn refresh_view(&self) -> Result<(), StoreError>;
}

/// In-memory store; counts commits and refreshes.
#[derive(Debug, Default)]
pub struct MemoryConversation {
    messages: Mutex<Vec<Message>>,
    commits: AtomicUsize,
    refreshes: AtomicUsize,
}

impl MemoryConversation {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages: Mutex::new(messages),
            commits: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.lock().clone()
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        // A poisoned lock still holds consistent data: every write is a single assignment.
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl ConversationStore for MemoryConversation {
    async fn history(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.snapshot())
    }

    async fn commit(&self, index: usize, text: String) -> Result<(), StoreError> {
        let mut messages = self.lock();
        let message = messages
            .get_mut(index)
            .ok_or(StoreError::MissingMessage(index))?;
        message.text = text;
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn refresh_view(&self) -> Result<(), StoreError> {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
