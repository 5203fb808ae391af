//! JSON chat file used as the conversation store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use refiner_core::Message;
use refiner_engine::{write_atomically, ConversationStore, StoreError};
use refiner_logging::{refiner_debug, refiner_info};

pub struct ChatFile {
    path: PathBuf,
    messages: Mutex<Vec<Message>>,
}

impl ChatFile {
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let text = fs::read_to_string(path)?;
        let messages: Vec<Message> = serde_json::from_str(&text)
            .map_err(|err| StoreError::Unavailable(format!("{}: {err}", path.display())))?;
        refiner_debug!("Loaded {} messages from {:?}", messages.len(), path);
        Ok(Self {
            path: path.to_path_buf(),
            messages: Mutex::new(messages),
        })
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn save(&self, messages: &[Message]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(messages)
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        write_atomically(&self.path, &json)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ConversationStore for ChatFile {
    async fn history(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.messages())
    }

    async fn commit(&self, index: usize, text: String) -> Result<(), StoreError> {
        let mut updated = self.messages();
        updated
            .get_mut(index)
            .ok_or(StoreError::MissingMessage(index))?
            .text = text;
        // Disk first: memory only changes once the file holds the new text.
        self.save(&updated)?;
        *self.lock() = updated;
        Ok(())
    }

    async fn refresh_view(&self) -> Result<(), StoreError> {
        refiner_info!("Chat file {:?} updated", self.path);
        Ok(())
    }
}
