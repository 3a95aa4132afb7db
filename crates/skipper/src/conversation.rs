use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::compaction::Summarizer;
use crate::models::message::Message;

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Serializes work on the same conversation while letting different
/// conversations proceed in parallel.
#[derive(Clone, Default)]
pub struct ConversationLocks {
    locks: LockMap,
}

impl ConversationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no one else holds the lock for `conversation_id`
    pub async fn acquire(&self, conversation_id: &str) -> ConversationGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(conversation_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = lock.lock_owned().await;
        ConversationGuard {
            conversation_id: conversation_id.to_string(),
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Number of conversations currently held or waited on
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held while a conversation is being served; releasing it wakes the next
/// waiter or evicts the registry entry when nobody is waiting.
pub struct ConversationGuard {
    conversation_id: String,
    locks: LockMap,
    guard: Option<OwnedMutexGuard<()>>,
}

impl ConversationGuard {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let idle = locks
            .get(&self.conversation_id)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if idle {
            locks.remove(&self.conversation_id);
        }
    }
}

/// Regenerate a conversation summary in the background. The task outlives
/// the request that triggered it, so failures are only logged.
pub fn spawn_summary_refresh<F, Fut>(
    summarizer: Arc<dyn Summarizer>,
    messages: Vec<Message>,
    persist: F,
) -> JoinHandle<()>
where
    F: FnOnce(String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let summary = match summarizer.summarize(&messages).await {
            Ok(summary) => summary.trim().to_string(),
            Err(err) => {
                warn!(error = %err, "conversation summary refresh failed");
                return;
            }
        };
        if summary.is_empty() {
            debug!("summarizer returned an empty summary, keeping the previous one");
            return;
        }
        if let Err(err) = persist(summary).await {
            warn!(error = %err, "failed to persist conversation summary");
        }
    })
}
