//! Keyed debounce for delayed re-invocation
//!
//! Schedule-then-supersede: scheduling an action for a key that already
//! has a pending one cancels the pending task. Used for workspace
//! reloads, where only the latest request matters.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
pub struct Debouncer {
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to run after `delay`, superseding any pending
    /// schedule for the same key
    pub async fn schedule<F>(&self, key: &str, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });

        let mut tasks = self.tasks.lock().await;
        if let Some(previous) = tasks.insert(key.to_string(), handle) {
            debug!("Superseding pending task for key {}", key);
            previous.abort();
        }
    }

    /// Cancel a pending schedule for a key, if any
    pub async fn cancel(&self, key: &str) {
        if let Some(handle) = self.tasks.lock().await.remove(key) {
            handle.abort();
        }
    }

    /// Cancel everything pending
    pub async fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().await;
        for (_, handle) in tasks.drain() {
            handle.abort();
        }
    }
}
