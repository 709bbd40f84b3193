//! In-memory backend for tests.
//!
//! The backend is [`Clone`] so tests can hold a handle for direct inspection while the uploader
//! owns a boxed copy.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::common::{Backend, BackendError, BackendResult, UploadTarget};

#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryBackend {
    puts: Arc<Mutex<Vec<UploadTarget>>>,
    failing_keys: Arc<HashSet<String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that rejects puts for the given keys.
    ///
    /// Rejected puts are still recorded as attempts.
    pub fn failing_on(keys: &[&str]) -> Self {
        Self {
            puts: Default::default(),
            failing_keys: Arc::new(keys.iter().map(|k| k.to_string()).collect()),
        }
    }

    /// Returns every attempted put, in call order.
    pub fn puts(&self) -> Vec<UploadTarget> {
        self.puts.lock().unwrap().clone()
    }

    /// Returns the sorted keys of all attempted puts.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.puts().into_iter().map(|t| t.key).collect();
        keys.sort();
        keys
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put_object(&self, target: &UploadTarget) -> BackendResult<()> {
        self.puts.lock().unwrap().push(target.clone());

        if self.failing_keys.contains(&target.key) {
            return Err(BackendError::Generic {
                context: format!("simulated failure for `{}`", target.key),
                cause: None,
            });
        }

        Ok(())
    }
}
