//! In-memory registry client for fixtures and testing.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::*;
use crate::registry::Registry;

/// Static registry.
///
/// Answers from a fixed set of records; ids not present are `NotFound`.
/// Scripted failures are returned, in order, before any record lookup.
pub struct StaticRegistry {
    records: HashMap<String, RegistryRecord>,
    scripted: Mutex<VecDeque<RegistryError>>,
    delay: Option<Duration>,
    call_count: AtomicU32,
}

impl StaticRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            scripted: Mutex::new(VecDeque::new()),
            delay: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Create from a map of registry id → record.
    pub fn from_records(records: HashMap<String, RegistryRecord>) -> Self {
        Self {
            records,
            ..Self::new()
        }
    }

    /// Add a record.
    pub fn with_record(mut self, registry_id: impl Into<String>, record: RegistryRecord) -> Self {
        self.records.insert(registry_id.into(), record);
        self
    }

    /// Queue errors returned by the next calls.
    pub fn with_failures(self, failures: impl IntoIterator<Item = RegistryError>) -> Self {
        self.push_failures(failures);
        self
    }

    /// Queue more errors at runtime.
    pub fn push_failures(&self, failures: impl IntoIterator<Item = RegistryError>) {
        let mut scripted = self.scripted.lock().unwrap_or_else(|e| e.into_inner());
        scripted.extend(failures);
    }

    /// Delay every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get the number of times fetch was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for StaticRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistryClient for StaticRegistry {
    fn id(&self) -> &str {
        "static"
    }

    async fn fetch(&self, _registry: Registry, registry_id: &str) -> Result<RegistryRecord, RegistryError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = {
            let mut queue = self.scripted.lock().unwrap_or_else(|e| e.into_inner());
            queue.pop_front()
        };
        if let Some(err) = scripted {
            return Err(err);
        }

        self.records
            .get(registry_id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(registry_id.to_string()))
    }
}
