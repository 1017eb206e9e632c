//! Process-wide reference-counted store for opaque payloads.
//!
//! Agents park large intermediate results here and carry only a
//! [`ResourceId`] in their memory. The entry is deleted when its global
//! reference count drops back to zero, and the whole store can be closed
//! with [`ResourceManager::shutdown`], after which registrations fail and
//! reads return `None`.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::id::ResourceId;

#[derive(Debug)]
struct ResourceEntry {
    payload: Value,
    description: String,
    /// Global reference count. Mutation happens under the dashmap entry
    /// guard, which serializes all updates for one resource id.
    ref_count: u32,
}

/// Reference-counted blob store shared by every agent in the process.
#[derive(Debug, Default)]
pub struct ResourceManager {
    entries: DashMap<ResourceId, ResourceEntry>,
    shutting_down: AtomicBool,
}

impl ResourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payload, returning its server-assigned id.
    ///
    /// Fails once [`shutdown`](Self::shutdown) has begun. The initial
    /// reference count is zero; callers that want to keep the entry alive
    /// must pair this with [`add_reference`](Self::add_reference).
    pub fn register(&self, payload: Value, description: impl Into<String>) -> Result<ResourceId> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(CoreError::ResourceManagerShutdown);
        }
        let id = ResourceId::generate();
        self.entries.insert(
            id.clone(),
            ResourceEntry {
                payload,
                description: description.into(),
                ref_count: 0,
            },
        );
        // Shutdown may have swept the map between the flag check and the
        // insert; a closed store must not retain the late entry.
        if self.shutting_down.load(Ordering::Acquire) {
            self.entries.remove(&id);
            return Err(CoreError::ResourceManagerShutdown);
        }
        Ok(id)
    }

    /// Fetch a payload. Returns `None` for unknown ids and always after
    /// shutdown.
    pub fn get(&self, id: &ResourceId) -> Option<Value> {
        if self.shutting_down.load(Ordering::Acquire) {
            return None;
        }
        self.entries.get(id).map(|e| e.payload.clone())
    }

    pub fn description(&self, id: &ResourceId) -> Option<String> {
        self.entries.get(id).map(|e| e.description.clone())
    }

    /// Increment the global reference count. No-op for unknown ids or after
    /// shutdown.
    pub fn add_reference(&self, id: &ResourceId) {
        if self.shutting_down.load(Ordering::Acquire) {
            return;
        }
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.ref_count += 1;
        }
    }

    /// Decrement the global reference count, deleting the entry when it
    /// reaches zero.
    pub fn release(&self, id: &ResourceId) {
        let remove = match self.entries.get_mut(id) {
            Some(mut entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.ref_count == 0
            }
            None => false,
        };
        if remove {
            // remove_if re-checks the count under the entry guard in case a
            // concurrent add_reference landed between the two calls.
            self.entries.remove_if(id, |_, e| e.ref_count == 0);
        }
    }

    /// Sweep entries whose count already sits at zero. Idempotent.
    pub fn cleanup(&self) {
        self.entries.retain(|_, e| e.ref_count > 0);
    }

    /// Unconditionally clear everything.
    pub fn force_cleanup(&self) {
        self.entries.clear();
    }

    /// Mark the manager closed and clear all entries. Further registrations
    /// fail with [`CoreError::ResourceManagerShutdown`]; reads return `None`.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.force_cleanup();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
