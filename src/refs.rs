//! Step-scoped element references.
//!
//! A store is an arena of live-element handles built by one summarization
//! pass. It is never patched: the next pass produces a brand new store and
//! the old one is dropped with everything it pointed to.

use std::collections::HashMap;

use crate::errors::AgentError;

#[derive(Debug, Clone)]
pub struct ElementRefStore<H> {
    generation: u64,
    handles: Vec<H>,
    index: HashMap<String, usize>,
}

impl<H> ElementRefStore<H> {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            handles: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Binds `reference_id` to `handle`. IDs are unique per pass; binding the
    /// same ID twice replaces the earlier slot's handle.
    pub(crate) fn bind(&mut self, reference_id: String, handle: H) {
        if let Some(&slot) = self.index.get(&reference_id) {
            self.handles[slot] = handle;
            return;
        }
        self.index.insert(reference_id, self.handles.len());
        self.handles.push(handle);
    }

    pub fn get(&self, reference_id: &str) -> Option<&H> {
        self.index.get(reference_id).map(|&slot| &self.handles[slot])
    }

    pub fn resolve(&self, reference_id: &str) -> Result<&H, AgentError> {
        self.get(reference_id).ok_or_else(|| {
            AgentError::ElementNotFound(format!(
                "no element bound to '{reference_id}' in generation {}",
                self.generation
            ))
        })
    }

    pub fn contains(&self, reference_id: &str) -> bool {
        self.index.contains_key(reference_id)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
