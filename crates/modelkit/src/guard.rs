//! Cycle guards threaded through the recursive graph algorithms.
//!
//! [`CycleGuard`] maps an already-visited composite to its counterpart: the
//! clone built for it, or the value it was compared against. One guard is
//! created per top-level `equal` / `deep_clone` call and handed down by
//! `&mut` to every nested call.
//!
//! [`JsonStack`] is the active descent path of a `to_json` call. A composite
//! that shows up again while it is still on the path is a true cycle.

use std::collections::HashMap;

use crate::error::EntityError;
use crate::value::Value;

/// Visited-object map for `equal` and `deep_clone`.
#[derive(Debug, Default)]
pub struct CycleGuard {
    visited: HashMap<usize, Value>,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counterpart recorded for the composite with identity `id`.
    pub fn get(&self, id: usize) -> Option<&Value> {
        self.visited.get(&id)
    }

    /// Record `counterpart` for `id`. The first record wins.
    pub fn add(&mut self, id: usize, counterpart: Value) {
        self.visited.entry(id).or_insert(counterpart);
    }

    pub fn contains(&self, id: usize) -> bool {
        self.visited.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.visited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visited.is_empty()
    }
}

/// Active descent path of a serialization.
#[derive(Debug, Default, Clone)]
pub struct JsonStack {
    path: Vec<usize>,
}

impl JsonStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push `id` onto the path, failing if it is already there.
    pub fn enter(&mut self, id: usize) -> Result<(), EntityError> {
        if self.path.contains(&id) {
            return Err(EntityError::CircularStructureToJson);
        }
        self.path.push(id);
        Ok(())
    }

    /// Pop the innermost entry pushed by [`JsonStack::enter`].
    pub fn leave(&mut self) {
        self.path.pop();
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// Run `f` with `id` pushed onto the path.
    pub fn within<T>(
        &mut self,
        id: usize,
        f: impl FnOnce(&mut JsonStack) -> Result<T, EntityError>,
    ) -> Result<T, EntityError> {
        self.enter(id)?;
        let out = f(self);
        self.leave();
        out
    }
}
