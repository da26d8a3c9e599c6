//! Registry of frame callbacks scheduled by executed code.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Opaque id of one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnimationHandle(pub u64);

/// Every outstanding registration, so cancellation never depends on ids the
/// script kept around.
#[derive(Debug, Default, Clone)]
pub struct AnimationRegistry {
    active: BTreeSet<AnimationHandle>,
}

impl AnimationRegistry {
    pub fn register(&mut self, handle: AnimationHandle) {
        self.active.insert(handle);
    }

    /// Forget one handle; true if it was outstanding.
    pub fn release(&mut self, handle: AnimationHandle) -> bool {
        self.active.remove(&handle)
    }

    /// Remove and return every outstanding handle, oldest first.
    pub fn drain(&mut self) -> Vec<AnimationHandle> {
        std::mem::take(&mut self.active).into_iter().collect()
    }

    pub fn contains(&self, handle: AnimationHandle) -> bool {
        self.active.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
