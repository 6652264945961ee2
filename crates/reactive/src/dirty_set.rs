//! Coalescing of change notifications.
//!
//! A `DirtySet` collects the keys that changed during a processing turn.
//! Turns nest: work that starts another turn while one is open (an upstream
//! callback that synchronously triggers a second stream, say) joins the outer
//! turn. Only when the outermost turn ends are the dirty keys handed back, each
//! once, in the order they were first marked.

use alloc::vec::Vec;

/// Set of keys waiting for a change notification.
#[derive(Debug)]
pub struct DirtySet<K> {
    /// Number of open turns
    depth: usize,
    /// Keys marked since the last drain, first-marked order
    pending: Vec<K>,
}

impl<K> Default for DirtySet<K> {
    fn default() -> Self {
        Self {
            depth: 0,
            pending: Vec::new(),
        }
    }
}

impl<K: PartialEq> DirtySet<K> {
    /// Creates an idle, empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a processing turn.
    pub fn begin(&mut self) {
        self.depth += 1;
    }

    /// Marks `key` as changed.
    ///
    /// Returns false if the key was already pending. Marks made while no turn
    /// is open stay pending until the next outermost turn ends.
    pub fn mark(&mut self, key: K) -> bool {
        if self.pending.contains(&key) {
            false
        } else {
            self.pending.push(key);
            true
        }
    }

    /// Closes a turn.
    ///
    /// When this closes the outermost turn and keys are pending, returns them
    /// and leaves the set empty. Unbalanced calls are ignored.
    pub fn end(&mut self) -> Option<Vec<K>> {
        if self.depth == 0 {
            return None;
        }
        self.depth -= 1;
        if self.depth == 0 && !self.pending.is_empty() {
            Some(core::mem::take(&mut self.pending))
        } else {
            None
        }
    }

    /// Returns true when no turn is open.
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.depth == 0
    }

    /// Returns the number of open turns.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the keys waiting for notification.
    #[inline]
    pub fn pending(&self) -> &[K] {
        &self.pending
    }

    /// Drops pending keys without closing any turn.
    pub fn discard(&mut self) {
        self.pending.clear();
    }
}
