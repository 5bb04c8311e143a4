use std::collections::VecDeque;

use crate::canvas::Canvas;

// ============================================================================
// SNAPSHOT - full-canvas state captured before an operation
// ============================================================================

/// The canvas as it was before `description` was applied.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub description: String,
    pub canvas: Canvas,
}

impl Snapshot {
    pub fn new(description: impl Into<String>, canvas: Canvas) -> Self {
        Self { description: description.into(), canvas }
    }

    fn memory_size(&self) -> usize {
        self.canvas.byte_size() + self.description.len()
    }
}

// ============================================================================
// HISTORY MANAGER - Manages undo/redo stacks with memory limits
// ============================================================================

/// Default number of undo steps kept.
pub const DEFAULT_HISTORY_SIZE: usize = 50;
/// Default byte budget across both stacks.
pub const DEFAULT_MEMORY_LIMIT: usize = 100 * 1024 * 1024;

/// Undo/redo history manager with memory limits.
#[derive(Debug)]
pub struct HistoryManager {
    undo_stack: VecDeque<Snapshot>,
    redo_stack: VecDeque<Snapshot>,
    max_history_size: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl HistoryManager {
    pub fn new(max_history_size: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size,
            max_memory_bytes: Some(DEFAULT_MEMORY_LIMIT),
            total_memory: 0,
        }
    }

    /// Replace the byte budget (`None` disables it).
    pub fn with_memory_limit(mut self, max_bytes: Option<usize>) -> Self {
        self.max_memory_bytes = max_bytes;
        self.prune();
        self
    }

    /// Record the state preceding a new action. Clears the redo stack.
    pub fn push(&mut self, snapshot: Snapshot) {
        for snap in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        }

        self.total_memory += snapshot.memory_size();
        self.undo_stack.push_back(snapshot);

        self.prune();
    }

    /// Restore the previous canvas into `current`; the replaced canvas moves
    /// to the redo stack. Returns the undone action's description.
    pub fn undo(&mut self, current: &mut Canvas) -> Option<String> {
        let snap = self.undo_stack.pop_back()?;
        let redo = self.swap(snap, current);
        self.redo_stack.push_back(redo);
        self.redo_stack.back().map(|s| s.description.clone())
    }

    /// Re-apply the most recently undone action.
    pub fn redo(&mut self, current: &mut Canvas) -> Option<String> {
        let snap = self.redo_stack.pop_back()?;
        let undo = self.swap(snap, current);
        self.undo_stack.push_back(undo);
        self.undo_stack.back().map(|s| s.description.clone())
    }

    /// Exchange the snapshot's canvas with `current`, keeping the memory
    /// total in step with the canvas that is now stored.
    fn swap(&mut self, mut snap: Snapshot, current: &mut Canvas) -> Snapshot {
        self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        std::mem::swap(&mut snap.canvas, current);
        self.total_memory += snap.memory_size();
        snap
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo_stack.back().map(|s| s.description.clone())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo_stack.back().map(|s| s.description.clone())
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.undo_stack.iter().rev().map(|s| s.description.clone()).collect()
    }

    /// Bytes held by both stacks (cached).
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    /// Drop the oldest entries until both limits hold. The byte budget
    /// never removes the last remaining entry.
    fn prune(&mut self) {
        while self.undo_stack.len() > self.max_history_size {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.undo_stack.len() > 1 {
                if let Some(removed) = self.undo_stack.pop_front() {
                    self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
                }
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_memory = 0;
    }

    /// Undo `steps` times, stopping early when the stack runs out.
    pub fn undo_to(&mut self, steps: usize, current: &mut Canvas) {
        for _ in 0..steps {
            if self.undo(current).is_none() {
                break;
            }
        }
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn canvas(v: u8) -> Canvas {
        Canvas::Gray(GrayImage::from_pixel(4, 4, Luma([v])))
    }

    #[test]
    fn undo_redo_swaps_canvases() {
        let mut history = HistoryManager::default();
        let mut current = canvas(1);
        history.push(Snapshot::new("Invert", current.clone()));
        current = canvas(2);

        assert_eq!(history.undo_description().as_deref(), Some("Invert"));
        assert_eq!(history.undo(&mut current).as_deref(), Some("Invert"));
        assert_eq!(current, canvas(1));
        assert!(history.can_redo());
        assert!(!history.can_undo());

        assert_eq!(history.redo(&mut current).as_deref(), Some("Invert"));
        assert_eq!(current, canvas(2));
        assert!(history.undo(&mut canvas(0)).is_some());
    }

    #[test]
    fn push_clears_redo() {
        let mut history = HistoryManager::default();
        let mut current = canvas(0);
        history.push(Snapshot::new("a", canvas(0)));
        history.undo(&mut current);
        assert_eq!(history.redo_count(), 1);
        history.push(Snapshot::new("b", canvas(5)));
        assert_eq!(history.redo_count(), 0);
        assert_eq!(history.undo_history(), vec!["b".to_string()]);
    }

    #[test]
    fn count_limit_drops_oldest() {
        let mut history = HistoryManager::new(3);
        for i in 0..5u8 {
            history.push(Snapshot::new(format!("step {}", i), canvas(i)));
        }
        assert_eq!(history.undo_count(), 3);
        assert_eq!(
            history.undo_history(),
            vec!["step 4".to_string(), "step 3".to_string(), "step 2".to_string()]
        );
    }

    #[test]
    fn memory_limit_keeps_last_entry() {
        // each snapshot: 16 pixel bytes + 1 description byte
        let mut history = HistoryManager::new(10).with_memory_limit(Some(20));
        history.push(Snapshot::new("a", canvas(0)));
        history.push(Snapshot::new("b", canvas(0)));
        assert_eq!(history.undo_count(), 1);
        assert_eq!(history.memory_usage(), 17);

        let mut tiny = HistoryManager::new(10).with_memory_limit(Some(1));
        tiny.push(Snapshot::new("big", canvas(0)));
        assert_eq!(tiny.undo_count(), 1);
    }

    #[test]
    fn undo_to_and_clear() {
        let mut history = HistoryManager::default();
        let mut current = canvas(9);
        for i in 0..4u8 {
            history.push(Snapshot::new(i.to_string(), canvas(i)));
        }
        history.undo_to(10, &mut current);
        assert_eq!(current, canvas(0));
        assert_eq!(history.redo_count(), 4);
        history.clear();
        assert_eq!(history.memory_usage(), 0);
        assert!(!history.can_redo());
    }
}
