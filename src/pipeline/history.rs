/// Linear undo/redo over preset snapshots.
///
/// Each entry is a full `ImagePreset` value, so whatever the cursor lands
/// on is immediately renderable without consulting any pipeline state.
/// Standard linear model, no branching: pushing while undone truncates
/// the redo tail.
use crate::pipeline::preset::ImagePreset;

/// Snapshots kept before the oldest entries are evicted.
const MAX_HISTORY: usize = 64;

#[derive(Debug, Default)]
pub struct HistoryManager {
    entries: Vec<ImagePreset>,
    /// Index of the current entry; only meaningful when non-empty.
    cursor: usize,
}

impl HistoryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The preset the editor should currently be showing.
    pub fn current(&self) -> Option<&ImagePreset> {
        self.entries.get(self.cursor)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.entries.is_empty() && self.cursor + 1 < self.entries.len()
    }

    /// Record a new edit state. Anything past the cursor (the redo tail)
    /// is dropped first; the oldest entry is evicted at capacity.
    pub fn push(&mut self, preset: &ImagePreset) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.cursor + 1);
        }
        self.entries.push(preset.clone());
        if self.entries.len() > MAX_HISTORY {
            self.entries.remove(0);
        }
        self.cursor = self.entries.len() - 1;
    }

    /// Step back one entry and return the preset now current, so the
    /// caller can resync its editing view. No-op at the oldest entry.
    pub fn undo(&mut self) -> Option<&ImagePreset> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.entries.get(self.cursor)
    }

    /// Symmetric to `undo`. No-op when there is nothing to redo.
    pub fn redo(&mut self) -> Option<&ImagePreset> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.entries.get(self.cursor)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::representation::FilterRepresentation;

    fn preset_with_sharpen(value: i32) -> ImagePreset {
        let mut rep = FilterRepresentation::sharpen();
        rep.set_value(value);
        let mut preset = ImagePreset::new();
        preset.add_filter(rep);
        preset
    }

    #[test]
    fn undo_returns_the_previous_snapshot() {
        let mut history = HistoryManager::new();
        for value in 0..5 {
            history.push(&preset_with_sharpen(value));
        }
        let restored = history.undo().unwrap();
        assert_eq!(restored, &preset_with_sharpen(3));
        assert_eq!(history.cursor(), 3);
    }

    #[test]
    fn redo_after_undo_restores_the_newer_snapshot() {
        let mut history = HistoryManager::new();
        history.push(&preset_with_sharpen(1));
        history.push(&preset_with_sharpen(2));

        assert_eq!(history.undo().unwrap(), &preset_with_sharpen(1));
        assert_eq!(history.redo().unwrap(), &preset_with_sharpen(2));
        assert!(history.redo().is_none());
    }

    #[test]
    fn undo_at_the_bottom_is_a_no_op() {
        let mut history = HistoryManager::new();
        assert!(history.undo().is_none());
        history.push(&preset_with_sharpen(1));
        assert!(history.undo().is_none());
        assert_eq!(history.current(), Some(&preset_with_sharpen(1)));
    }

    #[test]
    fn push_after_undo_discards_the_redo_tail() {
        let mut history = HistoryManager::new();
        history.push(&preset_with_sharpen(1));
        history.push(&preset_with_sharpen(2));
        history.push(&preset_with_sharpen(3));

        history.undo();
        history.undo();
        history.push(&preset_with_sharpen(99));

        // The old "future" (2, 3) is gone; redo has nothing to do.
        assert!(history.redo().is_none());
        assert_eq!(history.len(), 2);
        assert_eq!(history.current(), Some(&preset_with_sharpen(99)));
    }

    #[test]
    fn capacity_evicts_the_oldest_entry() {
        let mut history = HistoryManager::new();
        for value in 0..(MAX_HISTORY as i32 + 10) {
            history.push(&preset_with_sharpen(value % 100));
        }
        assert_eq!(history.len(), MAX_HISTORY);
        assert_eq!(history.cursor(), MAX_HISTORY - 1);
    }
}
