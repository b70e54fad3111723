use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{BookshelfError, Result};
use crate::models::Book;

// ─── Memento ────────────────────────────────────────────────

/// Kind of catalog mutation captured by a [`Memento`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Add,
    Remove,
    Update,
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// Which way a memento is being replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionDirection {
    Undo,
    Redo,
}

/// An undoable catalog mutation.
///
/// `book_state` is the state after the operation (or the state being removed,
/// for [`OperationType::Remove`]). Only updates carry a previous state.
#[derive(Debug, Clone)]
pub struct Memento {
    operation: OperationType,
    book_state: Book,
    previous_book_state: Option<Book>,
    recorded_at: DateTime<Utc>,
}

impl Memento {
    /// Memento for an add or a remove.
    pub fn new(book_state: Book, operation: OperationType) -> Result<Self> {
        if operation == OperationType::Update {
            return Err(BookshelfError::validation(
                "an update memento needs the previous book state",
            ));
        }
        Ok(Self::record(operation, book_state, None))
    }

    /// Memento for an update, remembering the state before it.
    pub fn with_previous(
        book_state: Book,
        operation: OperationType,
        previous_book_state: Book,
    ) -> Result<Self> {
        if operation != OperationType::Update {
            return Err(BookshelfError::validation(format!(
                "a previous book state is only valid for updates, not {operation}"
            )));
        }
        Ok(Self::record(operation, book_state, Some(previous_book_state)))
    }

    pub fn added(book: Book) -> Self {
        Self::record(OperationType::Add, book, None)
    }

    pub fn removed(book: Book) -> Self {
        Self::record(OperationType::Remove, book, None)
    }

    pub fn updated(book: Book, previous: Book) -> Self {
        Self::record(OperationType::Update, book, Some(previous))
    }

    fn record(operation: OperationType, book_state: Book, previous_book_state: Option<Book>) -> Self {
        Self {
            operation,
            book_state,
            previous_book_state,
            recorded_at: Utc::now(),
        }
    }

    pub fn operation(&self) -> OperationType {
        self.operation
    }

    pub fn book_state(&self) -> &Book {
        &self.book_state
    }

    pub fn previous_book_state(&self) -> Option<&Book> {
        self.previous_book_state.as_ref()
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    /// Short human-readable summary, e.g. `update "Dune" by Frank Herbert`.
    pub fn description(&self) -> String {
        format!("{} {}", self.operation, self.book_state)
    }
}

// ─── Restore listener ──────────────────────────────────────

/// Applies a memento to the catalog when it is undone or redone.
///
/// Implementations perform raw storage operations only and must never record
/// new history.
pub trait RestoreListener: Send + Sync {
    fn restore(&self, memento: &Memento, direction: ActionDirection) -> Result<()>;
}

impl<F> RestoreListener for F
where
    F: Fn(&Memento, ActionDirection) -> Result<()> + Send + Sync,
{
    fn restore(&self, memento: &Memento, direction: ActionDirection) -> Result<()> {
        self(memento, direction)
    }
}

// ─── History ───────────────────────────────────────────────

/// Undo/redo stacks of catalog mutations.
///
/// Recording a new memento always discards the redo stack. Undo and redo move
/// the top memento between the stacks and hand it to the restore listener; if
/// the listener fails the memento goes back where it came from.
pub struct History {
    undo_stack: Vec<Memento>,
    redo_stack: Vec<Memento>,
    max_depth: usize,
    restore_listener: Option<Box<dyn RestoreListener>>,
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("max_depth", &self.max_depth)
            .field("has_listener", &self.restore_listener.is_some())
            .finish()
    }
}

impl History {
    pub fn new() -> Self {
        Self::with_max_depth(0)
    }

    /// History that keeps at most `max_depth` undoable steps (0 = unbounded).
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_depth,
            restore_listener: None,
        }
    }

    /// Register the single restore listener, replacing any previous one.
    pub fn set_restore_listener(&mut self, listener: Box<dyn RestoreListener>) {
        self.restore_listener = Some(listener);
    }

    /// Record a new mutation.
    pub fn save(&mut self, memento: Memento) {
        tracing::debug!(memento = %memento.description(), "recorded history");
        self.undo_stack.push(memento);
        self.redo_stack.clear();
        if self.max_depth > 0 && self.undo_stack.len() > self.max_depth {
            let excess = self.undo_stack.len() - self.max_depth;
            self.undo_stack.drain(..excess);
        }
    }

    /// Revert the most recent mutation. `Ok(None)` when there is nothing to undo.
    pub fn undo(&mut self) -> Result<Option<Memento>> {
        let Some(memento) = self.undo_stack.pop() else {
            return Ok(None);
        };
        if let Err(e) = self.replay(&memento, ActionDirection::Undo) {
            self.undo_stack.push(memento);
            return Err(e);
        }
        self.redo_stack.push(memento.clone());
        Ok(Some(memento))
    }

    /// Reapply the most recently undone mutation. `Ok(None)` when there is nothing to redo.
    pub fn redo(&mut self) -> Result<Option<Memento>> {
        let Some(memento) = self.redo_stack.pop() else {
            return Ok(None);
        };
        if let Err(e) = self.replay(&memento, ActionDirection::Redo) {
            self.redo_stack.push(memento);
            return Err(e);
        }
        self.undo_stack.push(memento.clone());
        Ok(Some(memento))
    }

    fn replay(&self, memento: &Memento, direction: ActionDirection) -> Result<()> {
        match &self.restore_listener {
            Some(listener) => listener.restore(memento, direction),
            None => Ok(()),
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Memento the next `undo` would revert.
    pub fn peek_undo(&self) -> Option<&Memento> {
        self.undo_stack.last()
    }

    /// Memento the next `redo` would reapply.
    pub fn peek_redo(&self) -> Option<&Memento> {
        self.redo_stack.last()
    }

    /// Forget everything, e.g. after the underlying store was replaced.
    pub fn clean_all(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn book(title: &str) -> Book {
        Book::builder(title, "Author").id(1).build().unwrap()
    }

    type Calls = Arc<Mutex<Vec<(OperationType, ActionDirection, String)>>>;

    fn recording_history() -> (History, Calls) {
        let calls: Calls = Arc::default();
        let sink = Arc::clone(&calls);
        let mut history = History::new();
        history.set_restore_listener(Box::new(move |m: &Memento, d: ActionDirection| -> Result<()> {
            sink.lock()
                .unwrap()
                .push((m.operation(), d, m.book_state().title().to_string()));
            Ok(())
        }));
        (history, calls)
    }

    #[test]
    fn test_memento_construction_rules() {
        assert!(Memento::new(book("A"), OperationType::Add).is_ok());
        assert!(Memento::new(book("A"), OperationType::Remove).is_ok());
        assert!(Memento::new(book("A"), OperationType::Update).is_err());

        assert!(Memento::with_previous(book("B"), OperationType::Update, book("A")).is_ok());
        assert!(Memento::with_previous(book("B"), OperationType::Add, book("A")).is_err());
        assert!(Memento::with_previous(book("B"), OperationType::Remove, book("A")).is_err());

        let add = Memento::added(book("A"));
        assert!(add.previous_book_state().is_none());
        let update = Memento::updated(book("B"), book("A"));
        assert_eq!(update.previous_book_state().unwrap().title(), "A");
        assert_eq!(update.description(), "update \"B\" by Author");
    }

    #[test]
    fn test_empty_history_is_noop() {
        let (mut history, calls) = recording_history();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
        assert!(history.undo().unwrap().is_none());
        assert!(history.redo().unwrap().is_none());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_save_clears_redo() {
        let (mut history, _calls) = recording_history();
        history.save(Memento::added(book("A")));
        history.save(Memento::added(book("B")));
        history.undo().unwrap();
        assert!(history.can_redo());

        history.save(Memento::added(book("C")));
        assert!(history.can_undo());
        assert!(!history.can_redo());
        assert_eq!(history.undo_len(), 2);
    }

    #[test]
    fn test_undo_redo_move_between_stacks() {
        let (mut history, calls) = recording_history();
        history.save(Memento::added(book("A")));
        history.save(Memento::removed(book("B")));

        let undone = history.undo().unwrap().unwrap();
        assert_eq!(undone.operation(), OperationType::Remove);
        assert_eq!((history.undo_len(), history.redo_len()), (1, 1));

        let redone = history.redo().unwrap().unwrap();
        assert_eq!(redone.book_state().title(), "B");
        assert_eq!((history.undo_len(), history.redo_len()), (2, 0));

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                (OperationType::Remove, ActionDirection::Undo, "B".to_string()),
                (OperationType::Remove, ActionDirection::Redo, "B".to_string()),
            ]
        );
    }

    #[test]
    fn test_failed_restore_leaves_stacks_unchanged() {
        let mut history = History::new();
        history.set_restore_listener(Box::new(|_: &Memento, _: ActionDirection| -> Result<()> {
            Err(BookshelfError::BookNotFound(1))
        }));
        history.save(Memento::added(book("A")));

        assert!(history.undo().is_err());
        assert_eq!((history.undo_len(), history.redo_len()), (1, 0));
        assert_eq!(history.peek_undo().unwrap().book_state().title(), "A");
    }

    #[test]
    fn test_max_depth_drops_oldest() {
        let mut history = History::with_max_depth(2);
        for title in ["A", "B", "C"] {
            history.save(Memento::added(book(title)));
        }
        assert_eq!(history.undo_len(), 2);
        assert_eq!(history.undo().unwrap().unwrap().book_state().title(), "C");
        assert_eq!(history.undo().unwrap().unwrap().book_state().title(), "B");
        assert!(history.undo().unwrap().is_none());
    }

    #[test]
    fn test_recorded_at_travels_with_the_memento() {
        let (mut history, _calls) = recording_history();
        history.save(Memento::added(book("A")));
        history.save(Memento::added(book("B")));
        let first = history.undo_stack[0].recorded_at();
        let second = history.peek_undo().unwrap().recorded_at();
        assert!(first <= second);

        let undone = history.undo().unwrap().unwrap();
        assert_eq!(undone.recorded_at(), second);
        assert_eq!(history.peek_redo().unwrap().recorded_at(), second);
    }

    #[test]
    fn test_clean_all() {
        let (mut history, _calls) = recording_history();
        history.save(Memento::added(book("A")));
        history.save(Memento::added(book("B")));
        history.undo().unwrap();

        history.clean_all();
        assert!(!history.can_undo());
        assert!(!history.can_redo());
    }
}
