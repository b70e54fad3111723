use std::sync::Arc;

use crate::error::{BookshelfError, Result};
use crate::history::{ActionDirection, History, Memento, OperationType, RestoreListener};
use crate::models::{Book, ReadingState, SortCriteria, MAX_RATING};
use crate::notifier::{BookObserver, ChangeNotifier};
use crate::storage::repositories::BookRepository;

/// The entry point client code uses to read and change the catalog.
///
/// Every mutation runs the same protocol: write to the repository, record a
/// memento, notify observers. If the write fails nothing is recorded and no
/// one is notified. Reads go straight to the repository.
pub struct CatalogManager {
    repository: Arc<dyn BookRepository>,
    history: History,
    notifier: Arc<ChangeNotifier>,
}

impl CatalogManager {
    pub fn new(repository: Arc<dyn BookRepository>) -> Self {
        Self::with_parts(repository, Arc::new(ChangeNotifier::new()), History::new())
    }

    /// Build a manager around an existing notifier (so attached observers
    /// carry over) and a pre-configured history.
    pub fn with_parts(
        repository: Arc<dyn BookRepository>,
        notifier: Arc<ChangeNotifier>,
        mut history: History,
    ) -> Self {
        history.set_restore_listener(Box::new(CatalogRestorer {
            repository: Arc::clone(&repository),
            notifier: Arc::clone(&notifier),
        }));
        Self {
            repository,
            history,
            notifier,
        }
    }

    // ─── Mutations ──────────────────────────────────────────

    /// Insert a new book; its store id is written back onto `book`.
    pub fn add_book(&mut self, book: &mut Book) -> Result<()> {
        book.validate()?;
        if let Some(id) = book.id() {
            return Err(BookshelfError::validation(format!(
                "{book} is already in the catalog with id {id}"
            )));
        }
        self.repository.save(book)?;
        self.history.save(Memento::added(book.clone()));
        self.notifier.notify_all();
        Ok(())
    }

    /// Replace `old_book` with `new_book`; both must describe the same record.
    pub fn update_book(&mut self, old_book: &Book, new_book: &Book) -> Result<()> {
        old_book.validate()?;
        new_book.validate()?;
        let old_id = old_book.require_id()?;
        let new_id = new_book.require_id()?;
        if old_id != new_id {
            return Err(BookshelfError::validation(format!(
                "cannot update book {old_id} with the state of book {new_id}"
            )));
        }
        // captured before the write so it holds the pre-update state
        let memento = Memento::updated(new_book.clone(), old_book.clone());
        self.repository.update(new_book)?;
        self.history.save(memento);
        self.notifier.notify_all();
        Ok(())
    }

    pub fn delete_book(&mut self, book: &Book) -> Result<()> {
        book.require_id()?;
        let memento = Memento::removed(book.clone());
        self.repository.delete(book)?;
        self.history.save(memento);
        self.notifier.notify_all();
        Ok(())
    }

    // ─── Reads ──────────────────────────────────────────────

    pub fn get_all_books(&self, sort: SortCriteria) -> Result<Vec<Book>> {
        self.repository.load_all(sort)
    }

    pub fn get_book(&self, id: i64) -> Result<Book> {
        self.repository
            .find_by_id(id)?
            .ok_or(BookshelfError::BookNotFound(id))
    }

    pub fn find_books_by_title(&self, title: &str, sort: SortCriteria) -> Result<Vec<Book>> {
        self.repository.find_by_title(title, sort)
    }

    pub fn find_books_by_author(&self, author: &str, sort: SortCriteria) -> Result<Vec<Book>> {
        self.repository.find_by_author(author, sort)
    }

    pub fn filter_books_by_rating(&self, rating: u8, sort: SortCriteria) -> Result<Vec<Book>> {
        if rating > MAX_RATING {
            return Err(BookshelfError::validation(format!(
                "rating filter must be between 0 and {MAX_RATING}, got {rating}"
            )));
        }
        self.repository.find_by_rating(rating, sort)
    }

    pub fn filter_books_by_reading_state(
        &self,
        state: ReadingState,
        sort: SortCriteria,
    ) -> Result<Vec<Book>> {
        self.repository.find_by_reading_state(state, sort)
    }

    pub fn count_books(&self) -> Result<usize> {
        self.repository.count()
    }

    // ─── History ────────────────────────────────────────────

    pub fn undo(&mut self) -> Result<Option<Memento>> {
        self.history.undo()
    }

    pub fn redo(&mut self) -> Result<Option<Memento>> {
        self.history.redo()
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn clear_history(&mut self) {
        self.history.clean_all();
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    // ─── Observers ──────────────────────────────────────────

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn attach(&self, observer: Arc<dyn BookObserver>) -> bool {
        self.notifier.attach(observer)
    }

    pub fn detach(&self, observer: &Arc<dyn BookObserver>) -> bool {
        self.notifier.detach(observer)
    }
}

/// Replays mementos against the repository on undo/redo.
struct CatalogRestorer {
    repository: Arc<dyn BookRepository>,
    notifier: Arc<ChangeNotifier>,
}

impl RestoreListener for CatalogRestorer {
    fn restore(&self, memento: &Memento, direction: ActionDirection) -> Result<()> {
        let book = memento.book_state();
        match (memento.operation(), direction) {
            (OperationType::Add, ActionDirection::Undo)
            | (OperationType::Remove, ActionDirection::Redo) => {
                self.repository.delete(book)?;
            }
            (OperationType::Add, ActionDirection::Redo)
            | (OperationType::Remove, ActionDirection::Undo) => {
                let mut book = book.clone();
                self.repository.save(&mut book)?;
            }
            (OperationType::Update, ActionDirection::Undo) => {
                let previous = memento.previous_book_state().ok_or_else(|| {
                    BookshelfError::validation("update memento without a previous state")
                })?;
                self.repository.update(previous)?;
            }
            (OperationType::Update, ActionDirection::Redo) => {
                self.repository.update(book)?;
            }
        }
        tracing::debug!(?direction, memento = %memento.description(), "restored catalog state");
        self.notifier.notify_all();
        Ok(())
    }
}
