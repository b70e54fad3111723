mod book_repository;

pub use book_repository::SqliteBookRepository;

use crate::error::Result;
use crate::models::{Book, ReadingState, SortCriteria};

/// Storage contract for catalog records.
///
/// Every method is synchronous. Filters return an empty vector when nothing
/// matches; storage failures are returned, never masked as empty results.
pub trait BookRepository: Send + Sync {
    /// Insert `book` and write the store-generated id back onto it.
    ///
    /// A book that already carries an id is inserted under that id, which is
    /// how undo/redo bring a removed record back with its identity intact.
    /// On failure the book is left unchanged.
    fn save(&self, book: &mut Book) -> Result<()>;

    fn find_by_id(&self, id: i64) -> Result<Option<Book>>;

    fn load_all(&self, sort: SortCriteria) -> Result<Vec<Book>>;

    /// Case-insensitive substring match on the title.
    fn find_by_title(&self, title: &str, sort: SortCriteria) -> Result<Vec<Book>>;

    /// Case-insensitive substring match on the author.
    fn find_by_author(&self, author: &str, sort: SortCriteria) -> Result<Vec<Book>>;

    fn find_by_rating(&self, rating: u8, sort: SortCriteria) -> Result<Vec<Book>>;

    fn find_by_reading_state(&self, state: ReadingState, sort: SortCriteria) -> Result<Vec<Book>>;

    /// Overwrite the record identified by `book.id()`.
    fn update(&self, book: &Book) -> Result<()>;

    /// Remove the record identified by `book.id()`.
    fn delete(&self, book: &Book) -> Result<()>;

    fn count(&self) -> Result<usize>;
}
