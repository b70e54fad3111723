use std::sync::Arc;

use rusqlite::{params, Params};

use crate::error::{BookshelfError, Result};
use crate::models::{Book, BookRow, ReadingState, SortCriteria};
use crate::storage::database::StorageHandle;

use super::BookRepository;

const COLUMNS: &str = "id, title, author, isbn, genre, rating, readingState, coverPath";

pub struct SqliteBookRepository {
    handle: Arc<StorageHandle>,
}

impl SqliteBookRepository {
    pub fn new(handle: Arc<StorageHandle>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Arc<StorageHandle> {
        &self.handle
    }

    fn row_to_raw(row: &rusqlite::Row) -> rusqlite::Result<BookRow> {
        Ok(BookRow {
            id: row.get(0)?,
            title: row.get(1)?,
            author: row.get(2)?,
            isbn: row.get(3)?,
            genre: row.get(4)?,
            rating: row.get(5)?,
            reading_state: row.get(6)?,
            cover_path: row.get(7)?,
        })
    }

    fn into_book(raw: BookRow) -> Result<Book> {
        let id = raw.id.unwrap_or_default();
        Book::try_from(raw).map_err(|e| BookshelfError::CorruptRecord {
            id,
            reason: e.to_string(),
        })
    }

    fn query<P: Params>(&self, filter: &str, params: P, sort: SortCriteria) -> Result<Vec<Book>> {
        let sql = format!("SELECT {COLUMNS} FROM books {filter} {}", sort.order_by());
        let conn = self.handle.get_connection()?;
        let mut stmt = conn.prepare(&sql)?;

        let rows = stmt
            .query_map(params, Self::row_to_raw)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(Self::into_book).collect()
    }
}

impl BookRepository for SqliteBookRepository {
    fn save(&self, book: &mut Book) -> Result<()> {
        let conn = self.handle.get_connection()?;
        conn.execute(
            "INSERT INTO books (id, title, author, isbn, genre, rating, readingState, coverPath)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                book.id(),
                book.title(),
                book.author(),
                book.isbn(),
                book.genre(),
                book.rating(),
                book.reading_state(),
                book.cover_path(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        book.assign_id(id)?;
        tracing::debug!(id, title = book.title(), "inserted book");
        Ok(())
    }

    fn find_by_id(&self, id: i64) -> Result<Option<Book>> {
        let mut books = self.query("WHERE id = ?1", params![id], SortCriteria::None)?;
        Ok(books.pop())
    }

    fn load_all(&self, sort: SortCriteria) -> Result<Vec<Book>> {
        self.query("", [], sort)
    }

    fn find_by_title(&self, title: &str, sort: SortCriteria) -> Result<Vec<Book>> {
        // instr() keeps `%` and `_` in the needle literal, unlike LIKE
        self.query("WHERE instr(lower(title), lower(?1)) > 0", params![title], sort)
    }

    fn find_by_author(&self, author: &str, sort: SortCriteria) -> Result<Vec<Book>> {
        self.query("WHERE instr(lower(author), lower(?1)) > 0", params![author], sort)
    }

    fn find_by_rating(&self, rating: u8, sort: SortCriteria) -> Result<Vec<Book>> {
        self.query("WHERE rating = ?1", params![rating], sort)
    }

    fn find_by_reading_state(&self, state: ReadingState, sort: SortCriteria) -> Result<Vec<Book>> {
        self.query("WHERE readingState = ?1", params![state], sort)
    }

    fn update(&self, book: &Book) -> Result<()> {
        let id = book.require_id()?;
        let conn = self.handle.get_connection()?;
        let changed = conn.execute(
            "UPDATE books SET
                title = ?1,
                author = ?2,
                isbn = ?3,
                genre = ?4,
                rating = ?5,
                readingState = ?6,
                coverPath = ?7
             WHERE id = ?8",
            params![
                book.title(),
                book.author(),
                book.isbn(),
                book.genre(),
                book.rating(),
                book.reading_state(),
                book.cover_path(),
                id,
            ],
        )?;
        if changed == 0 {
            return Err(BookshelfError::BookNotFound(id));
        }
        tracing::debug!(id, title = book.title(), "updated book");
        Ok(())
    }

    fn delete(&self, book: &Book) -> Result<()> {
        let id = book.require_id()?;
        let conn = self.handle.get_connection()?;
        let deleted = conn.execute("DELETE FROM books WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(BookshelfError::BookNotFound(id));
        }
        tracing::debug!(id, title = book.title(), "deleted book");
        Ok(())
    }

    fn count(&self) -> Result<usize> {
        let conn = self.handle.get_connection()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
