use std::str::FromStr;

use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};

use crate::error::{BookshelfError, Result};

/// Highest rating a book can carry.
pub const MAX_RATING: u8 = 5;

// ─── Book ───────────────────────────────────────────────────

/// One catalog entry.
///
/// Books are only constructed through [`BookBuilder`], which validates every
/// field, so a `Book` value always satisfies the catalog invariants:
/// non-blank title and author, a rating in `0..=5` and a known reading state.
/// The only field that changes after construction is the id, which the
/// repository assigns once the record has been inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BookRow")]
pub struct Book {
    id: Option<i64>,
    title: String,
    author: String,
    isbn: String,
    genre: String,
    rating: u8,
    reading_state: ReadingState,
    cover_path: String,
}

impl Book {
    /// Start building a book from its two required fields.
    pub fn builder(title: impl Into<String>, author: impl Into<String>) -> BookBuilder {
        BookBuilder::new(title, author)
    }

    /// A builder pre-filled with this book's fields, id included.
    ///
    /// Used to derive the new state of an update from the current one.
    pub fn to_builder(&self) -> BookBuilder {
        BookBuilder {
            id: self.id,
            title: self.title.clone(),
            author: self.author.clone(),
            isbn: self.isbn.clone(),
            genre: self.genre.clone(),
            rating: self.rating,
            reading_state: self.reading_state,
            cover_path: self.cover_path.clone(),
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn isbn(&self) -> &str {
        &self.isbn
    }

    pub fn genre(&self) -> &str {
        &self.genre
    }

    pub fn rating(&self) -> u8 {
        self.rating
    }

    pub fn reading_state(&self) -> ReadingState {
        self.reading_state
    }

    pub fn cover_path(&self) -> &str {
        &self.cover_path
    }

    /// Whether the store has assigned an identity to this book.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// The store identity, or an error naming the book if it was never saved.
    pub fn require_id(&self) -> Result<i64> {
        self.id
            .ok_or_else(|| BookshelfError::BookNotPersisted(self.title.clone()))
    }

    /// Record the identity generated by the store.
    ///
    /// Assigning the id a book already carries is accepted (re-inserting a
    /// removed book keeps its identity); replacing it with a different one is not.
    pub fn assign_id(&mut self, id: i64) -> Result<()> {
        if id <= 0 {
            return Err(BookshelfError::validation(format!(
                "store identity must be positive, got {id}"
            )));
        }
        match self.id {
            Some(current) if current != id => Err(BookshelfError::validation(format!(
                "book '{}' already has id {current}, refusing to reassign {id}",
                self.title
            ))),
            _ => {
                self.id = Some(id);
                Ok(())
            }
        }
    }

    /// Re-check the invariants enforced at construction.
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(BookshelfError::validation("title is required"));
        }
        if self.author.trim().is_empty() {
            return Err(BookshelfError::validation("author is required"));
        }
        if self.rating > MAX_RATING {
            return Err(BookshelfError::validation(format!(
                "rating must be between 0 and {MAX_RATING}, got {}",
                self.rating
            )));
        }
        match self.id {
            Some(id) if id <= 0 => Err(BookshelfError::validation(format!(
                "store identity must be positive, got {id}"
            ))),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\" by {}", self.title, self.author)
    }
}

// ─── Builder ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BookBuilder {
    id: Option<i64>,
    title: String,
    author: String,
    isbn: String,
    genre: String,
    rating: u8,
    reading_state: ReadingState,
    cover_path: String,
}

impl BookBuilder {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            author: author.into(),
            isbn: String::new(),
            genre: String::new(),
            rating: 0,
            reading_state: ReadingState::default(),
            cover_path: String::new(),
        }
    }

    /// Identity of a record that already exists in the store.
    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn isbn(mut self, isbn: impl Into<String>) -> Self {
        self.isbn = isbn.into();
        self
    }

    pub fn genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    pub fn rating(mut self, rating: u8) -> Self {
        self.rating = rating;
        self
    }

    pub fn reading_state(mut self, state: ReadingState) -> Self {
        self.reading_state = state;
        self
    }

    pub fn cover_path(mut self, path: impl Into<String>) -> Self {
        self.cover_path = path.into();
        self
    }

    pub fn build(self) -> Result<Book> {
        let book = Book {
            id: self.id,
            title: self.title,
            author: self.author,
            isbn: self.isbn,
            genre: self.genre,
            rating: self.rating,
            reading_state: self.reading_state,
            cover_path: self.cover_path,
        };
        book.validate()?;
        Ok(book)
    }
}

// ─── Reading state ─────────────────────────────────────────

/// How far along the reader is with a book.
///
/// Persisted with the catalog's historical labels so existing database files
/// keep loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadingState {
    #[default]
    #[serde(rename = "da leggere", alias = "unread")]
    Unread,
    #[serde(rename = "in lettura", alias = "reading")]
    Reading,
    #[serde(rename = "letto", alias = "read")]
    Read,
}

impl ReadingState {
    pub const ALL: [ReadingState; 3] = [Self::Unread, Self::Reading, Self::Read];

    /// Label stored in the `readingState` column.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unread => "da leggere",
            Self::Reading => "in lettura",
            Self::Read => "letto",
        }
    }

    /// Parse a stored column value. Rows written before the state was
    /// mandatory carry an empty label or NULL; those read as unread.
    pub(crate) fn from_column(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::Unread),
            Some(label) => label.parse(),
        }
    }
}

impl std::fmt::Display for ReadingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ReadingState {
    type Err = BookshelfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "da leggere" | "unread" => Ok(Self::Unread),
            "in lettura" | "reading" => Ok(Self::Reading),
            "letto" | "read" => Ok(Self::Read),
            _ => Err(BookshelfError::validation(format!(
                "invalid reading state: '{s}' (expected one of: da leggere, in lettura, letto)"
            ))),
        }
    }
}

impl ToSql for ReadingState {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.label()))
    }
}

// ─── Raw row ───────────────────────────────────────────────

/// Unvalidated shape of a book as it comes out of storage or JSON.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct BookRow {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
    #[serde(default)]
    pub reading_state: Option<String>,
    #[serde(default)]
    pub cover_path: Option<String>,
}

impl TryFrom<BookRow> for Book {
    type Error = BookshelfError;

    fn try_from(row: BookRow) -> Result<Self> {
        let rating = match row.rating {
            None => 0,
            Some(value) => u8::try_from(value).map_err(|_| {
                BookshelfError::validation(format!(
                    "rating must be between 0 and {MAX_RATING}, got {value}"
                ))
            })?,
        };
        let mut builder = Book::builder(row.title, row.author)
            .isbn(row.isbn.unwrap_or_default())
            .genre(row.genre.unwrap_or_default())
            .rating(rating)
            .reading_state(ReadingState::from_column(row.reading_state.as_deref())?)
            .cover_path(row.cover_path.unwrap_or_default());
        if let Some(id) = row.id {
            builder = builder.id(id);
        }
        builder.build()
    }
}

// ─── Tests ─────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let book = Book::builder("1984", "George Orwell").build().unwrap();
        assert_eq!(book.title(), "1984");
        assert_eq!(book.author(), "George Orwell");
        assert_eq!(book.isbn(), "");
        assert_eq!(book.genre(), "");
        assert_eq!(book.rating(), 0);
        assert_eq!(book.reading_state(), ReadingState::Unread);
        assert_eq!(book.cover_path(), "");
        assert!(!book.is_persisted());
    }

    #[test]
    fn test_builder_all_fields() {
        let book = Book::builder("Il nome della rosa", "Umberto Eco")
            .isbn("978-8845292613")
            .genre("Giallo")
            .rating(5)
            .reading_state(ReadingState::Read)
            .cover_path("covers/rosa.png")
            .build()
            .unwrap();
        assert_eq!(book.isbn(), "978-8845292613");
        assert_eq!(book.genre(), "Giallo");
        assert_eq!(book.rating(), 5);
        assert_eq!(book.reading_state(), ReadingState::Read);
        assert_eq!(book.cover_path(), "covers/rosa.png");
    }

    #[test]
    fn test_blank_title_or_author_rejected() {
        assert!(Book::builder("", "Author").build().is_err());
        assert!(Book::builder("   ", "Author").build().is_err());
        assert!(Book::builder("Title", "").build().is_err());
        assert!(Book::builder("Title", " \t").build().is_err());
    }

    #[test]
    fn test_rating_range() {
        for rating in 0..=MAX_RATING {
            assert!(Book::builder("T", "A").rating(rating).build().is_ok());
        }
        let err = Book::builder("T", "A").rating(6).build().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_reading_state_labels() {
        assert_eq!("letto".parse::<ReadingState>().unwrap(), ReadingState::Read);
        assert_eq!("In Lettura".parse::<ReadingState>().unwrap(), ReadingState::Reading);
        assert_eq!("da leggere".parse::<ReadingState>().unwrap(), ReadingState::Unread);
        assert_eq!("reading".parse::<ReadingState>().unwrap(), ReadingState::Reading);
        assert!("finito".parse::<ReadingState>().is_err());
        assert_eq!(ReadingState::Reading.to_string(), "in lettura");
    }

    #[test]
    fn test_legacy_empty_state_reads_as_unread() {
        assert_eq!(ReadingState::from_column(None).unwrap(), ReadingState::Unread);
        assert_eq!(ReadingState::from_column(Some("")).unwrap(), ReadingState::Unread);
        assert!(ReadingState::from_column(Some("boh")).is_err());
    }

    #[test]
    fn test_assign_id_once() {
        let mut book = Book::builder("T", "A").build().unwrap();
        book.assign_id(7).unwrap();
        assert_eq!(book.id(), Some(7));
        // same identity again is fine
        book.assign_id(7).unwrap();
        assert!(book.assign_id(8).is_err());
        assert!(Book::builder("T", "A").build().unwrap().assign_id(0).is_err());
    }

    #[test]
    fn test_to_builder_keeps_identity() {
        let original = Book::builder("Old", "A").id(3).rating(2).build().unwrap();
        let edited = original.to_builder().title("New").build().unwrap();
        assert_eq!(edited.id(), Some(3));
        assert_eq!(edited.title(), "New");
        assert_eq!(edited.rating(), 2);
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{"id": 4, "title": "Dune", "author": "Frank Herbert", "rating": 4, "reading_state": "letto"}"#;
        let book: Book = serde_json::from_str(json).unwrap();
        assert_eq!(book.id(), Some(4));
        assert_eq!(book.reading_state(), ReadingState::Read);

        let bad = r#"{"title": "Dune", "author": "Frank Herbert", "rating": 9}"#;
        assert!(serde_json::from_str::<Book>(bad).is_err());
    }
}
