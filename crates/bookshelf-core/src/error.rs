use thiserror::Error;

/// All errors that can occur in bookshelf-core.
#[derive(Debug, Error)]
pub enum BookshelfError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Book not found: {0}")]
    BookNotFound(i64),

    #[error("Book has not been saved yet: {0}")]
    BookNotPersisted(String),

    #[error("Corrupt record {id}: {reason}")]
    CorruptRecord { id: i64, reason: String },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl BookshelfError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// True for errors raised before any storage access took place.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_) | Self::BookNotPersisted(_))
    }

    /// True for failures coming from the persistence backend.
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::BookNotFound(_) | Self::CorruptRecord { .. }
        )
    }
}

/// Exit codes used by the `bookshelf` binary.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    FileSystemError = 4,
}

impl From<&BookshelfError> for ExitCode {
    fn from(err: &BookshelfError) -> Self {
        match err {
            BookshelfError::ValidationError(_) | BookshelfError::BookNotPersisted(_) => {
                ExitCode::InvalidArgs
            }
            BookshelfError::BookNotFound(_) => ExitCode::NotFound,
            BookshelfError::Io(_) => ExitCode::FileSystemError,
            _ => ExitCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, BookshelfError>;
