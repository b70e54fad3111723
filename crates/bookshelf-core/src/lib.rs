pub mod config;
pub mod error;
pub mod history;
pub mod library;
pub mod manager;
pub mod models;
pub mod notifier;
pub mod storage;

pub use config::AppConfig;
pub use error::{BookshelfError, ExitCode, Result};
pub use history::{ActionDirection, History, Memento, OperationType, RestoreListener};
pub use library::Library;
pub use manager::CatalogManager;
pub use models::*;
pub use notifier::{BookObserver, ChangeNotifier, FnObserver, NotifyReport};

pub use storage::database::{open_database, open_in_memory, StorageHandle};
pub use storage::repositories::{BookRepository, SqliteBookRepository};
