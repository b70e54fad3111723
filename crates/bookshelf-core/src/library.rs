use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;
use crate::history::History;
use crate::manager::CatalogManager;
use crate::notifier::ChangeNotifier;
use crate::storage::database::{open_database, open_in_memory, StorageHandle};
use crate::storage::repositories::SqliteBookRepository;

/// An open catalog: the storage handle plus the manager working on it.
///
/// The notifier outlives database swaps, so observers attached once keep
/// receiving updates after an import.
pub struct Library {
    handle: Arc<StorageHandle>,
    notifier: Arc<ChangeNotifier>,
    manager: CatalogManager,
    history_depth: usize,
}

impl Library {
    /// Open the catalog configured in `config`.
    pub fn open(config: &AppConfig) -> Result<Self> {
        Self::open_at(&config.database_path(), config.history.max_depth)
    }

    pub fn open_at(path: &Path, history_depth: usize) -> Result<Self> {
        let handle = open_database(path)?;
        tracing::info!(path = %path.display(), "opened catalog");
        Ok(Self::from_handle(handle, history_depth))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_handle(open_in_memory()?, 0))
    }

    fn from_handle(handle: Arc<StorageHandle>, history_depth: usize) -> Self {
        let notifier = Arc::new(ChangeNotifier::new());
        let manager = Self::build_manager(&handle, &notifier, history_depth);
        Self {
            handle,
            notifier,
            manager,
            history_depth,
        }
    }

    fn build_manager(
        handle: &Arc<StorageHandle>,
        notifier: &Arc<ChangeNotifier>,
        history_depth: usize,
    ) -> CatalogManager {
        CatalogManager::with_parts(
            Arc::new(SqliteBookRepository::new(Arc::clone(handle))),
            Arc::clone(notifier),
            History::with_max_depth(history_depth),
        )
    }

    pub fn manager(&self) -> &CatalogManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut CatalogManager {
        &mut self.manager
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn handle(&self) -> &Arc<StorageHandle> {
        &self.handle
    }

    /// Replace the whole catalog with the database file at `source`.
    ///
    /// History from before the import is discarded, since its mementos refer
    /// to records that no longer exist. Observers are notified once.
    pub fn import_database(&mut self, source: &Path) -> Result<()> {
        if let Err(e) = self.handle.replace_with(source) {
            // a closed handle means the file may have changed under the history
            if !self.handle.is_open() {
                self.manager = Self::build_manager(&self.handle, &self.notifier, self.history_depth);
            }
            return Err(e);
        }
        self.manager = Self::build_manager(&self.handle, &self.notifier, self.history_depth);
        let books = self.manager.count_books()?;
        tracing::info!(source = %source.display(), books, "imported catalog");
        self.notifier.notify_all();
        Ok(())
    }

    /// Write a consistent copy of the catalog to `dest`.
    pub fn export_database(&self, dest: &Path) -> Result<()> {
        self.handle.export_to(dest)
    }

    /// Release the connection. The next operation reopens it.
    pub fn close(&self) -> Result<()> {
        self.handle.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::models::{Book, SortCriteria};
    use crate::notifier::FnObserver;
    use crate::BookshelfError;
    use tempfile::TempDir;

    fn add(library: &mut Library, title: &str) -> Book {
        let mut book = Book::builder(title, "Author").rating(3).build().unwrap();
        library.manager_mut().add_book(&mut book).unwrap();
        book
    }

    fn titles(library: &Library) -> Vec<String> {
        library
            .manager()
            .get_all_books(SortCriteria::TitleAsc)
            .unwrap()
            .iter()
            .map(|b| b.title().to_string())
            .collect()
    }

    #[test]
    fn test_import_replaces_contents_and_history() {
        let dir = TempDir::new().unwrap();

        let mut source = Library::open_at(&dir.path().join("source.db"), 0).unwrap();
        add(&mut source, "Imported One");
        add(&mut source, "Imported Two");
        let exported = dir.path().join("exported.db");
        source.export_database(&exported).unwrap();

        let mut library = Library::open_at(&dir.path().join("library.db"), 0).unwrap();
        add(&mut library, "Local");
        let notified = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&notified);
        library.notifier().attach(Arc::new(FnObserver::new(move || {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })));

        library.import_database(&exported).unwrap();

        assert_eq!(titles(&library), vec!["Imported One", "Imported Two"]);
        assert!(!library.manager().can_undo());
        assert!(!library.manager().can_redo());
        assert_eq!(notified.load(Ordering::SeqCst), 1);

        // observers survive the swap
        add(&mut library, "After import");
        assert_eq!(notified.load(Ordering::SeqCst), 2);
        assert!(library.manager().can_undo());
    }

    #[test]
    fn test_import_rejects_non_catalog_file() {
        let dir = TempDir::new().unwrap();
        let mut library = Library::open_at(&dir.path().join("library.db"), 0).unwrap();
        add(&mut library, "Keep me");

        let bogus = dir.path().join("notes.txt");
        std::fs::write(&bogus, "not a database").unwrap();
        assert!(library.import_database(&bogus).is_err());
        assert!(library.import_database(&dir.path().join("missing.db")).is_err());

        assert_eq!(titles(&library), vec!["Keep me"]);
        assert!(library.manager().can_undo());
    }

    #[test]
    fn test_failed_import_copy_keeps_catalog_and_history() {
        let dir = TempDir::new().unwrap();
        let mut source = Library::open_at(&dir.path().join("source.db"), 0).unwrap();
        add(&mut source, "Incoming");
        let exported = dir.path().join("exported.db");
        source.export_database(&exported).unwrap();

        let mut library = Library::open_at(&dir.path().join("library.db"), 0).unwrap();
        add(&mut library, "Local");
        // occupy the staging path so the copy fails before anything is swapped
        std::fs::create_dir(dir.path().join("library.db.importing")).unwrap();

        assert!(library.import_database(&exported).is_err());
        assert!(library.handle().is_open());
        assert_eq!(titles(&library), vec!["Local"]);
        assert!(library.manager().can_undo());
        library.manager_mut().undo().unwrap().unwrap();
        assert!(titles(&library).is_empty());
    }

    #[test]
    fn test_in_memory_can_export_but_not_import() {
        let dir = TempDir::new().unwrap();
        let mut library = Library::open_in_memory().unwrap();
        add(&mut library, "Ephemeral");

        let dest = dir.path().join("snapshot.db");
        library.export_database(&dest).unwrap();
        assert!(matches!(
            library.import_database(&dest),
            Err(BookshelfError::ConfigError(_))
        ));

        let reopened = Library::open_at(&dest, 0).unwrap();
        assert_eq!(titles(&reopened), vec!["Ephemeral"]);
    }

    #[test]
    fn test_open_uses_config_paths_and_depth() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::default();
        config.core.database_path = dir.path().join("db").join("catalog.db").to_string_lossy().to_string();
        config.history.max_depth = 1;

        let mut library = Library::open(&config).unwrap();
        add(&mut library, "A");
        add(&mut library, "B");
        assert_eq!(library.manager().history().undo_len(), 1);
        assert!(config.database_path().exists());
    }

    #[test]
    fn test_close_then_reuse() {
        let dir = TempDir::new().unwrap();
        let mut library = Library::open_at(&dir.path().join("library.db"), 0).unwrap();
        add(&mut library, "Before close");
        library.close().unwrap();
        assert!(!library.handle().is_open());

        add(&mut library, "After close");
        assert_eq!(titles(&library), vec!["After close", "Before close"]);
    }
}
