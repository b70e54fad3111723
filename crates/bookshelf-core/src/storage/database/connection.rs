use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{Connection, OpenFlags};

use super::migrations::run_migrations;
use super::schema::{apply_pragmas, has_books_table};
use crate::error::{BookshelfError, Result};

/// The single shared SQLite connection of a catalog.
///
/// The handle is owned explicitly and handed to repositories at construction.
/// It can be closed (e.g. around copying the database file) and reopens lazily
/// the next time a connection is requested.
pub struct StorageHandle {
    path: Option<PathBuf>,
    connection: Mutex<Option<Connection>>,
}

/// Locked access to an open connection.
pub struct ConnectionGuard<'a> {
    guard: MutexGuard<'a, Option<Connection>>,
}

impl Deref for ConnectionGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // `get_connection` only hands out guards over an open connection
        self.guard
            .as_ref()
            .unwrap_or_else(|| unreachable!("connection guard over a closed handle"))
    }
}

impl StorageHandle {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Self::connect(Some(path))?;
        tracing::info!(path = %path.display(), "opened catalog database");
        Ok(Self {
            path: Some(path.to_path_buf()),
            connection: Mutex::new(Some(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Self::connect(None)?;
        Ok(Self {
            path: None,
            connection: Mutex::new(Some(conn)),
        })
    }

    fn connect(path: Option<&Path>) -> Result<Connection> {
        let conn = match path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        apply_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(conn)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the connection, reopening it first if it was closed.
    pub fn get_connection(&self) -> Result<ConnectionGuard<'_>> {
        let mut guard = self.lock();
        if guard.is_none() {
            if self.path.is_none() {
                tracing::warn!("reopening a closed in-memory catalog; previous contents are gone");
            }
            *guard = Some(Self::connect(self.path.as_deref())?);
            tracing::debug!("reconnected catalog database");
        }
        Ok(ConnectionGuard { guard })
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.lock();
        Self::close_locked(&mut guard)
    }

    fn close_locked(guard: &mut MutexGuard<'_, Option<Connection>>) -> Result<()> {
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| BookshelfError::Database(e))?;
            tracing::debug!("closed catalog database");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }

    /// Swap the database file for `source`.
    ///
    /// The source is checked to be a catalog and staged next to the target
    /// before the connection is touched, so a failed check or copy leaves the
    /// open catalog as it was. The staged file is then renamed over the target
    /// and the connection reopened (and migrated).
    ///
    /// On error, a handle left closed means the file may already have been
    /// swapped; callers should drop state that refers to the old contents.
    pub fn replace_with(&self, source: &Path) -> Result<()> {
        let Some(target) = self.path.as_deref() else {
            return Err(BookshelfError::ConfigError(
                "cannot import into an in-memory catalog".to_string(),
            ));
        };
        Self::check_catalog_file(source)?;
        if resolve(source)? == resolve(target)? {
            return Err(BookshelfError::ConfigError(
                "import source is the open catalog itself".to_string(),
            ));
        }

        let staged = sidecar_path(target, ".importing");
        if let Err(e) = std::fs::copy(source, &staged) {
            let _ = std::fs::remove_file(&staged);
            return Err(e.into());
        }

        let mut guard = self.lock();
        Self::close_locked(&mut guard)?;
        let swapped = Self::swap_in(&staged, target);
        if swapped.is_err() {
            let _ = std::fs::remove_file(&staged);
        }
        *guard = Some(Self::connect(Some(target))?);
        swapped?;

        tracing::info!(
            source = %source.display(),
            target = %target.display(),
            "replaced catalog database"
        );
        Ok(())
    }

    fn swap_in(staged: &Path, target: &Path) -> Result<()> {
        for suffix in ["-wal", "-shm"] {
            let sidecar = sidecar_path(target, suffix);
            if sidecar.exists() {
                std::fs::remove_file(&sidecar)?;
            }
        }
        std::fs::rename(staged, target)?;
        Ok(())
    }

    /// Write a consistent snapshot of the catalog to `dest`, replacing it.
    ///
    /// The snapshot is written next to `dest` and renamed into place, so an
    /// existing file at `dest` survives a failed export.
    pub fn export_to(&self, dest: &Path) -> Result<()> {
        if let Some(current) = self.path.as_deref() {
            if resolve(current)? == resolve(dest)? {
                return Err(BookshelfError::ConfigError(
                    "export target is the open catalog itself".to_string(),
                ));
            }
        }

        let staged = sidecar_path(dest, ".exporting");
        if staged.exists() {
            std::fs::remove_file(&staged)?;
        }
        let written = self.get_connection().and_then(|conn| {
            conn.execute("VACUUM INTO ?1", [staged.to_string_lossy().into_owned()])?;
            Ok(())
        });
        let renamed = written.and_then(|()| Ok(std::fs::rename(&staged, dest)?));
        if renamed.is_err() {
            let _ = std::fs::remove_file(&staged);
        }
        renamed?;

        tracing::info!(dest = %dest.display(), "exported catalog database");
        Ok(())
    }

    fn check_catalog_file(source: &Path) -> Result<()> {
        if !source.is_file() {
            return Err(BookshelfError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no database file at {}", source.display()),
            )));
        }
        let conn = Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        if !has_books_table(&conn)? {
            return Err(BookshelfError::ValidationError(format!(
                "{} is not a catalog database (no books table)",
                source.display()
            )));
        }
        Ok(())
    }
}

/// Canonical form of `path`, which need not exist yet: its parent directory
/// is resolved and the file name appended.
fn resolve(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(std::fs::canonicalize(path)?);
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => std::fs::canonicalize(p)?,
        _ => std::env::current_dir()?,
    };
    Ok(match path.file_name() {
        Some(name) => parent.join(name),
        None => parent,
    })
}

fn sidecar_path(db: &Path, suffix: &str) -> PathBuf {
    let mut name = db.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn count_books(handle: &StorageHandle) -> i64 {
        let conn = handle.get_connection().unwrap();
        conn.query_row("SELECT COUNT(*) FROM books", [], |row| row.get(0))
            .unwrap()
    }

    fn insert(handle: &StorageHandle, title: &str) {
        let conn = handle.get_connection().unwrap();
        conn.execute(
            "INSERT INTO books (title, author) VALUES (?1, 'Someone')",
            [title],
        )
        .unwrap();
    }

    #[test]
    fn test_close_then_lazy_reopen() {
        let dir = TempDir::new().unwrap();
        let handle = StorageHandle::open(&dir.path().join("db").join("books.db")).unwrap();
        insert(&handle, "Persisted");

        handle.close().unwrap();
        assert!(!handle.is_open());
        handle.close().unwrap();

        assert_eq!(count_books(&handle), 1);
        assert!(handle.is_open());
    }

    #[test]
    fn test_export_then_replace() {
        let dir = TempDir::new().unwrap();
        let handle = StorageHandle::open(&dir.path().join("main.db")).unwrap();
        insert(&handle, "First");

        let snapshot = dir.path().join("snapshot.db");
        handle.export_to(&snapshot).unwrap();

        insert(&handle, "Second");
        assert_eq!(count_books(&handle), 2);

        handle.replace_with(&snapshot).unwrap();
        assert_eq!(count_books(&handle), 1);
    }

    #[test]
    fn test_export_overwrites_existing_snapshot() {
        let dir = TempDir::new().unwrap();
        let handle = StorageHandle::open(&dir.path().join("main.db")).unwrap();
        let snapshot = dir.path().join("snapshot.db");

        insert(&handle, "First");
        handle.export_to(&snapshot).unwrap();
        insert(&handle, "Second");
        handle.export_to(&snapshot).unwrap();
        assert!(!sidecar_path(&snapshot, ".exporting").exists());

        let copy = StorageHandle::open(&snapshot).unwrap();
        assert_eq!(count_books(&copy), 2);
    }

    #[test]
    fn test_export_onto_open_catalog_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.db");
        let handle = StorageHandle::open(&path).unwrap();
        insert(&handle, "Kept");

        let dotted = dir.path().join(".").join("main.db");
        for dest in [path.as_path(), dotted.as_path()] {
            assert!(matches!(
                handle.export_to(dest),
                Err(BookshelfError::ConfigError(_))
            ));
        }
        insert(&handle, "Added later");
        handle.close().unwrap();

        let reopened = StorageHandle::open(&path).unwrap();
        assert_eq!(count_books(&reopened), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_export_through_symlinked_directory_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lib.db");
        let handle = StorageHandle::open(&path).unwrap();
        insert(&handle, "Before");

        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path(), &link).unwrap();
        assert!(matches!(
            handle.export_to(&link.join("lib.db")),
            Err(BookshelfError::ConfigError(_))
        ));

        insert(&handle, "After");
        handle.close().unwrap();
        drop(handle);

        let reopened = StorageHandle::open(&path).unwrap();
        assert_eq!(count_books(&reopened), 2);
    }

    #[test]
    fn test_failed_export_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let handle = StorageHandle::open(&dir.path().join("main.db")).unwrap();
        let snapshot = dir.path().join("snapshot.db");
        std::fs::write(&snapshot, b"previous").unwrap();
        // a directory where the staging file would go makes the export fail
        std::fs::create_dir(sidecar_path(&snapshot, ".exporting")).unwrap();

        assert!(handle.export_to(&snapshot).is_err());
        assert_eq!(std::fs::read(&snapshot).unwrap(), b"previous");
    }

    #[test]
    fn test_failed_import_staging_leaves_catalog_open() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("main.db");
        let handle = StorageHandle::open(&target).unwrap();
        insert(&handle, "Original");

        let source_handle = StorageHandle::open(&dir.path().join("source.db")).unwrap();
        insert(&source_handle, "Incoming");
        insert(&source_handle, "Incoming too");
        let source = dir.path().join("export.db");
        source_handle.export_to(&source).unwrap();

        std::fs::create_dir(sidecar_path(&target, ".importing")).unwrap();
        assert!(handle.replace_with(&source).is_err());
        assert!(handle.is_open());
        assert_eq!(count_books(&handle), 1);

        std::fs::remove_dir(sidecar_path(&target, ".importing")).unwrap();
        handle.replace_with(&source).unwrap();
        assert_eq!(count_books(&handle), 2);
        assert!(!sidecar_path(&target, ".importing").exists());
    }

    #[test]
    fn test_replace_rejects_non_catalog() {
        let dir = TempDir::new().unwrap();
        let handle = StorageHandle::open(&dir.path().join("main.db")).unwrap();
        insert(&handle, "Kept");

        let other = dir.path().join("other.db");
        Connection::open(&other)
            .unwrap()
            .execute_batch("CREATE TABLE notes (body TEXT);")
            .unwrap();

        let err = handle.replace_with(&other).unwrap_err();
        assert!(err.is_validation());
        assert!(handle.replace_with(&dir.path().join("missing.db")).is_err());
        assert_eq!(count_books(&handle), 1);
    }

    #[test]
    fn test_in_memory_cannot_be_replaced() {
        let handle = StorageHandle::open_in_memory().unwrap();
        assert!(handle.is_in_memory());
        assert!(matches!(
            handle.replace_with(Path::new("whatever.db")),
            Err(BookshelfError::ConfigError(_))
        ));
    }
}
