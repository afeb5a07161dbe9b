mod schema;
pub mod backend;
pub mod corpus;
pub mod generated;
pub mod models;
pub mod query;

use rusqlite::Connection;
use std::path::Path;

use crate::error::MixResult;

pub use backend::{CorpusBackend, Sampled};
pub use models::{
    BoundingBox, CorpusStats, Crop, Engagement, GeneratedCrop, GeneratedPicture, GeneratedPost,
    LineageRow, NewCrop, NewGeneratedPicture, NewGeneratedPost, NewPicture, NewPost, Picture, Post,
    Public, UncroppedPicture,
};
pub use schema::{MIGRATIONS, SCHEMA};

/// Handle on the corpus database.
///
/// One handle is meant to be opened per mixing invocation and dropped when it
/// finishes; dropping closes the connection. Writes go through transactions and
/// the database runs in WAL mode, so concurrent readers on other handles never
/// see a partially recorded artifact.
pub struct Database {
    pub(crate) conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> MixResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("Opened {:?} with journal_mode={}", path, mode);
        Self::configure(conn)
    }

    pub fn open_in_memory() -> MixResult<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> MixResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> MixResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations();
        Ok(())
    }

    fn run_migrations(&self) {
        for migration in MIGRATIONS {
            if let Err(e) = self.conn.execute(migration, []) {
                tracing::trace!("Skipping applied migration {:?}: {}", migration, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();
        let columns: Vec<String> = db
            .conn
            .prepare("SELECT name FROM pragma_table_info('crops')")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();
        for expected in ["x", "y", "width", "height"] {
            assert!(columns.iter().any(|c| c == expected), "missing {expected}");
        }
    }

    #[test]
    fn test_open_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("memix.db");
        let db = Database::open(&path).unwrap();
        db.initialize().unwrap();
        assert!(path.exists());
    }
}
