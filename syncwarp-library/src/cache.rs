//! SQLite cache for alignment results
//!
//! Stores the time pairs of finished alignments so an unchanged pair of
//! recordings aligned with the same parameters is not computed twice.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Identity of a recording on disk, used for invalidation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIdentity {
    pub path: PathBuf,
    /// File size in bytes
    pub file_size: u64,
    /// Modification time as Unix timestamp
    pub modified_time: u64,
}

impl FileIdentity {
    /// Read size and modification time of `path`
    pub fn of(path: &Path) -> Result<Self, CacheError> {
        let meta = std::fs::metadata(path)?;
        let modified_time = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(Self {
            path: path.to_path_buf(),
            file_size: meta.len(),
            modified_time,
        })
    }
}

/// Everything an alignment result depends on
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentKey {
    pub a: FileIdentity,
    pub b: FileIdentity,
    /// Alignment strategy name
    pub mode: String,
    /// Strategy parameters in a stable textual form, e.g. `max_offset=10`
    pub params: String,
}

/// Cached result of one alignment
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAlignment {
    /// (time in A, time in B) in seconds, in path order
    pub pairs: Vec<(f64, f64)>,
    /// Unix timestamp of when the result was stored
    pub computed_at: u64,
}

/// Alignment cache backed by SQLite
pub struct AlignmentCache {
    conn: Connection,
}

impl AlignmentCache {
    const SCHEMA: &'static str = r#"
        CREATE TABLE IF NOT EXISTS alignments (
            id INTEGER PRIMARY KEY,
            path_a TEXT NOT NULL,
            size_a INTEGER NOT NULL,
            modified_a INTEGER NOT NULL,
            path_b TEXT NOT NULL,
            size_b INTEGER NOT NULL,
            modified_b INTEGER NOT NULL,
            mode TEXT NOT NULL,
            params TEXT NOT NULL,
            computed_at INTEGER NOT NULL,
            UNIQUE (path_a, path_b, mode, params)
        );
        CREATE TABLE IF NOT EXISTS pairs (
            alignment_id INTEGER NOT NULL REFERENCES alignments(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            time_a REAL NOT NULL,
            time_b REAL NOT NULL,
            PRIMARY KEY (alignment_id, seq)
        );
        PRAGMA foreign_keys = ON;
    "#;

    /// Open or create a cache database at the given path
    pub fn open(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(Self::SCHEMA)?;
        Ok(Self { conn })
    }

    /// Default database location under the user's data directory
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("syncwarp")
            .join("alignments.db")
    }

    /// Get a cached result if neither file changed since it was stored
    pub fn get(&self, key: &AlignmentKey) -> Result<Option<CachedAlignment>, CacheError> {
        let found: Option<(i64, u64)> = self
            .conn
            .query_row(
                "SELECT id, computed_at FROM alignments
                 WHERE path_a = ?1 AND size_a = ?2 AND modified_a = ?3
                   AND path_b = ?4 AND size_b = ?5 AND modified_b = ?6
                   AND mode = ?7 AND params = ?8",
                params![
                    key.a.path.to_string_lossy().to_string(),
                    key.a.file_size,
                    key.a.modified_time,
                    key.b.path.to_string_lossy().to_string(),
                    key.b.file_size,
                    key.b.modified_time,
                    key.mode,
                    key.params,
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, computed_at)) = found else {
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT time_a, time_b FROM pairs WHERE alignment_id = ?1 ORDER BY seq")?;
        let pairs = stmt
            .query_map([id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(f64, f64)>, _>>()?;

        Ok(Some(CachedAlignment { pairs, computed_at }))
    }

    /// Store a result, replacing any earlier one for the same files and parameters
    pub fn store(&self, key: &AlignmentKey, pairs: &[(f64, f64)]) -> Result<(), CacheError> {
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let tx = self.conn.unchecked_transaction()?;
        // Pairs of the replaced row go with it through the cascade
        tx.execute(
            "DELETE FROM alignments WHERE path_a = ?1 AND path_b = ?2 AND mode = ?3 AND params = ?4",
            params![
                key.a.path.to_string_lossy().to_string(),
                key.b.path.to_string_lossy().to_string(),
                key.mode,
                key.params,
            ],
        )?;
        tx.execute(
            r#"INSERT INTO alignments
               (path_a, size_a, modified_a, path_b, size_b, modified_b,
                mode, params, computed_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                key.a.path.to_string_lossy().to_string(),
                key.a.file_size,
                key.a.modified_time,
                key.b.path.to_string_lossy().to_string(),
                key.b.file_size,
                key.b.modified_time,
                key.mode,
                key.params,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();

        {
            let mut insert = tx.prepare(
                "INSERT INTO pairs (alignment_id, seq, time_a, time_b) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (seq, (time_a, time_b)) in pairs.iter().enumerate() {
                insert.execute(params![id, seq as i64, time_a, time_b])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of cached alignments
    pub fn count(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM alignments", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove every cached alignment involving `path`
    pub fn remove(&self, path: &Path) -> Result<usize, CacheError> {
        let path = path.to_string_lossy().to_string();
        let affected = self.conn.execute(
            "DELETE FROM alignments WHERE path_a = ?1 OR path_b = ?1",
            [path],
        )?;
        Ok(affected)
    }

    /// Clear all cached data
    pub fn clear(&self) -> Result<(), CacheError> {
        self.conn.execute("DELETE FROM alignments", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(path: &str) -> FileIdentity {
        FileIdentity {
            path: PathBuf::from(path),
            file_size: 1024000,
            modified_time: 1700000000,
        }
    }

    fn test_key() -> AlignmentKey {
        AlignmentKey {
            a: identity("/test/camera.wav"),
            b: identity("/test/recorder.wav"),
            mode: "offline".to_string(),
            params: "max_offset=10".to_string(),
        }
    }

    fn test_pairs() -> Vec<(f64, f64)> {
        vec![(0.0, 2.0), (0.02, 2.02), (0.04, 2.06)]
    }

    fn pair_rows(cache: &AlignmentCache) -> i64 {
        cache
            .conn
            .query_row("SELECT COUNT(*) FROM pairs", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_store_and_get() {
        let cache = AlignmentCache::in_memory().unwrap();
        cache.store(&test_key(), &test_pairs()).unwrap();

        let cached = cache.get(&test_key()).unwrap().expect("Stored alignment should be found");
        assert_eq!(cached.pairs, test_pairs());
        assert!(cached.computed_at > 0);
    }

    #[test]
    fn test_changed_file_misses() {
        let cache = AlignmentCache::in_memory().unwrap();
        cache.store(&test_key(), &test_pairs()).unwrap();

        let mut resized = test_key();
        resized.b.file_size = 999999;
        assert!(cache.get(&resized).unwrap().is_none());

        let mut touched = test_key();
        touched.a.modified_time = 1800000000;
        assert!(cache.get(&touched).unwrap().is_none());
    }

    #[test]
    fn test_parameters_are_part_of_the_key() {
        let cache = AlignmentCache::in_memory().unwrap();
        cache.store(&test_key(), &test_pairs()).unwrap();

        let mut streaming = test_key();
        streaming.mode = "streaming".to_string();
        assert!(cache.get(&streaming).unwrap().is_none());

        let mut wider = test_key();
        wider.params = "max_offset=20".to_string();
        assert!(cache.get(&wider).unwrap().is_none());
    }

    #[test]
    fn test_store_replaces_previous_result() {
        let cache = AlignmentCache::in_memory().unwrap();
        cache.store(&test_key(), &test_pairs()).unwrap();
        cache.store(&test_key(), &[(1.0, 1.5)]).unwrap();

        assert_eq!(cache.count().unwrap(), 1);
        assert_eq!(cache.get(&test_key()).unwrap().unwrap().pairs, vec![(1.0, 1.5)]);
        assert_eq!(pair_rows(&cache), 1, "Old pairs should be deleted with their alignment");
    }

    #[test]
    fn test_remove_by_either_path() {
        let cache = AlignmentCache::in_memory().unwrap();
        cache.store(&test_key(), &test_pairs()).unwrap();

        let mut other = test_key();
        other.a = identity("/test/phone.wav");
        cache.store(&other, &test_pairs()).unwrap();
        assert_eq!(cache.count().unwrap(), 2);

        assert_eq!(cache.remove(Path::new("/test/camera.wav")).unwrap(), 1);
        assert_eq!(cache.remove(Path::new("/test/recorder.wav")).unwrap(), 1);
        assert_eq!(cache.count().unwrap(), 0);
        assert_eq!(pair_rows(&cache), 0);
    }

    #[test]
    fn test_clear() {
        let cache = AlignmentCache::in_memory().unwrap();
        cache.store(&test_key(), &test_pairs()).unwrap();
        cache.clear().unwrap();
        assert_eq!(cache.count().unwrap(), 0);
    }

    #[test]
    fn test_file_identity_of_missing_file() {
        assert!(matches!(
            FileIdentity::of(Path::new("/nonexistent/file.wav")),
            Err(CacheError::Io(_))
        ));
    }
}
