//! File-backed contest catalog.
//!
//! Contest records live in a JSON array on disk (exported from the
//! contest source). `reload` swaps in a fresh list; a failed reload
//! keeps the previous one.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::info;

use super::ContestCatalog;
use crate::types::Contest;

pub struct FileContestCatalog {
    path: PathBuf,
    contests: RwLock<Vec<Contest>>,
}

impl FileContestCatalog {
    /// Load contests from `path`. A missing file yields an empty catalog.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let catalog = Self {
            path: path.as_ref().to_path_buf(),
            contests: RwLock::new(Vec::new()),
        };
        catalog.reload()?;
        Ok(catalog)
    }

    /// Catalog over a fixed list, not backed by a file.
    pub fn from_contests(contests: Vec<Contest>) -> Self {
        Self {
            path: PathBuf::new(),
            contests: RwLock::new(contests),
        }
    }

    /// Re-read the file. Returns the number of contests loaded.
    pub fn reload(&self) -> Result<usize> {
        if self.path.as_os_str().is_empty() || !self.path.exists() {
            info!(path = %self.path.display(), "No contest file, catalog unchanged");
            return Ok(self.current_contests().len());
        }

        let json = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read contests from {}", self.path.display()))?;
        let contests: Vec<Contest> = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse contests from {}", self.path.display()))?;

        let count = contests.len();
        *self.contests.write().unwrap_or_else(PoisonError::into_inner) = contests;
        info!(path = %self.path.display(), count, "Contests loaded");
        Ok(count)
    }
}

impl ContestCatalog for FileContestCatalog {
    fn current_contests(&self) -> Vec<Contest> {
        self.contests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContestState;
    use rust_decimal_macros::dec;

    const CONTESTS: &str = r#"[
        {"id": 1, "name": "Weekly Crypto Clash", "sport": "Crypto",
         "entry_fee": 5.0, "prize_pool": 1000.0,
         "start_time": "2026-10-01T00:00:00Z", "end_time": "2026-10-08T00:00:00Z",
         "max_participants": 100, "current_participants": 42, "state": "Active"},
        {"id": 2, "name": "Blue Chip Sprint", "sport": "Equities",
         "entry_fee": 0.0, "prize_pool": 250.0,
         "start_time": "2026-09-01T00:00:00Z", "end_time": "2026-09-02T00:00:00Z",
         "max_participants": 0, "current_participants": 0, "state": "Finished"}
    ]"#;

    fn temp_path() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("leagues_test_contests_{}.json", uuid::Uuid::new_v4()));
        p
    }

    #[test]
    fn test_load_contests_file() {
        let path = temp_path();
        std::fs::write(&path, CONTESTS).unwrap();

        let catalog = FileContestCatalog::load(&path).unwrap();
        let contests = catalog.current_contests();
        assert_eq!(contests.len(), 2);
        assert_eq!(contests[0].state, ContestState::Active);
        assert_eq!(contests[0].prize_pool, dec!(1000));
        assert_eq!(catalog.find(2).unwrap().name, "Blue Chip Sprint");
        assert!(catalog.find(3).is_none());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_empty() {
        let catalog = FileContestCatalog::load("/tmp/leagues_no_contests_here.json").unwrap();
        assert!(catalog.current_contests().is_empty());
    }

    #[test]
    fn test_bad_reload_keeps_previous() {
        let path = temp_path();
        std::fs::write(&path, CONTESTS).unwrap();
        let catalog = FileContestCatalog::load(&path).unwrap();

        std::fs::write(&path, "[{ broken").unwrap();
        assert!(catalog.reload().is_err());
        assert_eq!(catalog.current_contests().len(), 2);

        std::fs::remove_file(&path).unwrap();
    }
}
