use crate::{DbError, StoredProfile};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

/// On-disk store for connection profile records: one JSON file per profile,
/// named `<id>.json`, in a single directory.
///
/// Concurrent saves to different ids are independent. A concurrent save and
/// delete of the same id is last-writer-wins; acceptable for a single-user
/// desktop tool.
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new() -> Result<Self, DbError> {
        let config_dir = dirs::config_dir().ok_or_else(|| {
            DbError::IoError(std::io::Error::other("Could not find config directory"))
        })?;

        Self::at(config_dir.join("dbcompass").join("connections"))
    }

    /// Opens a store rooted at an explicit directory. Used by tests and by
    /// hosts that manage their own data directory.
    pub fn at(dir: PathBuf) -> Result<Self, DbError> {
        fs::create_dir_all(&dir).map_err(DbError::IoError)?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Writes the full record, overwriting any existing record with the
    /// same id.
    pub fn save(&self, profile: &StoredProfile) -> Result<(), DbError> {
        let content = serde_json::to_string_pretty(profile)
            .map_err(|e| DbError::invalid_profile(e.to_string()))?;

        fs::write(self.record_path(profile.id), content).map_err(DbError::IoError)
    }

    pub fn load(&self, id: Uuid) -> Result<Option<StoredProfile>, DbError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).map_err(DbError::IoError)?;
        let profile = serde_json::from_str(&content)
            .map_err(|e| DbError::invalid_profile(format!("{}: {e}", path.display())))?;

        Ok(Some(profile))
    }

    /// Reads every record in the directory, in directory-listing order.
    /// Malformed records are logged and skipped rather than failing the
    /// whole listing.
    pub fn load_all(&self) -> Result<Vec<StoredProfile>, DbError> {
        let mut profiles = Vec::new();

        for entry in fs::read_dir(&self.dir).map_err(DbError::IoError)? {
            let entry = entry.map_err(DbError::IoError)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    log::warn!("Skipping unreadable profile record {}: {e}", path.display());
                    continue;
                }
            };

            match serde_json::from_str::<StoredProfile>(&content) {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    log::warn!("Skipping malformed profile record {}: {e}", path.display());
                }
            }
        }

        Ok(profiles)
    }

    /// Removes the record. Returns whether a record existed.
    pub fn delete(&self, id: Uuid) -> Result<bool, DbError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(path).map_err(DbError::IoError)?;
        Ok(true)
    }

    /// Raw record contents, for callers that need to inspect the at-rest
    /// form (tests asserting the password is not stored in plaintext).
    pub fn raw_record(&self, id: Uuid) -> Result<Option<String>, DbError> {
        let path = self.record_path(id);
        if !path.exists() {
            return Ok(None);
        }
        fs::read_to_string(path).map(Some).map_err(DbError::IoError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionProfile, DbKind};

    fn stored(name: &str) -> StoredProfile {
        let profile = ConnectionProfile::new(name, DbKind::Postgres);
        StoredProfile::from_profile(&profile, None)
    }

    #[test]
    fn save_load_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::at(dir.path().to_path_buf()).unwrap();

        let record = stored("dev");
        store.save(&record).unwrap();

        let loaded = store.load(record.id).unwrap().unwrap();
        assert_eq!(loaded.name, "dev");

        assert!(store.delete(record.id).unwrap());
        assert!(!store.delete(record.id).unwrap());
        assert!(store.load(record.id).unwrap().is_none());
    }

    #[test]
    fn save_overwrites_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::at(dir.path().to_path_buf()).unwrap();

        let mut record = stored("before");
        store.save(&record).unwrap();

        record.name = "after".to_string();
        store.save(&record).unwrap();

        assert_eq!(store.load_all().unwrap().len(), 1);
        assert_eq!(store.load(record.id).unwrap().unwrap().name, "after");
    }

    #[test]
    fn load_all_skips_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::at(dir.path().to_path_buf()).unwrap();

        store.save(&stored("good")).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let profiles = store.load_all().unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "good");
    }
}
