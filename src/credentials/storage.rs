//! JSON file storage for the credential.
//!
//! Writes are atomic: the record goes to a sibling `.tmp` file, is fsynced,
//! then renamed over the target, so a reader never observes a partial file.

use super::{Credential, StoredCredential};
use crate::error::StoreError;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File-backed holder of the single persisted [`Credential`].
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Creates a store backed by `path`. The file need not exist yet.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted credential.
    ///
    /// # Returns
    /// * `Ok(Some(Credential))` - A complete credential was found
    /// * `Ok(None)` - No file, or the stored record is incomplete
    /// * `Err` - The file exists but cannot be read or parsed
    pub fn load(&self) -> Result<Option<Credential>, StoreError> {
        let Some(stored) = self.load_record()? else {
            debug!(path = %self.path.display(), "No credential file");
            return Ok(None);
        };

        let credential = stored.into_complete();
        if credential.is_none() {
            warn!(
                path = %self.path.display(),
                "Stored credential is incomplete, treating as absent"
            );
        }
        Ok(credential)
    }

    /// Reads the raw record without validating completeness.
    pub fn load_record(&self) -> Result<Option<StoredCredential>, StoreError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Persists `credential`, replacing any previous one atomically.
    pub fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let record = StoredCredential::from(credential);
        let json = serde_json::to_vec_pretty(&record)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        {
            let mut tmp_file = File::create(&tmp_path)?;
            tmp_file.write_all(&json)?;
            tmp_file.sync_all()?;
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        debug!(path = %self.path.display(), "Credential saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn create_test_credential() -> Credential {
        Credential {
            access_token: "access-token-12345".to_string(),
            refresh_token: "refresh-token-67890".to_string(),
            expires_in: 43200,
            acquired_at: Utc.timestamp_millis_opt(1_718_000_000_250).unwrap(),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().join("tokens.json"));
        let credential = create_test_credential();

        store.save(&credential).expect("Failed to save");

        let loaded = store
            .load()
            .expect("Failed to load")
            .expect("Credential not found");
        assert_eq!(loaded, credential);
    }

    #[test]
    fn test_round_trip_with_current_time() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().join("tokens.json"));
        let credential = Credential::acquired_now("a", "r", 3600);

        store.save(&credential).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), credential);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = CredentialStore::new(temp_dir.path().join("absent.json"));

        assert!(store.load().unwrap().is_none());
        assert!(store.load_record().unwrap().is_none());
    }

    #[test]
    fn test_load_incomplete_record() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokens.json");
        fs::write(
            &path,
            r#"{"access_token": "a", "refresh_token": null, "expires_in": 60, "token_acquired_time": 1.0}"#,
        )
        .unwrap();

        let store = CredentialStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let record = store.load_record().unwrap().unwrap();
        assert_eq!(record.access_token.as_deref(), Some("a"));
        assert!(record.refresh_token.is_none());
    }

    #[test]
    fn test_load_corrupt_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokens.json");
        fs::write(&path, "{not json").unwrap();

        let store = CredentialStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Json(_))));
    }

    #[test]
    fn test_save_overwrites_and_leaves_no_tmp() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokens.json");
        let store = CredentialStore::new(&path);

        store.save(&create_test_credential()).unwrap();

        let mut rotated = create_test_credential();
        rotated.access_token = "new-access".to_string();
        rotated.refresh_token = "new-refresh".to_string();
        store.save(&rotated).unwrap();

        assert_eq!(store.load().unwrap().unwrap(), rotated);
        assert!(!temp_dir.path().join("tokens.json.tmp").exists());
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state").join("furrow").join("tokens.json");
        let store = CredentialStore::new(&path);

        store.save(&create_test_credential()).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_save_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail
        let path = temp_dir.path().join("tokens.json");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), "x").unwrap();

        let store = CredentialStore::new(&path);
        let result = store.save(&create_test_credential());
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn test_written_file_uses_legacy_keys() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tokens.json");
        CredentialStore::new(&path)
            .save(&create_test_credential())
            .unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["access_token"], "access-token-12345");
        assert_eq!(value["refresh_token"], "refresh-token-67890");
        assert_eq!(value["expires_in"], 43200);
        assert_eq!(value["token_acquired_time"], 1718000000.25);
    }
}
