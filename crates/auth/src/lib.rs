use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Key under which a profile's access token is stored.
pub fn token_key(profile: &str) -> String {
    format!("{profile}:token")
}

/// Access tokens kept in a JSON file readable only by the owner.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store under `~/.<app>/credentials`.
    pub fn new(app: &str) -> Result<Self> {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        Ok(Self::with_path(home.join(format!(".{app}")).join("credentials")))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_secret(&self, account: &str) -> Result<Option<String>> {
        Ok(self.read()?.remove(account))
    }

    pub fn set_secret(&self, account: &str, secret: &str) -> Result<()> {
        let mut creds = self.read()?;
        creds.insert(account.to_string(), secret.to_string());
        self.write(&creds)?;
        debug!(account, "Stored secret");
        Ok(())
    }

    /// Remove a secret. Returns whether anything was removed.
    pub fn delete_secret(&self, account: &str) -> Result<bool> {
        let mut creds = self.read()?;
        if creds.remove(account).is_none() {
            return Ok(false);
        }
        self.write(&creds)?;
        debug!(account, "Deleted secret");
        Ok(true)
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Unable to read credentials at {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Malformed credentials file {}", self.path.display()))
    }

    fn write(&self, creds: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&self.path)
            .with_context(|| format!("Unable to write credentials to {}", self.path.display()))?;
        let json = serde_json::to_string_pretty(creds)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> CredentialStore {
        CredentialStore::with_path(dir.path().join("nested").join("credentials"))
    }

    #[test]
    fn test_token_key() {
        assert_eq!(token_key("ci"), "ci:token");
    }

    #[test]
    fn test_missing_file_has_no_secrets() {
        let dir = TempDir::new().unwrap();
        assert_eq!(store(&dir).get_secret("ci:token").unwrap(), None);
    }

    #[test]
    fn test_set_get_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.set_secret("ci:token", "abc123").unwrap();
        store.set_secret("other:token", "xyz").unwrap();
        assert_eq!(
            store.get_secret("ci:token").unwrap().as_deref(),
            Some("abc123")
        );

        assert!(store.delete_secret("ci:token").unwrap());
        assert!(!store.delete_secret("ci:token").unwrap());
        assert_eq!(store.get_secret("ci:token").unwrap(), None);
        assert_eq!(store.get_secret("other:token").unwrap().as_deref(), Some("xyz"));
    }

    #[test]
    fn test_overwrite_secret() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.set_secret("ci:token", "old").unwrap();
        store.set_secret("ci:token", "new").unwrap();
        assert_eq!(store.get_secret("ci:token").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        fs::write(store.path(), "{not json").unwrap();

        let err = store.get_secret("ci:token").unwrap_err();
        assert!(err.to_string().contains("Malformed credentials"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.set_secret("ci:token", "abc123").unwrap();

        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
