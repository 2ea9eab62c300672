//! Configuration paths and the flat key/value settings store.
//!
//! Handles paths and persistence for:
//! - presence settings (`config.env`)
//! - the background process record (`daemon.pid`)
//! - diagnostic logs
//!
//! Everything lives under `$SIMPLERPC_HOME`, or `~/.simplerpc` when unset.

use fs_err as fs;
use std::collections::BTreeMap;
use std::env;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const HOME_ENV: &str = "SIMPLERPC_HOME";
const HOME_DIR_NAME: &str = ".simplerpc";
const CONFIG_FILE: &str = "config.env";
const RECORD_FILE: &str = "daemon.pid";
const RECORD_LOCK_DIR: &str = "daemon.pid.lock";
const LOG_DIR: &str = "logs";

pub const CLIENT_ID: &str = "CLIENT_ID";
pub const DETAILS: &str = "DETAILS";
pub const STATE: &str = "STATE";
pub const LARGE_IMAGE_KEY: &str = "LARGE_IMAGE_KEY";
pub const LARGE_IMAGE_TEXT: &str = "LARGE_IMAGE_TEXT";
pub const SMALL_IMAGE_KEY: &str = "SMALL_IMAGE_KEY";
pub const SMALL_IMAGE_TEXT: &str = "SMALL_IMAGE_TEXT";
pub const ACTIVITY_TYPE: &str = "ACTIVITY_TYPE";
pub const BUTTON_LABEL: &str = "BUTTON_LABEL";
pub const BUTTON_URL: &str = "BUTTON_URL";
pub const BUTTON2_LABEL: &str = "BUTTON2_LABEL";
pub const BUTTON2_URL: &str = "BUTTON2_URL";

/// Every setting the presence core reads, in the order the file template lists them.
pub const KNOWN_KEYS: [&str; 12] = [
    CLIENT_ID,
    DETAILS,
    STATE,
    ACTIVITY_TYPE,
    LARGE_IMAGE_KEY,
    LARGE_IMAGE_TEXT,
    SMALL_IMAGE_KEY,
    SMALL_IMAGE_TEXT,
    BUTTON_LABEL,
    BUTTON_URL,
    BUTTON2_LABEL,
    BUTTON2_URL,
];

// ─────────────────────────────────────────────────────────────────────────────
// Paths
// ─────────────────────────────────────────────────────────────────────────────

/// Resolved locations of every file the application persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub home: PathBuf,
}

impl Paths {
    pub fn resolve() -> Result<Self, ConfigError> {
        if let Ok(path) = env::var(HOME_ENV) {
            if !path.trim().is_empty() {
                return Ok(Self::at(path));
            }
        }
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(Self::at(home.join(HOME_DIR_NAME)))
    }

    pub fn at(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    pub fn record_file(&self) -> PathBuf {
        self.home.join(RECORD_FILE)
    }

    /// Exclusive lock held while the record is read, checked and rewritten.
    pub fn record_lock_dir(&self) -> PathBuf {
        self.home.join(RECORD_LOCK_DIR)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.home.join(LOG_DIR)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Flat string settings persistence.
pub trait ConfigStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set_all(&mut self, values: &BTreeMap<String, String>) -> Result<(), ConfigError>;
}

/// `KEY=VALUE` text file store. Lines starting with `#` and blank lines are
/// ignored; everything after the first `=` is the value, minus one pair of
/// surrounding quotes.
#[derive(Debug)]
pub struct EnvFileStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl EnvFileStore {
    /// Loads the file, returning an empty store if it does not exist yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(content) => parse_env(&content),
            Err(err) if err.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(ConfigError::ReadFailed { path, source }),
        };
        Ok(Self { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Deletes the file and forgets every value.
    pub fn clear(&mut self) -> Result<(), ConfigError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ConfigError::WriteFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        }
        self.values.clear();
        Ok(())
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot::new(self.values.clone())
    }

    fn write_file(&self, values: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::WriteFailed {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, render_env(values)).map_err(write_err)?;
        fs::rename(&tmp_path, &self.path).map_err(write_err)?;
        Ok(())
    }
}

impl ConfigStore for EnvFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set_all(&mut self, values: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        self.write_file(values)?;
        self.values = values.clone();
        tracing::debug!(path = %self.path.display(), keys = values.len(), "Configuration saved");
        Ok(())
    }
}

fn parse_env(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

/// Strips one matching pair of `"` or `'` around a value, as dotenv files do.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Known keys first in template order, then anything else alphabetically.
fn render_env(values: &BTreeMap<String, String>) -> String {
    let mut out = String::from("# SimpleRPC configuration\n");
    for key in KNOWN_KEYS {
        let value = values.get(key).map(String::as_str).unwrap_or("");
        out.push_str(&format!("{}={}\n", key, value));
    }
    for (key, value) in values {
        if !KNOWN_KEYS.contains(&key.as_str()) {
            out.push_str(&format!("{}={}\n", key, value));
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable view of the settings used for one presence session.
///
/// Blank values count as absent, so a template line like `BUTTON_URL=` never
/// produces a half-filled field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    values: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    pub fn new(values: BTreeMap<String, String>) -> Self {
        let values = values
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        Self { values }
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    /// Process environment variables with a known key name take precedence
    /// over file values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in KNOWN_KEYS {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                self.values.insert(key.to_string(), value);
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn client_id(&self) -> Option<&str> {
        self.get(CLIENT_ID)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.client_id() {
            Some(id) if !id.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::MissingClientId),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_empty() {
        let temp = tempdir().unwrap();
        let store = EnvFileStore::load(temp.path().join("config.env")).unwrap();
        assert!(!store.exists());
        assert!(store.values().is_empty());
    }

    #[test]
    fn parses_comments_blanks_and_equals_in_values() {
        let parsed = parse_env(
            "# header\n\nCLIENT_ID=123\nBUTTON_URL=https://x.test/?a=b\nBROKEN\n=nokey\n",
        );
        assert_eq!(parsed.get("CLIENT_ID").map(String::as_str), Some("123"));
        assert_eq!(
            parsed.get("BUTTON_URL").map(String::as_str),
            Some("https://x.test/?a=b")
        );
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn quoted_values_lose_one_pair_of_quotes() {
        let parsed = parse_env(
            "DETAILS=\"Coding\"\nSTATE='In the zone'\nLARGE_IMAGE_TEXT=\"say \"hi\"\"\nSMALL_IMAGE_TEXT=\"half\nBUTTON_LABEL_1=\"\"\n",
        );
        assert_eq!(parsed.get("DETAILS").map(String::as_str), Some("Coding"));
        assert_eq!(parsed.get("STATE").map(String::as_str), Some("In the zone"));
        assert_eq!(
            parsed.get("LARGE_IMAGE_TEXT").map(String::as_str),
            Some("say \"hi\"")
        );
        assert_eq!(parsed.get("SMALL_IMAGE_TEXT").map(String::as_str), Some("\"half"));
        assert_eq!(parsed.get("BUTTON_LABEL_1").map(String::as_str), Some(""));
    }

    #[test]
    fn set_all_persists_and_reloads() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("nested").join("config.env");
        let mut store = EnvFileStore::load(&path).unwrap();

        let mut values = BTreeMap::new();
        values.insert(CLIENT_ID.to_string(), "123".to_string());
        values.insert(DETAILS.to_string(), "Coding".to_string());
        store.set_all(&values).unwrap();

        let reloaded = EnvFileStore::load(&path).unwrap();
        assert_eq!(reloaded.get(CLIENT_ID).as_deref(), Some("123"));
        assert_eq!(reloaded.get(DETAILS).as_deref(), Some("Coding"));
        // Unset known keys are written as blank template lines
        assert_eq!(reloaded.get(STATE).as_deref(), Some(""));
        assert!(reloaded.snapshot().get(STATE).is_none());
    }

    #[test]
    fn clear_removes_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("config.env");
        fs::write(&path, "CLIENT_ID=1\n").unwrap();

        let mut store = EnvFileStore::load(&path).unwrap();
        store.clear().unwrap();
        assert!(!path.exists());
        assert!(store.get(CLIENT_ID).is_none());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn snapshot_requires_client_id() {
        let snapshot = ConfigSnapshot::from_pairs([(DETAILS, "D"), (CLIENT_ID, "  ")]);
        assert!(matches!(
            snapshot.validate(),
            Err(ConfigError::MissingClientId)
        ));

        let snapshot = ConfigSnapshot::from_pairs([(CLIENT_ID, "123")]);
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn overrides_win_over_file_values() {
        let snapshot = ConfigSnapshot::from_pairs([(CLIENT_ID, "file"), (STATE, "S")])
            .with_overrides(|key| match key {
                CLIENT_ID => Some("env".to_string()),
                DETAILS => Some("".to_string()),
                _ => None,
            });
        assert_eq!(snapshot.client_id(), Some("env"));
        assert_eq!(snapshot.get(STATE), Some("S"));
        assert!(snapshot.get(DETAILS).is_none());
    }

    #[test]
    fn paths_hang_off_home() {
        let paths = Paths::at("/tmp/simplerpc-test");
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/simplerpc-test/config.env")
        );
        assert_eq!(
            paths.record_file(),
            PathBuf::from("/tmp/simplerpc-test/daemon.pid")
        );
    }
}
