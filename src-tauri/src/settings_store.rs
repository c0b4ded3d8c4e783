// Read-only view over the key=value settings file the UI writes.
// Only the two facts the boot sequence needs are exposed: the preferred
// backend port and whether identity/credential material is stored.

use std::collections::HashMap;
use std::path::Path;

use crate::config::DEFAULT_PORT;

const PORT_KEY: &str = "port";
const IDENTITY_KEY: &str = "identity";
const CREDENTIALS_KEY: &str = "credentials";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsStore {
    values: HashMap<String, String>,
}

impl SettingsStore {
    /// Load the store from disk. A missing file is an empty store.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Parse `key=value` lines. Blank lines and `#` comments are skipped,
    /// later duplicates win.
    pub fn parse(content: &str) -> Self {
        let values = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();

        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|v| !v.is_empty())
    }

    /// Preferred backend port, falling back to the default
    pub fn preferred_port(&self) -> u16 {
        self.non_empty(PORT_KEY)
            .and_then(|raw| raw.parse::<u16>().ok())
            .filter(|port| *port > 0)
            .unwrap_or(DEFAULT_PORT)
    }

    /// Whether the user already completed setup
    pub fn has_credentials(&self) -> bool {
        self.non_empty(IDENTITY_KEY).is_some() && self.non_empty(CREDENTIALS_KEY).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let store = SettingsStore::parse(
            "# written by the dashboard\n\n port = 4000 \nidentity=site-42\nbogus line\n",
        );
        assert_eq!(store.get("port"), Some("4000"));
        assert_eq!(store.get("identity"), Some("site-42"));
        assert_eq!(store.get("bogus line"), None);
    }

    #[test]
    fn test_later_keys_win() {
        let store = SettingsStore::parse("port=4000\nport=4100\n");
        assert_eq!(store.preferred_port(), 4100);
    }

    #[test]
    fn test_value_may_contain_equals() {
        let store = SettingsStore::parse("credentials=abc==\n");
        assert_eq!(store.get("credentials"), Some("abc=="));
    }

    #[test]
    fn test_preferred_port_falls_back_on_garbage() {
        assert_eq!(SettingsStore::parse("").preferred_port(), DEFAULT_PORT);
        assert_eq!(SettingsStore::parse("port=0").preferred_port(), DEFAULT_PORT);
        assert_eq!(SettingsStore::parse("port=70000").preferred_port(), DEFAULT_PORT);
        assert_eq!(SettingsStore::parse("port=abc").preferred_port(), DEFAULT_PORT);
    }

    #[test]
    fn test_has_credentials_requires_both_keys() {
        assert!(!SettingsStore::parse("identity=site-42").has_credentials());
        assert!(!SettingsStore::parse("identity=site-42\ncredentials=").has_credentials());
        assert!(SettingsStore::parse("identity=site-42\ncredentials=blob").has_credentials());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = SettingsStore::load(&temp_dir.path().join("settings.conf")).unwrap();
        assert_eq!(store, SettingsStore::default());
        assert!(!store.has_credentials());
    }

    #[test]
    fn test_load_reads_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.conf");
        std::fs::write(&path, "port=3200\nidentity=a\ncredentials=b\n").unwrap();

        let store = SettingsStore::load(&path).unwrap();
        assert_eq!(store.preferred_port(), 3200);
        assert!(store.has_credentials());
    }
}
