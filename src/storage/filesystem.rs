use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::traits::KeyValueStore;

/// One persisted value
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct StoredEntry {
    pub value: String,
    /// RFC 3339 timestamp of the last write
    pub updated_at: String,
}

/// On-disk layout of the store file
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct StoreFile {
    #[serde(default)]
    entries: BTreeMap<String, StoredEntry>,
}

/// Profile-scoped key-value store persisted as a YAML file.
///
/// The file is re-read on every access so that writes from another process
/// win (last write wins, as with browser storage shared between tabs).
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries with their timestamps
    pub fn entries(&self) -> Result<BTreeMap<String, StoredEntry>> {
        Ok(self.load()?.entries)
    }

    fn load(&self) -> Result<StoreFile> {
        if !self.path.exists() {
            return Ok(StoreFile::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read store file {:?}", self.path))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse store file {:?}", self.path))
    }

    fn save(&self, file: &StoreFile) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {:?}", dir))?;

        let yaml = serde_yaml::to_string(file).context("Failed to serialize store file")?;

        // Write to a temp file in the same directory, then rename over the target
        let mut temp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
        temp.write_all(yaml.as_bytes())
            .context("Failed to write temporary store file")?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to replace store file {:?}", self.path))?;

        Ok(())
    }

    fn update<F>(&self, update_fn: F) -> Result<()>
    where
        F: FnOnce(&mut StoreFile),
    {
        let mut file = self.load()?;
        update_fn(&mut file);
        self.save(&file)
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load()?.entries.get(key).map(|entry| entry.value.clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.update(|file| {
            file.entries.insert(
                key.to_string(),
                StoredEntry {
                    value: value.to_string(),
                    updated_at: chrono::Utc::now().to_rfc3339(),
                },
            );
        })
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        if self.get_item(key)?.is_none() {
            return Ok(());
        }
        self.update(|file| {
            file.entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_write_and_read_item() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let store = FileStore::new(temp_dir.path().join("nested/local.yaml"));

        assert_eq!(store.get_item("token")?, None);
        store.set_item("token", "abc.s1-n1")?;
        assert_eq!(store.get_item("token")?, Some("abc.s1-n1".to_string()));

        let entries = store.entries()?;
        assert!(chrono::DateTime::parse_from_rfc3339(&entries["token"].updated_at).is_ok());
        Ok(())
    }

    #[test]
    fn test_persists_across_instances() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("local.yaml");

        FileStore::new(&path).set_item("dense", "{}")?;
        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get_item("dense")?, Some("{}".to_string()));

        reopened.remove_item("dense")?;
        reopened.remove_item("never-written")?;
        assert_eq!(FileStore::new(&path).get_item("dense")?, None);
        Ok(())
    }

    #[test]
    fn test_corrupt_file_is_an_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("local.yaml");
        fs::write(&path, "entries: [not, a, map]")?;

        assert!(FileStore::new(&path).get_item("token").is_err());
        Ok(())
    }
}
