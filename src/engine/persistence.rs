use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde_json::Value;

use crate::{Error, Result};

#[allow(unused_imports)]
use crate::engine::LocalStore;

/// Handles disk I/O for the [`LocalStore`].
///
/// Persistence uses an atomic "write-then-rename" strategy to ensure data
/// integrity. Each collection key is stored in its own `.json` file.
pub struct Persistence {
    data_dir: PathBuf,
}

impl Persistence {
    /// Initializes a new `Persistence` handler in the specified directory.
    ///
    /// If the directory does not exist, it will be created.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self { data_dir: dir })
    }

    /// Writes a single collection's value to a JSON file atomically.
    ///
    /// This method writes to a temporary file first and then renames it to
    /// the final destination, preventing file corruption during power
    /// failures.
    pub fn save_key(&self, key: &str, value: &Value) -> Result<()> {
        let file_path = self.data_dir.join(format!("{}.json", key));
        let temp_path = file_path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(value)?;

        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &file_path)?;

        Ok(())
    }

    /// Deletes the file backing `key`, returning the key to the absent state
    /// on the next load.
    pub fn remove_key(&self, key: &str) -> Result<()> {
        let file_path = self.data_dir.join(format!("{}.json", key));
        if file_path.exists() {
            fs::remove_file(&file_path)?;
        }
        Ok(())
    }

    /// Loads every collection found in the data directory.
    ///
    /// Scans for all `.json` files in the `data_dir` and parses them into the
    /// store's key map. Unreadable or unparsable files are skipped with a
    /// warning so one corrupt collection does not block startup.
    pub fn load_all(&self) -> Result<HashMap<String, Value>> {
        let mut all_data = HashMap::new();

        if !self.data_dir.exists() {
            return Ok(all_data);
        }

        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                let key = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .ok_or_else(|| Error::Internal("Invalid filename".to_string()))?
                    .to_string();

                let content = match fs::read(&path) {
                    Ok(c) => c,
                    Err(e) => {
                        warn!("Could not read collection file {:?}: {}", path, e);
                        continue;
                    }
                };

                let value: Value = match serde_json::from_slice(&content) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Could not unmarshal collection data from {:?}: {}", path, e);
                        continue;
                    }
                };

                all_data.insert(key, value);
            }
        }

        Ok(all_data)
    }
}
