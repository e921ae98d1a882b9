use std::fs;
use std::path::Path;

use cxg_core::{PatternStore, export_grammar, import_grammar};

use crate::error::{Result, StoreError};
use crate::store::Store;

impl Store {
    /// Import a grammar JSON file. Returns the number of patterns written.
    pub fn import_json_file(&self, path: &Path) -> Result<usize> {
        let json = fs::read_to_string(path).map_err(|e| {
            StoreError::InvalidData(format!("failed to read {}: {e}", path.display()))
        })?;
        self.import_json_str(&json)
    }

    pub fn import_json_str(&self, json: &str) -> Result<usize> {
        let patterns = import_grammar(json)
            .map_err(|e| StoreError::InvalidData(format!("invalid JSON: {e}")))?;
        self.save_patterns(&patterns)
    }

    /// Export every stored pattern to a grammar JSON file.
    pub fn export_json_file(&self, path: &Path) -> Result<()> {
        let json = self.export_json_string()?;
        fs::write(path, json).map_err(|e| {
            StoreError::InvalidData(format!("failed to write {}: {e}", path.display()))
        })
    }

    pub fn export_json_string(&self) -> Result<String> {
        let patterns = self.load_all()?;
        export_grammar(&patterns)
            .map_err(|e| StoreError::InvalidData(format!("JSON export failed: {e}")))
    }
}
