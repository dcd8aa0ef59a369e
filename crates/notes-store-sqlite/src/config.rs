//! Assembler configuration

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Note assembly configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblerConfig {
    /// Parse stores whose generation could not be fingerprinted, with
    /// columns picked by probing
    pub allow_unknown_schema: bool,
    /// Write computed plaintext back into `ZICNOTEDATA` after `assemble_all`
    pub cache_plaintext: bool,
    /// Report objects whose rows are gone as deleted objects instead of
    /// the missing marker
    pub include_deleted_objects: bool,
    /// Produce HTML alongside plaintext
    pub render_html: bool,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            allow_unknown_schema: false,
            cache_plaintext: false,
            include_deleted_objects: true,
            render_html: true,
        }
    }
}

impl AssemblerConfig {
    /// Load from a JSON file; absent keys keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: AssemblerConfig = serde_json::from_str(r#"{"cache_plaintext": true}"#).unwrap();
        assert!(config.cache_plaintext);
        assert!(config.include_deleted_objects);
        assert!(config.render_html);
        assert!(!config.allow_unknown_schema);
    }

    #[test]
    fn test_from_json_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"allow_unknown_schema": true, "render_html": false}"#).unwrap();
        let config = AssemblerConfig::from_json_file(file.path()).unwrap();
        assert!(config.allow_unknown_schema);
        assert!(!config.render_html);
    }
}
