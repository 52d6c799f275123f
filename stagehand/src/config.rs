//! Container options.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{ContainerError, ContainerResult};

/// Options fixed at container creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerOptions {
    /// Label attached to every log record of this container.
    pub label: String,
    /// Log a forced backtrace when a constructor panic is re-raised from
    /// init. When off, a backtrace is only captured if `RUST_BACKTRACE` asks
    /// for one.
    pub capture_backtraces: bool,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            label: "default".to_string(),
            capture_backtraces: false,
        }
    }
}

impl ContainerOptions {
    /// Validate options before a container is built from them.
    pub fn sanitize(&self) -> ContainerResult<()> {
        if self.label.trim().is_empty() {
            return Err(ContainerError::Config(
                "container label must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Load options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> ContainerResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ContainerError::Config(format!(
                "Failed to read options from {}: {}",
                path.display(),
                e
            ))
        })?;

        let options: Self = serde_json::from_str(&raw).map_err(|e| {
            ContainerError::Config(format!(
                "Failed to parse options from {}: {}",
                path.display(),
                e
            ))
        })?;

        options.sanitize()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let options = ContainerOptions::default();
        assert!(options.sanitize().is_ok());
        assert!(!options.capture_backtraces);
    }

    #[test]
    fn test_empty_label_rejected() {
        let options = ContainerOptions {
            label: "  ".into(),
            ..Default::default()
        };
        let err = options.sanitize().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{ "label": "api" }"#).unwrap();

        let options = ContainerOptions::from_json_file(&path).unwrap();
        assert_eq!(options.label, "api");
        assert!(!options.capture_backtraces);
    }

    #[test]
    fn test_from_json_file_errors() {
        let dir = TempDir::new().unwrap();

        let missing = ContainerOptions::from_json_file(&dir.path().join("nope.json"));
        assert_eq!(missing.unwrap_err().kind(), ErrorKind::Config);

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ label: ").unwrap();
        let err = ContainerOptions::from_json_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse options"));
    }
}
