use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{error::OAuthError, types::CredentialRecord};

/// Default name of the Google Ads configuration document.
pub const DEFAULT_CONFIG_FILE: &str = "google-ads.yaml";

/// YAML document holding the API credentials and refresh token.
///
/// Single-operator store: no locking, no versioning. Every save rewrites the
/// whole document.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<CredentialRecord, OAuthError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OAuthError::ConfigNotFound {
                    path: self.path.clone(),
                });
            },
            Err(source) => {
                return Err(OAuthError::ConfigIo {
                    path: self.path.clone(),
                    source,
                });
            },
        };

        // An empty document parses as null.
        if content.trim().is_empty() {
            return Ok(CredentialRecord::default());
        }

        let record =
            serde_yaml::from_str(&content).map_err(|source| OAuthError::ConfigParse {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), "loaded credential record");
        Ok(record)
    }

    /// Write the record to a sibling temp file, then rename it over the
    /// target.
    pub fn save(&self, record: &CredentialRecord) -> Result<(), OAuthError> {
        let yaml = serde_yaml::to_string(record).map_err(|e| self.serialize_error(e))?;

        let tmp = self.temp_path();
        let io_err = |source| OAuthError::ConfigIo {
            path: self.path.clone(),
            source,
        };
        fs::write(&tmp, yaml).map_err(io_err)?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(io_err(e));
        }

        debug!(path = %self.path.display(), "saved credential record");
        Ok(())
    }

    /// Rendering failures are write-side errors, not a malformed document.
    fn serialize_error(&self, source: serde_yaml::Error) -> OAuthError {
        OAuthError::ConfigIo {
            path: self.path.clone(),
            source: io::Error::other(source),
        }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}
