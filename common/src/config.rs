//! Configuration types: dev/exec profiles and the ambient runtime/output/tracing knobs.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Runtime configuration for tokio and thread pools.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores).
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default).
    pub max_blocking_threads: usize,
}

/// Output and logging verbosity configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress non-error output.
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE.
    pub verbose: u8,
}

/// Tracing configuration for the process's local subscriber.
#[derive(Debug, Default)]
pub struct TracingConfig {
    /// When set, a [`crate::logging::CapturingLayer`] is installed alongside
    /// the fmt layer and every event is forwarded on this channel.
    pub capture_layer: Option<crate::logging::CapturingLayer>,
    /// Optional extra debug log file, written in addition to stderr.
    pub debug_log_file: Option<PathBuf>,
}

/// Dev-side connection profile (§6: "Dev profile").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DevProfile {
    pub remote_host: String,
    #[serde(default = "default_ssh_port")]
    pub remote_port: u16,
    pub ssh_username: String,
    pub ssh_password: String,
    pub local_dir: PathBuf,
}

fn default_ssh_port() -> u16 {
    22
}

impl DevProfile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ProfileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut profile: Self =
            toml::from_str(&text).map_err(|source| ConfigError::ProfileParse {
                path: path.to_path_buf(),
                source,
            })?;
        profile.ssh_password = unescape_password(&profile.ssh_password);
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.local_dir.is_dir() {
            return Err(ConfigError::LocalDirMissing(self.local_dir.clone()));
        }
        Ok(())
    }
}

/// A single entry of the exec-side mapping table (§3 "Mapping", §6 "Exec profile").
///
/// `link`, like `dest`, is a directory prefix: the matched mapping prefix is
/// substituted with it per file, the same way `dest` is (§4.4, mirroring
/// `original_source/pyremotedev/file.py`'s `path.replace(src, link, 1)`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct MappingEntry {
    pub dest: PathBuf,
    #[serde(default)]
    pub link: Option<PathBuf>,
}

/// Exec-side profile (§6: "Exec profile").
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExecProfile {
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,
    pub mappings: std::collections::BTreeMap<String, MappingEntry>,
}

impl ExecProfile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ProfileRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::ProfileParse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(log_file) = &self.log_file_path {
            if !log_file.is_file() {
                return Err(ConfigError::LogFileMissing(log_file.clone()));
            }
        }
        for entry in self.mappings.values() {
            if !entry.dest.is_dir() {
                return Err(ConfigError::MappingDestMissing(entry.dest.clone()));
            }
            if let Some(link) = &entry.link {
                if !link.is_dir() {
                    return Err(ConfigError::MappingLinkMissing(link.clone()));
                }
            }
        }
        Ok(())
    }
}

/// Escape a password for on-disk storage: a literal `%` becomes `%%` (§6).
pub fn escape_password(password: &str) -> String {
    password.replace('%', "%%")
}

/// Reverse of [`escape_password`].
pub fn unescape_password(escaped: &str) -> String {
    escaped.replace("%%", "%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_escape_roundtrip() {
        let original = "p%ss%word";
        let escaped = escape_password(original);
        assert_eq!(escaped, "p%%ss%%word");
        assert_eq!(unescape_password(&escaped), original);
    }

    #[test]
    fn dev_profile_parses_defaults() {
        let toml_text = r#"
            remote_host = "box.local"
            ssh_username = "pi"
            ssh_password = "secret"
            local_dir = "/tmp"
        "#;
        let profile: DevProfile = toml::from_str(toml_text).unwrap();
        assert_eq!(profile.remote_port, 22);
    }
}
