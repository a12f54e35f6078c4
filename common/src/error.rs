//! Error taxonomy shared by every devsync crate.
//!
//! Matches the error handling design: a small set of named, matchable
//! variants for configuration problems (surfaced to the user at startup),
//! everything else flows through `anyhow`.

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("local_dir {0:?} does not exist or is not a directory")]
    LocalDirMissing(std::path::PathBuf),

    #[error("external log file {0:?} does not exist")]
    LogFileMissing(std::path::PathBuf),

    #[error("mapping destination {0:?} does not exist")]
    MappingDestMissing(std::path::PathBuf),

    #[error("mapping link {0:?} does not exist or is not a directory")]
    MappingLinkMissing(std::path::PathBuf),

    #[error("invalid placeholder syntax in mapping pattern {0:?}")]
    InvalidPlaceholder(String),

    #[error("failed to read profile {path:?}: {source}")]
    ProfileRead {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile {path:?}: {source}")]
    ProfileParse {
        path: std::path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
