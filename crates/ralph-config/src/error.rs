use thiserror::Error;

/// Everything that can go wrong loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file existed but could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// The file that failed to read.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A config file's contents were not valid TOML.
    #[error("parsing {path}: {source}")]
    Parse {
        /// The file that failed to parse.
        path: String,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// A loaded and merged configuration did not deserialize into [`crate::Config`].
    #[error("deserializing merged config: {0}")]
    Deserialize(#[from] toml::de::Error),
    /// A field failed a post-merge sanity check.
    #[error("{field}: {message}")]
    Validation {
        /// Dotted path of the offending field, e.g. `model.temperature`.
        field: String,
        /// Human-readable description of the problem.
        message: String,
    },
}

/// Shorthand for this crate's fallible results.
pub type ConfigResult<T> = Result<T, ConfigError>;
