use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidConfig,
    ShardNotFound,
    ShardOpenFailed,
    SeekFailed,
    ReadFailed,
    EvictionTimeout,
    RetriesExhausted,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidConfig => "E1002",
            Self::ShardNotFound => "E2001",
            Self::ShardOpenFailed => "E2002",
            Self::SeekFailed => "E3001",
            Self::ReadFailed => "E3002",
            Self::EvictionTimeout => "E4001",
            Self::RetriesExhausted => "E4002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidConfig => "Invalid store configuration",
            Self::ShardNotFound => "Shard file not found",
            Self::ShardOpenFailed => "Shard file could not be opened",
            Self::SeekFailed => "Seek within shard failed",
            Self::ReadFailed => "Read from shard failed",
            Self::EvictionTimeout => "Timed out waiting to evict a busy handle",
            Self::RetriesExhausted => "Handle cache retry budget exhausted",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in lts.toml and retry."),
            Self::InvalidConfig => {
                Some("shard_size, max_open_handles and max_retries must be greater than zero.")
            }
            Self::ShardNotFound => {
                Some("Check the base path; the range may lie beyond the written data.")
            }
            Self::ShardOpenFailed => Some("Check read permissions on the shard tree."),
            Self::SeekFailed | Self::ReadFailed => {
                Some("Check the underlying storage device for I/O errors.")
            }
            Self::EvictionTimeout => Some(
                "Raise max_open_handles or eviction_wait_ms; every cached handle was busy.",
            ),
            Self::RetriesExhausted => {
                Some("Raise max_open_handles; the cache is thrashing under contention.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by a range read.
///
/// Directory races inside the handle cache never show up here; they are
/// retried internally. Only genuine I/O trouble on the target shard (or a
/// configured wait/retry bound being hit) reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    /// The shard file does not exist. No cache entry was created.
    #[error("shard not found: {}", path.display())]
    ShardNotFound { path: PathBuf },

    /// The shard file exists but could not be opened. No cache entry was created.
    #[error("failed to open shard {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Seeking to the in-shard offset failed. The handle stays cached.
    #[error("failed to seek to {offset} in {}: {source}", path.display())]
    Seek {
        path: PathBuf,
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// Reading from the shard failed with something other than end-of-file.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A blocking eviction waited longer than the configured bound.
    #[error("eviction of {} timed out after {waited:?}", path.display())]
    EvictionTimeout { path: PathBuf, waited: Duration },

    /// The read restarted more often than the configured retry budget allows.
    #[error("gave up on {} after {attempts} attempts", path.display())]
    RetriesExhausted { path: PathBuf, attempts: u32 },

    /// The cache directory was in a state its locking rules exclude.
    #[error("internal error while reading {}: {detail}", path.display())]
    Internal { path: PathBuf, detail: String },
}

impl ReadError {
    /// Build an open error, folding `NotFound` into its own variant.
    #[must_use]
    pub fn from_open(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::ShardNotFound { path }
        } else {
            Self::Open { path, source }
        }
    }

    /// Machine-readable code associated with this read error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::ShardNotFound { .. } => ErrorCode::ShardNotFound,
            Self::Open { .. } => ErrorCode::ShardOpenFailed,
            Self::Seek { .. } => ErrorCode::SeekFailed,
            Self::Read { .. } => ErrorCode::ReadFailed,
            Self::EvictionTimeout { .. } => ErrorCode::EvictionTimeout,
            Self::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
            Self::Internal { .. } => ErrorCode::InternalUnexpected,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// The shard path this error concerns.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::ShardNotFound { path }
            | Self::Open { path, .. }
            | Self::Seek { path, .. }
            | Self::Read { path, .. }
            | Self::EvictionTimeout { path, .. }
            | Self::RetriesExhausted { path, .. }
            | Self::Internal { path, .. } => path,
        }
    }
}

/// Configuration values that cannot describe a working store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("shard_size must be greater than zero")]
    ZeroShardSize,

    #[error("max_open_handles must be greater than zero")]
    ZeroCapacity,

    #[error("max_retries must be greater than zero")]
    ZeroRetries,
}

impl ConfigError {
    /// Machine-readable code associated with this config error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidConfig
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, ReadError};
    use std::collections::HashSet;
    use std::io;
    use std::path::PathBuf;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::InvalidConfig,
            ErrorCode::ShardNotFound,
            ErrorCode::ShardOpenFailed,
            ErrorCode::SeekFailed,
            ErrorCode::ReadFailed,
            ErrorCode::EvictionTimeout,
            ErrorCode::RetriesExhausted,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::ShardNotFound.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn not_found_open_maps_to_shard_not_found() {
        let path = PathBuf::from("00/00/0000000000");
        let err = ReadError::from_open(path.clone(), io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, ReadError::ShardNotFound { .. }));
        assert_eq!(err.code(), ErrorCode::ShardNotFound);
        assert_eq!(err.path(), path.as_path());
    }

    #[test]
    fn permission_denied_open_keeps_source() {
        let err = ReadError::from_open(
            PathBuf::from("00/00/0000000000"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.code(), ErrorCode::ShardOpenFailed);
        assert!(err.hint().is_some());
        assert!(std::error::Error::source(&err).is_some());
    }
}
