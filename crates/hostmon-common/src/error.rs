use crate::types::{EntityId, EntityKind};

/// Errors raised while reading counters or turning them into rates.
///
/// None of these stop the polling loop. A collector that fails drops its
/// family from the current snapshot and the agent moves on to the next poll.
///
/// # Examples
///
/// ```rust
/// use hostmon_common::error::CollectError;
/// use hostmon_common::types::EntityId;
///
/// let err = CollectError::vanished(&EntityId::process("qemu", 4242));
/// assert!(err.to_string().contains("4242"));
/// assert!(err.is_vanished());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    /// The counter source could not be read at all.
    #[error("{source_name} unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    /// A previously tracked process or device is gone.
    #[error("{kind} {key} vanished")]
    EntityVanished { kind: EntityKind, key: String },

    /// A line that could not be parsed into counters.
    #[error("malformed sample from {source_name}: {line}")]
    MalformedSample { source_name: String, line: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CollectError {
    pub fn unavailable(source_name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        CollectError::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn vanished(id: &EntityId) -> Self {
        CollectError::EntityVanished {
            kind: id.kind(),
            key: id.key(),
        }
    }

    pub fn malformed(source_name: impl Into<String>, line: impl Into<String>) -> Self {
        CollectError::MalformedSample {
            source_name: source_name.into(),
            line: line.into(),
        }
    }

    pub fn is_vanished(&self) -> bool {
        matches!(self, CollectError::EntityVanished { .. })
    }
}

/// Convenience `Result` alias for collection.
pub type Result<T> = std::result::Result<T, CollectError>;

/// Errors from loading or validating the agent configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config '{path}': {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}
