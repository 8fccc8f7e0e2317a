use clickdown_api::FetchError;

use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::sink::SinkError;

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Retries exhausted (or a non-retryable status) for one list
    #[error("List {list_id} could not be fetched: {source}")]
    LeafFatal {
        list_id: String,
        #[source]
        source: FetchError,
    },

    /// Listing the children of a hierarchy node failed
    #[error("Listing {node} failed: {source}")]
    Structural {
        node: String,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Extraction aborted: {message}")]
    Fatal { message: String },
}

impl ExtractError {
    /// Classify a failed page fetch. Malformed payloads are never absorbed.
    pub fn from_page_failure(list_id: &str, source: FetchError) -> Self {
        if source.is_fatal_for_leaf() {
            ExtractError::LeafFatal {
                list_id: list_id.to_string(),
                source,
            }
        } else {
            ExtractError::Fatal {
                message: format!("list {}: {}", list_id, source),
            }
        }
    }

    /// Errors the engine logs and steps over instead of failing the run
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExtractError::LeafFatal { .. } | ExtractError::Structural { .. }
        )
    }
}
