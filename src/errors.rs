/*!
 * Error types for the scenecraft application.
 *
 * Errors are split by how far they are allowed to travel:
 * - `ProviderError`: a single LLM/HTTP call went wrong
 * - `StageError`: one item (chapter or scene) of a stage failed; always
 *   contained by the orchestrator and mapped to a fallback
 * - `PipelineError`: the run itself failed; surfaced to the caller once
 */

use thiserror::Error;

use crate::pipeline::state::PipelineStage;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

impl ProviderError {
    /// Whether the provider could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ProviderError::ConnectionError(_))
    }
}

/// Item-level failure of a stage collaborator.
///
/// These never unwind past their stage: the orchestrator swaps the failed
/// item for its deterministic fallback.
#[derive(Error, Debug)]
pub enum StageError {
    /// The underlying model provider failed
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The collaborator answered, but the answer is missing required fields
    #[error("Malformed output: {0}")]
    Malformed(String),

    /// The collaborator did not answer within the item timeout
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// The collaborator (or a tool it depends on) cannot be reached
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// Local file or process failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    /// Whether this failure means the collaborator is unreachable rather than
    /// merely producing a bad answer for this item.
    pub fn is_unreachable(&self) -> bool {
        match self {
            StageError::Unavailable(_) => true,
            StageError::Provider(e) => e.is_unreachable(),
            _ => false,
        }
    }
}

/// Run-level failures. Any of these moves the run to `Failed`.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source text could not be split into chapters
    #[error("Segmentation failed: {0}")]
    Segmentation(String),

    /// Every item of a stage failed because its collaborator is unreachable
    #[error("{stage} failed: collaborator unreachable ({reason})")]
    Unreachable {
        /// Stage whose collaborator was down
        stage: PipelineStage,
        /// Last error observed
        reason: String,
    },

    /// The run was cancelled by the caller
    #[error("Run cancelled during {0}")]
    Cancelled(PipelineStage),

    /// Final assembly found the accumulated records inconsistent
    #[error("Finalization failed: {0}")]
    Finalization(String),

    /// The orchestrator attempted a transition the state machine forbids
    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition {
        /// Current stage
        from: PipelineStage,
        /// Requested stage
        to: PipelineStage,
    },

    /// The background run task panicked or was aborted
    #[error("Run task failed: {0}")]
    Join(String),
}

impl PipelineError {
    /// Stage the failure is attributed to, used in the terminal progress message.
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            PipelineError::Segmentation(_) => Some(PipelineStage::Segmenting),
            PipelineError::Unreachable { stage, .. } => Some(*stage),
            PipelineError::Cancelled(stage) => Some(*stage),
            PipelineError::Finalization(_) => Some(PipelineStage::Finalizing),
            PipelineError::InvalidTransition { from, .. } => Some(*from),
            PipelineError::Join(_) => None,
        }
    }
}
