use reqwest::StatusCode;
use thiserror::Error;

use crate::models::{Capability, Vendor};

/**
 * \brief Errors surfaced by the gateway.
 * \details `NotFound`, `UnsupportedProvider`, `NotImplemented` and `UpstreamFailure` are the
 *          dispatch kinds callers branch on. `InvalidInput` and `Storage` belong to the
 *          registry administration path. Messages never carry credentials or vendor payloads.
 */
#[derive(Debug, Error)]
pub enum AiError {
    /** \brief Provider id does not resolve, or no frontend provider is available. */
    #[error("{0}")]
    NotFound(String),

    /** \brief Vendor tag outside the supported set. */
    #[error("Unsupported AI provider: {vendor}")]
    UnsupportedProvider { vendor: String },

    /** \brief A real vendor without an implementation for the capability. */
    #[error("{vendor} {} not implemented", .capability.label())]
    NotImplemented {
        vendor: Vendor,
        capability: Capability,
    },

    /** \brief Anything unexpected during a vendor call. */
    #[error("Error during AI {}", .capability.label())]
    UpstreamFailure { capability: Capability },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("provider registry unavailable")]
    Storage(#[source] anyhow::Error),
}

impl AiError {
    pub fn provider_not_found() -> Self {
        AiError::NotFound("AI Provider not found".to_string())
    }

    /**
     * \brief HTTP-style status for transport mapping.
     */
    pub fn status(&self) -> StatusCode {
        match self {
            AiError::NotFound(_) => StatusCode::NOT_FOUND,
            AiError::UnsupportedProvider { .. } | AiError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            AiError::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            AiError::UpstreamFailure { .. } | AiError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /** \brief Worth retrying as-is (transient vendor trouble). */
    pub fn is_retryable(&self) -> bool {
        matches!(self, AiError::UpstreamFailure { .. })
    }
}

pub type AiResult<T> = Result<T, AiError>;
