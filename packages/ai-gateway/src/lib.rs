//! Provider registry and capability dispatch for the TransportVoice AI gateway.

pub mod config;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod registry;
pub mod telemetry;
pub mod vendors;

#[cfg(test)]
mod test_support;

pub use config::GatewayConfig;
pub use dispatcher::CapabilityDispatcher;
pub use error::{AiError, AiResult};
pub use registry::ProviderRegistry;

/**
 * \brief Common imports for gateway consumers.
 */
pub mod prelude {
    pub use crate::config::GatewayConfig;
    pub use crate::dispatcher::CapabilityDispatcher;
    pub use crate::error::{AiError, AiResult};
    pub use crate::models::{
        Capability, CategoryResult, FrontendProvider, ModerationResult, NewProvider,
        ProviderConfig, ProviderTestReport, ProviderUpdate, Sentiment, SentimentResult,
        SummaryResult, TranslationResult, Vendor,
    };
    pub use crate::registry::ProviderRegistry;
    pub use crate::telemetry;
}
