use std::{env, path::PathBuf, time::Duration};

use crate::models::Vendor;

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com";
pub const DEFAULT_ANTHROPIC_BASE: &str = "https://api.anthropic.com";
pub const DEFAULT_HUGGINGFACE_BASE: &str = "https://api-inference.huggingface.co";

/**
 * \brief Runtime settings for the gateway.
 * \details Read from `TRANSPORTVOICE_*` environment variables; missing or unparsable values
 *          fall back to the defaults below.
 */
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /** \brief SQLite file holding the provider registry. */
    pub db_path: PathBuf,
    /** \brief Whole-request timeout for vendor calls. */
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub openai_base: String,
    pub anthropic_base: String,
    pub huggingface_base: String,
    /** \brief Max in-flight calls for batch moderation. */
    pub batch_concurrency: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("transportvoice.db"),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            openai_base: DEFAULT_OPENAI_BASE.to_string(),
            anthropic_base: DEFAULT_ANTHROPIC_BASE.to_string(),
            huggingface_base: DEFAULT_HUGGINGFACE_BASE.to_string(),
            batch_concurrency: 4,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /**
     * \brief Build from an arbitrary key lookup (the environment in production).
     */
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            db_path: non_empty("TRANSPORTVOICE_DB")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            request_timeout: non_empty("TRANSPORTVOICE_AI_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            connect_timeout: defaults.connect_timeout,
            openai_base: non_empty("TRANSPORTVOICE_OPENAI_BASE").unwrap_or(defaults.openai_base),
            anthropic_base: non_empty("TRANSPORTVOICE_ANTHROPIC_BASE")
                .unwrap_or(defaults.anthropic_base),
            huggingface_base: non_empty("TRANSPORTVOICE_HUGGINGFACE_BASE")
                .unwrap_or(defaults.huggingface_base),
            batch_concurrency: non_empty("TRANSPORTVOICE_BATCH_CONCURRENCY")
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_concurrency),
        }
    }

    /**
     * \brief API root for a built-in vendor. `custom` has none; its root lives on the provider.
     */
    pub fn vendor_base(&self, vendor: Vendor) -> Option<&str> {
        match vendor {
            Vendor::OpenAI => Some(&self.openai_base),
            Vendor::Anthropic => Some(&self.anthropic_base),
            Vendor::HuggingFace => Some(&self.huggingface_base),
            Vendor::Custom => None,
        }
    }
}
