use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::AiError;

/**
 * \brief External AI API family a provider talks to.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    OpenAI,
    Anthropic,
    HuggingFace,
    Custom,
}

impl Vendor {
    pub const ALL: [Vendor; 4] = [
        Vendor::OpenAI,
        Vendor::Anthropic,
        Vendor::HuggingFace,
        Vendor::Custom,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Vendor::OpenAI => "openai",
            Vendor::Anthropic => "anthropic",
            Vendor::HuggingFace => "huggingface",
            Vendor::Custom => "custom",
        }
    }

    /**
     * \brief Whether this vendor has an implementation for `capability`.
     * \details HuggingFace only answers sentiment; everything else is `NotImplemented`.
     */
    pub fn supports(self, capability: Capability) -> bool {
        match self {
            Vendor::HuggingFace => capability == Capability::Sentiment,
            Vendor::OpenAI | Vendor::Anthropic | Vendor::Custom => true,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = AiError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "openai" => Ok(Vendor::OpenAI),
            "anthropic" => Ok(Vendor::Anthropic),
            "huggingface" => Ok(Vendor::HuggingFace),
            "custom" => Ok(Vendor::Custom),
            other => Err(AiError::UnsupportedProvider {
                vendor: other.to_string(),
            }),
        }
    }
}

/**
 * \brief One of the five AI operations the gateway routes.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Moderate,
    Sentiment,
    Summarize,
    Translate,
    Categorize,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Moderate,
        Capability::Sentiment,
        Capability::Summarize,
        Capability::Translate,
        Capability::Categorize,
    ];

    /** \brief Short tag, also the sub-path used by custom endpoints. */
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Moderate => "moderate",
            Capability::Sentiment => "sentiment",
            Capability::Summarize => "summarize",
            Capability::Translate => "translate",
            Capability::Categorize => "categorize",
        }
    }

    /** \brief Human wording used in error messages. */
    pub fn label(self) -> &'static str {
        match self {
            Capability::Moderate => "moderation",
            Capability::Sentiment => "sentiment analysis",
            Capability::Summarize => "summarization",
            Capability::Translate => "translation",
            Capability::Categorize => "categorization",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const MASKED_SECRET: &str = "•••••••••••••••••••••••••";

fn mask_secret<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => serializer.serialize_some(MASKED_SECRET),
        None => serializer.serialize_none(),
    }
}

/**
 * \brief A configured AI backend as persisted in the registry.
 * \details `vendor` keeps the raw stored tag; dispatch parses it through [`Vendor::from_str`]
 *          so an out-of-enumeration tag surfaces as `UnsupportedProvider` at call time.
 *          The credential is masked on serialization and redacted from `Debug`.
 */
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /** \brief Row id. */
    pub id: i64,
    /** \brief Display name. */
    pub name: String,
    /** \brief Vendor tag as stored. */
    pub vendor: String,
    /** \brief Vendor-specific model identifier. */
    pub model: String,
    /** \brief Secret credential. */
    #[serde(serialize_with = "mask_secret")]
    pub api_key: Option<String>,
    /** \brief API root; required for `custom`, overrides the vendor default otherwise. */
    pub base_url: Option<String>,
    pub is_default: bool,
    pub is_visible_to_frontend: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ProviderConfig {
    /**
     * \brief Parse the stored vendor tag.
     */
    pub fn vendor_kind(&self) -> Result<Vendor, AiError> {
        self.vendor.parse()
    }

    /**
     * \brief Non-secret projection handed to end-user-facing callers.
     */
    pub fn frontend_view(&self, with_default_flag: bool) -> FrontendProvider {
        FrontendProvider {
            id: self.id,
            name: self.name.clone(),
            vendor: self.vendor.clone(),
            model: self.model.clone(),
            is_default: with_default_flag.then_some(self.is_default),
        }
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("vendor", &self.vendor)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("is_default", &self.is_default)
            .field("is_visible_to_frontend", &self.is_visible_to_frontend)
            .finish()
    }
}

/**
 * \brief Provider fields safe to expose to end users.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendProvider {
    pub id: i64,
    pub name: String,
    #[serde(rename = "provider")]
    pub vendor: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

/**
 * \brief Input for creating a provider.
 */
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProvider {
    pub name: String,
    pub vendor: String,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_visible_to_frontend: bool,
}

/**
 * \brief Partial update; `None` leaves the field untouched.
 */
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUpdate {
    pub name: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub is_default: Option<bool>,
    pub is_visible_to_frontend: Option<bool>,
}

/**
 * \brief Chat message in the OpenAI role/content shape.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /** \brief system/user/assistant */
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResult {
    pub flagged: bool,
    #[serde(default)]
    pub categories: BTreeMap<String, bool>,
    /** \brief 0 (safe) to 1 (certain violation) per category. */
    #[serde(default, alias = "category_scores")]
    pub category_scores: BTreeMap<String, f64>,
    #[serde(default, alias = "notes", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub provider: Vendor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentResult {
    pub sentiment: Sentiment,
    /** \brief -1 (most negative) to 1 (most positive). */
    pub score: f64,
    #[serde(default)]
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_result: Option<Value>,
    pub provider: Vendor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResult {
    pub summary: String,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default, alias = "key_points")]
    pub key_points: Vec<String>,
    pub provider: Vendor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationResult {
    pub original_text: String,
    pub translated_text: String,
    pub target_language: String,
    pub provider: Vendor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResult {
    pub category: String,
    /** \brief 0 to 1. */
    pub confidence: f64,
    #[serde(default)]
    pub explanation: String,
    pub provider: Vendor,
}

/**
 * \brief Outcome of a provider connectivity test.
 */
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderTestReport {
    pub ok: bool,
    pub provider_id: i64,
    pub vendor: String,
    pub model: String,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(api_key: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            id: 7,
            name: "primary".to_string(),
            vendor: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: api_key.map(str::to_string),
            base_url: None,
            is_default: true,
            is_visible_to_frontend: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn vendor_tags_parse_and_reject_unknown() {
        for vendor in Vendor::ALL {
            assert_eq!(vendor.as_str().parse::<Vendor>().unwrap(), vendor);
        }
        let err = "gemini".parse::<Vendor>().unwrap_err();
        assert!(matches!(err, AiError::UnsupportedProvider { .. }));
        assert!("OpenAI".parse::<Vendor>().is_err());
    }

    #[test]
    fn huggingface_supports_sentiment_only() {
        for capability in Capability::ALL {
            assert_eq!(
                Vendor::HuggingFace.supports(capability),
                capability == Capability::Sentiment
            );
            assert!(Vendor::OpenAI.supports(capability));
        }
    }

    #[test]
    fn provider_config_never_leaks_secret() {
        let cfg = sample(Some("sk-live-123"));
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("sk-live-123"));
        assert!(json.contains("\"isVisibleToFrontend\":true"));
        assert!(!format!("{:?}", cfg).contains("sk-live-123"));

        let view = serde_json::to_value(cfg.frontend_view(false)).unwrap();
        assert_eq!(view["provider"], "openai");
        assert!(view.get("isDefault").is_none());
        assert!(view.get("apiKey").is_none());
    }

    #[test]
    fn moderation_result_accepts_vendor_spellings() {
        let v = serde_json::json!({
            "flagged": true,
            "categories": {"hate": true},
            "category_scores": {"hate": 0.91},
            "provider": "openai"
        });
        let parsed: ModerationResult = serde_json::from_value(v).unwrap();
        assert_eq!(parsed.category_scores["hate"], 0.91);

        let out = serde_json::to_value(&parsed).unwrap();
        assert!(out.get("categoryScores").is_some());
        assert!(out.get("reason").is_none());
    }
}
