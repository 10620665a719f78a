//! Vendor adapters: one per supported AI API family.
//!
//! Each adapter turns the generic capability arguments into the vendor's request shape and
//! parses the reply into the shared result types. Adapters return `anyhow::Result`; a known
//! gateway error (such as `NotImplemented`) travels inside it as an [`AiError`] so the
//! dispatcher can tell it apart from an unexpected failure.

use anyhow::{anyhow, bail, Context, Result};
use reqwest::{header::AUTHORIZATION, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::AiError;
use crate::models::{
    Capability, CategoryResult, ModerationResult, ProviderConfig, SentimentResult, SummaryResult,
    TranslationResult, Vendor,
};

pub mod anthropic;
pub mod custom;
pub mod huggingface;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use custom::CustomAdapter;
pub use huggingface::HuggingFaceAdapter;
pub use openai::OpenAiAdapter;

/** \brief Separator used when several comments are sent as one payload. */
pub const COMMENT_SEPARATOR: &str = "\n\n";

/**
 * \brief Everything an adapter needs for one outbound call.
 */
pub struct VendorRequest<'a> {
    pub client: &'a Client,
    pub provider: &'a ProviderConfig,
    /** \brief API root, already resolved from the provider or the vendor default. */
    pub base: &'a str,
}

impl VendorRequest<'_> {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.trim_end_matches('/'), path)
    }

    /**
     * \brief Add `Authorization: Bearer <key>` when the provider has a credential.
     */
    pub fn bearer(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.provider.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => builder.header(AUTHORIZATION, format!("Bearer {}", key)),
            None => builder,
        }
    }
}

/**
 * \brief Range checks a decoded result must pass before it is handed to callers.
 */
pub(crate) trait ResultBounds {
    fn check_bounds(&self) -> Result<()> {
        Ok(())
    }
}

fn within(field: &str, value: f64, min: f64, max: f64) -> Result<()> {
    if !(min..=max).contains(&value) {
        bail!("{} {} outside [{}, {}]", field, value, min, max);
    }
    Ok(())
}

impl ResultBounds for ModerationResult {
    fn check_bounds(&self) -> Result<()> {
        for (category, score) in &self.category_scores {
            within(&format!("categoryScores.{}", category), *score, 0.0, 1.0)?;
        }
        Ok(())
    }
}

impl ResultBounds for SentimentResult {
    fn check_bounds(&self) -> Result<()> {
        within("score", self.score, -1.0, 1.0)
    }
}

impl ResultBounds for CategoryResult {
    fn check_bounds(&self) -> Result<()> {
        within("confidence", self.confidence, 0.0, 1.0)
    }
}

impl ResultBounds for SummaryResult {}

impl ResultBounds for TranslationResult {}

/**
 * \brief The five capabilities as implemented by one vendor.
 */
#[allow(async_fn_in_trait)]
pub trait VendorAdapter: Send + Sync {
    fn vendor(&self) -> Vendor;

    async fn moderate(&self, req: &VendorRequest<'_>, text: &str) -> Result<ModerationResult>;

    async fn sentiment(&self, req: &VendorRequest<'_>, text: &str) -> Result<SentimentResult>;

    async fn summarize(&self, req: &VendorRequest<'_>, comments: &[String])
        -> Result<SummaryResult>;

    async fn translate(
        &self,
        req: &VendorRequest<'_>,
        text: &str,
        target_language: &str,
    ) -> Result<TranslationResult>;

    async fn categorize(
        &self,
        req: &VendorRequest<'_>,
        text: &str,
        categories: &[String],
    ) -> Result<CategoryResult>;

    /**
     * \brief Error for a capability this vendor deliberately lacks.
     */
    fn not_implemented(&self, capability: Capability) -> anyhow::Error {
        AiError::NotImplemented {
            vendor: self.vendor(),
            capability,
        }
        .into()
    }
}

/**
 * \brief Send a JSON POST and return the decoded JSON reply.
 * \details Non-2xx answers become errors carrying the status and a clipped body.
 */
pub(crate) async fn post_json(builder: RequestBuilder, body: &Value) -> Result<Value> {
    let resp = builder.json(body).send().await?;
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        bail!("request failed: {} -> {}", status, clip(&text, 300));
    }
    resp.json().await.context("vendor reply is not JSON")
}

/**
 * \brief Attach the `provider` tag to a JSON object and deserialize it into a result type.
 * \details Scores outside their documented range are rejected like a shape mismatch.
 */
pub(crate) fn stamp_provider<T>(value: Value, vendor: Vendor) -> Result<T>
where
    T: DeserializeOwned + ResultBounds,
{
    let Value::Object(mut map) = value else {
        bail!("expected a JSON object from {}", vendor);
    };
    map.insert("provider".to_string(), Value::String(vendor.to_string()));
    let result: T = serde_json::from_value(Value::Object(map))
        .with_context(|| format!("{} reply does not match the expected result shape", vendor))?;
    result
        .check_bounds()
        .with_context(|| format!("{} reply is out of range", vendor))?;
    Ok(result)
}

/**
 * \brief Parse a model reply that was prompted to be a bare JSON object.
 */
pub(crate) fn parse_json_reply<T>(content: &str, vendor: Vendor) -> Result<T>
where
    T: DeserializeOwned + ResultBounds,
{
    let value: Value = serde_json::from_str(content.trim())
        .map_err(|e| anyhow!("{} reply is not valid JSON: {}", vendor, e))?;
    stamp_provider(value, vendor)
}

fn clip(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Sentiment;

    pub(crate) fn provider(vendor: &str, base_url: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            id: 1,
            name: format!("{} test", vendor),
            vendor: vendor.to_string(),
            model: "test-model".to_string(),
            api_key: Some("sk-secret-value".to_string()),
            base_url: base_url.map(str::to_string),
            is_default: false,
            is_visible_to_frontend: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn parse_json_reply_tags_provider() {
        let reply = r#"
            {"sentiment": "negative", "score": -0.6, "explanation": "complains about delays"}
        "#;
        let parsed: SentimentResult = parse_json_reply(reply, Vendor::Anthropic).unwrap();
        assert_eq!(parsed.sentiment, Sentiment::Negative);
        assert_eq!(parsed.provider, Vendor::Anthropic);
    }

    #[test]
    fn parse_json_reply_rejects_prose_and_wrong_shape() {
        let err = parse_json_reply::<SentimentResult>("Sure! Here is the JSON", Vendor::OpenAI)
            .unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));

        let err = parse_json_reply::<CategoryResult>(r#"["cost"]"#, Vendor::OpenAI).unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));

        assert!(parse_json_reply::<CategoryResult>(r#"{"confidence": 0.4}"#, Vendor::OpenAI)
            .is_err());
    }

    #[test]
    fn stamp_provider_overwrites_remote_tag() {
        let value = serde_json::json!({
            "summary": "Mostly about parking",
            "themes": ["parking"],
            "keyPoints": ["keep street parking"],
            "provider": "somebody-else"
        });
        let parsed: SummaryResult = stamp_provider(value, Vendor::Custom).unwrap();
        assert_eq!(parsed.provider, Vendor::Custom);
        assert_eq!(parsed.key_points, vec!["keep street parking"]);
    }

    #[test]
    fn out_of_range_numbers_are_rejected() {
        let err = parse_json_reply::<CategoryResult>(
            r#"{"category": "cost", "confidence": 85, "explanation": "percent"}"#,
            Vendor::OpenAI,
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("confidence 85"));

        let sentiment = serde_json::json!({"sentiment": "positive", "score": 7.5});
        assert!(stamp_provider::<SentimentResult>(sentiment, Vendor::Custom).is_err());

        let moderation = serde_json::json!({
            "flagged": true,
            "categories": {"hate": true},
            "categoryScores": {"hate": 1.2}
        });
        assert!(stamp_provider::<ModerationResult>(moderation, Vendor::Anthropic).is_err());
    }

    #[test]
    fn boundary_values_are_accepted() {
        let sentiment: SentimentResult = stamp_provider(
            serde_json::json!({"sentiment": "negative", "score": -1.0}),
            Vendor::Custom,
        )
        .unwrap();
        assert_eq!(sentiment.score, -1.0);

        let category: CategoryResult = stamp_provider(
            serde_json::json!({"category": "cost", "confidence": 1.0, "explanation": ""}),
            Vendor::Custom,
        )
        .unwrap();
        assert_eq!(category.confidence, 1.0);

        let moderation: ModerationResult = stamp_provider(
            serde_json::json!({"flagged": false, "categories": {}, "categoryScores": {"hate": 0.0}}),
            Vendor::OpenAI,
        )
        .unwrap();
        assert!(!moderation.flagged);
    }

    #[test]
    fn bearer_header_only_with_credential() {
        let client = Client::new();
        let mut cfg = provider("custom", None);
        let req = VendorRequest {
            client: &client,
            provider: &cfg,
            base: "http://localhost",
        };
        let built = req.bearer(client.post(req.url("/x"))).build().unwrap();
        assert_eq!(built.headers()[AUTHORIZATION], "Bearer sk-secret-value");

        cfg.api_key = None;
        let req = VendorRequest {
            client: &client,
            provider: &cfg,
            base: "http://localhost",
        };
        let built = req.bearer(client.post(req.url("/x"))).build().unwrap();
        assert!(built.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("héllo", 2), "hé");
        assert_eq!(clip("ok", 10), "ok");
    }
}
