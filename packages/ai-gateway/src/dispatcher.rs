use std::time::Instant;

use anyhow::anyhow;
use futures_util::{stream, StreamExt};
use reqwest::Client;

use crate::config::GatewayConfig;
use crate::error::{AiError, AiResult};
use crate::models::{
    Capability, CategoryResult, ModerationResult, ProviderConfig, ProviderTestReport,
    SentimentResult, SummaryResult, TranslationResult, Vendor,
};
use crate::registry::ProviderRegistry;
use crate::telemetry;
use crate::vendors::{
    AnthropicAdapter, CustomAdapter, HuggingFaceAdapter, OpenAiAdapter, VendorAdapter,
    VendorRequest,
};

const TEST_PROBE_TEXT: &str = "Connection test: the new bus lane works well.";

/**
 * \brief Resolve the provider, pick the adapter for its vendor, run one capability call and
 *        normalize the outcome.
 * \details `$call` sees the concrete adapter as `$adapter` and the request as `$req`.
 */
macro_rules! dispatch {
    ($self:ident, $provider_id:expr, $capability:expr, |$adapter:ident, $req:ident| $call:expr) => {{
        let capability = $capability;
        let target = $self.resolve($provider_id).await?;
        let started = Instant::now();
        let outcome = match target.base.as_deref() {
            None => Err(anyhow!(
                "no API base configured for provider {}",
                target.provider.id
            )),
            Some(base) => {
                let $req = VendorRequest {
                    client: &$self.client,
                    provider: &target.provider,
                    base,
                };
                match target.vendor {
                    Vendor::OpenAI => {
                        let $adapter = OpenAiAdapter;
                        $call.await
                    }
                    Vendor::Anthropic => {
                        let $adapter = AnthropicAdapter;
                        $call.await
                    }
                    Vendor::HuggingFace => {
                        let $adapter = HuggingFaceAdapter;
                        $call.await
                    }
                    Vendor::Custom => {
                        let $adapter = CustomAdapter;
                        $call.await
                    }
                }
            }
        };
        $self.finish(&target, capability, started, outcome)
    }};
}

/** \brief Provider resolved for one call. */
struct Target {
    provider: ProviderConfig,
    vendor: Vendor,
    base: Option<String>,
}

/**
 * \brief Entry point for the five AI capabilities.
 * \details Every call re-reads the provider from the registry, so configuration changes apply
 *          to the next request. Callers only ever see [`AiError`] kinds.
 */
#[derive(Clone)]
pub struct CapabilityDispatcher {
    registry: ProviderRegistry,
    client: Client,
    config: GatewayConfig,
}

impl CapabilityDispatcher {
    pub fn new(registry: ProviderRegistry, config: GatewayConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            registry,
            client,
            config,
        })
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub async fn moderate_content(
        &self,
        text: &str,
        provider_id: i64,
    ) -> AiResult<ModerationResult> {
        dispatch!(self, provider_id, Capability::Moderate, |adapter, req| {
            adapter.moderate(&req, text)
        })
    }

    pub async fn analyze_sentiment(
        &self,
        text: &str,
        provider_id: i64,
    ) -> AiResult<SentimentResult> {
        dispatch!(self, provider_id, Capability::Sentiment, |adapter, req| {
            adapter.sentiment(&req, text)
        })
    }

    /**
     * \brief Summarize a batch of comments in one vendor call.
     */
    pub async fn summarize_comments(
        &self,
        comments: &[String],
        provider_id: i64,
    ) -> AiResult<SummaryResult> {
        dispatch!(self, provider_id, Capability::Summarize, |adapter, req| {
            adapter.summarize(&req, comments)
        })
    }

    pub async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        provider_id: i64,
    ) -> AiResult<TranslationResult> {
        dispatch!(self, provider_id, Capability::Translate, |adapter, req| {
            adapter.translate(&req, text, target_language)
        })
    }

    /**
     * \brief Assign `text` to one of `categories`.
     * \details The vendor's answer is passed through even when it names a category outside
     *          the candidates; that case is logged.
     */
    pub async fn categorize_comment(
        &self,
        text: &str,
        categories: &[String],
        provider_id: i64,
    ) -> AiResult<CategoryResult> {
        if categories.iter().all(|c| c.trim().is_empty()) {
            return Err(AiError::InvalidInput(
                "at least one category is required".to_string(),
            ));
        }
        let result = dispatch!(self, provider_id, Capability::Categorize, |adapter, req| {
            adapter.categorize(&req, text, categories)
        })?;
        if !categories
            .iter()
            .any(|c| c.trim().eq_ignore_ascii_case(result.category.trim()))
        {
            tracing::warn!(
                provider_id,
                category = %result.category,
                "vendor picked a category outside the candidate set"
            );
        }
        Ok(result)
    }

    /**
     * \brief Moderate several texts concurrently. Results keep input order and fail
     *        independently.
     */
    pub async fn moderate_batch(
        &self,
        texts: &[String],
        provider_id: i64,
    ) -> Vec<AiResult<ModerationResult>> {
        stream::iter(texts.iter().map(|text| self.moderate_content(text, provider_id)))
            .buffered(self.config.batch_concurrency.max(1))
            .collect()
            .await
    }

    /**
     * \brief Send a small sentiment probe through the normal path and report how it went.
     * \details Only an unknown id is raised; every other failure lands in the report.
     */
    pub async fn test_provider(&self, provider_id: i64) -> AiResult<ProviderTestReport> {
        let provider = self.registry.get_provider_config(provider_id).await?;
        let started = Instant::now();
        let outcome = self.analyze_sentiment(TEST_PROBE_TEXT, provider_id).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        Ok(ProviderTestReport {
            ok: outcome.is_ok(),
            provider_id,
            vendor: provider.vendor,
            model: provider.model,
            latency_ms,
            error: outcome.err().map(|e| e.to_string()),
        })
    }

    async fn resolve(&self, provider_id: i64) -> AiResult<Target> {
        let provider = self.registry.get_provider_config(provider_id).await?;
        let vendor = provider.vendor_kind()?;
        let base = provider
            .base_url
            .clone()
            .or_else(|| self.config.vendor_base(vendor).map(str::to_string));
        Ok(Target {
            provider,
            vendor,
            base,
        })
    }

    fn finish<T>(
        &self,
        target: &Target,
        capability: Capability,
        started: Instant,
        outcome: anyhow::Result<T>,
    ) -> AiResult<T> {
        let provider_id = target.provider.id;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(value) => {
                tracing::debug!(provider_id, vendor = %target.vendor, capability = capability.as_str(), elapsed_ms, "ai call ok");
                telemetry::log_event(
                    "ai",
                    &format!(
                        "{} provider={} vendor={} ok {}ms",
                        capability.as_str(),
                        provider_id,
                        target.vendor,
                        elapsed_ms
                    ),
                );
                Ok(value)
            }
            Err(err) => {
                let err = match err.downcast::<AiError>() {
                    Ok(known) => {
                        tracing::info!(provider_id, vendor = %target.vendor, capability = capability.as_str(), "{}", known);
                        known
                    }
                    Err(other) => {
                        let detail = redact(&format!("{:#}", other), target.provider.api_key.as_deref());
                        tracing::error!(
                            provider_id,
                            vendor = %target.vendor,
                            capability = capability.as_str(),
                            error = %detail,
                            "ai call failed"
                        );
                        AiError::UpstreamFailure { capability }
                    }
                };
                telemetry::log_error(
                    "ai",
                    &format!(
                        "{} provider={} vendor={} failed: {}",
                        capability.as_str(),
                        provider_id,
                        target.vendor,
                        err
                    ),
                );
                Err(err)
            }
        }
    }
}

fn redact(message: &str, secret: Option<&str>) -> String {
    match secret {
        Some(secret) if !secret.is_empty() => message.replace(secret, "[redacted]"),
        _ => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{NewProvider, Sentiment};
    use crate::test_support::mock_vendor;
    use axum::http::StatusCode;
    use rusqlite::{params, Connection};
    use serde_json::json;

    fn chat_reply(content: &str) -> serde_json::Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    fn new_provider(vendor: &str, base_url: Option<&str>) -> NewProvider {
        NewProvider {
            name: format!("{} provider", vendor),
            vendor: vendor.to_string(),
            model: "test-model".to_string(),
            api_key: Some("sk-live-very-secret".to_string()),
            base_url: base_url.map(str::to_string),
            is_default: false,
            is_visible_to_frontend: true,
        }
    }

    async fn dispatcher_with(vendor: &str, base_url: Option<&str>) -> (CapabilityDispatcher, i64) {
        let registry = ProviderRegistry::in_memory().unwrap();
        let provider = registry
            .create_provider(new_provider(vendor, base_url))
            .await
            .unwrap();
        let dispatcher = CapabilityDispatcher::new(registry, GatewayConfig::default()).unwrap();
        (dispatcher, provider.id)
    }

    #[tokio::test]
    async fn unknown_provider_id_is_not_found() {
        let registry = ProviderRegistry::in_memory().unwrap();
        let dispatcher = CapabilityDispatcher::new(registry, GatewayConfig::default()).unwrap();
        let err = dispatcher.moderate_content("hi", 42).await.unwrap_err();
        assert!(matches!(err, AiError::NotFound(_)));
        assert_eq!(err.to_string(), "AI Provider not found");
        assert!(matches!(
            dispatcher.test_provider(42).await,
            Err(AiError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn stored_unknown_vendor_is_unsupported() {
        let conn = Connection::open_in_memory().unwrap();
        db::migrate(&conn).unwrap();
        conn.execute(
            "INSERT INTO providers (name, vendor, model, api_key, is_default, is_visible_to_frontend, created_at, updated_at)
             VALUES ('g', 'gemini', 'gemini-pro', 'k', 0, 1, ?1, ?1)",
            params![db::now_rfc3339().unwrap()],
        )
        .unwrap();
        let id = conn.last_insert_rowid();
        let registry = ProviderRegistry::from_connection(conn).unwrap();
        let dispatcher = CapabilityDispatcher::new(registry, GatewayConfig::default()).unwrap();

        let err = dispatcher.analyze_sentiment("ok", id).await.unwrap_err();
        assert!(matches!(err, AiError::UnsupportedProvider { ref vendor } if vendor == "gemini"));
        assert_eq!(err.status().as_u16(), 400);

        let report = dispatcher.test_provider(id).await.unwrap();
        assert!(!report.ok);
        assert_eq!(report.error.as_deref(), Some("Unsupported AI provider: gemini"));
    }

    #[tokio::test]
    async fn huggingface_lacks_everything_but_sentiment() {
        let (dispatcher, id) = dispatcher_with("huggingface", Some("http://127.0.0.1:1")).await;
        let comments = vec!["a".to_string()];
        let categories = vec!["cost".to_string()];

        let errors = [
            dispatcher.moderate_content("x", id).await.unwrap_err(),
            dispatcher.summarize_comments(&comments, id).await.unwrap_err(),
            dispatcher.translate_text("x", "fr", id).await.unwrap_err(),
            dispatcher
                .categorize_comment("x", &categories, id)
                .await
                .unwrap_err(),
        ];
        for err in &errors {
            assert!(matches!(
                err,
                AiError::NotImplemented {
                    vendor: Vendor::HuggingFace,
                    ..
                }
            ));
            assert_eq!(err.status().as_u16(), 501);
        }
        assert_eq!(errors[0].to_string(), "huggingface moderation not implemented");
    }

    #[tokio::test]
    async fn network_failure_is_upstream_and_hides_secret() {
        let (dispatcher, id) = dispatcher_with("openai", Some("http://127.0.0.1:1")).await;
        let err = dispatcher.analyze_sentiment("fine", id).await.unwrap_err();
        assert!(matches!(
            err,
            AiError::UpstreamFailure {
                capability: Capability::Sentiment
            }
        ));
        assert_eq!(err.status().as_u16(), 500);
        assert_eq!(err.to_string(), "Error during AI sentiment analysis");
        assert!(!format!("{:?}", err).contains("sk-live-very-secret"));
    }

    #[tokio::test]
    async fn vendor_error_status_is_upstream() {
        let mock = mock_vendor(
            "/v1/moderations",
            StatusCode::UNAUTHORIZED,
            json!({"error": {"message": "Incorrect API key provided: sk-live-very-secret"}}),
        )
        .await;
        let (dispatcher, id) = dispatcher_with("openai", Some(&mock.base)).await;
        let err = dispatcher.moderate_content("x", id).await.unwrap_err();
        assert_eq!(err.to_string(), "Error during AI moderation");
    }

    #[tokio::test]
    async fn openai_categorize_round_trip() {
        let mock = mock_vendor(
            "/v1/chat/completions",
            StatusCode::OK,
            chat_reply(r#"{"category":"cost","confidence":0.82,"explanation":"mentions parking fees"}"#),
        )
        .await;
        let (dispatcher, id) = dispatcher_with("openai", Some(&mock.base)).await;
        let categories = vec!["safety".to_string(), "cost".to_string()];
        let result = dispatcher
            .categorize_comment("Parking fees are too high", &categories, id)
            .await
            .unwrap();
        assert_eq!(result.category, "cost");
        assert_eq!(result.confidence, 0.82);
        assert_eq!(result.provider, Vendor::OpenAI);

        let calls = mock.calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0["authorization"], "Bearer sk-live-very-secret");
    }

    #[tokio::test]
    async fn categorize_passes_through_unlisted_category() {
        let mock = mock_vendor(
            "/v1/chat/completions",
            StatusCode::OK,
            chat_reply(r#"{"category":"noise","confidence":0.4,"explanation":"mentions loud buses"}"#),
        )
        .await;
        let (dispatcher, id) = dispatcher_with("openai", Some(&mock.base)).await;
        let categories = vec!["safety".to_string(), "cost".to_string()];
        let result = dispatcher
            .categorize_comment("Buses are loud", &categories, id)
            .await
            .unwrap();
        assert_eq!(result.category, "noise");
    }

    #[tokio::test]
    async fn empty_categories_are_rejected_before_any_call() {
        let mock = mock_vendor("/v1/chat/completions", StatusCode::OK, chat_reply("{}")).await;
        let (dispatcher, id) = dispatcher_with("openai", Some(&mock.base)).await;
        let err = dispatcher
            .categorize_comment("text", &[], id)
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::InvalidInput(_)));
        assert!(mock.calls().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_model_reply_is_upstream() {
        let mock = mock_vendor(
            "/v1/chat/completions",
            StatusCode::OK,
            chat_reply("Sure! The sentiment is positive."),
        )
        .await;
        let (dispatcher, id) = dispatcher_with("openai", Some(&mock.base)).await;
        let err = dispatcher.analyze_sentiment("Great", id).await.unwrap_err();
        assert!(matches!(err, AiError::UpstreamFailure { .. }));
    }

    #[tokio::test]
    async fn out_of_range_confidence_is_upstream() {
        let mock = mock_vendor(
            "/v1/chat/completions",
            StatusCode::OK,
            chat_reply(r#"{"category":"cost","confidence":85,"explanation":"mostly about fees"}"#),
        )
        .await;
        let (dispatcher, id) = dispatcher_with("openai", Some(&mock.base)).await;
        let categories = vec!["safety".to_string(), "cost".to_string()];
        let err = dispatcher
            .categorize_comment("Fees again", &categories, id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AiError::UpstreamFailure {
                capability: Capability::Categorize
            }
        ));
    }

    #[tokio::test]
    async fn huggingface_error_object_is_upstream() {
        let mock = mock_vendor(
            "/models/test-model",
            StatusCode::OK,
            json!({"error": "Model test-model is currently loading"}),
        )
        .await;
        let (dispatcher, id) = dispatcher_with("huggingface", Some(&mock.base)).await;
        let err = dispatcher.analyze_sentiment("ok", id).await.unwrap_err();
        assert!(matches!(
            err,
            AiError::UpstreamFailure {
                capability: Capability::Sentiment
            }
        ));
    }

    #[tokio::test]
    async fn custom_provider_routes_to_capability_path() {
        let mock = mock_vendor(
            "/sentiment",
            StatusCode::OK,
            json!({"sentiment": "negative", "score": -0.6, "explanation": "complaint"}),
        )
        .await;
        let (dispatcher, id) = dispatcher_with("custom", Some(&mock.base)).await;
        let result = dispatcher.analyze_sentiment("Too slow", id).await.unwrap();
        assert_eq!(result.sentiment, Sentiment::Negative);
        assert_eq!(result.provider, Vendor::Custom);

        let report = dispatcher.test_provider(id).await.unwrap();
        assert!(report.ok);
        assert!(report.error.is_none());
        assert_eq!(report.vendor, "custom");
    }

    #[tokio::test]
    async fn batch_keeps_order_and_isolates_failures() {
        let mock = mock_vendor(
            "/moderate",
            StatusCode::OK,
            json!({"flagged": false, "categories": {}, "categoryScores": {}}),
        )
        .await;
        let (dispatcher, id) = dispatcher_with("custom", Some(&mock.base)).await;
        let texts: Vec<String> = (0..6).map(|i| format!("comment {}", i)).collect();

        let results = dispatcher.moderate_batch(&texts, id).await;
        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.is_ok()));

        let bodies: Vec<_> = mock.calls().await.into_iter().map(|(_, b)| b).collect();
        assert_eq!(bodies.len(), 6);
        for text in &texts {
            assert!(bodies.contains(&json!({ "text": text })));
        }

        let missing = dispatcher.moderate_batch(&texts[..2], id + 100).await;
        assert!(missing
            .iter()
            .all(|r| matches!(r, Err(AiError::NotFound(_)))));
    }

    #[test]
    fn redact_strips_credential() {
        assert_eq!(
            redact("bad key sk-1 rejected", Some("sk-1")),
            "bad key [redacted] rejected"
        );
        assert_eq!(redact("plain", Some("")), "plain");
        assert_eq!(redact("plain", None), "plain");
    }
}
