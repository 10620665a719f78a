use anyhow::Result;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::{post_json, stamp_provider, ResultBounds, VendorAdapter, VendorRequest, COMMENT_SEPARATOR};
use crate::models::{
    Capability, CategoryResult, ModerationResult, SentimentResult, SummaryResult,
    TranslationResult, Vendor,
};

/**
 * \brief Self-hosted service exposing `{base}/{capability}` endpoints that already answer in
 *        the shared result shape.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomAdapter;

impl CustomAdapter {
    async fn call<T: DeserializeOwned + ResultBounds>(
        &self,
        req: &VendorRequest<'_>,
        capability: Capability,
        body: Value,
    ) -> Result<T> {
        let reply = self.send(req, capability, &body).await?;
        stamp_provider(reply, Vendor::Custom)
    }

    async fn send(
        &self,
        req: &VendorRequest<'_>,
        capability: Capability,
        body: &Value,
    ) -> Result<Value> {
        let builder = req
            .client
            .post(req.url(&format!("/{}", capability.as_str())))
            .header(CONTENT_TYPE, "application/json");
        let builder = req.bearer(builder);
        post_json(builder, body).await
    }
}

impl VendorAdapter for CustomAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Custom
    }

    async fn moderate(&self, req: &VendorRequest<'_>, text: &str) -> Result<ModerationResult> {
        self.call(req, Capability::Moderate, json!({ "text": text }))
            .await
    }

    async fn sentiment(&self, req: &VendorRequest<'_>, text: &str) -> Result<SentimentResult> {
        self.call(req, Capability::Sentiment, json!({ "text": text }))
            .await
    }

    async fn summarize(
        &self,
        req: &VendorRequest<'_>,
        comments: &[String],
    ) -> Result<SummaryResult> {
        let text = comments.join(COMMENT_SEPARATOR);
        self.call(req, Capability::Summarize, json!({ "text": text }))
            .await
    }

    async fn translate(
        &self,
        req: &VendorRequest<'_>,
        text: &str,
        target_language: &str,
    ) -> Result<TranslationResult> {
        let mut reply = self
            .send(
                req,
                Capability::Translate,
                &json!({ "text": text, "targetLanguage": target_language }),
            )
            .await?;
        // Services commonly echo only the translation.
        if let Value::Object(map) = &mut reply {
            map.entry("originalText").or_insert_with(|| json!(text));
            map.entry("targetLanguage")
                .or_insert_with(|| json!(target_language));
        }
        stamp_provider(reply, Vendor::Custom)
    }

    async fn categorize(
        &self,
        req: &VendorRequest<'_>,
        text: &str,
        categories: &[String],
    ) -> Result<CategoryResult> {
        self.call(
            req,
            Capability::Categorize,
            json!({ "text": text, "categories": categories }),
        )
        .await
    }
}
