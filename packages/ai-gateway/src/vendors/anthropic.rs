use anyhow::{bail, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

use super::{parse_json_reply, post_json, VendorAdapter, VendorRequest, COMMENT_SEPARATOR};
use crate::models::{
    CategoryResult, Message, ModerationResult, SentimentResult, SummaryResult, TranslationResult,
    Vendor,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MESSAGES_PATH: &str = "/v1/messages";

const SHORT_MAX_TOKENS: u32 = 1000;
const LONG_MAX_TOKENS: u32 = 2000;

const PRECISE_TEMPERATURE: f64 = 0.0;
const SUMMARY_TEMPERATURE: f64 = 0.2;

fn moderation_prompt(text: &str) -> String {
    format!(
        "Please analyze if the following text contains any harmful, unsafe, or inappropriate content. Respond with ONLY a JSON object with these fields: \"flagged\" (boolean), \"categories\" (object with boolean values for the categories \"harassment\", \"hate\", \"self_harm\", \"sexual\", \"violence\"), \"categoryScores\" (object with scores between 0 and 1 for each category), and \"reason\" (brief explanation if flagged).\n\nText to analyze:\n\"{}\"",
        text
    )
}

fn sentiment_prompt(text: &str) -> String {
    format!(
        "Analyze the sentiment of the following text and respond with ONLY a JSON object with these fields: \"sentiment\" (one of \"positive\", \"neutral\", \"negative\"), \"score\" (number between -1 and 1), and \"explanation\" (brief explanation of the sentiment).\n\nText to analyze:\n\"{}\"",
        text
    )
}

fn summary_prompt(combined: &str) -> String {
    format!(
        "Provide a concise summary of the following comments from a community transportation planning project. Group them by themes and highlight the most important concerns and suggestions. Respond with ONLY a JSON object with these fields: \"summary\" (overall summary), \"themes\" (array of main themes), and \"keyPoints\" (array of key points).\n\nComments:\n\"{}\"",
        combined
    )
}

fn translation_prompt(text: &str, target_language: &str) -> String {
    format!(
        "Translate the following text to {}. Preserve formatting and provide ONLY the translated text without any explanation or metadata.\n\nText to translate:\n\"{}\"",
        target_language, text
    )
}

fn categorization_prompt(text: &str, categories: &[String]) -> String {
    format!(
        "Categorize the following comment from a transportation planning project into one of these categories: {}. Respond with ONLY a JSON object with these fields: \"category\" (the most appropriate category), \"confidence\" (number between 0 and 1), and \"explanation\" (brief explanation of why this category was chosen).\n\nComment to categorize:\n\"{}\"",
        categories.join(", "),
        text
    )
}

/**
 * \brief Anthropic Messages API; every capability, moderation included, is prompt-based.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

impl AnthropicAdapter {
    async fn complete(
        &self,
        req: &VendorRequest<'_>,
        prompt: String,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = req.provider.api_key.as_deref().filter(|k| !k.is_empty()) {
            headers.insert("x-api-key", HeaderValue::from_str(key)?);
        }
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let body = json!({
            "model": req.provider.model,
            "messages": [Message::user(prompt)],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });
        let builder = req.client.post(req.url(MESSAGES_PATH)).headers(headers);
        let v = post_json(builder, &body).await?;
        let text = extract_anthropic_content(&v);
        if text.is_empty() {
            bail!("anthropic reply has no text content");
        }
        Ok(text)
    }
}

impl VendorAdapter for AnthropicAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::Anthropic
    }

    async fn moderate(&self, req: &VendorRequest<'_>, text: &str) -> Result<ModerationResult> {
        let content = self
            .complete(
                req,
                moderation_prompt(text),
                SHORT_MAX_TOKENS,
                PRECISE_TEMPERATURE,
            )
            .await?;
        parse_json_reply(&content, Vendor::Anthropic)
    }

    async fn sentiment(&self, req: &VendorRequest<'_>, text: &str) -> Result<SentimentResult> {
        let content = self
            .complete(
                req,
                sentiment_prompt(text),
                SHORT_MAX_TOKENS,
                PRECISE_TEMPERATURE,
            )
            .await?;
        parse_json_reply(&content, Vendor::Anthropic)
    }

    async fn summarize(
        &self,
        req: &VendorRequest<'_>,
        comments: &[String],
    ) -> Result<SummaryResult> {
        let combined = comments.join(COMMENT_SEPARATOR);
        let content = self
            .complete(
                req,
                summary_prompt(&combined),
                LONG_MAX_TOKENS,
                SUMMARY_TEMPERATURE,
            )
            .await?;
        parse_json_reply(&content, Vendor::Anthropic)
    }

    async fn translate(
        &self,
        req: &VendorRequest<'_>,
        text: &str,
        target_language: &str,
    ) -> Result<TranslationResult> {
        let translated_text = self
            .complete(
                req,
                translation_prompt(text, target_language),
                LONG_MAX_TOKENS,
                PRECISE_TEMPERATURE,
            )
            .await?;
        Ok(TranslationResult {
            original_text: text.to_string(),
            translated_text,
            target_language: target_language.to_string(),
            provider: Vendor::Anthropic,
        })
    }

    async fn categorize(
        &self,
        req: &VendorRequest<'_>,
        text: &str,
        categories: &[String],
    ) -> Result<CategoryResult> {
        let content = self
            .complete(
                req,
                categorization_prompt(text, categories),
                SHORT_MAX_TOKENS,
                PRECISE_TEMPERATURE,
            )
            .await?;
        parse_json_reply(&content, Vendor::Anthropic)
    }
}

fn extract_anthropic_content(v: &Value) -> String {
    v.get("content")
        .and_then(|arr| arr.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}
