use anyhow::{anyhow, Result};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use super::{
    parse_json_reply, post_json, stamp_provider, VendorAdapter, VendorRequest, COMMENT_SEPARATOR,
};
use crate::models::{
    CategoryResult, Message, ModerationResult, SentimentResult, SummaryResult, TranslationResult,
    Vendor,
};

const MODERATION_PATH: &str = "/v1/moderations";
const CHAT_PATH: &str = "/v1/chat/completions";

/** \brief Low temperature for classification-like answers. */
const PRECISE_TEMPERATURE: f64 = 0.1;
/** \brief Summaries get a little room for phrasing. */
const SUMMARY_TEMPERATURE: f64 = 0.2;

const SENTIMENT_PROMPT: &str = "You are a sentiment analysis assistant. Analyze the sentiment of the following text and respond with ONLY a JSON object with these fields: \"sentiment\" (one of \"positive\", \"neutral\", \"negative\"), \"score\" (number between -1 and 1), and \"explanation\" (brief explanation of the sentiment).";

const SUMMARY_PROMPT: &str = "You are a summarization assistant. Provide a concise summary of the following comments from a community transportation planning project. Group them by themes and highlight the most important concerns and suggestions. Respond with ONLY a JSON object with these fields: \"summary\" (overall summary), \"themes\" (array of main themes), and \"keyPoints\" (array of key points).";

fn translation_prompt(target_language: &str) -> String {
    format!(
        "You are a translation assistant. Translate the following text to {}. Preserve formatting and provide ONLY the translated text without any explanation or metadata.",
        target_language
    )
}

fn categorization_prompt(categories: &[String]) -> String {
    format!(
        "You are a categorization assistant. Categorize the following comment from a transportation planning project into one of these categories: {}. Respond with ONLY a JSON object with these fields: \"category\" (the most appropriate category), \"confidence\" (number between 0 and 1), and \"explanation\" (brief explanation of why this category was chosen).",
        categories.join(", ")
    )
}

/**
 * \brief OpenAI: dedicated moderation endpoint plus JSON-prompted chat completions.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl OpenAiAdapter {
    async fn post(&self, req: &VendorRequest<'_>, path: &str, body: &Value) -> Result<Value> {
        let builder = req
            .client
            .post(req.url(path))
            .header(CONTENT_TYPE, "application/json");
        let builder = req.bearer(builder);
        post_json(builder, body).await
    }

    async fn chat_completion(
        &self,
        req: &VendorRequest<'_>,
        system_prompt: &str,
        user_content: &str,
        temperature: f64,
    ) -> Result<String> {
        let messages = [Message::system(system_prompt), Message::user(user_content)];
        let body = json!({
            "model": req.provider.model,
            "messages": messages,
            "temperature": temperature,
        });
        let v = self.post(req, CHAT_PATH, &body).await?;
        extract_openai_content(&v).ok_or_else(|| anyhow!("openai reply has no message content"))
    }
}

impl VendorAdapter for OpenAiAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::OpenAI
    }

    async fn moderate(&self, req: &VendorRequest<'_>, text: &str) -> Result<ModerationResult> {
        let v = self
            .post(req, MODERATION_PATH, &json!({ "input": text }))
            .await?;
        let first = v
            .get("results")
            .and_then(|r| r.get(0))
            .cloned()
            .ok_or_else(|| anyhow!("openai moderation reply has no results"))?;
        stamp_provider(first, Vendor::OpenAI)
    }

    async fn sentiment(&self, req: &VendorRequest<'_>, text: &str) -> Result<SentimentResult> {
        let content = self
            .chat_completion(req, SENTIMENT_PROMPT, text, PRECISE_TEMPERATURE)
            .await?;
        parse_json_reply(&content, Vendor::OpenAI)
    }

    async fn summarize(
        &self,
        req: &VendorRequest<'_>,
        comments: &[String],
    ) -> Result<SummaryResult> {
        let combined = comments.join(COMMENT_SEPARATOR);
        let content = self
            .chat_completion(req, SUMMARY_PROMPT, &combined, SUMMARY_TEMPERATURE)
            .await?;
        parse_json_reply(&content, Vendor::OpenAI)
    }

    async fn translate(
        &self,
        req: &VendorRequest<'_>,
        text: &str,
        target_language: &str,
    ) -> Result<TranslationResult> {
        let translated_text = self
            .chat_completion(
                req,
                &translation_prompt(target_language),
                text,
                PRECISE_TEMPERATURE,
            )
            .await?;
        Ok(TranslationResult {
            original_text: text.to_string(),
            translated_text,
            target_language: target_language.to_string(),
            provider: Vendor::OpenAI,
        })
    }

    async fn categorize(
        &self,
        req: &VendorRequest<'_>,
        text: &str,
        categories: &[String],
    ) -> Result<CategoryResult> {
        let content = self
            .chat_completion(
                req,
                &categorization_prompt(categories),
                text,
                PRECISE_TEMPERATURE,
            )
            .await?;
        parse_json_reply(&content, Vendor::OpenAI)
    }
}

fn extract_openai_content(v: &Value) -> Option<String> {
    v.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}
