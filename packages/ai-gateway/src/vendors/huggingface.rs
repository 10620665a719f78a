use anyhow::{anyhow, bail, Result};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use super::{post_json, VendorAdapter, VendorRequest};
use crate::models::{
    Capability, CategoryResult, ModerationResult, Sentiment, SentimentResult, SummaryResult,
    TranslationResult, Vendor,
};

/**
 * \brief HuggingFace hosted inference. Only sentiment is wired up; the other capabilities
 *        depend on which model is deployed and answer `NotImplemented`.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct HuggingFaceAdapter;

/**
 * \brief Map a classifier label onto the shared sentiment scale.
 * \details Accepts POSITIVE/NEUTRAL/NEGATIVE in any case and the LABEL_0..2
 *          (negative, neutral, positive) convention of the common sentiment checkpoints.
 */
fn map_label(label: &str) -> Option<Sentiment> {
    match label.to_ascii_lowercase().as_str() {
        "positive" | "pos" | "label_2" => Some(Sentiment::Positive),
        "neutral" | "neu" | "label_1" => Some(Sentiment::Neutral),
        "negative" | "neg" | "label_0" => Some(Sentiment::Negative),
        _ => None,
    }
}

/**
 * \brief Pick the highest-scoring label and convert its 0..1 confidence to -1..1.
 * \details An empty list is neutral with score 0. Confidences are clamped to [0, 1] first so
 *          the signed score always stays within [-1, 1].
 *          The score rescales the winner's confidence, not its polarity: a confident NEGATIVE
 *          gives a score near +1. This matches the formula the TransportVoice service has
 *          always used; read the direction from the returned [`Sentiment`].
 */
pub fn best_sentiment(scores: &[(String, f64)]) -> Result<(Sentiment, f64, Option<&str>)> {
    let mut best: Option<(&str, f64)> = None;
    for (label, score) in scores {
        let score = if score.is_nan() { 0.0 } else { score.clamp(0.0, 1.0) };
        if best.map_or(score > 0.0, |(_, top)| score > top) {
            best = Some((label.as_str(), score));
        }
    }
    match best {
        None => Ok((Sentiment::Neutral, 0.0, None)),
        Some((label, score)) => {
            let sentiment =
                map_label(label).ok_or_else(|| anyhow!("unrecognized sentiment label: {}", label))?;
            Ok((sentiment, score * 2.0 - 1.0, Some(label)))
        }
    }
}

/**
 * \brief The inference API answers `[[{label, score}, ...]]` for one input; some pipelines
 *        drop the outer list.
 * \details Anything else, including the `{"error": ...}` object sent while a model loads,
 *          is rejected. Only a well-formed empty list yields no scores.
 */
fn label_scores(v: &Value) -> Result<(Vec<(String, f64)>, Value)> {
    let Value::Array(outer) = v else {
        bail!("huggingface sentiment reply is not a list");
    };
    let items = match outer.first() {
        Some(Value::Array(inner)) => inner,
        Some(Value::Object(_)) | None => outer,
        Some(_) => bail!("unexpected huggingface sentiment payload"),
    };
    let scores = items
        .iter()
        .map(|item| {
            let label = item.get("label").and_then(Value::as_str);
            let score = item.get("score").and_then(Value::as_f64);
            match (label, score) {
                (Some(label), Some(score)) => Ok((label.to_string(), score)),
                _ => Err(anyhow!("huggingface sentiment item lacks a label or score")),
            }
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((scores, Value::Array(items.clone())))
}

impl VendorAdapter for HuggingFaceAdapter {
    fn vendor(&self) -> Vendor {
        Vendor::HuggingFace
    }

    async fn moderate(&self, _req: &VendorRequest<'_>, _text: &str) -> Result<ModerationResult> {
        Err(self.not_implemented(Capability::Moderate))
    }

    async fn sentiment(&self, req: &VendorRequest<'_>, text: &str) -> Result<SentimentResult> {
        let url = req.url(&format!("/models/{}", req.provider.model));
        let builder = req
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json");
        let builder = req.bearer(builder);
        let v = post_json(builder, &json!({ "inputs": text })).await?;

        let (scores, raw) = label_scores(&v)?;
        let (sentiment, score, label) = best_sentiment(&scores)?;
        let explanation = match label {
            Some(label) => format!("{} ranked {} highest", req.provider.model, label),
            None => format!("{} returned no labels", req.provider.model),
        };
        Ok(SentimentResult {
            sentiment,
            score,
            explanation,
            raw_result: Some(raw),
            provider: Vendor::HuggingFace,
        })
    }

    async fn summarize(
        &self,
        _req: &VendorRequest<'_>,
        _comments: &[String],
    ) -> Result<SummaryResult> {
        Err(self.not_implemented(Capability::Summarize))
    }

    async fn translate(
        &self,
        _req: &VendorRequest<'_>,
        _text: &str,
        _target_language: &str,
    ) -> Result<TranslationResult> {
        Err(self.not_implemented(Capability::Translate))
    }

    async fn categorize(
        &self,
        _req: &VendorRequest<'_>,
        _text: &str,
        _categories: &[String],
    ) -> Result<CategoryResult> {
        Err(self.not_implemented(Capability::Categorize))
    }
}
