//! Optional AI enrichment layer. Reads a deterministic classification plus
//! the raw error signature and may attach reasoning, suggested fixes and a
//! confidence nudge — never a category change.
//!
//! Grounded on `offload`'s `connector` module
//! (`examples/imbue-ai-offload/src/connector.rs`) for the shape of "a narrow
//! trait over an external HTTP dependency, with every failure mode folded
//! into a single swallowed error so the caller never has to special-case
//! them". `reqwest` is pulled in fresh for this module since no crate
//! already in the teacher's stack speaks HTTP as a client (`axum` is
//! server-side only).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::model::AiEnrichment;

const MAX_CONFIDENCE_DELTA: f64 = 0.1;

/// An external enrichment provider. Implementations must never propagate an
/// error to the caller — a provider failure (timeout, malformed JSON,
/// non-2xx) is logged and swallowed, yielding `None`, so a flaky or absent
/// AI backend can never affect the deterministic result.
#[async_trait]
pub trait AiEnricher: Send + Sync {
    async fn enrich(&self, signature: &str, category: &str, confidence: f64) -> Option<AiEnrichment>;
}

/// The default enricher when `classifier.ai_enrichment_enabled = false`, or
/// when no `ai_provider_url` is configured. Always returns `None`.
pub struct NullEnricher;

#[async_trait]
impl AiEnricher for NullEnricher {
    async fn enrich(&self, _signature: &str, _category: &str, _confidence: f64) -> Option<AiEnrichment> {
        None
    }
}

/// Calls an HTTP JSON endpoint expected to return
/// `{"reasoning": "...", "suggested_fixes": [...], "confidence_delta": f64}`.
/// Any network error, non-2xx status, or unparseable body is swallowed.
pub struct HttpAiEnricher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAiEnricher {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, endpoint }
    }
}

#[derive(Debug, Deserialize)]
struct AiResponse {
    reasoning: String,
    #[serde(default)]
    suggested_fixes: Vec<String>,
    confidence_delta: f64,
}

#[async_trait]
impl AiEnricher for HttpAiEnricher {
    async fn enrich(&self, signature: &str, category: &str, confidence: f64) -> Option<AiEnrichment> {
        let request = serde_json::json!({
            "error_signature": signature,
            "category": category,
            "confidence": confidence,
        });

        let response = match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "ai enrichment request failed, falling back to deterministic result");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "ai enrichment provider returned non-2xx");
            return None;
        }

        let parsed: AiResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "ai enrichment response was not valid JSON");
                return None;
            }
        };

        Some(AiEnrichment {
            reasoning: parsed.reasoning,
            suggested_fixes: parsed.suggested_fixes,
            confidence_delta: parsed.confidence_delta.clamp(-MAX_CONFIDENCE_DELTA, MAX_CONFIDENCE_DELTA),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_enricher_never_enriches() {
        let enricher = NullEnricher;
        assert!(enricher.enrich("AssertionError", "PRODUCT_DEFECT", 0.9).await.is_none());
    }
}
