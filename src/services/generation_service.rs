use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Used when the response contains neither the JSON payload nor the
/// solution-sheet marker.
pub const SOLUTIONS_PLACEHOLDER: &str =
    "Solutions were not returned in a separate section. Review the test document above.";

const SOLUTION_MARKER: &str = "SOLUTION SHEET";
const TEST_LABEL: &str = "TEST DOCUMENT";

const MAX_ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_secs(3);

// Generous output cap: a 100+ question test plus its solution sheet does not
// fit the usual defaults, and truncation is silent.
const MAX_COMPLETION_TOKENS: u32 = 16_000;
const TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub test: String,
    pub solutions: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct GenerationService {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GenerationService {
    pub fn new(base_url: String, api_key: String, model: String, client: Client) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }

    /// One bounded retry loop around the single external call site. The
    /// surrounding request handling adds no retries of its own.
    pub async fn generate(&self, directive: &str) -> Result<GeneratedContent> {
        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match self.request_completion(directive).await {
                Ok(raw) => {
                    let content = parse_generation_response(&raw);
                    tracing::info!(
                        test_len = content.test.len(),
                        solutions_len = content.solutions.len(),
                        "Generation response parsed"
                    );
                    return Ok(content);
                }
                Err(e) => {
                    tracing::warn!(
                        "Generation attempt {}/{} failed: {}",
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    last_err = Some(e);
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Internal("Generation failed".to_string())))
    }

    async fn request_completion(&self, directive: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: directive.to_string(),
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_COMPLETION_TOKENS,
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(Duration::from_secs(180))
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("request failed: {}", e)))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let message = format!("HTTP {}: {}", status, truncate(&body, 300));
            if status == reqwest::StatusCode::BAD_GATEWAY
                || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
                || status.as_u16() == 529
            {
                return Err(Error::UpstreamOverloaded(message));
            }
            return Err(Error::Upstream(message));
        }

        let body: ChatCompletionResponse = res
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("invalid response body: {}", e)))?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(Error::Upstream("empty completion".to_string()));
        }
        Ok(text)
    }
}

/// Turn the raw model output into `{test, solutions}`.
///
/// The model's format is not contractually guaranteed, so parsing degrades
/// through three tiers instead of failing the request: embedded JSON, then
/// the labeled plain-text layout, then the raw text with a placeholder
/// solution sheet.
pub fn parse_generation_response(raw: &str) -> GeneratedContent {
    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(payload) = serde_json::from_str::<GenerationPayload>(&raw[start..=end]) {
                return GeneratedContent {
                    test: payload.test,
                    solutions: payload.solutions,
                    note: None,
                };
            }
        }
    }

    if let Some(idx) = raw.find(SOLUTION_MARKER) {
        let test = raw[..idx].replacen(TEST_LABEL, "", 1).trim().to_string();
        let solutions = raw[idx + SOLUTION_MARKER.len()..].trim().to_string();
        return GeneratedContent {
            test,
            solutions,
            note: None,
        };
    }

    GeneratedContent {
        test: raw.trim().to_string(),
        solutions: SOLUTIONS_PLACEHOLDER.to_string(),
        note: Some(
            "The generation service returned an unexpected format; the response is shown unmodified."
                .to_string(),
        ),
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[derive(Deserialize)]
struct GenerationPayload {
    test: String,
    solutions: String,
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
