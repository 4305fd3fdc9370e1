use crate::domain::ScreenshotImage;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Model overloaded after {0} attempts")]
    Overloaded(u32),
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Answers a question about a screenshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn ask(&self, image: &ScreenshotImage, question: &str) -> Result<String, VisionError>;
}

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// Non-standard status the Messages API uses for "overloaded".
const STATUS_OVERLOADED: u16 = 529;

pub const SYSTEM_PROMPT: &str = "You are AskShot, an assistant that answers questions about a \
screenshot the user captured in their browser.\n\
Rules:\n\
- Answer only from what is visible in the screenshot plus general knowledge needed to explain it.\n\
- If the question or the screenshot contains vulgar, sexual, hateful, violent or otherwise \
sensitive content, politely decline to engage with that content.\n\
- Never reveal or transcribe passwords, payment card numbers, or other personal secrets visible \
in the image.\n\
- If the question has nothing to do with the screenshot, say so briefly and steer the user back \
to asking about what is on screen.\n\
- Keep answers concise and use Markdown lists or code blocks when they help.";

pub fn backoff_for_attempt(attempt: u32) -> Duration {
    Duration::from_millis(INITIAL_BACKOFF_MS * 2_u64.pow(attempt))
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    message: String,
}

/// Classifies a failed response; `None` means the body was not an API error envelope.
fn parse_api_error(body: &str) -> Option<(String, String)> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| (b.error.type_, b.error.message))
}

fn is_overloaded(status: u16, body: &str) -> bool {
    status == STATUS_OVERLOADED
        || parse_api_error(body).is_some_and(|(kind, _)| kind == "overloaded_error")
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    type_: String,
    #[serde(default)]
    text: Option<String>,
}

fn extract_answer(response: MessagesResponse) -> Result<String, VisionError> {
    let text: Vec<String> = response
        .content
        .into_iter()
        .filter(|b| b.type_ == "text")
        .filter_map(|b| b.text)
        .collect();

    if text.is_empty() {
        return Err(VisionError::InvalidResponse("No text content in response".to_string()));
    }
    Ok(text.join("\n"))
}

pub struct AnthropicClient {
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(
        api_key: &str,
        base_url: String,
        model: String,
        max_tokens: u32,
    ) -> Result<Self, VisionError> {
        let mut headers = header::HeaderMap::new();
        let key_value = header::HeaderValue::from_str(api_key)
            .map_err(|e| VisionError::InvalidConfig(format!("Invalid API key format: {}", e)))?;
        headers.insert("x-api-key", key_value);
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| VisionError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens,
        })
    }
}

#[async_trait]
impl VisionModel for AnthropicClient {
    async fn ask(&self, image: &ScreenshotImage, question: &str) -> Result<String, VisionError> {
        let body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": SYSTEM_PROMPT,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": image.format.media_type(),
                            "data": image.data,
                        }
                    },
                    { "type": "text", "text": question }
                ]
            }]
        });

        for attempt in 0..MAX_ATTEMPTS {
            let resp = self
                .client
                .post(format!("{}/v1/messages", self.base_url))
                .json(&body)
                .send()
                .await
                .map_err(|e| VisionError::RequestFailed(e.to_string()))?;

            let status = resp.status().as_u16();
            if resp.status().is_success() {
                let parsed: MessagesResponse = resp
                    .json()
                    .await
                    .map_err(|e| VisionError::InvalidResponse(e.to_string()))?;
                return extract_answer(parsed);
            }

            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if is_overloaded(status, &error_text) {
                if attempt < MAX_ATTEMPTS - 1 {
                    let backoff = backoff_for_attempt(attempt);
                    warn!(
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        "Vision model overloaded, retrying"
                    );
                    sleep(backoff).await;
                    continue;
                }
                return Err(VisionError::Overloaded(MAX_ATTEMPTS));
            }

            let message = parse_api_error(&error_text)
                .map(|(_, message)| message)
                .unwrap_or(error_text);
            return Err(VisionError::Api { status, message });
        }

        Err(VisionError::Overloaded(MAX_ATTEMPTS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_is_detected_by_status_or_error_type() {
        assert!(is_overloaded(529, ""));
        assert!(is_overloaded(
            500,
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
        ));
        assert!(!is_overloaded(
            400,
            r#"{"type":"error","error":{"type":"invalid_request_error","message":"bad"}}"#
        ));
        assert!(!is_overloaded(503, "upstream connect error"));
    }

    #[test]
    fn backoff_doubles_from_one_second() {
        assert_eq!(backoff_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(backoff_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(backoff_for_attempt(2), Duration::from_millis(4000));
    }

    #[test]
    fn answer_joins_text_blocks_and_rejects_empty() {
        let response: MessagesResponse = serde_json::from_value(json!({
            "content": [
                { "type": "text", "text": "first" },
                { "type": "tool_use", "id": "x" },
                { "type": "text", "text": "second" }
            ]
        }))
        .unwrap();
        assert_eq!(extract_answer(response).unwrap(), "first\nsecond");

        let empty: MessagesResponse = serde_json::from_value(json!({ "content": [] })).unwrap();
        assert!(matches!(extract_answer(empty), Err(VisionError::InvalidResponse(_))));
    }

    #[test]
    fn client_rejects_unusable_key() {
        let result = AnthropicClient::new(
            "bad\nkey",
            "https://api.anthropic.com".to_string(),
            "claude-3-sonnet-20240229".to_string(),
            1024,
        );
        assert!(matches!(result, Err(VisionError::InvalidConfig(_))));
    }
}
