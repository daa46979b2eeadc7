// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification backend for OpenAI-compatible chat completion APIs.

use std::time::Duration;

use async_trait::async_trait;
use leadwire_config::model::ClassifierConfig;
use leadwire_core::{
    AdapterType, BackendVerdict, ClassificationRequest, ClassifierBackend, ClassifierError,
    HealthStatus, LeadwireError, PluginAdapter,
};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::response::parse_verdict;

const SYSTEM_PROMPT: &str = "You classify messages posted in public chats. \
Decide whether the message is a request for a service or a job that someone \
could answer (a lead). Adverts, offers, greetings, chat rules and reviews are \
not leads. Reply with one JSON object and nothing else: \
{\"relevant\": true|false, \"category\": string|null, \"confidence\": 0.0-1.0}. \
Use only the categories listed by the user. Confidence 0.9 or above for clear \
leads, 0.6 to 0.8 for ambiguous ones, below 0.5 when the message is almost \
certainly not a lead.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Calls `POST {endpoint}/chat/completions` once per classification.
///
/// Retries, rate limiting and deadlines belong to [`crate::Classifier`];
/// this backend only maps one HTTP exchange onto a verdict or an error.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    url: String,
    model: String,
    timeout: Duration,
}

impl OpenAiBackend {
    pub fn new(config: &ClassifierConfig) -> Result<Self, LeadwireError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = config.api_key.as_deref() {
            let value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                LeadwireError::Config(format!("invalid classifier api key header value: {e}"))
            })?;
            headers.insert(AUTHORIZATION, value);
        }

        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| LeadwireError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/chat/completions", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            timeout,
        })
    }

    fn user_prompt(request: &ClassificationRequest, categories: &[String]) -> String {
        let mut prompt = String::new();
        if !categories.is_empty() {
            prompt.push_str("Categories: ");
            prompt.push_str(&categories.join(", "));
            prompt.push('\n');
        }
        if let Some(hint) = request.category_hint.as_deref() {
            prompt.push_str("Matched rule category: ");
            prompt.push_str(hint);
            prompt.push('\n');
        }
        if let Some(title) = request.message.channel_title.as_deref() {
            prompt.push_str("Chat: ");
            prompt.push_str(title);
            prompt.push('\n');
        }
        prompt.push_str("Message:\n");
        prompt.push_str(&request.message.text);
        prompt
    }

    fn transport_error(&self, err: reqwest::Error) -> ClassifierError {
        if err.is_timeout() {
            ClassifierError::Timeout {
                after: self.timeout,
            }
        } else {
            ClassifierError::Upstream {
                message: format!("request failed: {err}"),
                status: None,
                retryable: true,
            }
        }
    }
}

/// Whether a failed HTTP status is worth another attempt.
fn retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

#[async_trait]
impl PluginAdapter for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Classifier
    }

    async fn health_check(&self) -> Result<HealthStatus, LeadwireError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), LeadwireError> {
        Ok(())
    }
}

#[async_trait]
impl ClassifierBackend for OpenAiBackend {
    async fn classify(
        &self,
        request: &ClassificationRequest,
        categories: &[String],
    ) -> Result<BackendVerdict, ClassifierError> {
        let prompt = Self::user_prompt(request, categories);
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.0,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %text, "classifier request rejected");
            return Err(ClassifierError::Upstream {
                message: if text.is_empty() {
                    status.to_string()
                } else {
                    text
                },
                status: Some(status.as_u16()),
                retryable: retryable_status(status),
            });
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e)
            } else {
                ClassifierError::Upstream {
                    message: format!("invalid completion body: {e}"),
                    status: Some(status.as_u16()),
                    retryable: true,
                }
            }
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClassifierError::Upstream {
                message: "completion has no content".into(),
                status: Some(status.as_u16()),
                retryable: true,
            })?;

        parse_verdict(&content)
    }
}
