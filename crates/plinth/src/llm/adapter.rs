// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use async_trait::async_trait;
use dotenvy::dotenv;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| Client::builder().build().expect("HTTP client"));

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("could not extract content from {0} response")]
    MalformedResponse(&'static str),
    #[error("{0}")]
    Configuration(String),
}

/// Boundary to the external natural-language capability. The core never
/// trusts the output of these calls; every caller re-validates shape and
/// value sets before use.
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    async fn generate_response(&self, prompt: &str) -> Result<String, LlmError>;

    async fn generate_structured_response(
        &self,
        system_prompt: &str,
        user_input: &str,
    ) -> Result<Value, LlmError> {
        let response = self
            .generate_response(&format!("System: {system_prompt}\n\nUser: {user_input}"))
            .await?;
        if let Some(json_str) = extract_json(&response) {
            match serde_json::from_str::<Value>(&json_str) {
                Ok(value) => return Ok(value),
                Err(e) => debug!("failed to parse extracted JSON: {e}"),
            }
        }
        Ok(json!({ "response": response }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Provider {
    Anthropic,
    Ollama,
    OpenAiStyle,
}

impl Provider {
    fn name(self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Ollama => "ollama",
            Self::OpenAiStyle => "openai",
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpLlmAdapter {
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    api_version: String,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl HttpLlmAdapter {
    pub fn anthropic() -> Result<Self, LlmError> {
        dotenv().ok();
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            LlmError::Configuration("ANTHROPIC_API_KEY environment variable not set".into())
        })?;
        Ok(Self {
            endpoint: env_or(
                "ANTHROPIC_ENDPOINT",
                "https://api.anthropic.com/v1/messages",
            ),
            api_key,
            model: env_or("ANTHROPIC_MODEL", "claude-3-5-haiku-latest"),
            max_tokens: env_or("ANTHROPIC_MAX_TOKENS", "4096").parse().unwrap_or(4096),
            temperature: env_or("ANTHROPIC_TEMPERATURE", "0.2").parse().unwrap_or(0.2),
            api_version: env_or("ANTHROPIC_API_VERSION", "2023-06-01"),
        })
    }

    pub fn ollama(model: impl Into<String>) -> Self {
        dotenv().ok();
        Self {
            endpoint: env_or("OLLAMA_ENDPOINT", "http://localhost:11434/api/generate"),
            api_key: String::new(),
            model: model.into(),
            max_tokens: env_or("OLLAMA_MAX_TOKENS", "4096").parse().unwrap_or(4096),
            temperature: env_or("OLLAMA_TEMPERATURE", "0.2").parse().unwrap_or(0.2),
            api_version: String::new(),
        }
    }

    fn provider(&self) -> Provider {
        if self.endpoint.contains("11434") || self.endpoint.contains("ollama") {
            Provider::Ollama
        } else if self.endpoint.contains("openai.com") {
            Provider::OpenAiStyle
        } else {
            Provider::Anthropic
        }
    }

    fn payload(&self, prompt: &str, provider: Provider) -> Value {
        match provider {
            Provider::Ollama => json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
                "options": {
                    "temperature": self.temperature,
                    "num_predict": self.max_tokens
                }
            }),
            _ => json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "messages": [{ "role": "user", "content": prompt }],
                "temperature": self.temperature
            }),
        }
    }
}

#[async_trait]
impl LlmAdapter for HttpLlmAdapter {
    async fn generate_response(&self, prompt: &str) -> Result<String, LlmError> {
        let provider = self.provider();
        let payload = self.payload(prompt, provider);
        debug!(provider = provider.name(), model = %self.model, "dispatching LLM request");
        let mut request = HTTP_CLIENT
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&payload);
        if provider != Provider::Ollama {
            request = request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", &self.api_version);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(LlmError::Api {
                provider: provider.name(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let body: Value = response.json().await?;
        let content = match provider {
            Provider::Ollama => body["response"].as_str(),
            _ => body["content"][0]["text"]
                .as_str()
                .or_else(|| body["choices"][0]["message"]["content"].as_str()),
        };
        content
            .map(str::to_string)
            .ok_or(LlmError::MalformedResponse(provider.name()))
    }
}

/// Pulls the first well-formed JSON object out of a model reply: either a
/// fenced ```json block or the first balanced top-level object.
pub fn extract_json(content: &str) -> Option<String> {
    if let Some(start) = content.find("```json") {
        if let Some(end) = content[start + 7..].find("```") {
            let block = content[start + 7..start + 7 + end].trim();
            if serde_json::from_str::<Value>(block).is_ok() {
                return Some(block.to_string());
            }
        }
    }
    let start_pos = content.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;
    for (i, ch) in content[start_pos..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '"' => in_string = !in_string,
            '\\' if in_string => escape_next = true,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &content[start_pos..=start_pos + i];
                    if serde_json::from_str::<Value>(candidate).is_ok() {
                        return Some(candidate.to_string());
                    }
                    break;
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json_block() {
        let reply = "Sure, here you go:\n```json\n{\"intent\": \"pl_calculation\"}\n```";
        assert_eq!(
            extract_json(reply),
            Some("{\"intent\": \"pl_calculation\"}".to_string())
        );
    }

    #[test]
    fn extracts_first_balanced_object() {
        let reply = "prefix {\"a\": {\"b\": 1}} suffix";
        assert_eq!(extract_json(reply), Some("{\"a\": {\"b\": 1}}".to_string()));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let reply = r#"{"note": "curly } inside", "n": 2}"#;
        assert_eq!(extract_json(reply), Some(reply.to_string()));
    }

    #[test]
    fn plain_prose_yields_nothing() {
        assert_eq!(extract_json("no json here"), None);
    }
}
