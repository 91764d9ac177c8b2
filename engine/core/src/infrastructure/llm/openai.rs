// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI-Compatible Chat Completions Adapter
//
// Serves the hosted API and local compatible servers (LM Studio, vLLM,
// llama.cpp). Local servers run without a key, so auth is only sent when one
// is configured. JSON-mode requests ask for a `json_object` response format.

use crate::domain::llm::{
    FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OpenAIAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

impl OpenAIAdapter {
    pub fn new(base_url: String, api_key: String, model: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: Some(api_key).filter(|k| !k.is_empty()),
            model,
            timeout_secs,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> LLMError {
        if err.is_timeout() {
            LLMError::Timeout(self.timeout_secs)
        } else {
            LLMError::Network(err.to_string())
        }
    }

    fn status_error(&self, status: reqwest::StatusCode, body: String) -> LLMError {
        match status.as_u16() {
            401 | 403 => LLMError::Authentication(body),
            404 => LLMError::ModelNotFound(self.model.clone()),
            429 => LLMError::RateLimit,
            _ => LLMError::Provider(format!("HTTP {}: {}", status, body.trim())),
        }
    }
}

#[async_trait]
impl LLMProvider for OpenAIAdapter {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system_prompt.as_deref() {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });

        let body = CompletionRequest {
            model: &self.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stop: options.stop_sequences.as_deref(),
            response_format: options
                .json_response
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .request(reqwest::Method::POST, "/chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, body));
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Unreadable completion: {}", e)))?;

        let usage = completion
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.prompt_tokens + u.completion_tokens,
            })
            .unwrap_or_default();

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LLMError::Provider("Completion has no choices".into()))?;

        Ok(GenerationResponse {
            text: choice.message.content.unwrap_or_default(),
            usage,
            provider: "openai".to_string(),
            model: self.model.clone(),
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let response = self
            .request(reqwest::Method::GET, "/models")
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, body));
        }

        // Some compatible servers answer with an empty list; only a listed miss counts
        let models: ModelList = response.json().await.unwrap_or(ModelList { data: Vec::new() });
        if models.data.is_empty() || models.data.iter().any(|m| m.id == self.model) {
            Ok(())
        } else {
            Err(LLMError::ModelNotFound(self.model.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_json_mode_and_bearer_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [
                    { "role": "system", "content": "You are a portfolio strategist." },
                    { "role": "user", "content": "Refine XLK" }
                ],
                "response_format": { "type": "json_object" }
            })))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"{\"action\":\"keep\"}"},"finish_reason":"stop"}],"usage":{"prompt_tokens":30,"completion_tokens":8}}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new(
            format!("{}/v1", server.url()),
            "sk-test".to_string(),
            "gpt-4o-mini".to_string(),
            5,
        );
        let options = GenerationOptions::default()
            .with_system_prompt("You are a portfolio strategist.")
            .expecting_json();
        let response = adapter.generate("Refine XLK", &options).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.text, r#"{"action":"keep"}"#);
        assert_eq!(response.usage.total_tokens, 38);
    }

    #[tokio::test]
    async fn test_keyless_server_gets_no_auth_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"0.3"},"finish_reason":"length"}]}"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new(server.url(), String::new(), "local".to_string(), 5);
        let response = adapter
            .generate("Score", &GenerationOptions::default())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(response.finish_reason, FinishReason::Length);
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::new(server.url(), "k".to_string(), "gpt-4o-mini".to_string(), 5);
        let err = adapter
            .generate("hi", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::RateLimit));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_health_check_lists_models() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/models")
            .with_status(200)
            .with_body(r#"{"data":[{"id":"gpt-4o-mini"}]}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let listed = OpenAIAdapter::new(server.url(), "k".to_string(), "gpt-4o-mini".to_string(), 5);
        assert!(listed.health_check().await.is_ok());

        let unlisted = OpenAIAdapter::new(server.url(), "k".to_string(), "gpt-5".to_string(), 5);
        assert!(matches!(
            unlisted.health_check().await,
            Err(LLMError::ModelNotFound(_))
        ));
    }
}
