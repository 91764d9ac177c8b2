// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ollama LLM Provider Adapter
//
// Talks to a local Ollama server through /api/generate. JSON-mode requests set
// `format: "json"` so selection, refinement and profile prompts come back as a
// bare object. The health check fails when the configured model is not pulled.

use crate::domain::llm::{
    FinishReason, GenerationOptions, GenerationResponse, LLMError, LLMProvider, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub struct OllamaAdapter {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    stream: bool,
    options: SamplingOptions<'a>,
}

#[derive(Serialize)]
struct SamplingOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct GenerateReply {
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    prompt_eval_count: u32,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

impl OllamaAdapter {
    pub fn new(base_url: String, model: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout_secs,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn transport_error(&self, err: reqwest::Error) -> LLMError {
        if err.is_timeout() {
            LLMError::Timeout(self.timeout_secs)
        } else {
            LLMError::Network(err.to_string())
        }
    }

    /// `llama3.1` and `llama3.1:latest` name the same pulled model.
    fn is_pulled(&self, tags: &[Tag]) -> bool {
        let wanted = self.model.strip_suffix(":latest").unwrap_or(&self.model);
        tags.iter()
            .any(|tag| tag.name.strip_suffix(":latest").unwrap_or(&tag.name) == wanted)
    }
}

#[async_trait]
impl LLMProvider for OllamaAdapter {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse, LLMError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: options.system_prompt.as_deref(),
            format: options.json_response.then_some("json"),
            stream: false,
            options: SamplingOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
                stop: options.stop_sequences.as_deref(),
            },
        };

        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(LLMError::ModelNotFound(self.model.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::Provider(format!("Ollama returned {}: {}", status, body.trim())));
        }

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Unreadable Ollama reply: {}", e)))?;

        Ok(GenerationResponse {
            text: reply.response,
            usage: TokenUsage {
                prompt_tokens: reply.prompt_eval_count,
                completion_tokens: reply.eval_count,
                total_tokens: reply.prompt_eval_count + reply.eval_count,
            },
            provider: "ollama".to_string(),
            model: self.model.clone(),
            finish_reason: match reply.done_reason.as_deref() {
                Some("length") => FinishReason::Length,
                _ => FinishReason::Stop,
            },
        })
    }

    async fn health_check(&self) -> Result<(), LLMError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !response.status().is_success() {
            return Err(LLMError::Network(format!("Ollama returned {}", response.status())));
        }
        let tags: TagList = response
            .json()
            .await
            .map_err(|e| LLMError::Provider(format!("Unreadable tag list: {}", e)))?;

        if self.is_pulled(&tags.models) {
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
    async fn test_json_request_sets_format_and_sampling() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/generate")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "llama3.2:3b",
                "system": "You are a portfolio analyst.",
                "format": "json",
                "stream": false,
                "options": { "num_predict": 500 }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response":"{\"selected_assets\":[]}","done":true,"done_reason":"stop","eval_count":12,"prompt_eval_count":40}"#)
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(format!("{}/", server.url()), "llama3.2:3b".to_string(), 5);
        let options = GenerationOptions::default()
            .with_system_prompt("You are a portfolio analyst.")
            .with_max_tokens(500)
            .expecting_json();
        let response = adapter.generate("Pick assets", &options).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.text, r#"{"selected_assets":[]}"#);
        assert_eq!(response.usage.total_tokens, 52);
        assert_eq!(response.finish_reason, FinishReason::Stop);
    }

    #[tokio::test]
    async fn test_truncated_reply_reports_length() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(200)
            .with_body(r#"{"response":"0.","done":true,"done_reason":"length"}"#)
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(server.url(), "llama3.1:8b".to_string(), 5);
        let response = adapter
            .generate("Score", &GenerationOptions::default().with_max_tokens(2))
            .await
            .unwrap();
        assert_eq!(response.finish_reason, FinishReason::Length);
        assert_eq!(response.usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn test_missing_model_maps_to_model_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(404)
            .with_body(r#"{"error":"model not found"}"#)
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(server.url(), "missing".to_string(), 5);
        let err = adapter
            .generate("hello", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LLMError::ModelNotFound(m) if m == "missing"));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/generate")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let adapter = OllamaAdapter::new(server.url(), "llama3.1:8b".to_string(), 5);
        let err = adapter
            .generate("hello", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_health_check_requires_pulled_model() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/tags")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama3.1:8b"},{"name":"mistral:latest"}]}"#)
            .expect_at_least(1)
            .create_async()
            .await;

        let pulled = OllamaAdapter::new(server.url(), "llama3.1:8b".to_string(), 5);
        assert!(pulled.health_check().await.is_ok());

        let implicit_tag = OllamaAdapter::new(server.url(), "mistral".to_string(), 5);
        assert!(implicit_tag.health_check().await.is_ok());

        let absent = OllamaAdapter::new(server.url(), "llama3.2:3b".to_string(), 5);
        assert!(matches!(
            absent.health_check().await,
            Err(LLMError::ModelNotFound(_))
        ));
    }
}
