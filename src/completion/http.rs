use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::client::CompletionClient;
use crate::config::CompletionConfiguration;
use crate::error::CompletionError;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Client for an OpenAI-compatible `/v1/completions` endpoint.
pub struct HttpCompletionClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    max_tokens: u32,
}

impl HttpCompletionClient {
    pub fn new(endpoint: &str, configuration: &CompletionConfiguration) -> Self {
        Self {
            client: Client::new(),
            url: format!("{}/v1/completions", endpoint.trim_end_matches('/')),
            api_key: configuration.api_key.clone(),
            model: configuration.model.clone(),
            max_tokens: configuration.max_tokens,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    #[instrument(skip_all, fields(url = %self.url, prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let request = CompletionRequest {
            model: &self.model,
            prompt,
            max_tokens: self.max_tokens,
        };

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        debug!("Sending completion request");
        let response = builder
            .send()
            .await
            .map_err(|e| CompletionError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CompletionError::Status(response.status().as_u16()));
        }

        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.text.trim().to_string())
            .ok_or_else(|| CompletionError::Malformed("response has no choices".to_string()))
    }
}
