use crate::core::ai::{
    models::{AiConfig, AiMessage, AiProviderResponse, FunctionCall, FunctionDef},
    AiError, AiProvider,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl AiProvider for OpenAiClient {
    async fn chat_complete(
        &self,
        messages: &[AiMessage],
        functions: &[FunctionDef],
        config: &AiConfig,
    ) -> Result<AiProviderResponse, AiError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut payload = json!({
            "model": config.model,
            "messages": messages,
            "temperature": config.temperature,
        });
        if let Some(max_tokens) = config.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if !functions.is_empty() {
            let tools: Vec<Value> = functions
                .iter()
                .map(|f| json!({ "type": "function", "function": f }))
                .collect();
            payload["tools"] = json!(tools);
            payload["tool_choice"] = json!("auto");
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AiError::Timeout
                } else {
                    AiError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(AiError::Api { status, message });
        }

        let response_json: Value = response
            .json()
            .await
            .map_err(|e| AiError::InvalidResponse(e.to_string()))?;

        parse_completion(&response_json)
    }
}

/// Pulls the text and the first function call out of a chat completion.
///
/// Understands both the `tool_calls` array and the older single
/// `function_call` field.
fn parse_completion(body: &Value) -> Result<AiProviderResponse, AiError> {
    let message = body["choices"][0]
        .get("message")
        .ok_or_else(|| AiError::InvalidResponse("no choices in response".to_string()))?;

    let content = message["content"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string);

    let call = message["tool_calls"]
        .as_array()
        .and_then(|calls| calls.first())
        .map(|tc| &tc["function"])
        .or_else(|| message.get("function_call").filter(|fc| fc.is_object()));

    let function_call = match call {
        Some(func) => {
            let name = func["name"]
                .as_str()
                .ok_or_else(|| AiError::InvalidResponse("function call without a name".to_string()))?;
            // Arguments stay raw; the dispatcher decides whether they are usable.
            let arguments = match &func["arguments"] {
                Value::String(s) => s.clone(),
                Value::Null => "{}".to_string(),
                other => other.to_string(),
            };
            Some(FunctionCall {
                name: name.to_string(),
                arguments,
            })
        }
        None => None,
    };

    Ok(AiProviderResponse {
        content,
        function_call,
    })
}
