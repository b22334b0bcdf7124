// Chat dispatcher
//
// Sends the user's message to the language model along with the bridge
// operation catalog. When the model picks a function, the arguments are
// checked against that operation's input type and forwarded to the bridge.
// Nothing is retried; one user turn is at most one bridge call (two for a
// content plan).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use super::ai_service::{AiError, AiProvider};
use super::formatting::{format_result, strip_code_fences};
use super::models::{
    AiConfig, AiMessage, FunctionCall, FunctionDef, FunctionParameters, PropertyDef,
};
use crate::core::bridge::operations::{CreateSheetRequest, PopulateSheetRequest};
use crate::core::bridge::{
    catalog, BridgeOperation, BridgeRequest, OperationKind, OperationResult, ParamType,
};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that manages Google Docs \
and Google Sheets for the user. When the user asks to create or edit a document or a \
spreadsheet, call the matching function. Otherwise answer normally.";

const CONTENT_PLAN_SHEET_NAME: &str = "Content Plan";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("The model produced an unusable function call: {0}")]
    ModelOutput(String),

    #[error(transparent)]
    Model(#[from] AiError),
}

#[derive(Debug, Error)]
pub enum BridgeClientError {
    #[error("{0}")]
    Transport(String),

    #[error("bridge request timed out")]
    Timeout,
}

/// How the dispatcher reaches the bridge.
#[async_trait]
pub trait BridgeClient: Send + Sync {
    /// Runs one operation on the bridge. Transport problems come back as a
    /// `Failure`, so callers always get a result they can show.
    async fn call(&self, request: &BridgeRequest) -> OperationResult;

    /// Whether the bridge currently holds a usable Google credential.
    async fn is_authenticated(&self) -> Result<bool, BridgeClientError>;
}

#[async_trait]
impl<T: BridgeClient + ?Sized> BridgeClient for Arc<T> {
    async fn call(&self, request: &BridgeRequest) -> OperationResult {
        (**self).call(request).await
    }

    async fn is_authenticated(&self) -> Result<bool, BridgeClientError> {
        (**self).is_authenticated().await
    }
}

/// What one user turn produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    /// Text to show the user.
    pub reply: String,
    /// The bridge operation that ran, if the model chose one.
    pub operation: Option<OperationKind>,
    pub result: Option<OperationResult>,
}

impl DispatchOutcome {
    fn text(reply: String) -> Self {
        Self {
            reply,
            operation: None,
            result: None,
        }
    }

    fn from_result(kind: OperationKind, result: OperationResult) -> Self {
        Self {
            reply: format_result(kind, &result),
            operation: Some(kind),
            result: Some(result),
        }
    }
}

pub struct ChatDispatcher<P: AiProvider, B: BridgeClient> {
    provider: P,
    bridge: B,
    config: AiConfig,
    system_prompt: String,
    functions: Vec<FunctionDef>,
}

impl<P: AiProvider, B: BridgeClient> ChatDispatcher<P, B> {
    pub fn new(provider: P, bridge: B, config: AiConfig) -> Self {
        Self {
            provider,
            bridge,
            config,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            functions: catalog().iter().map(function_def).collect(),
        }
    }

    pub async fn is_authenticated(&self) -> Result<bool, BridgeClientError> {
        self.bridge.is_authenticated().await
    }

    /// Handles one user message.
    pub async fn handle(&self, user_text: &str) -> Result<DispatchOutcome, DispatchError> {
        let messages = vec![
            AiMessage::system(self.system_prompt.clone()),
            AiMessage::user(user_text),
        ];

        let response = self
            .provider
            .chat_complete(&messages, &self.functions, &self.config)
            .await?;

        match response.function_call {
            Some(call) => self.invoke(call).await,
            None => Ok(DispatchOutcome::text(response.content.unwrap_or_default())),
        }
    }

    async fn invoke(&self, call: FunctionCall) -> Result<DispatchOutcome, DispatchError> {
        let kind = OperationKind::from_function_name(&call.name).ok_or_else(|| {
            DispatchError::ModelOutput(format!("unknown function '{}'", call.name))
        })?;

        let args: Value = serde_json::from_str(&call.arguments).map_err(|e| {
            DispatchError::ModelOutput(format!("arguments for {} are not JSON: {}", call.name, e))
        })?;
        let request =
            BridgeRequest::parse(kind, &args).map_err(|e| DispatchError::ModelOutput(e.to_string()))?;

        tracing::debug!(operation = kind.function_name(), "Model requested bridge operation");
        let result = self.bridge.call(&request).await;
        Ok(DispatchOutcome::from_result(kind, result))
    }

    /// Asks the model for a 30-day content plan as a table, then creates a
    /// sheet and writes the table into it.
    ///
    /// The table is generated and checked before any sheet is created, so a
    /// bad model reply never leaves an empty sheet behind.
    pub async fn content_plan(&self, topic: &str) -> Result<DispatchOutcome, DispatchError> {
        let rows = self.generate_plan_rows(topic).await?;

        let created = self
            .bridge
            .call(&BridgeRequest::CreateSheet(CreateSheetRequest {
                name: plan_sheet_name(topic),
            }))
            .await;
        let sheet_id = match &created {
            OperationResult::Success(success) if !success.resource_id.is_empty() => {
                success.resource_id.clone()
            }
            _ => return Ok(DispatchOutcome::from_result(OperationKind::CreateSheet, created)),
        };

        let populated = self
            .bridge
            .call(&BridgeRequest::PopulateSheet(PopulateSheetRequest {
                sheet_id,
                values: rows,
            }))
            .await;
        Ok(DispatchOutcome::from_result(OperationKind::PopulateSheet, populated))
    }

    async fn generate_plan_rows(&self, topic: &str) -> Result<Vec<Vec<String>>, DispatchError> {
        let messages = vec![
            AiMessage::system(
                "You produce structured content plans. Reply with JSON only, no prose.",
            ),
            AiMessage::user(plan_prompt(topic)),
        ];
        let response = self
            .provider
            .chat_complete(&messages, &[], &self.config)
            .await?;

        let content = response
            .content
            .ok_or_else(|| DispatchError::ModelOutput("content plan reply was empty".to_string()))?;
        parse_plan_rows(&content)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Function schema for one catalog operation.
pub fn function_def(op: &BridgeOperation) -> FunctionDef {
    let properties: HashMap<String, PropertyDef> = op
        .params
        .iter()
        .map(|param| {
            let description = Some(param.description.to_string());
            let schema = match param.param_type {
                ParamType::String => PropertyDef::string(description),
                ParamType::StringTable => PropertyDef::array_of(
                    PropertyDef::array_of(PropertyDef::string(None), None),
                    description,
                ),
            };
            (param.name.to_string(), schema)
        })
        .collect();

    FunctionDef {
        name: op.function_name.to_string(),
        description: op.description.to_string(),
        parameters: FunctionParameters {
            param_type: "object".to_string(),
            properties,
            required: op.params.iter().map(|p| p.name.to_string()).collect(),
        },
    }
}

fn plan_sheet_name(topic: &str) -> String {
    let topic = topic.trim();
    if topic.is_empty() {
        CONTENT_PLAN_SHEET_NAME.to_string()
    } else {
        format!("{} - {}", CONTENT_PLAN_SHEET_NAME, topic)
    }
}

fn plan_prompt(topic: &str) -> String {
    let subject = if topic.trim().is_empty() {
        "social media".to_string()
    } else {
        topic.trim().to_string()
    };
    format!(
        "Generate a 30-day {} content plan. Format the response as valid JSON ONLY: an array \
         of rows where the first row is the header [\"Day\", \"Format\", \"Caption\", \
         \"Image Idea\", \"Tool\"] and every following row is one day. Every cell must be a \
         string. Do not include any text outside of the JSON.",
        subject
    )
}

/// True for messages like "make me a content plan sheet for my bakery".
pub fn is_content_plan_request(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("content plan") && lower.contains("sheet")
}

/// Picks the plan subject out of a request: whatever follows the last
/// " for " or " about ". Empty when there is neither.
pub fn plan_topic(text: &str) -> String {
    let lower = text.to_lowercase();
    let start = [" for ", " about "]
        .iter()
        .filter_map(|marker| lower.rfind(marker).map(|at| at + marker.len()))
        .max();
    match start {
        // Lowercasing can shift byte offsets for some scripts; only slice on a boundary.
        Some(at) if text.is_char_boundary(at) && lower.len() == text.len() => text[at..]
            .trim()
            .trim_end_matches(|c: char| c.is_ascii_punctuation())
            .to_string(),
        _ => String::new(),
    }
}

/// Parses the model's content plan reply into rows of cells.
fn parse_plan_rows(raw: &str) -> Result<Vec<Vec<String>>, DispatchError> {
    let rows: Vec<Vec<String>> = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| DispatchError::ModelOutput(format!("content plan is not a JSON table: {}", e)))?;
    if rows.is_empty() {
        return Err(DispatchError::ModelOutput(
            "content plan has no rows".to_string(),
        ));
    }
    Ok(rows)
}
