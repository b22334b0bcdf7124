use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    pub role: String,
    pub content: String,
}

impl AiMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

// =============================================================================
// FUNCTION-CALLING SCHEMA
// =============================================================================
//
// These serialize straight into the JSON Schema subset chat-completion APIs
// accept for function parameters.

/// A function the model may choose to call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: FunctionParameters,
}

/// Always an object schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionParameters {
    #[serde(rename = "type")]
    pub param_type: String,
    pub properties: HashMap<String, PropertyDef>,
    pub required: Vec<String>,
}

/// Schema for a single property/parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyDef {
    /// JSON Schema type: "string", "array", ...
    #[serde(rename = "type")]
    pub prop_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Element schema when `prop_type` is "array".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertyDef>>,
}

impl PropertyDef {
    pub fn string(description: Option<String>) -> Self {
        Self {
            prop_type: "string".to_string(),
            description,
            items: None,
        }
    }

    pub fn array_of(items: PropertyDef, description: Option<String>) -> Self {
        Self {
            prop_type: "array".to_string(),
            description,
            items: Some(Box::new(items)),
        }
    }
}

/// A function call as the model emitted it. `arguments` is the raw JSON text
/// and has not been parsed or checked yet.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// What came back from one chat completion: free text, a function call, or
/// (rarely) both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AiProviderResponse {
    pub content: Option<String>,
    pub function_call: Option<FunctionCall>,
}
