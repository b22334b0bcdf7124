// Bridge operation catalog
//
// The fixed set of things a chat client can ask the bridge to do. The same
// catalog drives the HTTP routes, the request parsing, and the function
// schema we hand to the language model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BridgeError;

/// Unique identifier for bridge operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateDocument,
    AppendText,
    CreateSheet,
    PopulateSheet,
}

/// Shape of a single parameter in an operation's input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    /// Rows of string cells.
    StringTable,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    pub param_type: ParamType,
    pub description: &'static str,
}

/// A named, schema-described action.
#[derive(Debug, Clone)]
pub struct BridgeOperation {
    pub kind: OperationKind,
    /// Name the language model calls it by.
    pub function_name: &'static str,
    /// Path segment under the bridge base URL.
    pub endpoint: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

static CATALOG: [BridgeOperation; 4] = [
    BridgeOperation {
        kind: OperationKind::CreateDocument,
        function_name: "create_google_doc",
        endpoint: "create_doc",
        description: "Create a new Google Document in Drive",
        params: &[ParamSpec {
            name: "name",
            param_type: ParamType::String,
            description: "The name of the document",
        }],
    },
    BridgeOperation {
        kind: OperationKind::AppendText,
        function_name: "append_text_doc",
        endpoint: "append_text_doc",
        description: "Append text into an existing Google Doc",
        params: &[
            ParamSpec {
                name: "doc_id",
                param_type: ParamType::String,
                description: "The id of the Google Doc to write into",
            },
            ParamSpec {
                name: "text",
                param_type: ParamType::String,
                description: "The text to insert",
            },
        ],
    },
    BridgeOperation {
        kind: OperationKind::CreateSheet,
        function_name: "create_google_sheet",
        endpoint: "create_sheet",
        description: "Create a new Google Sheet in Drive",
        params: &[ParamSpec {
            name: "name",
            param_type: ParamType::String,
            description: "The name of the spreadsheet",
        }],
    },
    BridgeOperation {
        kind: OperationKind::PopulateSheet,
        function_name: "populate_google_sheet",
        endpoint: "populate_google_sheet",
        description: "Populate a Google Sheet with tabular data",
        params: &[
            ParamSpec {
                name: "sheet_id",
                param_type: ParamType::String,
                description: "The id of the Google Sheet to fill",
            },
            ParamSpec {
                name: "values",
                param_type: ParamType::StringTable,
                description: "Rows of cells, written starting at the top-left cell",
            },
        ],
    },
];

/// The whole catalog, in a stable order.
pub fn catalog() -> &'static [BridgeOperation] {
    &CATALOG
}

impl OperationKind {
    pub fn operation(&self) -> &'static BridgeOperation {
        match self {
            OperationKind::CreateDocument => &CATALOG[0],
            OperationKind::AppendText => &CATALOG[1],
            OperationKind::CreateSheet => &CATALOG[2],
            OperationKind::PopulateSheet => &CATALOG[3],
        }
    }

    pub fn from_function_name(name: &str) -> Option<Self> {
        CATALOG
            .iter()
            .find(|op| op.function_name == name)
            .map(|op| op.kind)
    }

    pub fn function_name(&self) -> &'static str {
        self.operation().function_name
    }

    pub fn endpoint(&self) -> &'static str {
        self.operation().endpoint
    }
}

// ============================================================================
// REQUEST BODIES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDocRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendTextRequest {
    pub doc_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSheetRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateSheetRequest {
    pub sheet_id: String,
    pub values: Vec<Vec<String>>,
}

/// A parsed and validated request for one catalog operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeRequest {
    CreateDocument(CreateDocRequest),
    AppendText(AppendTextRequest),
    CreateSheet(CreateSheetRequest),
    PopulateSheet(PopulateSheetRequest),
}

impl BridgeRequest {
    /// Parses `args` strictly as the declared input type of `kind`, then
    /// validates it. Anything else is a validation error; nothing is coerced.
    pub fn parse(kind: OperationKind, args: &Value) -> Result<Self, BridgeError> {
        if !args.is_object() {
            return Err(BridgeError::Validation(format!(
                "{} expects a JSON object",
                kind.function_name()
            )));
        }

        let request = match kind {
            OperationKind::CreateDocument => BridgeRequest::CreateDocument(from_value(kind, args)?),
            OperationKind::AppendText => BridgeRequest::AppendText(from_value(kind, args)?),
            OperationKind::CreateSheet => BridgeRequest::CreateSheet(from_value(kind, args)?),
            OperationKind::PopulateSheet => BridgeRequest::PopulateSheet(from_value(kind, args)?),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            BridgeRequest::CreateDocument(_) => OperationKind::CreateDocument,
            BridgeRequest::AppendText(_) => OperationKind::AppendText,
            BridgeRequest::CreateSheet(_) => OperationKind::CreateSheet,
            BridgeRequest::PopulateSheet(_) => OperationKind::PopulateSheet,
        }
    }

    /// JSON body as the bridge endpoint expects it.
    pub fn to_json(&self) -> Value {
        let value = match self {
            BridgeRequest::CreateDocument(req) => serde_json::to_value(req),
            BridgeRequest::AppendText(req) => serde_json::to_value(req),
            BridgeRequest::CreateSheet(req) => serde_json::to_value(req),
            BridgeRequest::PopulateSheet(req) => serde_json::to_value(req),
        };
        // Plain structs of strings always serialize.
        value.unwrap_or(Value::Null)
    }

    /// Names must have visible characters. Text may be whitespace but not
    /// empty. Ids are Drive ids, so they never need escaping in a URL path.
    /// An empty `values` array is a zero-row write.
    pub fn validate(&self) -> Result<(), BridgeError> {
        match self {
            BridgeRequest::CreateDocument(req) => require_non_empty("name", &req.name),
            BridgeRequest::CreateSheet(req) => require_non_empty("name", &req.name),
            BridgeRequest::AppendText(req) => {
                require_resource_id("doc_id", &req.doc_id)?;
                if req.text.is_empty() {
                    return Err(BridgeError::Validation("'text' must not be empty".to_string()));
                }
                Ok(())
            }
            BridgeRequest::PopulateSheet(req) => require_resource_id("sheet_id", &req.sheet_id),
        }
    }
}

fn from_value<T: for<'de> Deserialize<'de>>(kind: OperationKind, args: &Value) -> Result<T, BridgeError> {
    T::deserialize(args).map_err(|e| {
        BridgeError::Validation(format!("invalid {} request: {}", kind.function_name(), e))
    })
}

fn require_non_empty(field: &str, value: &str) -> Result<(), BridgeError> {
    if value.trim().is_empty() {
        return Err(BridgeError::Validation(format!(
            "'{}' must be a non-empty string",
            field
        )));
    }
    Ok(())
}

fn require_resource_id(field: &str, value: &str) -> Result<(), BridgeError> {
    require_non_empty(field, value)?;
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(BridgeError::Validation(format!(
            "'{}' may only contain letters, digits, '-' and '_'",
            field
        )));
    }
    Ok(())
}
