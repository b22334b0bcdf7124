//! Formatting helpers for the chat dispatcher.
//!
//! Turns bridge results into the text we show the user, and cleans up the
//! Markdown wrapping models like to put around JSON.

use crate::core::bridge::{OperationKind, OperationResult};

/// Formats a bridge result for the chat user.
///
/// Failures are passed through verbatim so the user sees what Google (or the
/// bridge) actually said.
pub fn format_result(kind: OperationKind, result: &OperationResult) -> String {
    match result {
        OperationResult::Success(success) => {
            let link = success.resource_link.as_deref().unwrap_or_default();
            match kind {
                OperationKind::CreateDocument => format!("✅ Document created: {}", link),
                OperationKind::CreateSheet => format!("✅ Sheet created: {}", link),
                OperationKind::AppendText => {
                    format!("✅ Text appended to document {}", success.resource_id)
                }
                OperationKind::PopulateSheet => {
                    let rows = success
                        .fields
                        .get("rows_added")
                        .and_then(|v| v.as_u64())
                        .unwrap_or_default();
                    format!("✅ {} rows written to sheet: {}", rows, link)
                }
            }
        }
        OperationResult::AuthRequired { authorization_url } => format!(
            "⚠️ Please authenticate first: {}\n\nAfter authenticating, try your request again!",
            authorization_url
        ),
        OperationResult::Failure(failure) => failure.message.clone(),
    }
}

/// Strips one layer of Markdown code fences (```` ```json ... ``` ````) if present.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}
