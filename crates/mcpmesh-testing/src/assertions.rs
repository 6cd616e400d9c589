//! Assertion helpers for tool outputs and errors.

use mcpmesh_core::error::{ErrorOrigin, McpError};
use mcpmesh_core::types::ToolOutput;

/// Assert that a tool output is successful and its text contains `expected`.
///
/// # Panics
///
/// Panics if the output is flagged as an error or lacks the text.
pub fn assert_tool_text(output: &ToolOutput, expected: &str) {
    assert!(
        !output.is_error,
        "Expected successful tool output, but got an error result"
    );
    let text = output
        .content
        .iter()
        .filter_map(|c| c.as_text())
        .collect::<Vec<_>>()
        .join("");
    assert!(
        text.contains(expected),
        "Expected tool output to contain '{expected}', but got '{text}'"
    );
}

/// Assert that `err` is a handler failure from `origin` mentioning `expected`.
///
/// # Panics
///
/// Panics if `err` is not a handler error, has another origin, or its
/// message lacks `expected`.
pub fn assert_handler_error(err: &McpError, origin: ErrorOrigin, expected: &str) {
    let Some(details) = err.handler_details() else {
        panic!("Expected a handler error, but got: {err}");
    };
    assert_eq!(
        details.origin, origin,
        "Expected {origin} handler error, but got {}",
        details.origin
    );
    assert!(
        details.message.contains(expected),
        "Expected handler error to contain '{expected}', but got '{}'",
        details.message
    );
}
