//! Standard JSON-RPC and MCP error codes.
//!
//! Errors only acquire a numeric code when they cross a wire boundary
//! (the router or a transport). Inside a process they stay [`McpError`](super::McpError).

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;

/// The JSON sent is not a valid Request object.
pub const INVALID_REQUEST: i32 = -32600;

/// The method does not exist.
pub const METHOD_NOT_FOUND: i32 = -32601;

/// Invalid method parameters.
pub const INVALID_PARAMS: i32 = -32602;

/// Internal JSON-RPC error.
pub const INTERNAL_ERROR: i32 = -32603;

/// Server error range start.
pub const SERVER_ERROR_START: i32 = -32000;

/// Server error range end.
pub const SERVER_ERROR_END: i32 = -32099;

// MCP-specific codes

/// Resource, tool or prompt was not found.
pub const RESOURCE_NOT_FOUND: i32 = -32002;

/// A capability handler failed.
pub const HANDLER_ERROR: i32 = SERVER_ERROR_START - 1;

/// A transport round trip failed.
pub const TRANSPORT_ERROR: i32 = SERVER_ERROR_START;

/// The request was cancelled before producing a result.
pub const REQUEST_CANCELLED: i32 = SERVER_ERROR_START - 8;

/// Registration-time conflicts (names, prefixes, templates, cycles).
pub const REGISTRATION_CONFLICT: i32 = SERVER_ERROR_START - 10;

/// Two resource candidates matched the same identifier at call time.
pub const RESOURCE_CONFLICT: i32 = SERVER_ERROR_START - 11;
