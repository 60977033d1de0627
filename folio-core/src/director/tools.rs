//! Tools the director exposes to the model.

use claude::Tool;
use serde_json::Value;

use crate::retrieval::QuoteRequest;

/// All tool definitions for the Claude API.
pub fn scene_tools() -> Vec<Tool> {
    vec![QuoteRequest::as_tool()]
}

/// Parse a `search_quotes` invocation into a request.
pub fn parse_search_request(input: &Value) -> Result<QuoteRequest, String> {
    serde_json::from_value(input.clone()).map_err(|e| format!("invalid search_quotes input: {e}"))
}
