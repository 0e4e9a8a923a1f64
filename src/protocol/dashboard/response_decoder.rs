use serde_json::Value;

use crate::error::ProviderError;
use crate::protocol::canonical::{
    ChatMessage, ChatRequest, ChatResponse, TokenUsage, ToolCall, ToolCallResult,
};
use crate::util::next_tool_use_id;

/// Decode a non-streaming Dashboard chat response.
///
/// The assistant turn is read from `response` when present and from the top
/// level otherwise. Tool uses are paired with the tools offered in `request`.
///
/// # Errors
///
/// Returns [`ProviderError::Translation`] when the body is not a JSON object.
pub fn decode_chat_response(
    body: Value,
    request: &ChatRequest,
) -> Result<ChatResponse, ProviderError> {
    if !body.is_object() {
        return Err(ProviderError::Translation(
            "chat response is not a JSON object".to_string(),
        ));
    }
    let turn = match body.get("response") {
        Some(response @ Value::Object(_)) => response,
        _ => &body,
    };

    let text = extract_text(turn);
    let tool_calls = extract_tool_calls(turn);
    let usage = turn
        .get("usage")
        .or_else(|| body.get("usage"))
        .map(usage_from_value)
        .unwrap_or_default();
    let stop_reason = turn
        .get("stopReason")
        .or_else(|| turn.get("stop_reason"))
        .or_else(|| body.get("stopReason"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut message = ChatMessage::assistant(text);
    message.tool_calls.extend(tool_calls.iter().cloned());
    let tool_calls = tool_calls
        .into_iter()
        .map(|call| ToolCallResult {
            definition: request.tool(&call.name).cloned(),
            call,
        })
        .collect();

    Ok(ChatResponse {
        message,
        tool_calls,
        stop_reason,
        usage,
        raw: body,
    })
}

fn extract_text(turn: &Value) -> String {
    match turn.get("content") {
        Some(Value::String(text)) => return text.clone(),
        Some(Value::Array(blocks)) => return concat_text_blocks(blocks),
        _ => {}
    }
    match turn.get("message").and_then(|message| message.get("content")) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => concat_text_blocks(blocks),
        _ => String::new(),
    }
}

fn concat_text_blocks(blocks: &[Value]) -> String {
    let mut out = String::new();
    for text in blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
    {
        out.push_str(text);
    }
    out
}

fn content_blocks(turn: &Value) -> &[Value] {
    let content = turn
        .get("content")
        .filter(|content| content.is_array())
        .or_else(|| turn.get("message").and_then(|message| message.get("content")));
    match content {
        Some(Value::Array(blocks)) => blocks,
        _ => &[],
    }
}

/// Collect tool uses from `toolUse` (object or array) and from content blocks.
fn extract_tool_calls(turn: &Value) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    match turn.get("toolUse") {
        Some(Value::Array(items)) => calls.extend(items.iter().filter_map(tool_call_from_value)),
        Some(item @ Value::Object(_)) => calls.extend(tool_call_from_value(item)),
        _ => {}
    }
    for tool in content_blocks(turn)
        .iter()
        .filter_map(|block| block.get("toolUse"))
    {
        if let Some(call) = tool_call_from_value(tool) {
            if !calls.iter().any(|existing| existing.id == call.id) {
                calls.push(call);
            }
        }
    }
    calls
}

/// Build a tool call from a vendor tool-use object.
///
/// Returns `None` when the object has no tool name. A missing `toolUseId`
/// gets a generated `tooluse_` id.
#[must_use]
pub fn tool_call_from_value(tool: &Value) -> Option<ToolCall> {
    let name = tool.get("name").and_then(Value::as_str)?;
    let id = tool
        .get("toolUseId")
        .or_else(|| tool.get("id"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map_or_else(next_tool_use_id, str::to_string);
    let arguments = tool
        .get("input")
        .or_else(|| tool.get("arguments"))
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));
    let call = ToolCall::new(id, name, arguments);
    let arguments = call.arguments_value();
    Some(ToolCall { arguments, ..call })
}

/// Token usage from a vendor usage object, camelCase or snake_case.
#[must_use]
pub fn usage_from_value(usage: &Value) -> TokenUsage {
    usage.as_object().map(usage_from_map).unwrap_or_default()
}

#[must_use]
pub fn usage_from_map(usage: &serde_json::Map<String, Value>) -> TokenUsage {
    let read = |camel: &str, snake: &str| {
        usage
            .get(camel)
            .or_else(|| usage.get(snake))
            .and_then(Value::as_u64)
    };
    let input_tokens = read("inputTokens", "input_tokens");
    let output_tokens = read("outputTokens", "output_tokens");
    let total_tokens = read("totalTokens", "total_tokens").or_else(|| {
        input_tokens
            .zip(output_tokens)
            .map(|(input, output)| input + output)
    });
    TokenUsage {
        input_tokens,
        output_tokens,
        total_tokens,
    }
}
