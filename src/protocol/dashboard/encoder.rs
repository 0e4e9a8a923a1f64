use base64::Engine as _;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::protocol::canonical::{
    validate_messages, ChatMessage, ChatRequest, GenerationParams, MediaBlock, MediaPayload, Role,
    ToolDefinition,
};
use crate::protocol::dashboard::{
    DashboardChatRequest, DashboardInferenceConfig, DashboardInputSchema, DashboardMessage,
    DashboardTextBlock, DashboardTool, DashboardToolConfig, DashboardToolSpec,
};
use crate::protocol::mapping::{media_kind_key, role_to_dashboard};

/// Placeholder for tool results with no text; the vendor rejects empty text blocks.
pub const EMPTY_TOOL_RESULT_TEXT: &str = "Tool Result";

const DEFAULT_RESPONSE_SCHEMA_NAME: &str = "response";

/// Encode a chat request into the Dashboard chat wire format.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidRequest`] when a tool-result turn does not
/// answer an earlier tool call.
pub fn encode_chat_request(
    request: &ChatRequest,
    stream: bool,
) -> Result<DashboardChatRequest, ProviderError> {
    validate_messages(&request.messages)?;

    // --- system ---
    let mut system = Vec::new();
    if let Some(prompt) = request.system_prompt.as_deref() {
        if !prompt.is_empty() {
            system.push(DashboardTextBlock {
                text: prompt.to_string(),
            });
        }
    }

    // --- messages ---
    let mut messages = Vec::with_capacity(request.messages.len());
    for message in &request.messages {
        if message.role == Role::System {
            if !message.text.is_empty() {
                system.push(DashboardTextBlock {
                    text: message.text.clone(),
                });
            }
            continue;
        }
        messages.push(encode_message(message));
    }

    // --- tools ---
    let tool_config = if request.tools.is_empty() {
        None
    } else {
        Some(DashboardToolConfig {
            tools: request.tools.iter().map(encode_tool).collect(),
        })
    };

    // --- structured output ---
    let response_format = request.response_schema.as_ref().map(encode_response_format);

    Ok(DashboardChatRequest {
        model: request.model.clone(),
        messages,
        system,
        tool_config,
        inference_config: encode_inference_config(&request.generation),
        response_format,
        stream: stream.then_some(true),
    })
}

/// Encode one non-system message.
#[must_use]
pub fn encode_message(message: &ChatMessage) -> DashboardMessage {
    if message.role == Role::Assistant && !message.tool_calls.is_empty() {
        let mut blocks = Vec::with_capacity(message.tool_calls.len() + 1);
        if !message.text.is_empty() {
            blocks.push(json!({ "text": message.text }));
        }
        for call in &message.tool_calls {
            blocks.push(json!({
                "toolUse": {
                    "toolUseId": call.id,
                    "name": call.name,
                    "input": call.arguments_value(),
                }
            }));
        }
        return DashboardMessage {
            role: "assistant".to_string(),
            content: Value::Array(blocks),
        };
    }

    if message.role == Role::Tool || message.tool_result_id.is_some() {
        let text = if message.text.is_empty() {
            EMPTY_TOOL_RESULT_TEXT
        } else {
            message.text.as_str()
        };
        return DashboardMessage {
            role: "user".to_string(),
            content: json!([{
                "toolResult": {
                    "toolUseId": message.tool_result_id.as_deref().unwrap_or_default(),
                    "content": [{ "text": text }],
                }
            }]),
        };
    }

    let role = role_to_dashboard(message.role).to_string();
    if !message.attachments.is_empty() {
        let mut blocks: Vec<Value> = message.attachments.iter().map(encode_media_block).collect();
        if !message.text.is_empty() {
            blocks.push(json!({ "text": message.text }));
        }
        return DashboardMessage {
            role,
            content: Value::Array(blocks),
        };
    }

    DashboardMessage {
        role,
        content: Value::String(message.text.clone()),
    }
}

/// Encode an attachment as `{image|video|document: {format, [name], source}}`.
#[must_use]
pub fn encode_media_block(block: &MediaBlock) -> Value {
    let source = match block.payload() {
        MediaPayload::Inline(bytes) => json!({
            "bytes": base64::engine::general_purpose::STANDARD.encode(bytes),
        }),
        MediaPayload::Remote(uri) => json!({ "s3Location": { "uri": uri } }),
    };
    let mut body = serde_json::Map::with_capacity(3);
    body.insert("format".to_string(), Value::String(block.format().to_string()));
    if let Some(name) = block.name() {
        body.insert("name".to_string(), Value::String(name.to_string()));
    }
    body.insert("source".to_string(), source);

    let mut outer = serde_json::Map::with_capacity(1);
    outer.insert(media_kind_key(block.kind()).to_string(), Value::Object(body));
    Value::Object(outer)
}

fn encode_tool(tool: &ToolDefinition) -> DashboardTool {
    DashboardTool {
        tool_spec: DashboardToolSpec {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: DashboardInputSchema {
                json: tool
                    .parameters_schema
                    .clone()
                    .unwrap_or_else(|| json!({ "type": "object" })),
            },
        },
    }
}

fn encode_response_format(schema: &Value) -> Value {
    let name = schema
        .get("title")
        .and_then(Value::as_str)
        .filter(|title| !title.is_empty())
        .unwrap_or(DEFAULT_RESPONSE_SCHEMA_NAME);
    json!({
        "type": "json_schema",
        "jsonSchema": { "name": name, "schema": schema },
    })
}

fn encode_inference_config(generation: &GenerationParams) -> Option<DashboardInferenceConfig> {
    if generation.is_empty() {
        return None;
    }
    Some(DashboardInferenceConfig {
        max_tokens: generation.max_tokens,
        temperature: generation.temperature,
        top_p: generation.top_p,
        stop_sequences: generation.stop.clone().filter(|stop| !stop.is_empty()),
    })
}
