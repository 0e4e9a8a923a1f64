pub mod encoder;
pub mod response_decoder;
pub mod stream;

use serde::{Deserialize, Serialize};

/// Dashboard chat request wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardChatRequest {
    pub model: String,
    pub messages: Vec<DashboardMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<DashboardTextBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<DashboardToolConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_config: Option<DashboardInferenceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// Dashboard message wire type.
///
/// `content` is a flat string for plain text turns and a content-block array
/// for tool calls, tool results and attachments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMessage {
    pub role: String,
    pub content: serde_json::Value,
}

/// A bare `{text}` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardTextBlock {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardToolConfig {
    pub tools: Vec<DashboardTool>,
}

/// Tool definition wire type: `{toolSpec:{name, description, inputSchema:{json}}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTool {
    pub tool_spec: DashboardToolSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardToolSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: DashboardInputSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardInputSchema {
    pub json: serde_json::Value,
}

/// Generation parameters wire type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardInferenceConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
}

/// Vendor error body: `{"error": "..."}` or `{"error": {"message": "..."}}` or `{"message": "..."}`.
#[must_use]
pub fn error_message_from_body(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    let message = match value.get("error") {
        Some(serde_json::Value::String(message)) => Some(message.as_str()),
        Some(serde_json::Value::Object(error)) => {
            error.get("message").and_then(serde_json::Value::as_str)
        }
        _ => None,
    }
    .or_else(|| value.get("message").and_then(serde_json::Value::as_str))
    .or_else(|| value.get("detail").and_then(serde_json::Value::as_str))?;
    Some(message.to_string())
}
