use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::protocol::mapping::{media_format_from_mime, media_kind_from_mime};

/// Provider-agnostic message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    #[serde(alias = "tool_result")]
    Tool,
}

impl Role {
    /// Parse a role name as used by host frameworks and the vendor stream.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" | "tool_result" => Some(Role::Tool),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Kind of a media attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Document,
}

/// Where the bytes of a media attachment live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPayload {
    Inline(Arc<[u8]>),
    Remote(String),
}

/// An image, video or document attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlock {
    kind: MediaKind,
    format: String,
    mime_type: String,
    name: Option<String>,
    payload: MediaPayload,
}

impl MediaBlock {
    /// Build an attachment from local bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRequest`] for MIME types the vendor cannot accept.
    pub fn inline(mime_type: &str, bytes: impl Into<Arc<[u8]>>) -> Result<Self, ProviderError> {
        Self::build(mime_type, MediaPayload::Inline(bytes.into()))
    }

    /// Build an attachment that already lives in remote storage.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRequest`] for MIME types the vendor cannot accept.
    pub fn remote(mime_type: &str, uri: impl Into<String>) -> Result<Self, ProviderError> {
        Self::build(mime_type, MediaPayload::Remote(uri.into()))
    }

    fn build(mime_type: &str, payload: MediaPayload) -> Result<Self, ProviderError> {
        let mime = mime_type.trim().to_ascii_lowercase();
        let kind = media_kind_from_mime(&mime).ok_or_else(|| {
            ProviderError::InvalidRequest(format!("Unsupported attachment type '{mime_type}'"))
        })?;
        let format = media_format_from_mime(&mime).to_string();
        Ok(Self {
            kind,
            format,
            mime_type: mime,
            name: None,
            payload,
        })
    }

    /// Attach a display name; documents require one on the wire.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn payload(&self) -> &MediaPayload {
        &self.payload
    }
}

/// A model-initiated function invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON arguments. A string value is treated as serialized JSON.
    pub arguments: serde_json::Value,
}

impl ToolCall {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Arguments as a JSON value, parsing string-encoded arguments.
    ///
    /// Unparseable argument strings become an empty object.
    #[must_use]
    pub fn arguments_value(&self) -> serde_json::Value {
        match &self.arguments {
            serde_json::Value::String(raw) if raw.trim().is_empty() => serde_json::json!({}),
            serde_json::Value::String(raw) => {
                serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
            }
            serde_json::Value::Null => serde_json::json!({}),
            other => other.clone(),
        }
    }
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub attachments: Vec<MediaBlock>,
    pub tool_calls: SmallVec<[ToolCall; 1]>,
    pub tool_result_id: Option<String>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            attachments: Vec::new(),
            tool_calls: SmallVec::new(),
            tool_result_id: None,
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// A tool-result turn answering the tool call `tool_call_id`.
    #[must_use]
    pub fn tool_result(tool_call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_result_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, text)
        }
    }

    #[must_use]
    pub fn with_attachment(mut self, block: MediaBlock) -> Self {
        self.attachments.push(block);
        self
    }

    #[must_use]
    pub fn with_tool_call(mut self, call: ToolCall) -> Self {
        self.tool_calls.push(call);
        self
    }
}

/// Check that every tool-result turn answers an earlier assistant tool call.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidRequest`] naming the first offending message.
pub fn validate_messages(messages: &[ChatMessage]) -> Result<(), ProviderError> {
    let mut offered: Vec<&str> = Vec::new();
    for (index, message) in messages.iter().enumerate() {
        if message.role == Role::Assistant {
            offered.extend(message.tool_calls.iter().map(|call| call.id.as_str()));
        }
        if message.role != Role::Tool {
            continue;
        }
        let Some(result_id) = message.tool_result_id.as_deref() else {
            return Err(ProviderError::InvalidRequest(format!(
                "messages[{index}]: tool message is missing its tool result id"
            )));
        };
        if !offered.contains(&result_id) {
            return Err(ProviderError::InvalidRequest(format!(
                "messages[{index}]: tool result '{result_id}' does not answer any earlier tool call"
            )));
        }
    }
    Ok(())
}

/// A tool offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub parameters_schema: Option<serde_json::Value>,
}

impl ToolDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters_schema: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.parameters_schema = Some(schema);
        self
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl TokenUsage {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none() && self.output_tokens.is_none() && self.total_tokens.is_none()
    }
}

/// Generation parameters passed through to the vendor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: Option<u64>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop: Option<Vec<String>>,
}

impl GenerationParams {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.max_tokens.is_none()
            && self.temperature.is_none()
            && self.top_p.is_none()
            && self.stop.as_ref().map_or(true, Vec::is_empty)
    }
}

/// A provider-agnostic chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub system_prompt: Option<String>,
    pub tools: Arc<[ToolDefinition]>,
    /// JSON schema the assistant output must conform to.
    pub response_schema: Option<serde_json::Value>,
    pub generation: GenerationParams,
}

impl ChatRequest {
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            system_prompt: None,
            tools: Arc::from(Vec::new()),
            response_schema: None,
            generation: GenerationParams::default(),
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Arc::from(tools);
        self
    }

    #[must_use]
    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Look up an offered tool by name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.iter().find(|tool| tool.name == name)
    }
}

/// A tool call returned by the model, paired with the definition that was offered.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallResult {
    pub call: ToolCall,
    pub definition: Option<ToolDefinition>,
}

/// A provider-agnostic non-streaming chat response.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub message: ChatMessage,
    pub tool_calls: Vec<ToolCallResult>,
    pub stop_reason: Option<String>,
    pub usage: TokenUsage,
    /// The vendor document the response was decoded from.
    pub raw: serde_json::Value,
}

/// One incremental piece of a streamed chat answer.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatChunk {
    pub role: Role,
    pub text: String,
    pub usage: TokenUsage,
    pub tool_call: Option<ToolCall>,
    pub stop_reason: Option<String>,
}

/// Capabilities a model may offer, in provider-agnostic terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelCapability {
    Chat,
    ChatWithImageVision,
    ChatWithTools,
    ChatJsonOutput,
    ChatStructuredResponse,
    ChatSystemRole,
    Embeddings,
    TextToImage,
}

impl ModelCapability {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ModelCapability::Chat => "chat",
            ModelCapability::ChatWithImageVision => "chat_with_image_vision",
            ModelCapability::ChatWithTools => "chat_with_tools",
            ModelCapability::ChatJsonOutput => "chat_json_output",
            ModelCapability::ChatStructuredResponse => "chat_structured_response",
            ModelCapability::ChatSystemRole => "chat_system_role",
            ModelCapability::Embeddings => "embeddings",
            ModelCapability::TextToImage => "text_to_image",
        }
    }
}

/// Metadata about a model in the remote catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub context_window: Option<u64>,
    pub max_output_tokens: Option<u64>,
    pub capabilities: BTreeSet<ModelCapability>,
}

impl ModelDescriptor {
    /// True when the model offers every capability in `filter`.
    #[must_use]
    pub fn supports_all(&self, filter: &[ModelCapability]) -> bool {
        filter.iter().all(|cap| self.capabilities.contains(cap))
    }
}
