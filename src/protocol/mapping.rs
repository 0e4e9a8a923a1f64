use serde::{Deserialize, Serialize};

use super::canonical::{MediaKind, ModelCapability, Role};

// ---------------------------------------------------------------------------
// Role mappings
// ---------------------------------------------------------------------------

/// Wire role for a message. Tool results travel as user turns.
#[must_use]
pub fn role_to_dashboard(role: Role) -> &'static str {
    match role {
        Role::System | Role::User | Role::Tool => "user",
        Role::Assistant => "assistant",
    }
}

/// Role from the wire, falling back to assistant like the vendor stream does.
#[must_use]
pub fn dashboard_role_to_canonical(s: &str) -> Role {
    match Role::parse(s) {
        Some(Role::Tool) => Role::User,
        Some(role) => role,
        None => Role::Assistant,
    }
}

// ---------------------------------------------------------------------------
// Media mappings
// ---------------------------------------------------------------------------

/// Attachment kind for a lower-cased MIME type, `None` when unsupported.
#[must_use]
pub fn media_kind_from_mime(mime: &str) -> Option<MediaKind> {
    let (top, sub) = mime.split_once('/')?;
    match top {
        "image" => Some(MediaKind::Image),
        "video" => Some(MediaKind::Video),
        "text" => Some(MediaKind::Document),
        "application" if document_format(sub).is_some() => Some(MediaKind::Document),
        _ => None,
    }
}

/// Vendor format tag for a lower-cased MIME type.
#[must_use]
pub fn media_format_from_mime(mime: &str) -> &str {
    let Some((top, sub)) = mime.split_once('/') else {
        return mime;
    };
    let sub = sub.split(';').next().unwrap_or(sub).trim();
    match (top, sub) {
        ("image", "jpg" | "jpeg" | "pjpeg") => "jpeg",
        ("image", "svg+xml") => "svg",
        ("video", "quicktime") => "mov",
        ("video", "x-matroska") => "mkv",
        ("video", "x-flv") => "flv",
        ("video", "x-ms-wmv") => "wmv",
        ("video", "3gpp") => "three_gp",
        ("text", "plain") => "txt",
        ("text", "markdown") => "md",
        ("text", "html") => "html",
        ("text", "csv") => "csv",
        ("application", other) => document_format(other).unwrap_or(other),
        (_, other) => other,
    }
}

fn document_format(sub: &str) -> Option<&'static str> {
    match sub {
        "pdf" => Some("pdf"),
        "msword" => Some("doc"),
        "vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "vnd.ms-excel" => Some("xls"),
        "vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Some("xlsx"),
        "json" => Some("txt"),
        _ => None,
    }
}

/// Wire key for a media block (`image`, `video`, `document`).
#[must_use]
pub fn media_kind_key(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Image => "image",
        MediaKind::Video => "video",
        MediaKind::Document => "document",
    }
}

// ---------------------------------------------------------------------------
// Capability mappings
// ---------------------------------------------------------------------------

/// Capability flag as published by the remote model catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCapability {
    #[serde(alias = "text", alias = "completion")]
    Chat,
    #[serde(alias = "image_input", alias = "multimodal")]
    Vision,
    #[serde(alias = "function_calling", alias = "tool_use")]
    Tools,
    #[serde(alias = "json_mode")]
    JsonOutput,
    #[serde(alias = "response_schema")]
    StructuredOutput,
    SystemPrompt,
    #[serde(alias = "embedding")]
    Embeddings,
    #[serde(alias = "image", alias = "text_to_image")]
    ImageGeneration,
    Streaming,
    #[serde(other)]
    Unknown,
}

/// Map a remote capability flag to the provider-agnostic capability.
///
/// Flags with no local counterpart map to `None`.
#[must_use]
pub fn remote_capability_to_canonical(flag: RemoteCapability) -> Option<ModelCapability> {
    match flag {
        RemoteCapability::Chat => Some(ModelCapability::Chat),
        RemoteCapability::Vision => Some(ModelCapability::ChatWithImageVision),
        RemoteCapability::Tools => Some(ModelCapability::ChatWithTools),
        RemoteCapability::JsonOutput => Some(ModelCapability::ChatJsonOutput),
        RemoteCapability::StructuredOutput => Some(ModelCapability::ChatStructuredResponse),
        RemoteCapability::SystemPrompt => Some(ModelCapability::ChatSystemRole),
        RemoteCapability::Embeddings => Some(ModelCapability::Embeddings),
        RemoteCapability::ImageGeneration => Some(ModelCapability::TextToImage),
        RemoteCapability::Streaming | RemoteCapability::Unknown => None,
    }
}
