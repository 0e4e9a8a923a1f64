pub mod sse;

pub use sse::{decode_line, transcript_stream, LineOutcome, TranscriptStream};

use crate::protocol::canonical::Role;

/// One decoded record of the vendor chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental assistant text.
    TextDelta {
        role: Role,
        text: String,
        /// Raw usage object as sent by the vendor; empty when absent.
        usage: serde_json::Map<String, serde_json::Value>,
    },
    /// The model asked for a tool to be invoked.
    ToolUse {
        role: Role,
        tool: serde_json::Value,
        stop_reason: Option<String>,
        content: Option<serde_json::Value>,
    },
    /// The vendor signalled the end of the answer.
    Complete,
}

impl StreamEvent {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(self, StreamEvent::Complete)
    }
}
