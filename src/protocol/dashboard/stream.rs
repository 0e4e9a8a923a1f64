use futures_util::stream::BoxStream;
use futures_util::{future, Stream, StreamExt};

use crate::error::ProviderError;
use crate::protocol::canonical::{ChatChunk, TokenUsage};
use crate::protocol::dashboard::response_decoder::{tool_call_from_value, usage_from_map};
use crate::stream::StreamEvent;

/// Lazy stream of chat chunks handed to callers.
pub type ChatChunkStream = BoxStream<'static, Result<ChatChunk, ProviderError>>;

/// Map one decoded stream event to the chunk callers see.
///
/// `Complete` and tool uses without a name produce no chunk.
#[must_use]
pub fn stream_event_to_chunk(event: StreamEvent) -> Option<ChatChunk> {
    match event {
        StreamEvent::TextDelta { role, text, usage } => Some(ChatChunk {
            role,
            text,
            usage: usage_from_map(&usage),
            tool_call: None,
            stop_reason: None,
        }),
        StreamEvent::ToolUse {
            role,
            tool,
            stop_reason,
            ..
        } => {
            let Some(call) = tool_call_from_value(&tool) else {
                tracing::warn!(tool = %tool, "Dropping streamed tool use without a name");
                return None;
            };
            Some(ChatChunk {
                role,
                text: String::new(),
                usage: TokenUsage::default(),
                tool_call: Some(call),
                stop_reason,
            })
        }
        StreamEvent::Complete => None,
    }
}

/// Wrap decoded stream events into chat chunks, ending at `Complete`.
pub fn chat_chunk_stream<S>(events: S) -> ChatChunkStream
where
    S: Stream<Item = Result<StreamEvent, ProviderError>> + Send + 'static,
{
    events
        .take_while(|item| future::ready(!matches!(item, Ok(StreamEvent::Complete))))
        .filter_map(|item| {
            future::ready(match item {
                Ok(event) => stream_event_to_chunk(event).map(Ok),
                Err(err) => Some(Err(err)),
            })
        })
        .fuse()
        .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::Role;
    use crate::stream::transcript_stream;
    use bytes::Bytes;
    use serde_json::json;

    fn chunks_from(lines: &'static str) -> ChatChunkStream {
        let body = futures_util::stream::iter(vec![Ok::<_, ProviderError>(Bytes::from_static(
            lines.as_bytes(),
        ))]);
        chat_chunk_stream(transcript_stream(body))
    }

    #[tokio::test]
    async fn test_text_deltas_become_chunks_in_order() {
        let chunks: Vec<ChatChunk> = chunks_from(
            "data: {\"delta\":\"Hel\"}\ndata: {\"delta\":\"lo\",\"usage\":{\"outputTokens\":2}}\ndata: {\"complete\":true}\n",
        )
        .map(Result::unwrap)
        .collect()
        .await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Hel");
        assert_eq!(chunks[0].role, Role::Assistant);
        assert_eq!(chunks[1].text, "lo");
        assert_eq!(chunks[1].usage.output_tokens, Some(2));
    }

    #[tokio::test]
    async fn test_tool_use_becomes_empty_text_chunk_with_call() {
        let chunks: Vec<ChatChunk> = chunks_from(
            "data: {\"toolUse\":{\"name\":\"get_weather\",\"input\":{\"city\":\"Oslo\"}},\"stopReason\":\"tool_use\"}\n",
        )
        .map(Result::unwrap)
        .collect()
        .await;
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.is_empty());
        let call = chunks[0].tool_call.as_ref().unwrap();
        assert_eq!(call.name, "get_weather");
        assert!(call.id.starts_with("tooluse_"));
        assert_eq!(call.arguments, json!({"city": "Oslo"}));
        assert_eq!(chunks[0].stop_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn test_complete_and_nameless_tool_produce_no_chunk() {
        assert!(stream_event_to_chunk(StreamEvent::Complete).is_none());
        assert!(stream_event_to_chunk(StreamEvent::ToolUse {
            role: Role::Assistant,
            tool: json!({"input": {}}),
            stop_reason: None,
            content: None,
        })
        .is_none());
    }
}
