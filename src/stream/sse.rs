//! Line-oriented decoder for the vendor chat stream.
//!
//! The vendor sends one `data: {json}` record per line. Records are decoded
//! into [`StreamEvent`]s; anything that is not a `data: ` line is ignored and
//! undecodable JSON is logged and skipped.
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures_util::stream::FusedStream;
use futures_util::Stream;
use memchr::memchr;
use serde_json::Value;

use super::StreamEvent;
use crate::error::ProviderError;
use crate::protocol::canonical::Role;
use crate::protocol::mapping::dashboard_role_to_canonical;
use crate::util::truncate_for_log;

const DATA_PREFIX: &str = "data: ";

/// What the decoder should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    /// A `complete` record was seen; nothing after it may be read.
    Complete,
}

/// Decode one line of the stream, appending any events it carries to `out`.
///
/// Surrounding whitespace is trimmed first. A line can carry several events:
/// a text delta, one tool use per `toolUse` element, then the completion
/// marker, in that order.
pub fn decode_line(line: &[u8], out: &mut VecDeque<StreamEvent>) -> LineOutcome {
    let Ok(line) = std::str::from_utf8(line) else {
        tracing::warn!(len = line.len(), "Skipping non UTF-8 stream line");
        return LineOutcome::Continue;
    };
    let Some(payload) = line.trim().strip_prefix(DATA_PREFIX) else {
        return LineOutcome::Continue;
    };

    let record = match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(record)) => record,
        Ok(_) => {
            tracing::warn!(
                payload = truncate_for_log(payload, 256),
                "Skipping stream record that is not a JSON object"
            );
            return LineOutcome::Continue;
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                payload = truncate_for_log(payload, 256),
                "Failed to decode stream record"
            );
            return LineOutcome::Continue;
        }
    };

    let role = record
        .get("role")
        .and_then(Value::as_str)
        .map_or(Role::Assistant, dashboard_role_to_canonical);

    if let Some(delta) = record.get("delta") {
        let text = match delta {
            Value::String(text) => text.clone(),
            Value::Object(obj) => obj
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };
        let usage = match record.get("usage") {
            Some(Value::Object(usage)) => usage.clone(),
            _ => serde_json::Map::new(),
        };
        out.push_back(StreamEvent::TextDelta { role, text, usage });
    }

    let tool_use = record.get("toolUse").or_else(|| {
        record
            .get("response")
            .and_then(|response| response.get("toolUse"))
    });
    if let Some(tool_use) = tool_use {
        let stop_reason = record
            .get("stopReason")
            .or_else(|| record.get("response").and_then(|r| r.get("stopReason")))
            .and_then(Value::as_str)
            .map(str::to_string);
        let content = record.get("content").cloned();
        let tools: Vec<&Value> = match tool_use {
            Value::Array(items) => items.iter().collect(),
            Value::Null => Vec::new(),
            single => vec![single],
        };
        for tool in tools {
            out.push_back(StreamEvent::ToolUse {
                role,
                tool: tool.clone(),
                stop_reason: stop_reason.clone(),
                content: content.clone(),
            });
        }
    }

    if record.get("complete").is_some_and(is_truthy) {
        out.push_back(StreamEvent::Complete);
        return LineOutcome::Complete;
    }
    LineOutcome::Continue
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false"),
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
        Value::Null => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Reading,
    /// Body ended; the unterminated tail still has to be decoded.
    Eof,
    Done,
}

pin_project_lite::pin_project! {
    /// Lazy, single-pass stream of [`StreamEvent`]s over a response body.
    ///
    /// The body is read only as fast as events are pulled. After a
    /// `complete` record, end of body, or a read error the stream yields
    /// `None` forever.
    pub struct TranscriptStream<S> {
        #[pin]
        body: S,
        buffer: BytesMut,
        pending: VecDeque<StreamEvent>,
        state: ReadState,
    }
}

impl<S> TranscriptStream<S> {
    #[must_use]
    pub fn new(body: S) -> Self {
        Self {
            body,
            buffer: BytesMut::with_capacity(4096),
            pending: VecDeque::with_capacity(4),
            state: ReadState::Reading,
        }
    }
}

/// Decode a raw byte stream into stream events.
pub fn transcript_stream<S, E>(body: S) -> TranscriptStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<ProviderError>,
{
    TranscriptStream::new(body)
}

impl<S, E> Stream for TranscriptStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<ProviderError>,
{
    type Item = Result<StreamEvent, ProviderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            match *this.state {
                ReadState::Done => return Poll::Ready(None),
                ReadState::Eof => {
                    if !this.buffer.is_empty() {
                        let tail = this.buffer.split();
                        decode_line(&tail, this.pending);
                    }
                    *this.state = ReadState::Done;
                    continue;
                }
                ReadState::Reading => {}
            }

            if let Some(pos) = memchr(b'\n', &this.buffer[..]) {
                let line = this.buffer.split_to(pos + 1);
                if decode_line(&line, this.pending) == LineOutcome::Complete {
                    *this.state = ReadState::Done;
                    this.buffer.clear();
                }
                continue;
            }

            match ready!(this.body.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.buffer.extend_from_slice(&chunk),
                Some(Err(err)) => {
                    *this.state = ReadState::Done;
                    this.buffer.clear();
                    let err: ProviderError = err.into();
                    tracing::warn!(error = %err, "Chat stream read failed");
                    return Poll::Ready(Some(Err(err)));
                }
                None => *this.state = ReadState::Eof,
            }
        }
    }
}

impl<S, E> FusedStream for TranscriptStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<ProviderError>,
{
    fn is_terminated(&self) -> bool {
        self.state == ReadState::Done && self.pending.is_empty()
    }
}
