use std::sync::Arc;
use std::time::Instant;

use futures_util::{future, stream, StreamExt};
use parking_lot::Mutex;

use crate::error::ProviderError;
use crate::observability::log_request_complete;
use crate::observability::token_counter::{estimate_request_tokens, estimate_tokens, merge_usage};
use crate::protocol::canonical::{ChatChunk, ChatRequest, ChatResponse, TokenUsage};
use crate::protocol::dashboard::encoder::encode_chat_request;
use crate::protocol::dashboard::response_decoder::decode_chat_response;
use crate::protocol::dashboard::stream::{chat_chunk_stream, ChatChunkStream};
use crate::state::ProviderState;
use crate::stream::transcript_stream;

/// Run one chat turn and wait for the full answer.
///
/// # Errors
///
/// Returns [`ProviderError::InvalidRequest`] for malformed conversations
/// (checked before any network call), [`ProviderError::Auth`] without
/// credentials, and transport/upstream/translation errors from the call.
pub async fn chat(state: &ProviderState, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
    let started = Instant::now();
    let body = encode_chat_request(request, false)?;
    let token = state.bearer_token().await?;
    let request_id = state.next_request_id();
    tracing::debug!(
        %request_id,
        model = %request.model,
        messages = body.messages.len(),
        tools = request.tools.len(),
        "Sending Dashboard chat request"
    );

    let raw = state
        .transport
        .post_json(state.endpoints.chat(), &token, &body)
        .await?;
    let response = decode_chat_response(raw, request)?;

    if state.config.features.log_usage {
        let usage = merge_usage(
            &response.usage,
            estimate_request_tokens(request),
            estimate_tokens(&response.message.text),
        );
        log_request_complete(&request.model, &usage, started);
    }
    Ok(response)
}

/// Start a streamed chat turn.
///
/// The returned stream yields chunks as the upstream produces them and ends
/// at the completion marker or at end of body.
///
/// # Errors
///
/// Same as [`chat`] for everything that happens before the first byte;
/// read failures afterwards surface as one `Err` item in the stream.
pub async fn chat_stream(
    state: &ProviderState,
    request: &ChatRequest,
) -> Result<ChatChunkStream, ProviderError> {
    let started = Instant::now();
    let body = encode_chat_request(request, true)?;
    let token = state.bearer_token().await?;
    let request_id = state.next_request_id();
    tracing::debug!(
        %request_id,
        model = %request.model,
        messages = body.messages.len(),
        tools = request.tools.len(),
        "Opening Dashboard chat stream"
    );

    let bytes = state
        .transport
        .post_stream(state.endpoints.chat_stream(), &token, &body)
        .await?;
    let chunks = chat_chunk_stream(transcript_stream(bytes));
    if !state.config.features.log_usage {
        return Ok(chunks);
    }
    Ok(with_usage_logging(
        chunks,
        request.model.clone(),
        estimate_request_tokens(request),
        started,
    ))
}

#[derive(Default)]
struct StreamUsage {
    reported: TokenUsage,
    estimated_output: u64,
}

/// Log usage once the chunk stream is exhausted.
fn with_usage_logging(
    chunks: ChatChunkStream,
    model: String,
    estimated_input: u64,
    started: Instant,
) -> ChatChunkStream {
    let seen = Arc::new(Mutex::new(StreamUsage::default()));
    let tracker = Arc::clone(&seen);
    let tracked = chunks.inspect(move |item| {
        if let Ok(chunk) = item {
            record_chunk(&mut tracker.lock(), chunk);
        }
    });
    let finish = stream::once(async move {
        let seen = seen.lock();
        let usage = merge_usage(&seen.reported, estimated_input, seen.estimated_output);
        log_request_complete(&model, &usage, started);
        None::<Result<ChatChunk, ProviderError>>
    })
    .filter_map(future::ready);
    tracked.chain(finish).boxed()
}

fn record_chunk(usage: &mut StreamUsage, chunk: &ChatChunk) {
    if !chunk.usage.is_empty() {
        usage.reported = chunk.usage.clone();
    }
    usage.estimated_output += estimate_tokens(&chunk.text);
}
