use std::collections::VecDeque;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dashboard_ai::protocol::canonical::{ChatMessage, ChatRequest, ToolCall, ToolDefinition};
use dashboard_ai::protocol::dashboard::encoder::encode_chat_request;
use dashboard_ai::protocol::dashboard::stream::chat_chunk_stream;
use dashboard_ai::stream::{decode_line, transcript_stream};
use dashboard_ai::ProviderError;
use futures_util::{stream, StreamExt};

fn sample_transcript(deltas: usize) -> String {
    let mut out = String::new();
    for idx in 0..deltas {
        out.push_str("data: {\"delta\":\"token ");
        out.push_str(&idx.to_string());
        out.push_str("\",\"role\":\"assistant\",\"usage\":{\"outputTokens\":1}}\n");
    }
    out.push_str(
        "data: {\"toolUse\":{\"toolUseId\":\"t-1\",\"name\":\"get_weather\",\"input\":{\"city\":\"SF\"}},\"stopReason\":\"tool_use\"}\n",
    );
    out.push_str("data: {\"complete\":true}\n");
    out
}

/// Split `transcript` into fixed-size network chunks that ignore line ends.
fn chunked(transcript: &str, size: usize) -> Vec<Bytes> {
    transcript
        .as_bytes()
        .chunks(size)
        .map(Bytes::copy_from_slice)
        .collect()
}

fn sample_request() -> ChatRequest {
    ChatRequest::new(
        "amazon.nova-lite",
        vec![
            ChatMessage::user("What is the weather in SF?"),
            ChatMessage::assistant("Let me check.").with_tool_call(ToolCall::new(
                "call_1",
                "get_weather",
                serde_json::json!("{\"city\":\"SF\"}"),
            )),
            ChatMessage::tool_result("call_1", "18C and foggy"),
        ],
    )
    .with_system_prompt("You are a helpful assistant")
    .with_tools(vec![ToolDefinition::new("get_weather")
        .with_description("Get weather")
        .with_schema(serde_json::json!({
            "type": "object",
            "properties": {"city": {"type": "string"}},
            "required": ["city"]
        }))])
}

fn bench_decode_line(c: &mut Criterion) {
    let line = b"data: {\"delta\":\"Hello there\",\"role\":\"assistant\",\"usage\":{\"inputTokens\":12}}";
    let mut out = VecDeque::with_capacity(4);

    c.bench_function("sse_decode_line_delta", |b| {
        b.iter(|| {
            out.clear();
            black_box(decode_line(black_box(line), &mut out));
        });
    });
}

fn bench_transcript_stream(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("bench runtime");
    let transcript = sample_transcript(200);

    for size in [64_usize, 1024, 16 * 1024] {
        let chunks = chunked(&transcript, size);
        c.bench_function(&format!("sse_chat_chunks_200_deltas_{size}b"), |b| {
            b.iter(|| {
                let body = stream::iter(
                    chunks
                        .iter()
                        .cloned()
                        .map(Ok::<Bytes, ProviderError>)
                        .collect::<Vec<_>>(),
                );
                let count = runtime.block_on(chat_chunk_stream(transcript_stream(body)).count());
                black_box(count);
            });
        });
    }
}

fn bench_encode_request(c: &mut Criterion) {
    let request = sample_request();

    c.bench_function("encode_chat_request_tools", |b| {
        b.iter(|| {
            let wire = encode_chat_request(black_box(&request), false).unwrap();
            black_box(serde_json::to_vec(&wire).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_decode_line,
    bench_transcript_stream,
    bench_encode_request
);
criterion_main!(benches);
