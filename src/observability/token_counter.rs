//! Rough token accounting for usage logs when the upstream omits counts.

use crate::protocol::canonical::{ChatRequest, TokenUsage};

/// About four bytes per token; no tokenizer tables are loaded.
#[must_use]
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}

/// Input estimate for a request: system prompt, message text, tool-call
/// arguments and tool definitions. Attachments are not counted.
#[must_use]
pub fn estimate_request_tokens(request: &ChatRequest) -> u64 {
    let prompt = request.system_prompt.as_deref().map_or(0, estimate_tokens);
    let messages: u64 = request
        .messages
        .iter()
        .map(|msg| {
            estimate_tokens(&msg.text)
                + msg
                    .tool_calls
                    .iter()
                    .map(|call| estimate_tokens(&call.arguments_value().to_string()))
                    .sum::<u64>()
        })
        .sum();
    let tools: u64 = request
        .tools
        .iter()
        .map(|tool| {
            estimate_tokens(&tool.name)
                + tool.description.as_deref().map_or(0, estimate_tokens)
                + tool
                    .parameters_schema
                    .as_ref()
                    .map_or(0, |schema| estimate_tokens(&schema.to_string()))
        })
        .sum();
    prompt + messages + tools
}

/// Upstream counts win when non-zero; the rest come from the estimates.
#[must_use]
pub fn merge_usage(upstream: &TokenUsage, estimated_input: u64, estimated_output: u64) -> TokenUsage {
    let reported = |value: Option<u64>| value.filter(|count| *count > 0);
    let input = reported(upstream.input_tokens).unwrap_or(estimated_input);
    let output = reported(upstream.output_tokens).unwrap_or(estimated_output);
    TokenUsage {
        input_tokens: Some(input),
        output_tokens: Some(output),
        total_tokens: Some(reported(upstream.total_tokens).unwrap_or(input + output)),
    }
}
