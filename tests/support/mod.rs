//! Shared helpers for integration tests: SSE bodies and wiremock responses.

#![allow(dead_code)]

use serde_json::{Value, json};
use wiremock::ResponseTemplate;

/// Encode chunks as an upstream SSE body terminated by `[DONE]`.
pub fn sse_body(chunks: &[Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn sse_response(chunks: &[Value]) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(sse_body(chunks))
}

pub fn text_chunk(text: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]})
}

pub fn finish_chunk(reason: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {}, "finish_reason": reason}]})
}

/// First fragment of a tool call: id and name, arguments to follow.
pub fn tool_start_chunk(index: usize, id: &str, name: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"tool_calls": [{
        "index": index,
        "id": id,
        "type": "function",
        "function": {"name": name, "arguments": ""}
    }]}, "finish_reason": null}]})
}

pub fn tool_args_chunk(index: usize, arguments: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"tool_calls": [{
        "index": index,
        "function": {"arguments": arguments}
    }]}, "finish_reason": null}]})
}

/// Split a wire body into its frames.
pub fn frames(body: &str) -> Vec<String> {
    body.split_inclusive("\n\n").map(str::to_string).collect()
}
