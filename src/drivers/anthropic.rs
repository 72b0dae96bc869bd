//! Anthropic Messages API 方言：system 为顶层参数，流式事件为 content_block_delta
//!
//! Anthropic Messages dialect. Differences from OpenAI:
//! - The system prompt is a top-level `system` string, not a message.
//! - `max_tokens` is mandatory; stop words go in `stop_sequences`.
//! - Text arrives as `content_block_delta` events with `delta.text`.
//! - `response_format` has no counterpart and is ignored.

use serde_json::{json, Value};

use super::{ParseCursor, ParsedEvent, ParsedFragment};

use crate::types::UnifiedRequest;

pub fn messages_body(request: &UnifiedRequest, model: &str, max_tokens: u32) -> Value {
    let messages: Vec<Value> = request
        .conversation()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": max_tokens,
        "stream": true,
        "temperature": request.params.temperature,
    });
    if let Some(system) = request.system_text() {
        body["system"] = Value::String(system);
    }
    if !request.params.stop.is_empty() {
        body["stop_sequences"] = json!(request.params.stop);
    }
    body
}

pub fn parse_event(v: &Value, cursor: &ParseCursor) -> ParsedEvent {
    match v.get("type").and_then(|t| t.as_str()).unwrap_or("") {
        "content_block_delta" => {
            let text = v.pointer("/delta/text").and_then(|t| t.as_str()).unwrap_or("");
            if text.is_empty() {
                // input_json_delta and thinking deltas carry no output text
                return ParsedEvent::Skip;
            }
            ParsedEvent::Fragment(ParsedFragment {
                text: text.to_string(),
                cursor: cursor.advanced(text),
            })
        }
        "error" => ParsedEvent::VendorError(v.get("error").cloned().unwrap_or_else(|| v.clone())),
        _ => ParsedEvent::Skip,
    }
}
