//! OpenAI 系方言：Chat Completions、Azure Chat 与 Responses API
//!
//! OpenAI family dialects. Chat Completions is shared by OpenAI, DeepSeek, Groq,
//! Ollama, LM Studio and custom endpoints; Azure differs only in carrying the
//! model in the URL. The Responses API uses typed content parts and its own
//! event vocabulary (`response.output_text.delta` / `.done`).

use serde_json::{json, Value};

use crate::types::{MessageRole, UnifiedRequest};

use super::{apply_tools, ParseCursor, ParsedEvent, ParsedFragment};

/// Chat Completions body.
pub fn chat_body(request: &UnifiedRequest, model: &str, max_tokens: u32) -> Value {
    let mut body = azure_chat_body(request, max_tokens);
    body["model"] = Value::String(model.to_string());
    body
}

/// Chat Completions body without `model`; Azure routes by deployment.
pub fn azure_chat_body(request: &UnifiedRequest, max_tokens: u32) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = request.system_text() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for m in request.conversation() {
        messages.push(json!({ "role": m.role.as_str(), "content": m.content }));
    }

    let mut body = json!({
        "messages": messages,
        "stream": true,
        "max_tokens": max_tokens,
        "temperature": request.params.temperature,
        "top_p": request.params.top_p,
    });
    if !request.params.stop.is_empty() {
        body["stop"] = json!(request.params.stop);
    }
    if !request.response_format.is_text() {
        body["response_format"] = chat_response_format(request);
    }
    apply_tools(&mut body, request);
    body
}

fn chat_response_format(request: &UnifiedRequest) -> Value {
    match &request.response_format.schema {
        Some(schema) if request.response_format.kind == "json_schema" => json!({
            "type": "json_schema",
            "json_schema": { "name": "output", "schema": schema },
        }),
        _ => json!({ "type": request.response_format.kind }),
    }
}

/// Responses API body.
pub fn responses_body(request: &UnifiedRequest, model: &str, max_tokens: u32) -> Value {
    let mut input = Vec::new();
    if let Some(system) = request.system_text() {
        input.push(json!({
            "role": "system",
            "content": [{ "type": "input_text", "text": system }],
        }));
    }
    for m in request.conversation() {
        let part_type = match m.role {
            MessageRole::Assistant => "output_text",
            _ => "input_text",
        };
        input.push(json!({
            "role": m.role.as_str(),
            "content": [{ "type": part_type, "text": m.content }],
        }));
    }

    let mut body = json!({
        "model": model,
        "input": input,
        "stream": true,
        "max_output_tokens": max_tokens,
        "temperature": request.params.temperature,
        "top_p": request.params.top_p,
    });
    if !request.response_format.is_text() {
        let format = match &request.response_format.schema {
            Some(schema) if request.response_format.kind == "json_schema" => json!({
                "type": "json_schema",
                "name": "output",
                "schema": schema,
            }),
            _ => json!({ "type": request.response_format.kind }),
        };
        body["text"] = json!({ "format": format });
    }
    apply_tools(&mut body, request);
    body
}

/// `chat.completion.chunk` events.
pub fn parse_chat_event(v: &Value, cursor: &ParseCursor) -> ParsedEvent {
    if let Some(error) = v.get("error").filter(|e| !e.is_null()) {
        return ParsedEvent::VendorError(error.clone());
    }

    let text = ["/choices/0/delta/content", "/choices/0/message/content", "/choices/0/text"]
        .iter()
        .find_map(|p| v.pointer(p).and_then(|t| t.as_str()))
        .unwrap_or("");
    if text.is_empty() {
        return ParsedEvent::Skip;
    }
    ParsedEvent::Fragment(ParsedFragment {
        text: text.to_string(),
        cursor: cursor.advanced(text),
    })
}

/// `(output_index, content_index)` of a Responses text event.
fn output_item(v: &Value) -> (u64, u64) {
    let index = |name: &str| v.get(name).and_then(|i| i.as_u64()).unwrap_or(0);
    (index("output_index"), index("content_index"))
}

/// Responses API events. Deltas accumulate per output item; an item's `.done`
/// snapshot only contributes text its own deltas did not already deliver.
pub fn parse_responses_event(v: &Value, cursor: &ParseCursor) -> ParsedEvent {
    let event_type = v.get("type").and_then(|t| t.as_str()).unwrap_or("");
    match event_type {
        "response.output_text.delta" => {
            let delta = v.get("delta").and_then(|d| d.as_str()).unwrap_or("");
            if delta.is_empty() {
                return ParsedEvent::Skip;
            }
            let item = output_item(v);
            ParsedEvent::Fragment(ParsedFragment {
                text: delta.to_string(),
                cursor: ParseCursor {
                    emitted: format!("{}{}", cursor.emitted_for(item), delta),
                    item: Some(item),
                },
            })
        }
        "response.output_text.done" => {
            let text = v.get("text").and_then(|t| t.as_str()).unwrap_or("");
            let item = output_item(v);
            let seen = cursor.emitted_for(item);
            if text.is_empty() || text == seen {
                return ParsedEvent::Skip;
            }
            let fresh = text.strip_prefix(seen).unwrap_or(text);
            ParsedEvent::Fragment(ParsedFragment {
                text: fresh.to_string(),
                cursor: ParseCursor {
                    emitted: text.to_string(),
                    item: Some(item),
                },
            })
        }
        "error" => ParsedEvent::VendorError(v.get("error").cloned().unwrap_or_else(|| v.clone())),
        "response.failed" => ParsedEvent::VendorError(
            v.pointer("/response/error")
                .cloned()
                .unwrap_or_else(|| v.clone()),
        ),
        _ => ParsedEvent::Skip,
    }
}
