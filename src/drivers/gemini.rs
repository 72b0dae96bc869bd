//! Google Gemini 方言：generateContent 流式接口
//!
//! Gemini dialect. The model lives in the URL (`{model}:streamGenerateContent`),
//! the system prompt in `system_instruction`, sampling knobs in
//! `generationConfig`. Assistant turns use the `model` role.

use serde_json::{json, Value};

use super::{ParseCursor, ParsedEvent, ParsedFragment};

use crate::types::{MessageRole, UnifiedRequest};

pub fn generate_body(request: &UnifiedRequest, max_tokens: u32) -> Value {
    let contents: Vec<Value> = request
        .conversation()
        .map(|m| {
            let role = match m.role {
                MessageRole::Assistant => "model",
                _ => "user",
            };
            json!({ "role": role, "parts": [{ "text": m.content }] })
        })
        .collect();

    let mut generation_config = json!({
        "maxOutputTokens": max_tokens,
        "temperature": request.params.temperature,
        "topP": request.params.top_p,
    });
    if !request.params.stop.is_empty() {
        generation_config["stopSequences"] = json!(request.params.stop);
    }
    if !request.response_format.is_text() {
        generation_config["responseMimeType"] = json!("application/json");
        if let Some(schema) = &request.response_format.schema {
            generation_config["responseSchema"] = schema.clone();
        }
    }

    let mut body = json!({
        "contents": contents,
        "generationConfig": generation_config,
    });
    if let Some(system) = request.system_text() {
        body["system_instruction"] = json!({ "parts": [{ "text": system }] });
    }
    body
}

pub fn parse_event(v: &Value, cursor: &ParseCursor) -> ParsedEvent {
    if let Some(error) = v.get("error").filter(|e| !e.is_null()) {
        return ParsedEvent::VendorError(error.clone());
    }

    let text: String = v
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter(|p| !p.get("thought").and_then(|t| t.as_bool()).unwrap_or(false))
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return ParsedEvent::Skip;
    }
    ParsedEvent::Fragment(ParsedFragment {
        cursor: cursor.advanced(&text),
        text,
    })
}
