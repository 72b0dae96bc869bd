//! Unified request format (vendor-neutral input to the request builder)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::message::Message;

/// Sampling and length parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub stream: bool,
    /// Configured ceiling; the dialect builders derive the wire value from it.
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub stop: Vec<String>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            stream: true,
            max_tokens: 4096,
            temperature: 0.2,
            top_p: 1.0,
            stop: Vec::new(),
        }
    }
}

/// Requested output format. `kind` is `"text"`, `"json_object"` or `"json_schema"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl ResponseFormat {
    pub fn text() -> Self {
        Self {
            kind: "text".to_string(),
            schema: None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.kind.is_empty() || self.kind == "text"
    }
}

impl Default for ResponseFormat {
    fn default() -> Self {
        Self::text()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    pub trace_id: String,
    /// When set, request and response bodies are kept out of logs and error displays.
    pub privacy_mode: bool,
}

/// One completion request. Build it with [`UnifiedRequest::builder`]; it is not mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRequest {
    pub request_id: String,
    /// dictation / ask / translate; opaque to the gateway.
    pub mode: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub params: GenerationParams,
    /// Opaque tool definitions, passed through to OpenAI-style dialects.
    pub tools: Vec<Value>,
    pub tool_choice: Option<Value>,
    pub response_format: ResponseFormat,
    pub metadata: RequestMetadata,
}

impl UnifiedRequest {
    pub fn builder() -> UnifiedRequestBuilder {
        UnifiedRequestBuilder::default()
    }

    /// Characters of every non-system message, the input size used for max-token sizing.
    pub fn input_char_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| !m.is_system())
            .map(|m| m.content.chars().count())
            .sum()
    }

    /// System prompt merged with any system-role messages, joined by a blank line.
    pub fn system_text(&self) -> Option<String> {
        let mut parts: Vec<&str> = Vec::new();
        if !self.system_prompt.trim().is_empty() {
            parts.push(self.system_prompt.as_str());
        }
        parts.extend(
            self.messages
                .iter()
                .filter(|m| m.is_system() && !m.content.trim().is_empty())
                .map(|m| m.content.as_str()),
        );
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Messages that are sent in the conversation body (system ones are hoisted).
    pub fn conversation(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_system())
    }
}

/// Builder for [`UnifiedRequest`].
#[derive(Debug, Clone, Default)]
pub struct UnifiedRequestBuilder {
    request_id: Option<String>,
    mode: String,
    system_prompt: String,
    messages: Vec<Message>,
    params: GenerationParams,
    tools: Vec<Value>,
    tool_choice: Option<Value>,
    response_format: ResponseFormat,
    metadata: RequestMetadata,
}

impl UnifiedRequestBuilder {
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = mode.into();
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.params.max_tokens = max;
        self
    }

    pub fn temperature(mut self, temp: f64) -> Self {
        self.params.temperature = temp;
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.params.top_p = top_p;
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.params.stop = stop;
        self
    }

    pub fn tools(mut self, tools: Vec<Value>) -> Self {
        self.tools = tools;
        self
    }

    pub fn tool_choice(mut self, tool_choice: Value) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = format;
        self
    }

    pub fn trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.metadata.trace_id = trace_id.into();
        self
    }

    pub fn privacy_mode(mut self, enabled: bool) -> Self {
        self.metadata.privacy_mode = enabled;
        self
    }

    pub fn build(self) -> UnifiedRequest {
        let request_id = self
            .request_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut metadata = self.metadata;
        if metadata.trace_id.is_empty() {
            metadata.trace_id = request_id.clone();
        }
        UnifiedRequest {
            request_id,
            mode: self.mode,
            system_prompt: self.system_prompt,
            messages: self.messages,
            params: self.params,
            tools: self.tools,
            tool_choice: self.tool_choice,
            response_format: self.response_format,
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_assigns_request_id() {
        let a = UnifiedRequest::builder().build();
        let b = UnifiedRequest::builder().build();
        assert_ne!(a.request_id, b.request_id);
        assert_eq!(a.metadata.trace_id, a.request_id);

        let c = UnifiedRequest::builder().request_id("req-1").build();
        assert_eq!(c.request_id, "req-1");
    }

    #[test]
    fn test_system_text_merges_system_messages() {
        let req = UnifiedRequest::builder()
            .system_prompt("Be brief.")
            .message(Message::system("Answer in French."))
            .message(Message::user("hello"))
            .build();
        assert_eq!(req.system_text().as_deref(), Some("Be brief.\n\nAnswer in French."));
        assert_eq!(req.conversation().count(), 1);
    }

    #[test]
    fn test_input_char_count_ignores_system() {
        let req = UnifiedRequest::builder()
            .message(Message::system("xxxxxxxxxx"))
            .message(Message::user("héllo"))
            .message(Message::assistant("ok"))
            .build();
        assert_eq!(req.input_char_count(), 7);
    }
}
