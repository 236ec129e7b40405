use core_config::ServiceConfig;
use serde::Serialize;

use crate::CorrectionError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

/// Streaming chat-completions request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

impl ChatRequest {
    /// System prompt + templated user message, streaming enabled.
    pub fn for_text(settings: &ServiceConfig, text: &str) -> Self {
        Self {
            model: settings.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: settings.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user",
                    content: settings.user_message(text),
                },
            ],
            temperature: settings.effective_temperature(),
            max_tokens: settings.max_tokens,
            stream: true,
        }
    }

    pub fn to_body(&self) -> Result<Vec<u8>, CorrectionError> {
        serde_json::to_vec(self).map_err(|e| CorrectionError::Encoding(e.to_string()))
    }
}
