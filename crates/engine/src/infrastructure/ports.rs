//! Port traits for infrastructure boundaries.
//!
//! The engine abstracts exactly one thing: the LLM provider. Everything else
//! is concrete. Dice are injected through the domain's `DiceRoller` trait;
//! the seeded implementation lives beside the client here.

use async_trait::async_trait;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request to the text-completion provider.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    /// JSON schema hint. Providers that support constrained decoding honor
    /// it; others receive it embedded in the prompt.
    pub response_schema: Option<serde_json::Value>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system_prompt = Some(system.into());
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Token accounting from the provider, when reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Provider response.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// The async text-completion interface the session core consumes.
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub Llm {}

        #[async_trait]
        impl LlmPort for Llm {
            async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
        }
    }

    #[tokio::test]
    async fn test_port_is_object_safe() {
        let mut mock = MockLlm::new();
        mock.expect_generate().returning(|_| {
            Ok(LlmResponse {
                content: "ok".into(),
                usage: None,
            })
        });
        let port: Box<dyn LlmPort> = Box::new(mock);
        let response = port
            .generate(LlmRequest::default())
            .await
            .expect("generate");
        assert_eq!(response.content, "ok");
    }

    #[test]
    fn test_request_builders() {
        let request = LlmRequest::new(vec![Message::user("hello")])
            .with_system("sys")
            .with_temperature(0.4);
        assert_eq!(request.system_prompt.as_deref(), Some("sys"));
        assert_eq!(request.temperature, Some(0.4));
        assert!(request.response_schema.is_none());
    }
}
