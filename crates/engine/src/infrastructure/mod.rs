pub mod dice;
pub mod openai;
pub mod ports;
pub mod resilient;

pub use dice::SessionDice;
pub use openai::OpenAiCompatClient;
pub use ports::{LlmError, LlmPort, LlmRequest, LlmResponse, Message, MessageRole, TokenUsage};
pub use resilient::{ResilientLlmClient, RetryConfig};
