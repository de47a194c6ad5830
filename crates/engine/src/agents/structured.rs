//! Structured-output calls with retry, backoff, and attempt accounting
//!
//! Every agent call goes through here: issue the request, extract JSON from
//! whatever came back, parse into the expected type, retry on validation
//! failure with exponential backoff (1s, 2s, 4s), and hand the caller a full
//! per-attempt trace so the coordinator can emit one `llm_call` event per
//! attempt. Raw model text from failed attempts is preserved - it is
//! training data.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::ports::{LlmPort, LlmRequest, Message, TokenUsage};

/// Retry/timeout policy for one structured call.
#[derive(Debug, Clone)]
pub struct StructuredCallConfig {
    /// Validation retries after the initial attempt.
    pub max_retries: u32,
    /// First backoff delay; doubles per retry.
    pub base_backoff: Duration,
    /// Budget for each attempt; expiry is terminal, not retried.
    pub timeout: Duration,
}

impl Default for StructuredCallConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
        }
    }
}

impl StructuredCallConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// One LLM attempt, as recorded in the log.
#[derive(Debug, Clone, Default)]
pub struct LlmAttempt {
    pub ok: bool,
    pub validation_failed: bool,
    pub timed_out: bool,
    pub cancelled: bool,
    pub transport_error: Option<String>,
    pub latency_ms: u64,
    pub usage: Option<TokenUsage>,
    /// Raw model text, kept even when validation failed.
    pub raw_text: String,
}

/// Outcome of a structured call.
#[derive(Debug, Clone)]
pub struct StructuredCall<T> {
    /// Parsed value; `None` means every attempt failed validation (use the
    /// legacy fallback on `raw_last`) or the call timed out / was cancelled.
    pub value: Option<T>,
    pub attempts: Vec<LlmAttempt>,
    /// Last raw text seen, for the legacy parsing path.
    pub raw_last: String,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl<T> StructuredCall<T> {
    /// True when the value came through cleanly or will come from fallback.
    pub fn used_fallback(&self) -> bool {
        self.value.is_none() && !self.timed_out && !self.cancelled
    }

    pub fn retry_count(&self) -> u32 {
        (self.attempts.len() as u32).saturating_sub(1)
    }
}

/// Issue a structured call and parse the response as `T`.
pub async fn call_structured<T: DeserializeOwned>(
    llm: &dyn LlmPort,
    request: &LlmRequest,
    config: &StructuredCallConfig,
    cancel: &CancellationToken,
) -> StructuredCall<T> {
    let mut attempts: Vec<LlmAttempt> = Vec::new();
    let mut raw_last = String::new();
    let mut request = request.clone();

    for attempt_no in 0..=config.max_retries {
        if attempt_no > 0 {
            let delay = config.base_backoff * 2u32.saturating_pow(attempt_no - 1);
            tokio::time::sleep(delay).await;
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                attempts.push(LlmAttempt {
                    cancelled: true,
                    latency_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                });
                return StructuredCall {
                    value: None,
                    attempts,
                    raw_last,
                    timed_out: false,
                    cancelled: true,
                };
            }
            result = tokio::time::timeout(config.timeout, llm.generate(request.clone())) => result,
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        let response = match outcome {
            Err(_) => {
                // Attempt budget expired: terminal, produce a structural
                // failure upstream rather than retrying into a stale round.
                attempts.push(LlmAttempt {
                    timed_out: true,
                    latency_ms,
                    ..Default::default()
                });
                return StructuredCall {
                    value: None,
                    attempts,
                    raw_last,
                    timed_out: true,
                    cancelled: false,
                };
            }
            Ok(Err(e)) => {
                // Transport failure past the resilient wrapper's retries is
                // surfaced with timeout semantics.
                tracing::warn!(error = %e, "LLM transport failure in structured call");
                attempts.push(LlmAttempt {
                    timed_out: true,
                    transport_error: Some(e.to_string()),
                    latency_ms,
                    ..Default::default()
                });
                return StructuredCall {
                    value: None,
                    attempts,
                    raw_last,
                    timed_out: true,
                    cancelled: false,
                };
            }
            Ok(Ok(response)) => response,
        };

        raw_last = response.content.clone();
        let parsed = extract_json(&response.content)
            .and_then(|json| serde_json::from_str::<T>(&json).ok());

        match parsed {
            Some(value) => {
                attempts.push(LlmAttempt {
                    ok: true,
                    latency_ms,
                    usage: response.usage,
                    raw_text: response.content,
                    ..Default::default()
                });
                return StructuredCall {
                    value: Some(value),
                    attempts,
                    raw_last,
                    timed_out: false,
                    cancelled: false,
                };
            }
            None => {
                tracing::warn!(
                    attempt = attempt_no + 1,
                    "structured output validation failed"
                );
                attempts.push(LlmAttempt {
                    validation_failed: true,
                    latency_ms,
                    usage: response.usage,
                    raw_text: response.content.clone(),
                    ..Default::default()
                });
                // Reprompt with the failed output in context.
                request.messages.push(Message::assistant(response.content));
                request.messages.push(Message::user(
                    "That was not a single valid JSON object matching the \
                     requested shape. Respond again with JSON only.",
                ));
            }
        }
    }

    StructuredCall {
        value: None,
        attempts,
        raw_last,
        timed_out: false,
        cancelled: false,
    }
}

/// Pull the first JSON object out of model text: fenced block if present,
/// otherwise the first balanced `{...}` span.
pub fn extract_json(text: &str) -> Option<String> {
    let candidate = match text.find("```") {
        Some(fence_start) => {
            let after = &text[fence_start + 3..];
            let body_start = after.find('\n').map(|p| p + 1).unwrap_or(0);
            let body = &after[body_start..];
            match body.find("```") {
                Some(fence_end) => &body[..fence_end],
                None => body,
            }
        }
        None => text,
    };

    let start = candidate.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in candidate[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(candidate[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{LlmError, LlmResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Probe {
        answer: String,
    }

    /// Mock that pops scripted responses in order.
    struct ScriptedLlm {
        responses: Mutex<Vec<Result<String, LlmError>>>,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    #[async_trait]
    impl LlmPort for ScriptedLlm {
        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            let mut responses = self.responses.lock().expect("lock");
            if responses.is_empty() {
                return Err(LlmError::RequestFailed("script exhausted".into()));
            }
            responses.remove(0).map(|content| LlmResponse {
                content,
                usage: None,
            })
        }
    }

    fn fast_config() -> StructuredCallConfig {
        StructuredCallConfig {
            max_retries: 3,
            base_backoff: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_extract_json_plain() {
        assert_eq!(
            extract_json(r#"{"a": 1}"#),
            Some(r#"{"a": 1}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_fenced() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json(text), Some("{\"a\": 1}".to_string()));
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let text = "The declaration is {\"a\": {\"b\": 2}} as requested.";
        assert_eq!(extract_json(text), Some("{\"a\": {\"b\": 2}}".to_string()));
    }

    #[test]
    fn test_extract_json_braces_in_strings() {
        let text = r#"{"a": "curly } brace", "b": 1}"#;
        assert_eq!(extract_json(text), Some(text.to_string()));
    }

    #[test]
    fn test_extract_json_none_for_prose() {
        assert_eq!(extract_json("no json here"), None);
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let llm = ScriptedLlm::new(vec![Ok(r#"{"answer": "yes"}"#.to_string())]);
        let call: StructuredCall<Probe> = call_structured(
            &llm,
            &LlmRequest::default(),
            &fast_config(),
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(
            call.value,
            Some(Probe {
                answer: "yes".into()
            })
        );
        assert_eq!(call.attempts.len(), 1);
        assert!(call.attempts[0].ok);
    }

    #[tokio::test]
    async fn test_two_failures_then_success() {
        let llm = ScriptedLlm::new(vec![
            Ok("garbage".to_string()),
            Ok("{broken".to_string()),
            Ok(r#"{"answer": "third time"}"#.to_string()),
        ]);
        let call: StructuredCall<Probe> = call_structured(
            &llm,
            &LlmRequest::default(),
            &fast_config(),
            &CancellationToken::new(),
        )
        .await;
        assert!(call.value.is_some());
        assert_eq!(call.attempts.len(), 3);
        assert!(call.attempts[0].validation_failed);
        assert!(call.attempts[1].validation_failed);
        assert!(call.attempts[2].ok);
        assert_eq!(call.retry_count(), 2);
        assert!(!call.used_fallback());
        // Raw text of failed attempts is preserved for training.
        assert_eq!(call.attempts[0].raw_text, "garbage");
    }

    #[tokio::test]
    async fn test_exhaustion_flags_fallback() {
        let llm = ScriptedLlm::new(vec![
            Ok("bad".to_string()),
            Ok("bad".to_string()),
            Ok("bad".to_string()),
            Ok("still bad".to_string()),
        ]);
        let call: StructuredCall<Probe> = call_structured(
            &llm,
            &LlmRequest::default(),
            &fast_config(),
            &CancellationToken::new(),
        )
        .await;
        assert!(call.value.is_none());
        assert!(call.used_fallback());
        assert_eq!(call.attempts.len(), 4);
        assert_eq!(call.raw_last, "still bad");
    }

    #[tokio::test]
    async fn test_transport_error_surfaces_as_timeout() {
        let llm = ScriptedLlm::new(vec![Err(LlmError::RequestFailed("conn refused".into()))]);
        let call: StructuredCall<Probe> = call_structured(
            &llm,
            &LlmRequest::default(),
            &fast_config(),
            &CancellationToken::new(),
        )
        .await;
        assert!(call.value.is_none());
        assert!(call.timed_out);
        assert!(!call.used_fallback());
    }

    #[tokio::test]
    async fn test_cancellation_is_terminal() {
        let llm = ScriptedLlm::new(vec![Ok(r#"{"answer": "late"}"#.to_string())]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let call: StructuredCall<Probe> =
            call_structured(&llm, &LlmRequest::default(), &fast_config(), &cancel).await;
        assert!(call.cancelled);
        assert!(call.value.is_none());
    }
}
