//! Caller-side retry for provider calls.
//!
//! Providers make one attempt per call. Callers that want another attempt
//! after a transport failure wrap the call in a [`RetryPolicy`].

use super::types::{ChatError, Completion, Message, Provider, SamplingParams};
use std::time::Duration;
use tracing::warn;

/// Exponential backoff over transient errors only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// A single attempt.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Send a chat request, retrying transient failures.
    pub async fn chat(
        &self,
        provider: &dyn Provider,
        messages: &[Message],
        params: &SamplingParams,
    ) -> Result<Completion, ChatError> {
        let mut attempt = 0;
        loop {
            match provider.chat(messages, params).await {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    warn!(error = %err, attempt, delay_ms = delay.as_millis() as u64, "Retrying chat request");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed sequence of outcomes and counts calls.
    struct Scripted {
        outcomes: Mutex<Vec<Result<Completion>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(mut outcomes: Vec<Result<Completion>>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        async fn chat(&self, _: &[Message], _: &SamplingParams) -> Result<Completion> {
            *self.calls.lock().unwrap() += 1;
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(ChatError::Timeout))
        }

        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            unimplemented!()
        }
    }

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_retries_transient_then_succeeds() {
        let provider = Scripted::new(vec![
            Err(ChatError::Timeout),
            Err(ChatError::HttpStatus { code: 503, body: String::new() }),
            Ok(Completion::new("finally")),
        ]);

        let completion = fast(2)
            .chat(&provider, &[Message::user("q")], &SamplingParams::default())
            .await
            .unwrap();

        assert_eq!(completion.content, "finally");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let provider = Scripted::new(vec![]);

        let err = fast(1)
            .chat(&provider, &[Message::user("q")], &SamplingParams::default())
            .await
            .unwrap_err();

        assert_eq!(err, ChatError::Timeout);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_api_error_not_retried() {
        let provider = Scripted::new(vec![Err(ChatError::ApiError {
            code: "40001".into(),
            message: "invalid parameter".into(),
        })]);

        let err = fast(5)
            .chat(&provider, &[Message::user("q")], &SamplingParams::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::ApiError { .. }));
        assert_eq!(provider.calls(), 1);
    }
}
