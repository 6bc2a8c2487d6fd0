use super::fallback::FallbackPicker;
use crate::prompt::{compose, turn_prompt, TemplateKind};
use crate::provider::{Message, Provider, RetryPolicy, SamplingParams};
use crate::rag::RetrievalAgent;
use async_trait::async_trait;
use polarity_persona::{Persona, Temperament};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Who a speaker is, as recorded in the experiment log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub stance: String,
    pub model_type: String,
}

/// What a speaker said on one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    /// True when `text` is a canned fallback.
    pub degraded: bool,
    pub error: Option<String>,
}

impl Utterance {
    pub fn reply(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            degraded: false,
            error: None,
        }
    }

    pub fn fallback(text: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            degraded: true,
            error: Some(error.into()),
        }
    }
}

/// One side of a dialogue.
///
/// `respond` never fails: a speaker that cannot produce a reply returns a
/// degraded utterance instead.
#[async_trait]
pub trait Speaker: Send {
    fn profile(&self) -> AgentProfile;

    async fn respond(&mut self, topic: &str, incoming: &str) -> Utterance;
}

/// Optional trimming applied to every model reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplyLimits {
    pub max_lines: Option<usize>,
    pub max_chars: Option<usize>,
}

impl ReplyLimits {
    /// Keeps the first `max_lines` non-blank lines, then the first
    /// `max_chars` characters.
    pub fn apply(&self, text: &str) -> String {
        let text = text.trim();
        let mut out = match self.max_lines {
            Some(max) => text
                .lines()
                .map(str::trim_end)
                .filter(|line| !line.trim().is_empty())
                .take(max)
                .collect::<Vec<_>>()
                .join("\n"),
            None => text.to_string(),
        };
        if let Some(max) = self.max_chars {
            if let Some((idx, _)) = out.char_indices().nth(max) {
                out.truncate(idx);
            }
        }
        out
    }
}

/// A persona-driven speaker backed by a chat provider.
///
/// Without a provider the agent is offline and every turn degrades to a
/// fallback line. With a [`RetrievalAgent`] the incoming message is used as
/// the retrieval query and the hits are folded into a stance-aware prompt.
pub struct DialogueAgent {
    name: String,
    persona: Persona,
    temperament: Arc<dyn Temperament>,
    retrieval: Option<RetrievalAgent>,
    top_k: usize,
    provider: Option<Arc<dyn Provider>>,
    sampling: SamplingParams,
    retry: RetryPolicy,
    history: Vec<Message>,
    history_window: usize,
    fallback: FallbackPicker,
    limits: ReplyLimits,
}

impl DialogueAgent {
    pub fn new(name: impl Into<String>, persona: Persona, temperament: Arc<dyn Temperament>) -> Self {
        Self {
            name: name.into(),
            persona,
            temperament,
            retrieval: None,
            top_k: 3,
            provider: None,
            sampling: SamplingParams::default(),
            retry: RetryPolicy::default(),
            history: Vec::new(),
            history_window: 3,
            fallback: FallbackPicker::default(),
            limits: ReplyLimits::default(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalAgent, top_k: usize) -> Self {
        self.retrieval = Some(retrieval);
        self.top_k = top_k;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Number of past messages sent with each request.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.fallback = FallbackPicker::seeded(seed);
        self
    }

    pub fn with_limits(mut self, limits: ReplyLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn is_rag(&self) -> bool {
        self.retrieval.is_some()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    async fn user_prompt(&self, topic: &str, incoming: &str) -> String {
        let question = turn_prompt(topic, incoming);
        let Some(retrieval) = &self.retrieval else {
            return question;
        };

        let retrieved = match retrieval.retrieve(incoming, self.top_k).await {
            Ok(results) => results,
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Retrieval failed, continuing without references");
                Vec::new()
            }
        };
        debug!(agent = %self.name, hits = retrieved.len(), "Retrieved references");

        let kind = TemplateKind::StanceAware {
            stance: self.persona.stance.clone(),
        };
        compose(&retrieved, &question, &kind)
    }

    fn build_messages(&self, user_prompt: String) -> Vec<Message> {
        let start = self.history.len().saturating_sub(self.history_window);
        let mut messages = Vec::with_capacity(self.history.len() - start + 2);
        messages.push(Message::system(self.temperament.system_prompt(&self.persona)));
        messages.extend(self.history[start..].iter().cloned());
        messages.push(Message::user(user_prompt));
        messages
    }

    fn degrade(&mut self, error: String) -> Utterance {
        let text = self.fallback.pick(&self.persona.fallback);
        Utterance::fallback(text, error)
    }
}

#[async_trait]
impl Speaker for DialogueAgent {
    fn profile(&self) -> AgentProfile {
        AgentProfile {
            name: self.name.clone(),
            stance: self.persona.stance.clone(),
            model_type: self.temperament.model_type().to_string(),
        }
    }

    async fn respond(&mut self, topic: &str, incoming: &str) -> Utterance {
        let Some(provider) = self.provider.clone() else {
            debug!(agent = %self.name, "No provider, using fallback");
            return self.degrade("offline: no provider configured".to_string());
        };

        let prompt = self.user_prompt(topic, incoming).await;
        let messages = self.build_messages(prompt);

        match self.retry.chat(provider.as_ref(), &messages, &self.sampling).await {
            Ok(completion) => {
                let text = self.limits.apply(&completion.content);
                self.history.push(Message::user(incoming));
                self.history.push(Message::assistant(text.clone()));
                Utterance::reply(text)
            }
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Chat failed, using fallback");
                self.degrade(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatError, Completion, Result, Role};
    use crate::rag::HashingEncoder;
    use polarity_persona::{Base, Detox};
    use std::sync::Mutex;

    /// Echoes the request back so tests can inspect what was sent.
    struct Recorder {
        requests: Mutex<Vec<Vec<Message>>>,
        fail: bool,
    }

    impl Recorder {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn last(&self) -> Vec<Message> {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Provider for Recorder {
        async fn chat(&self, messages: &[Message], _: &SamplingParams) -> Result<Completion> {
            self.requests.lock().unwrap().push(messages.to_vec());
            if self.fail {
                return Err(ChatError::ApiError {
                    code: "40084".into(),
                    message: "blocked".into(),
                });
            }
            let n = self.requests.lock().unwrap().len();
            Ok(Completion::new(format!("reply {}", n)))
        }

        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Err(ChatError::TransportFailure("unused".into()))
        }
    }

    fn agent(provider: Arc<Recorder>) -> DialogueAgent {
        DialogueAgent::new("Agent_L", Persona::left(), Arc::new(Base))
            .with_provider(provider)
            .with_retry(RetryPolicy::none())
    }

    #[test]
    fn test_reply_limits() {
        let limits = ReplyLimits {
            max_lines: Some(2),
            max_chars: None,
        };
        assert_eq!(limits.apply("one\n\ntwo\nthree\n"), "one\ntwo");

        let limits = ReplyLimits {
            max_lines: None,
            max_chars: Some(3),
        };
        assert_eq!(limits.apply("  정부의 책임  "), "정부의");
        assert_eq!(ReplyLimits::default().apply(" as is "), "as is");
    }

    #[tokio::test]
    async fn test_message_layout_and_history_window() {
        let provider = Recorder::new(false);
        let mut agent = agent(provider.clone()).with_history_window(3);

        for i in 0..3 {
            let reply = agent.respond("topic", &format!("incoming {}", i)).await;
            assert!(!reply.degraded);
        }
        assert_eq!(agent.history().len(), 6);

        let sent = provider.last();
        // system + 3 history + new user
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[0].content, Persona::left().description);
        assert_eq!(sent[1].role, Role::Assistant);
        assert_eq!(sent[1].content, "reply 1");
        assert_eq!(sent[2].content, "incoming 1");
        assert_eq!(sent[4].role, Role::User);
        assert!(sent[4].content.contains("incoming 2"));
    }

    #[tokio::test]
    async fn test_failure_degrades_and_keeps_history() {
        let provider = Recorder::new(true);
        let mut agent = agent(provider).with_seed(3);

        let reply = agent.respond("topic", "hello").await;
        assert!(reply.degraded);
        assert!(Persona::left().fallback.contains(&reply.text));
        assert!(reply.error.unwrap().contains("40084"));
        assert!(agent.history().is_empty());
    }

    #[tokio::test]
    async fn test_offline_agent_falls_back() {
        let mut agent = DialogueAgent::new("Agent_R", Persona::right(), Arc::new(Detox::default()));
        let reply = agent.respond("topic", "hello").await;

        assert!(reply.degraded);
        assert!(Persona::right().fallback.contains(&reply.text));
        assert_eq!(agent.profile().model_type, "detox");
    }

    #[tokio::test]
    async fn test_rag_prompt_includes_references() {
        let provider = Recorder::new(false);
        let mut retrieval = RetrievalAgent::with_encoder("left", Arc::new(HashingEncoder::new(64)));
        retrieval
            .add_texts(["The government ignored the warnings."])
            .await
            .unwrap();

        let mut agent = agent(provider.clone()).with_retrieval(retrieval, 3);
        agent.respond("crowd safety", "Who ignored the warnings?").await;

        let user = provider.last().pop().unwrap();
        assert!(user.content.contains("[ref 1] The government ignored the warnings."));
        assert!(user.content.contains("the left community"));
    }
}
