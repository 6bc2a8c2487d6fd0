//! Side-by-side answers from a neutral model and from stance RAG agents.
//!
//! The same question goes to the bare model with a neutral system prompt and
//! to one retrieval-augmented call per corpus. Putting the answers next to
//! each other shows how much the retrieved snippets pull the model.

use crate::prompt::{compose, TemplateKind};
use crate::provider::{Message, Provider, RetryPolicy, SamplingParams};
use crate::rag::{RetrievalAgent, RetrievalResult};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

const NEUTRAL_SYSTEM: &str = "You are a neutral and balanced AI assistant.";
const COMMUNITY_SYSTEM: &str =
    "You are an AI that answers by reflecting the perspective of the community posts provided.";

/// One answer in a comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// `"baseline"` or the corpus label.
    pub label: String,
    pub text: String,
    pub references: Vec<RetrievalResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub query: String,
    pub baseline: Answer,
    pub stances: Vec<Answer>,
}

pub struct Comparison {
    provider: Arc<dyn Provider>,
    agents: Vec<RetrievalAgent>,
    retry: RetryPolicy,
    top_k: usize,
    baseline_params: SamplingParams,
    stance_params: SamplingParams,
}

impl Comparison {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            agents: Vec::new(),
            retry: RetryPolicy::default(),
            top_k: 5,
            baseline_params: SamplingParams::default()
                .with_max_tokens(512)
                .with_temperature(0.5),
            stance_params: SamplingParams::default()
                .with_max_tokens(512)
                .with_temperature(0.8),
        }
    }

    pub fn with_agent(mut self, agent: RetrievalAgent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    async fn ask(&self, label: &str, system: &str, user: String, params: &SamplingParams) -> Answer {
        let messages = [Message::system(system), Message::user(user)];
        match self.retry.chat(self.provider.as_ref(), &messages, params).await {
            Ok(completion) => Answer {
                label: label.to_string(),
                text: completion.content,
                references: Vec::new(),
                error: None,
            },
            Err(e) => {
                warn!(label, error = %e, "Comparison call failed");
                Answer {
                    label: label.to_string(),
                    text: String::new(),
                    references: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Asks `query` of the neutral model and of every registered corpus.
    pub async fn run(&self, query: &str) -> ComparisonReport {
        info!(query, corpora = self.agents.len(), "Running comparison");
        let baseline = self
            .ask("baseline", NEUTRAL_SYSTEM, query.to_string(), &self.baseline_params)
            .await;

        let mut stances = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let references = match agent.retrieve(query, self.top_k).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(label = agent.label(), error = %e, "Retrieval failed");
                    Vec::new()
                }
            };
            let kind = TemplateKind::StanceAware {
                stance: agent.label().to_string(),
            };
            let prompt = compose(&references, query, &kind);
            let mut answer = self
                .ask(agent.label(), COMMUNITY_SYSTEM, prompt, &self.stance_params)
                .await;
            answer.references = references;
            stances.push(answer);
        }

        ComparisonReport {
            query: query.to_string(),
            baseline,
            stances,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ChatError, Completion, Result};
    use crate::rag::HashingEncoder;
    use async_trait::async_trait;

    /// Replies with the system prompt it was given; fails when asked about "explode".
    struct Mirror;

    #[async_trait]
    impl Provider for Mirror {
        async fn chat(&self, messages: &[Message], params: &SamplingParams) -> Result<Completion> {
            if messages[1].content.contains("explode") {
                return Err(ChatError::ApiError {
                    code: "40001".into(),
                    message: "bad".into(),
                });
            }
            Ok(Completion::new(format!(
                "{} @ {}",
                messages[0].content, params.temperature
            )))
        }

        async fn embed(&self, _: &str) -> Result<Vec<f32>> {
            Err(ChatError::Timeout)
        }
    }

    async fn corpus(label: &str, texts: &[&str]) -> RetrievalAgent {
        let mut agent = RetrievalAgent::with_encoder(label, Arc::new(HashingEncoder::new(64)));
        agent.add_texts(texts.iter().copied()).await.unwrap();
        agent
    }

    #[tokio::test]
    async fn test_report_has_one_answer_per_corpus() {
        let comparison = Comparison::new(Arc::new(Mirror))
            .with_agent(corpus("boomer", &["Young people give up too easily."]).await)
            .with_agent(corpus("zoomer", &["Old people resist change.", "Overtime is waste."]).await)
            .with_top_k(1);

        let report = comparison.run("Do young people work hard?").await;

        assert_eq!(report.baseline.label, "baseline");
        assert_eq!(report.baseline.text, format!("{} @ 0.5", NEUTRAL_SYSTEM));
        assert!(report.baseline.references.is_empty());

        assert_eq!(report.stances.len(), 2);
        assert!(report.stances.iter().all(|a| a.error.is_none()));
        assert_eq!(report.stances[0].label, "boomer");
        assert_eq!(report.stances[0].text, format!("{} @ 0.8", COMMUNITY_SYSTEM));
        assert_eq!(report.stances[1].references.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_reported_per_answer() {
        let comparison = Comparison::new(Arc::new(Mirror)).with_retry(RetryPolicy::none());
        let report = comparison.run("explode").await;

        assert!(report.baseline.text.is_empty());
        assert!(report.baseline.error.as_deref().unwrap().contains("40001"));
        assert!(report.stances.is_empty());
    }
}
