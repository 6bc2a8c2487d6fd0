//! polarity-core - Retrieval-augmented dialogue experiments
//!
//! Provides the building blocks for measuring how stance-specific corpora
//! shift a chat model's answers:
//! - Chat and embedding providers (CLOVA Studio) with caller-side retry
//! - RAG over per-stance corpora with a persistent flat index
//! - Prompt templates for plain and stance-aware answers
//! - Two-agent dialogue experiments with JSON logs
//! - Configuration management
//!
//! ## Primary API
//!
//! Most runs build two [`DialogueAgent`]s, hand them to a
//! [`DialogueExperiment`], and save the resulting [`ExperimentLog`].

// Public modules
pub mod compare;
pub mod config;
pub mod dialogue;
pub mod prompt;
pub mod provider;
pub mod rag;

// Public exports
pub use compare::{Comparison, ComparisonReport};
pub use config::{Config, ConfigError, Credentials};
pub use dialogue::{
    AgentProfile, DialogueAgent, DialogueExperiment, ExperimentLog, LogSummary, ReplyLimits, Speaker,
    TurnRecord, Utterance,
};
pub use prompt::{compose, TemplateKind};
pub use rag::{Document, EmbeddingStore, RagError, RetrievalAgent, RetrievalResult};

// Provider exports
pub use provider::{
    ChatError, ClovaProvider, Completion, Message, Provider, RetryPolicy, Role, SamplingParams,
};
