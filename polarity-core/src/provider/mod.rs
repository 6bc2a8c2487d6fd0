//! Chat-completion provider abstraction layer.
//!
//! This module defines a common interface for chat and embedding backends
//! and the CLOVA Studio implementation used by experiments.

mod types;
pub mod clova;
pub mod retry;

// Re-export common types
pub use types::{
    ChatError,
    Completion,
    Message,
    Provider,
    Result,
    Role,
    SamplingParams,
    Usage,
};

// Re-export provider implementations
pub use clova::ClovaProvider;
pub use retry::RetryPolicy;
