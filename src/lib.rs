//! polarity - Bias propagation experiments for retrieval-augmented dialogue
//!
//! This is the convenience wrapper crate that re-exports the polarity
//! components.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! polarity = "0.1"
//! ```
//!
//! ```no_run
//! use polarity::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let left = DialogueAgent::new("Agent_L", Persona::left(), Arc::new(Base)).with_seed(1);
//! let right = DialogueAgent::new("Agent_R", Persona::right(), Arc::new(Detox::default())).with_seed(2);
//!
//! let log = DialogueExperiment::new("offline", "crowd safety", Box::new(left), Box::new(right), 3)
//!     .run()
//!     .await;
//! log.save_in("./logs").unwrap();
//! # }
//! ```

// Re-export core
pub use polarity_core::*;
pub use polarity_persona;

/// Prelude module for convenient imports
pub mod prelude {
    pub use polarity_core::*;
    pub use polarity_persona::{Base, Detox, Persona, PersonaRegistry, Temperament};
}
