use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PersonaError {
    #[error("Unknown stance: {0}")]
    UnknownStance(String),

    #[error("Unknown model type: {0}")]
    UnknownModelType(String),

    #[error("Persona '{0}' has no fallback responses")]
    EmptyFallback(String),
}

pub type Result<T> = std::result::Result<T, PersonaError>;

/// A debating position bound to one corpus.
///
/// The `fallback` lines are what an agent says when its model call fails,
/// so a persona must always carry at least one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub stance: String,
    pub description: String,
    pub fallback: Vec<String>,
}

impl Persona {
    pub fn new(stance: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            stance: stance.into(),
            description: description.into(),
            fallback: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, line: impl Into<String>) -> Self {
        self.fallback.push(line.into());
        self
    }

    pub fn left() -> Self {
        Self::new(
            "left",
            "You are a debater who emphasizes the government's responsibility.",
        )
        .with_fallback("I think the government's systematic safety management was lacking.")
        .with_fallback("Preventive measures should have been far more thorough.")
        .with_fallback("Those in charge must be held clearly accountable.")
    }

    pub fn right() -> Self {
        Self::new(
            "right",
            "You are a debater who emphasizes personal responsibility and on-site management.",
        )
        .with_fallback("We also need to look at how the site itself was managed.")
        .with_fallback("Individual safety awareness is an important factor too.")
        .with_fallback("An objective analysis has to come first.")
    }

    pub fn neutral() -> Self {
        Self::new("neutral", "You are a neutral debater.")
            .with_fallback("Both sides raise points worth examining.")
            .with_fallback("We should weigh the evidence before assigning blame.")
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stance)
    }
}

/// How an agent is instructed to behave, independent of its stance.
///
/// Base and detox agents differ only in the temperament they are built
/// with; the dialogue loop never branches on the model type.
pub trait Temperament: Send + Sync {
    /// Label written to dialogue logs ("base", "detox", ...).
    fn model_type(&self) -> &str;

    /// System prompt for a given persona.
    fn system_prompt(&self, persona: &Persona) -> String;
}

/// Persona description only.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base;

impl Temperament for Base {
    fn model_type(&self) -> &str {
        "base"
    }

    fn system_prompt(&self, persona: &Persona) -> String {
        persona.description.clone()
    }
}

/// Persona description followed by civility rules.
#[derive(Debug, Clone)]
pub struct Detox {
    rules: Vec<String>,
}

impl Detox {
    pub fn new(rules: Vec<String>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[String] {
        &self.rules
    }
}

impl Default for Detox {
    fn default() -> Self {
        Self::new(
            [
                "Do not belittle or mock the other side.",
                "Avoid aggressive or emotional language.",
                "Do not force a biased claim on the other side.",
                "Do not lecture or moralize.",
                "Exchange opinions respectfully.",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }
}

impl Temperament for Detox {
    fn model_type(&self) -> &str {
        "detox"
    }

    fn system_prompt(&self, persona: &Persona) -> String {
        let mut prompt = format!(
            "{}\n\nImportant: always follow these rules:",
            persona.description
        );
        for rule in &self.rules {
            prompt.push_str("\n- ");
            prompt.push_str(rule);
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_personas_have_fallbacks() {
        for persona in [Persona::left(), Persona::right(), Persona::neutral()] {
            assert!(!persona.fallback.is_empty(), "{} has no fallback", persona);
        }
    }

    #[test]
    fn test_base_prompt_is_description() {
        let persona = Persona::left();
        assert_eq!(Base.system_prompt(&persona), persona.description);
        assert_eq!(Base.model_type(), "base");
    }

    #[test]
    fn test_detox_prompt_lists_rules() {
        let persona = Persona::right();
        let detox = Detox::default();
        let prompt = detox.system_prompt(&persona);

        assert!(prompt.starts_with(&persona.description));
        for rule in detox.rules() {
            assert!(prompt.contains(&format!("- {}", rule)));
        }
        assert_eq!(detox.model_type(), "detox");
    }
}
