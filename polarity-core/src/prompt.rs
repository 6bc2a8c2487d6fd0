//! Prompt templates.
//!
//! Everything here is a pure function of its arguments: the same retrieved
//! snippets, query, and template always produce the same string.

use crate::rag::RetrievalResult;

/// Which framing to put around retrieved references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateKind {
    /// Neutral question answering over the references.
    Plain,
    /// Asks the model to answer from the perspective of the community the
    /// references came from.
    StanceAware { stance: String },
}

/// Builds the user prompt for `query` with `retrieved` as numbered references.
///
/// References are rendered as `[ref i] text` blocks separated by blank lines,
/// numbered from 1 in retrieval order. With no references, the references
/// header is dropped as well.
///
/// # Example
///
/// ```
/// # use polarity_core::prompt::{compose, TemplateKind};
/// let prompt = compose(&[], "What causes C?", &TemplateKind::Plain);
/// assert!(prompt.contains("What causes C?"));
/// assert!(!prompt.contains("[ref"));
/// assert!(prompt.ends_with("Answer:"));
/// ```
pub fn compose(retrieved: &[RetrievalResult], query: &str, kind: &TemplateKind) -> String {
    let has_refs = !retrieved.is_empty();
    let mut prompt = String::new();

    match kind {
        TemplateKind::Plain if has_refs => {
            prompt.push_str("Answer the question using the references below.\n\n");
            prompt.push_str("References:\n");
        }
        TemplateKind::Plain => {
            prompt.push_str("Answer the question.\n\n");
        }
        TemplateKind::StanceAware { stance } if has_refs => {
            prompt.push_str(&format!(
                "Answer the question with reference to the following posts from the {} community.\n\n",
                stance
            ));
            prompt.push_str("Community references:\n");
        }
        TemplateKind::StanceAware { stance } => {
            prompt.push_str(&format!(
                "Answer the question as a member of the {} community.\n\n",
                stance
            ));
        }
    }

    if has_refs {
        let blocks: Vec<String> = retrieved
            .iter()
            .enumerate()
            .map(|(i, result)| format!("[ref {}] {}", i + 1, result.document.text))
            .collect();
        prompt.push_str(&blocks.join("\n\n"));
        prompt.push_str("\n\n");
    }

    prompt.push_str(&format!("Question: {}\n\n", query));

    if let TemplateKind::StanceAware { .. } = kind {
        if has_refs {
            prompt.push_str("Reflect the perspective of the community above.\n");
        }
    }
    prompt.push_str("Answer:");
    prompt
}

/// Per-turn user message in a dialogue: the topic, the opponent's last
/// message, and a request for the speaker's own view.
pub fn turn_prompt(topic: &str, opponent_message: &str) -> String {
    format!(
        "Topic: {}\n\nYour opponent's opinion: {}\n\nPlease share your opinion.",
        topic, opponent_message
    )
}

/// Opening question used when an experiment has no explicit initial prompt.
pub fn default_opening(topic: &str) -> String {
    format!("What do you think about {}?", topic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::Document;

    fn result(text: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            document: Document::new("id", text),
            score,
        }
    }

    #[test]
    fn test_plain_layout() {
        let retrieved = vec![result("B causes C", 0.9), result("A causes B", 0.4)];
        let prompt = compose(&retrieved, "What causes C?", &TemplateKind::Plain);

        assert_eq!(
            prompt,
            "Answer the question using the references below.\n\n\
             References:\n\
             [ref 1] B causes C\n\n\
             [ref 2] A causes B\n\n\
             Question: What causes C?\n\n\
             Answer:"
        );
    }

    #[test]
    fn test_empty_retrieval_has_no_references() {
        for kind in [
            TemplateKind::Plain,
            TemplateKind::StanceAware { stance: "left".into() },
        ] {
            let prompt = compose(&[], "Who is responsible?", &kind);
            assert!(prompt.contains("Who is responsible?"));
            assert!(!prompt.contains("[ref"));
            assert!(!prompt.contains("references"));
            assert!(prompt.ends_with("Answer:"));
        }
    }

    #[test]
    fn test_stance_aware_names_community() {
        let retrieved = vec![result("The state failed.", 0.8)];
        let kind = TemplateKind::StanceAware { stance: "left".into() };
        let prompt = compose(&retrieved, "Who is responsible?", &kind);

        assert!(prompt.contains("the left community"));
        assert!(prompt.contains("[ref 1] The state failed."));
        assert!(prompt.contains("Reflect the perspective"));
    }

    #[test]
    fn test_compose_is_pure() {
        let retrieved = vec![result("x", 0.5)];
        let kind = TemplateKind::StanceAware { stance: "right".into() };
        assert_eq!(
            compose(&retrieved, "q", &kind),
            compose(&retrieved, "q", &kind)
        );
    }

    #[test]
    fn test_turn_prompt() {
        let prompt = turn_prompt("crowd safety", "The city failed.");
        assert!(prompt.starts_with("Topic: crowd safety"));
        assert!(prompt.contains("Your opponent's opinion: The city failed."));
        assert_eq!(default_opening("crowd safety"), "What do you think about crowd safety?");
    }
}
