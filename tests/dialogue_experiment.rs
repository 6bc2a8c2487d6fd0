//! End-to-end dialogue runs against a mock CLOVA endpoint.

use polarity::config::{ClovaConfig, Credentials};
use polarity::prelude::*;
use polarity::rag::HashingEncoder;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_success(text: &str) -> serde_json::Value {
    serde_json::json!({
        "status": {"code": "20000", "message": "OK"},
        "result": {
            "message": {"role": "assistant", "content": text},
            "usage": {"inputTokens": 10, "outputTokens": 4, "totalTokens": 14}
        }
    })
}

fn provider_for(server: &MockServer) -> Arc<dyn Provider> {
    let config = ClovaConfig {
        chat_url: format!("{}/chat", server.uri()),
        embedding_url: format!("{}/embed", server.uri()),
        timeout_secs: 5,
    };
    Arc::new(ClovaProvider::new(&config, &Credentials::new("test-key")).unwrap())
}

fn no_retry() -> RetryPolicy {
    RetryPolicy::new(0, Duration::ZERO)
}

#[tokio::test]
async fn http_500_produces_degraded_record_and_full_log() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let left = DialogueAgent::new("Agent_L", Persona::left(), Arc::new(Base))
        .with_provider(provider.clone())
        .with_retry(no_retry())
        .with_seed(1);
    let right = DialogueAgent::new("Agent_R", Persona::right(), Arc::new(Detox::default()))
        .with_provider(provider)
        .with_retry(no_retry())
        .with_seed(2);

    let log = DialogueExperiment::new("failing", "crowd safety", Box::new(left), Box::new(right), 2)
        .run()
        .await;

    assert_eq!(log.dialogue.len(), 4);
    assert_eq!(log.degraded_count(), 4);
    let first = &log.dialogue[0];
    assert!(Persona::left().fallback.contains(&first.message));
    assert!(first.error.as_deref().unwrap().contains("500"));
    assert_eq!(log.dialogue[1].model_type, "detox");
}

#[tokio::test]
async fn replies_flow_between_agents() {
    let server = MockServer::start().await;
    // The right agent is asked about the left agent's reply.
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_string_contains("left reply"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_success("right reply")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_success("left reply")))
        .mount(&server)
        .await;

    let provider = provider_for(&server);
    let left = DialogueAgent::new("Agent_L", Persona::left(), Arc::new(Base))
        .with_provider(provider.clone())
        .with_retry(no_retry());
    let right = DialogueAgent::new("Agent_R", Persona::right(), Arc::new(Base))
        .with_provider(provider)
        .with_retry(no_retry());

    let log = DialogueExperiment::new("flow", "crowd safety", Box::new(left), Box::new(right), 1)
        .run()
        .await;

    let messages: Vec<&str> = log.dialogue.iter().map(|r| r.message.as_str()).collect();
    assert_eq!(messages, vec!["left reply", "right reply"]);
    assert_eq!(log.degraded_count(), 0);
}

#[tokio::test]
async fn rag_agent_sends_references_to_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat"))
        .and(body_string_contains("[ref 1] The city ignored the crowd warnings."))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_success("grounded")))
        .expect(1)
        .mount(&server)
        .await;

    let mut retrieval = RetrievalAgent::new(
        "left",
        EmbeddingStore::new(Arc::new(HashingEncoder::new(128))),
    );
    retrieval
        .add_texts(["The city ignored the crowd warnings."])
        .await
        .unwrap();

    let mut agent = DialogueAgent::new("Agent_L", Persona::left(), Arc::new(Base))
        .with_provider(provider_for(&server))
        .with_retrieval(retrieval, 3)
        .with_retry(no_retry());

    let reply = agent.respond("crowd safety", "Who ignored the warnings?").await;
    assert_eq!(reply, Utterance::reply("grounded"));
}

#[tokio::test]
async fn offline_seeded_runs_are_identical_and_round_trip() {
    async fn offline_log() -> ExperimentLog {
        let left = DialogueAgent::new("Agent_L", Persona::left(), Arc::new(Base)).with_seed(42);
        let right = DialogueAgent::new("Agent_R", Persona::right(), Arc::new(Base)).with_seed(43);
        DialogueExperiment::new("offline", "crowd safety", Box::new(left), Box::new(right), 3)
            .run()
            .await
    }

    let first = offline_log().await;
    let second = offline_log().await;
    assert_eq!(first.dialogue.len(), 6);

    let messages = |log: &ExperimentLog| -> Vec<String> {
        log.dialogue.iter().map(|r| r.message.clone()).collect()
    };
    assert_eq!(messages(&first), messages(&second));

    let dir = TempDir::new().unwrap();
    let path = first.save_in(dir.path()).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("dialogue_log_offline_"));
    assert!(name.ends_with(".json"));

    assert_eq!(ExperimentLog::load(&path).unwrap(), first);
}
