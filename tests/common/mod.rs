// Shared helpers for integration tests.
#![allow(dead_code)]

use serde_json::json;
use std::time::Duration;
use therapist_eval::llm_interaction::{LlmClient, LlmSettings};
use therapist_eval::styles::STYLES;
use therapist_eval::therapist::{ReplyMode, Therapist};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const UNADAPTED: &str = "It sounds like caregiving has been exhausting. What feels hardest right now?";
pub const ADAPTED: &str = "You need to rest. Tell me: what is the hardest part?";

pub fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

/// Mount a therapist responder and a style adapter responder on `server`.
pub async fn mount_model(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Problem-Solving Therapy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(UNADAPTED)))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_string_contains("Please revise"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(ADAPTED)))
        .mount(server)
        .await;
}

pub fn therapist(server: &MockServer, style: usize, mode: ReplyMode) -> Therapist {
    let llm = LlmClient::new(LlmSettings {
        base_url: format!("{}/v1", server.uri()),
        api_key: "sk-test".to_string(),
        model: "gpt-4o-mini".to_string(),
        temperature: 0.7,
        timeout: Duration::from_secs(5),
    })
    .unwrap();
    Therapist::new(llm, &STYLES[style], mode)
}

/// Request bodies received by the mock, parsed as JSON, in arrival order.
pub async fn request_bodies(server: &MockServer) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}
