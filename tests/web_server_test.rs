mod common;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::{mount_model, therapist, ADAPTED};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use therapist_eval::storage::LocalDirSink;
use therapist_eval::therapist::ReplyMode;
use therapist_eval::web_server::{build_router, AppState};
use wiremock::MockServer;

struct Harness {
    server: TestServer,
    out: TempDir,
    _model: MockServer,
}

async fn harness(min_turns: usize) -> Harness {
    let model = MockServer::start().await;
    mount_model(&model).await;
    let out = tempfile::tempdir().unwrap();
    let state = AppState::new(
        therapist(&model, 0, ReplyMode::Adapted),
        Arc::new(LocalDirSink::new(out.path())),
        min_turns,
        PathBuf::from("templates"),
    );
    let server = TestServer::new(build_router(state, PathBuf::from("static"))).unwrap();
    Harness {
        server,
        out,
        _model: model,
    }
}

async fn send(h: &Harness, pid: &str, content: &str) -> String {
    let resp = h
        .server
        .post(&format!("/chat/{}/message", pid))
        .form(&[("content", content)])
        .await;
    resp.assert_status(StatusCode::SEE_OTHER);
    resp.header("location").to_str().unwrap().to_string()
}

async fn start(h: &Harness, pid: &str) {
    h.server
        .post("/start")
        .form(&[("participant_id", pid)])
        .await
        .assert_status(StatusCode::SEE_OTHER);
}

#[test_log::test(tokio::test)]
async fn test_index_asks_for_participant_id() {
    let h = harness(2).await;
    let resp = h.server.get("/").await;
    resp.assert_status_ok();
    let body = resp.text();
    assert!(body.contains("What is your participant ID?"));
    assert!(body.contains("Please enter your participant ID to continue."));
}

#[test_log::test(tokio::test)]
async fn test_start_redirects_and_rejects_bad_ids() {
    let h = harness(2).await;

    let resp = h.server.post("/start").form(&[("participant_id", " 17 ")]).await;
    resp.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(resp.header("location"), "/chat/17");

    let resp = h.server.post("/start").form(&[("participant_id", "")]).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert!(resp.text().contains("participant ID is empty"));

    let resp = h.server.post("/start").form(&[("participant_id", "a b")]).await;
    resp.assert_status(StatusCode::BAD_REQUEST);
}

#[test_log::test(tokio::test)]
async fn test_chat_page_shows_greeting_and_escapes_content() {
    let h = harness(2).await;

    let resp = h.server.get("/chat/17").await;
    resp.assert_status_ok();
    let body = resp.text();
    assert!(body.contains("Hello, I am an AI therapist"));
    assert!(body.contains("Evaluation Section 1"));
    assert!(!body.contains("Save &amp; Start Evaluation"));

    let location = send(&h, "17", "<b>tired</b>").await;
    assert_eq!(location, "/chat/17?new=1#latest");
    let body = h.server.get("/chat/17?new=1").await.text();
    assert!(body.contains("&lt;b&gt;tired&lt;/b&gt;"));
    assert!(body.contains(ADAPTED));
    assert!(body.contains(r#"class="message assistant latest""#));
}

#[test_log::test(tokio::test)]
async fn test_typing_effect_only_after_new_reply() {
    let h = harness(2).await;
    send(&h, "17", "hello").await;

    let body = h.server.get("/chat/17").await.text();
    assert!(body.contains(ADAPTED));
    assert!(!body.contains(r#"class="message assistant latest""#));
    let body = h.server.get("/chat/17?notice=chat_saved").await.text();
    assert!(!body.contains(r#"class="message assistant latest""#));
}

#[test_log::test(tokio::test)]
async fn test_transcript_uploaded_once_threshold_reached() {
    let h = harness(2).await;
    let file = h.out.path().join("authoritative_P17.csv");

    send(&h, "17", "first").await;
    assert!(!file.exists());
    let resp = h.server.post("/chat/17/save").await;
    resp.assert_status(StatusCode::BAD_REQUEST);

    send(&h, "17", "second").await;
    assert!(file.exists());

    let mut reader = csv::Reader::from_path(&file).unwrap();
    let rows: Vec<(String, String)> = reader.deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[0].0, "assistant");
    assert_eq!(rows[1], ("user".to_string(), "first".to_string()));
    assert_eq!(rows[4], ("assistant".to_string(), ADAPTED.to_string()));

    let body = h.server.get("/chat/17").await.text();
    assert!(body.contains("Save &amp; Start Evaluation"));

    let resp = h.server.post("/chat/17/save").await;
    resp.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(resp.header("location"), "/chat/17?notice=chat_saved");
    let body = h.server.get("/chat/17?notice=chat_saved").await.text();
    assert!(body.contains("Chat history was uploaded successfully."));

    // Every turn past the threshold replaces the stored transcript.
    send(&h, "17", "third").await;
    let mut reader = csv::Reader::from_path(&file).unwrap();
    let rows: Vec<(String, String)> = reader.deserialize().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 7);
    assert_eq!(rows[5], ("user".to_string(), "third".to_string()));
    assert_eq!(rows[6], ("assistant".to_string(), ADAPTED.to_string()));
}

#[test_log::test(tokio::test)]
async fn test_empty_message_is_ignored() {
    let h = harness(1).await;
    let location = send(&h, "17", "   ").await;
    assert_eq!(location, "/chat/17#latest");
    assert!(!h.out.path().join("authoritative_P17.csv").exists());
}

#[test_log::test(tokio::test)]
async fn test_sessions_are_isolated() {
    let h = harness(1).await;
    send(&h, "1", "only for one").await;

    let body = h.server.get("/chat/2").await.text();
    assert!(!body.contains("only for one"));
    assert!(h.out.path().join("authoritative_P1.csv").exists());
    assert!(!h.out.path().join("authoritative_P2.csv").exists());
}

#[test_log::test(tokio::test)]
async fn test_ratings_uploaded_as_csv() {
    let h = harness(2).await;
    start(&h, "17").await;

    let resp = h
        .server
        .post("/chat/17/ratings")
        .form(&[
            ("ta_1", "20"),
            ("ta_1_neg", "It repeated itself"),
            ("ta_1_pos", "ignored"),
            ("ta_2", "80"),
            ("ta_2_pos", "Stayed on my goal"),
            ("ta_3", "50"),
            ("ta_4", "50"),
            ("ue_1", "9"),
            ("ue_2", "3"),
            ("emp_1", "70"),
            ("emp_2", "60"),
            ("emp_3", "10"),
        ])
        .await;
    resp.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(resp.header("location"), "/chat/17?notice=ratings_saved");

    let file = h.out.path().join("EvalRatings_authoritative_P17.csv");
    let mut reader = csv::Reader::from_path(&file).unwrap();
    let rows: Vec<(String, String)> = reader.deserialize().map(|r| r.unwrap()).collect();
    let get = |aspect: &str| {
        rows.iter()
            .find(|(a, _)| a == aspect)
            .map(|(_, v)| v.clone())
            .unwrap()
    };
    assert_eq!(rows.len(), 17);
    assert_eq!(get("TA_rating_1"), "20");
    assert_eq!(get("TA_rationale_1_neg"), "It repeated itself");
    assert_eq!(get("TA_rationale_1_pos"), "");
    assert_eq!(get("TA_rationale_2_pos"), "Stayed on my goal");
    assert_eq!(get("UE_rating_1"), "9");
    assert_eq!(get("Empathy_rating_3"), "10");

    let body = h.server.get("/chat/17?notice=ratings_saved").await.text();
    assert!(body.contains("Evaluation ratings were uploaded successfully."));
    assert!(body.contains("Ratings received."));
}

#[test_log::test(tokio::test)]
async fn test_out_of_range_rating_rejected() {
    let h = harness(2).await;
    start(&h, "17").await;
    let post = |field: &'static str, value: &'static str| {
        h.server
            .post("/chat/17/ratings")
            .form(&[(field, value)])
    };

    let resp = post("ue_1", "11").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert!(resp.text().contains("UE_rating_1"));

    let resp = post("ta_1", "300").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert!(resp.text().contains("TA_rating_1 must be between 0 and 100, got 300"));

    let resp = post("emp_2", "-5").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert!(resp.text().contains("Empathy_rating_2"));

    let resp = post("ue_2", "lots").await;
    resp.assert_status(StatusCode::BAD_REQUEST);
    assert!(resp.text().contains("Invalid rating form"));

    assert!(!h.out.path().join("EvalRatings_authoritative_P17.csv").exists());
}

#[test_log::test(tokio::test)]
async fn test_unknown_participant_cannot_save_or_rate() {
    let h = harness(1).await;

    // Viewing a page does not register the participant.
    h.server.get("/chat/99").await.assert_status_ok();

    let resp = h.server.post("/chat/99/ratings").form(&[("ta_1", "50")]).await;
    resp.assert_status(StatusCode::NOT_FOUND);
    assert!(resp.text().contains("No session for participant 99"));
    h.server
        .post("/chat/99/save")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    assert!(std::fs::read_dir(h.out.path()).unwrap().next().is_none());
}

#[test_log::test(tokio::test)]
async fn test_model_failure_surfaces_as_bad_gateway() {
    let model = MockServer::start().await; // nothing mounted: every call gets 404
    let out = tempfile::tempdir().unwrap();
    let state = AppState::new(
        therapist(&model, 0, ReplyMode::Adapted),
        Arc::new(LocalDirSink::new(out.path())),
        1,
        PathBuf::from("templates"),
    );
    let server = TestServer::new(build_router(state, PathBuf::from("static"))).unwrap();

    let resp = server
        .post("/chat/17/message")
        .form(&[("content", "hello")])
        .await;
    resp.assert_status(StatusCode::BAD_GATEWAY);
    assert!(resp.text().contains("Therapist response failed"));
}

#[test_log::test(tokio::test)]
async fn test_static_assets_served() {
    let h = harness(2).await;
    h.server.get("/static/style.css").await.assert_status_ok();
    h.server
        .get("/static/missing.css")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}
