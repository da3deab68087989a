//! HTTP surface exercised over a real socket.

mod common;

use std::sync::Arc;

use imigra_gateway::AppState;
use imigra_gateway::server::create_router;
use serde_json::{Value, json};

async fn spawn(state: Arc<AppState>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_health() {
    let base = spawn(common::app_state(&[]).await).await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_question_escalation_and_operator_answer() {
    let base = spawn(common::app_state(&["900"]).await).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/questions"))
        .json(&json!({
            "user": { "external_id": "42", "username": "ivan" },
            "text": "Сколько длится рассмотрение ВНЖ?"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let outcome: Value = response.json().await.unwrap();
    assert_eq!(outcome["status"], "escalated");
    assert!(
        outcome["operator_notification"]
            .as_str()
            .unwrap()
            .contains("@ivan")
    );
    let id = outcome["interaction_id"].as_i64().unwrap();

    // Only operators see tickets.
    let forbidden = client
        .get(format!("{base}/tickets?operator_id=42"))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status(), 403);

    let tickets: Value = client
        .get(format!("{base}/tickets?operator_id=900"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(tickets["tickets"].as_array().unwrap().len(), 1);
    assert!(tickets["text"].as_str().unwrap().contains(&format!("#{id}")));

    let not_operator = client
        .post(format!("{base}/questions/{id}/answer"))
        .json(&json!({ "operator_id": "42", "answer": "Около трёх месяцев." }))
        .send()
        .await
        .unwrap();
    assert_eq!(not_operator.status(), 403);

    let answered = client
        .post(format!("{base}/questions/{id}/answer"))
        .json(&json!({ "operator_id": "900", "answer": "Около трёх месяцев." }))
        .send()
        .await
        .unwrap();
    assert_eq!(answered.status(), 200);
    let recorded: Value = answered.json().await.unwrap();
    assert_eq!(recorded["user_external_id"], "42");
    assert_eq!(recorded["ticket_closed"], true);
    assert_eq!(recorded["knowledge_entry"]["source"], "admin");

    let again = client
        .post(format!("{base}/questions/{id}/answer"))
        .json(&json!({ "operator_id": "900", "answer": "Другой ответ." }))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status(), 409);

    let missing = client
        .post(format!("{base}/questions/999/answer"))
        .json(&json!({ "operator_id": "900", "answer": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 404);
}

#[tokio::test]
async fn test_empty_question_is_bad_request() {
    let base = spawn(common::app_state(&[]).await).await;
    let response = reqwest::Client::new()
        .post(format!("{base}/questions"))
        .json(&json!({ "user": { "external_id": "1" }, "text": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}
