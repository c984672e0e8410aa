//! HTTP tool server tests. Each test serves the router on an ephemeral port.

use serde_json::{json, Value};
use std::sync::Arc;

use stability_guard::config::Config;
use stability_guard::guard::StabilityGuard;
use stability_guard::server::router;

async fn spawn_server() -> String {
    let config = Config::minimal();
    let guard = StabilityGuard::in_memory(&config);
    let app = router(Arc::new(config), Arc::new(guard));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn call(base: &str, tool: &str, params: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}/tools/{}", base, tool))
        .json(&params)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// Parse the JSON document inside a tool's text content.
fn payload(body: &Value) -> Value {
    let text = body["content"][0]["text"].as_str().unwrap();
    serde_json::from_str(text).unwrap()
}

fn user_card() -> Value {
    json!({
        "name": "UserCard",
        "kind": "component",
        "metadata": {
            "file_path": "src/components/UserCard.tsx",
            "category": "profile",
            "functionality": ["display user"],
            "props": ["user"]
        },
        "tags": ["user"]
    })
}

#[tokio::test]
async fn test_health_and_tool_list() {
    let base = spawn_server().await;

    let health: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let list: Value = reqwest::get(format!("{}/tools/list", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = list["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names.len(), 8);
    assert!(names.contains(&"analyze_component"));
    assert!(names.contains(&"get_similar_components"));
}

#[tokio::test]
async fn test_register_then_duplicate_conflicts() {
    let base = spawn_server().await;

    let (status, body) = call(&base, "register_component", user_card()).await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(payload(&body)["registered"]["name"], "UserCard");

    let (status, body) = call(&base, "register_component", user_card()).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"]["code"], "conflict");

    let (_, body) = call(&base, "get_statistics", json!({})).await;
    assert_eq!(payload(&body)["registry"]["total"], 1);
}

#[tokio::test]
async fn test_register_missing_fields_is_bad_request() {
    let base = spawn_server().await;
    let (status, body) = call(
        &base,
        "register_component",
        json!({ "name": "Orphan", "kind": "component" }),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn test_analyze_blocks_existing_component() {
    let base = spawn_server().await;
    call(&base, "register_component", user_card()).await;

    let (status, body) = call(
        &base,
        "analyze_component",
        json!({ "kind": "component", "name": "UserCard" }),
    )
    .await;
    assert_eq!(status, 200);
    let decision = payload(&body);
    assert_eq!(decision["can_proceed"], false);
    assert_eq!(decision["audit"]["status"], "skipped");
}

#[tokio::test]
async fn test_search_and_validate_code() {
    let base = spawn_server().await;
    call(&base, "register_component", user_card()).await;

    let (status, body) = call(&base, "search_catalog", json!({ "query": "user" })).await;
    assert_eq!(status, 200);
    assert!(body["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("UserCard"));

    let (status, body) = call(
        &base,
        "validate_code",
        json!({ "code": "const mockUsers = [];" }),
    )
    .await;
    assert_eq!(status, 200);
    assert!(body["content"][0]["text"]
        .as_str()
        .unwrap()
        .contains("mock-variable"));
}

#[tokio::test]
async fn test_parameter_and_routing_errors() {
    let base = spawn_server().await;

    let (status, body) = call(&base, "validate_code", json!({})).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = call(&base, "no_such_tool", json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = call(
        &base,
        "analyze_component",
        json!({ "kind": "widget", "name": "X" }),
    )
    .await;
    assert_eq!(status, 400);
}
