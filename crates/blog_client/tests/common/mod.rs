//! Shared fixtures for the API integration tests

#![allow(dead_code)]

use blog_client::{BlogApi, Session, TokenStore};
use blog_core::{ClientConfig, TokenPair};
use serde_json::{json, Value};
use wiremock::MockServer;

/// Session wired to `server`, with an empty in-memory token store.
pub async fn session_for(server: &MockServer) -> Session {
    session_with_store(server, TokenStore::in_memory()).await
}

pub async fn session_with_store(server: &MockServer, tokens: TokenStore) -> Session {
    let config = ClientConfig::with_api_base(format!("{}/api", server.uri()));
    let api = BlogApi::new(config, tokens).expect("Failed to build API client");
    Session::new(api).await.expect("Failed to open session")
}

/// Session whose store already holds `access`/`refresh`.
pub async fn logged_in_session(server: &MockServer, access: &str, refresh: &str) -> Session {
    let tokens = TokenStore::in_memory();
    tokens
        .save(&TokenPair::new(access, refresh))
        .await
        .expect("Failed to seed tokens");
    session_with_store(server, tokens).await
}

pub fn user_json(id: i64) -> Value {
    json!({
        "id": id,
        "email": format!("user{id}@example.com"),
        "username": format!("user{id}"),
        "first_name": "Test",
        "last_name": "User",
        "date_joined": "2024-01-15T09:30:00Z"
    })
}

pub fn auth_json(id: i64, access: &str, refresh: &str) -> Value {
    json!({
        "user": user_json(id),
        "tokens": { "access": access, "refresh": refresh }
    })
}

pub fn blog_json(id: i64, author_id: i64) -> Value {
    json!({
        "id": id,
        "title": format!("Post {id}"),
        "content": format!("Content of post {id}"),
        "author": user_json(author_id),
        "created_at": "2024-02-01T12:00:00Z",
        "updated_at": "2024-02-01T12:00:00Z",
        "is_published": true
    })
}

pub fn list_item_json(id: i64, author_id: i64) -> Value {
    json!({
        "id": id,
        "title": format!("Post {id}"),
        "content_preview": format!("Content of post {id}"),
        "author": user_json(author_id),
        "created_at": "2024-02-01T12:00:00Z",
        "updated_at": "2024-02-01T12:00:00Z"
    })
}

pub fn page_json(count: u64, ids: &[i64]) -> Value {
    json!({
        "count": count,
        "next": null,
        "previous": null,
        "results": ids.iter().map(|id| list_item_json(*id, 1)).collect::<Vec<_>>()
    })
}

/// Number of requests the server saw carrying an `Authorization` header.
pub async fn authorized_request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|req| req.headers.get("authorization").is_some())
        .count()
}
