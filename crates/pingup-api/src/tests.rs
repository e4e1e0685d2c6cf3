//! End-to-end tests through the router, against an in-memory database and a
//! throwaway upload directory.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use pingup_db::Database;
use pingup_db::queries::NewUser;
use pingup_gateway::{Frame, LiveHandle};

use crate::assets::{AssetStore, LocalAssets};
use crate::auth::{AppState, AppStateInner, IdentityResolver};
use crate::router::router;

const SECRET: &str = "router-test-secret";
const WEBHOOK_SECRET: &str = "whsec_test";
const BOUNDARY: &str = "pingup-test-boundary";

struct TestApp {
    state: AppState,
    app: Router,
    identity: IdentityResolver,
    upload_dir: PathBuf,
}

impl TestApp {
    async fn new(users: &[&str]) -> Self {
        let db = Database::open_in_memory().unwrap();
        for id in users {
            db.create_user(&NewUser {
                id: id.to_string(),
                email: format!("{id}@example.com"),
                full_name: format!("{id} Example"),
                username: id.to_string(),
                profile_picture: String::new(),
            })
            .unwrap();
        }

        let upload_dir = std::env::temp_dir().join(format!("pingup-router-{}", uuid::Uuid::new_v4()));
        let local = LocalAssets::new(upload_dir.clone(), "http://localhost:3000".into())
            .await
            .unwrap();
        let state = AppStateInner::new(
            db,
            AssetStore::Local(local),
            IdentityResolver::new(SECRET),
            WEBHOOK_SECRET.into(),
            Duration::from_secs(15),
        );

        Self {
            app: router(state.clone()),
            state,
            identity: IdentityResolver::new(SECRET),
            upload_dir,
        }
    }

    fn token(&self, user_id: &str) -> String {
        self.identity.issue(user_id, chrono::Duration::hours(1)).unwrap()
    }

    async fn send(&self, req: Request<Body>) -> Value {
        let response = self.app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    async fn get(&self, user_id: &str, uri: &str) -> Value {
        let req = Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    async fn post_json(&self, user_id: &str, uri: &str, body: Value) -> Value {
        let req = Request::post(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(req).await
    }

    async fn post_multipart(
        &self,
        user_id: &str,
        uri: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
    ) -> Value {
        let req = Request::post(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token(user_id)))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, file)))
            .unwrap();
        self.send(req).await
    }

    async fn send_text(&self, from: &str, to: &str, text: &str) -> Value {
        self.post_multipart(from, "/api/message/send", &[("to_user_id", to), ("text", text)], None)
            .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.upload_dir).ok();
    }
}

fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    if let Some((name, filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn ids(list: &Value) -> Vec<&str> {
    list.as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().or_else(|| v["id"].as_str()).unwrap())
        .collect()
}

// -- Envelope and auth --

#[tokio::test]
async fn health_check_is_public() {
    let t = TestApp::new(&[]).await;
    let response = t.app.clone().oneshot(Request::get("/").body(Body::empty()).unwrap()).await.unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Server Is Running");
}

#[tokio::test]
async fn missing_token_fails_inside_envelope() {
    let t = TestApp::new(&["u1"]).await;
    let req = Request::get("/api/user/data").body(Body::empty()).unwrap();
    let body = t.send(req).await;
    assert_eq!(body, json!({ "success": false, "message": "Not Authenticated" }));
}

#[tokio::test]
async fn user_data_carries_sets() {
    let t = TestApp::new(&["u1", "u2"]).await;
    t.post_json("u1", "/api/user/follow", json!({ "id": "u2" })).await;

    let body = t.get("u1", "/api/user/data").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["id"], "u1");
    assert_eq!(ids(&body["user"]["following"]), vec!["u2"]);
    assert!(body["user"]["followers"].as_array().unwrap().is_empty());
}

// -- Messages --

#[tokio::test]
async fn chat_lists_newest_first() {
    let t = TestApp::new(&["u1", "u2"]).await;
    let sent = t.send_text("u1", "u2", "first").await;
    assert_eq!(sent["success"], true);
    assert_eq!(sent["message"]["message_type"], "text");
    assert_eq!(sent["message"]["seen"], false);
    t.send_text("u2", "u1", "second").await;

    let chat = t.post_json("u1", "/api/message/get", json!({ "to_user_id": "u2" })).await;
    let texts: Vec<&str> = chat["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["second", "first"]);
}

#[tokio::test]
async fn reading_marks_only_incoming_as_seen() {
    let t = TestApp::new(&["u1", "u2"]).await;
    t.send_text("u1", "u2", "to u2").await;
    t.send_text("u2", "u1", "to u1").await;

    // u2 opens the conversation: only u1 -> u2 becomes seen.
    t.post_json("u2", "/api/message/get", json!({ "to_user_id": "u1" })).await;

    let inbox_u2 = t.get("u2", "/api/user/recent-messages").await;
    assert_eq!(inbox_u2["messages"][0]["text"], "to u2");
    assert_eq!(inbox_u2["messages"][0]["seen"], true);
    assert_eq!(inbox_u2["messages"][0]["from_user_id"]["username"], "u1");

    let inbox_u1 = t.get("u1", "/api/user/recent-messages").await;
    assert_eq!(inbox_u1["messages"][0]["text"], "to u1");
    assert_eq!(inbox_u1["messages"][0]["seen"], false);
}

#[tokio::test]
async fn empty_message_is_rejected() {
    let t = TestApp::new(&["u1", "u2"]).await;
    let body = t
        .post_multipart("u1", "/api/message/send", &[("to_user_id", "u2"), ("text", "  ")], None)
        .await;
    assert_eq!(body["success"], false);

    let chat = t.post_json("u2", "/api/message/get", json!({ "to_user_id": "u1" })).await;
    assert!(chat["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unknown_recipient_is_rejected() {
    let t = TestApp::new(&["u1"]).await;
    let body = t.send_text("u1", "ghost", "hello?").await;
    assert_eq!(body, json!({ "success": false, "message": "Recipient Not Found" }));
}

#[tokio::test]
async fn image_message_gets_transformed_url() {
    let t = TestApp::new(&["u1", "u2"]).await;
    let body = t
        .post_multipart(
            "u1",
            "/api/message/send",
            &[("to_user_id", "u2")],
            Some(("image", "cat.png", b"not really a png")),
        )
        .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["message"]["message_type"], "image");
    let url = body["message"]["media_url"].as_str().unwrap();
    assert!(url.starts_with("http://localhost:3000/uploads/"));
    assert!(url.ends_with("?tr=q-auto:w-1280:f-webp"));
}

#[tokio::test]
async fn live_recipient_receives_enriched_message() {
    let t = TestApp::new(&["u1", "u2"]).await;
    let (handle, mut rx) = LiveHandle::new("u2");
    t.state.registry.register(handle);

    t.send_text("u1", "u2", "ping").await;

    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let Frame::Data(json) = frame else {
        panic!("expected a data frame, got {frame:?}");
    };
    let payload: Value = serde_json::from_str(&json).unwrap();
    assert_eq!(payload["text"], "ping");
    assert_eq!(payload["from_user_id"]["id"], "u1");
    assert_eq!(payload["to_user_id"], "u2");
}

#[tokio::test]
async fn stream_opens_with_greeting() {
    let t = TestApp::new(&["u1"]).await;
    let uri = format!("/api/message/u1?token={}", t.token("u1"));
    let response = t.app.clone().oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");

    let mut body = response.into_body();
    let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
    assert_eq!(&first[..], b"log:Connected to SSE stream\n\n");
    assert!(t.state.registry.lookup("u1").is_some());

    drop(body);
    assert!(t.state.registry.lookup("u1").is_none());
}

#[tokio::test]
async fn shutdown_completes_with_stream_open() {
    let t = TestApp::new(&["u1"]).await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let registry = t.state.registry.clone();
    let server = tokio::spawn(
        axum::serve(listener, t.app.clone())
            .with_graceful_shutdown(async move {
                stop_rx.await.ok();
                registry.close_all();
            })
            .into_future(),
    );

    let url = format!("http://{addr}/api/message/u1?token={}", t.token("u1"));
    let mut response = reqwest::get(url).await.unwrap();
    let greeting = response.chunk().await.unwrap().unwrap();
    assert_eq!(&greeting[..], b"log:Connected to SSE stream\n\n");

    stop_tx.send(()).unwrap();
    let finished = tokio::time::timeout(Duration::from_secs(3), server).await;
    assert!(finished.is_ok(), "server kept running with a live stream open");
    assert!(response.chunk().await.map(|c| c.is_none()).unwrap_or(true));
}

#[tokio::test]
async fn stream_rejects_someone_elses_token() {
    let t = TestApp::new(&["u1", "u2"]).await;
    let uri = format!("/api/message/u1?token={}", t.token("u2"));
    let body = t.send(Request::get(uri).body(Body::empty()).unwrap()).await;
    assert_eq!(body["success"], false);
    assert!(t.state.registry.lookup("u1").is_none());
}

// -- Connections --

#[tokio::test]
async fn twenty_first_request_in_a_day_is_rate_limited() {
    let mut users: Vec<String> = (0..21).map(|i| format!("target{i}")).collect();
    users.push("sender".into());
    let refs: Vec<&str> = users.iter().map(String::as_str).collect();
    let t = TestApp::new(&refs).await;

    for target in &users[..20] {
        let body = t.post_json("sender", "/api/user/connect", json!({ "id": target })).await;
        assert_eq!(body["success"], true, "request to {target} failed: {body}");
    }

    let body = t.post_json("sender", "/api/user/connect", json!({ "id": "target20" })).await;
    assert_eq!(
        body["message"],
        "You Have Sent More Than 20 Connection Requests In The Last 24 Hours"
    );
}

#[tokio::test]
async fn duplicate_request_reports_pending_either_direction() {
    let t = TestApp::new(&["u1", "u2"]).await;
    let first = t.post_json("u1", "/api/user/connect", json!({ "id": "u2" })).await;
    assert_eq!(first["message"], "Connection Request Sent Successfully");

    let again = t.post_json("u1", "/api/user/connect", json!({ "id": "u2" })).await;
    assert_eq!(again, json!({ "success": false, "message": "Connection Request Pending" }));

    let reverse = t.post_json("u2", "/api/user/connect", json!({ "id": "u1" })).await;
    assert_eq!(reverse["message"], "Connection Request Pending");

    let listing = t.get("u2", "/api/user/connections").await;
    assert_eq!(ids(&listing["pending_connections"]), vec!["u1"]);
}

#[tokio::test]
async fn only_the_recipient_can_accept() {
    let t = TestApp::new(&["u1", "u2"]).await;
    t.post_json("u1", "/api/user/connect", json!({ "id": "u2" })).await;

    let wrong_side = t.post_json("u1", "/api/user/accept", json!({ "id": "u2" })).await;
    assert_eq!(wrong_side, json!({ "success": false, "message": "Connection Not Found" }));
    let data = t.get("u1", "/api/user/data").await;
    assert!(data["user"]["connections"].as_array().unwrap().is_empty());

    let accepted = t.post_json("u2", "/api/user/accept", json!({ "id": "u1" })).await;
    assert_eq!(accepted["message"], "Connection Accepted Successfully");

    for (me, other) in [("u1", "u2"), ("u2", "u1")] {
        let data = t.get(me, "/api/user/data").await;
        assert_eq!(ids(&data["user"]["connections"]), vec![other]);
    }

    let listing = t.get("u2", "/api/user/connections").await;
    assert!(listing["pending_connections"].as_array().unwrap().is_empty());
    assert_eq!(listing["connections"][0]["username"], "u1");

    let reconnect = t.post_json("u1", "/api/user/connect", json!({ "id": "u2" })).await;
    assert_eq!(reconnect["message"], "You Are Already Connected With This User");
}

#[tokio::test]
async fn follow_is_mirrored_and_reversible() {
    let t = TestApp::new(&["u1", "u2"]).await;
    let followed = t.post_json("u1", "/api/user/follow", json!({ "id": "u2" })).await;
    assert_eq!(followed["message"], "Now You Are Following This User");

    let twice = t.post_json("u1", "/api/user/follow", json!({ "id": "u2" })).await;
    assert_eq!(twice["message"], "You Are Already Following This User");

    let listing = t.get("u2", "/api/user/connections").await;
    assert_eq!(listing["followers"][0]["id"], "u1");

    let unfollowed = t.post_json("u1", "/api/user/unfollow", json!({ "id": "u2" })).await;
    assert_eq!(unfollowed["success"], true);
    let data = t.get("u2", "/api/user/data").await;
    assert!(data["user"]["followers"].as_array().unwrap().is_empty());
}

// -- Profiles --

#[tokio::test]
async fn discover_excludes_the_caller() {
    let t = TestApp::new(&["alice", "alina", "bob"]).await;
    let found = t.post_json("alice", "/api/user/discover", json!({ "input": "ali" })).await;
    let names: Vec<&str> = found["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["alina"]);
}

#[tokio::test]
async fn profile_update_keeps_taken_username() {
    let t = TestApp::new(&["u1", "u2"]).await;
    let body = t
        .post_multipart(
            "u1",
            "/api/user/update",
            &[("username", "u2"), ("bio", "new bio"), ("location", "Lagos")],
            Some(("profile", "me.jpg", b"jpeg-ish")),
        )
        .await;

    assert_eq!(body["message"], "Profile Updated Successfully");
    assert_eq!(body["user"]["username"], "u1");
    assert_eq!(body["user"]["bio"], "new bio");
    assert_eq!(body["user"]["location"], "Lagos");
    assert!(body["user"]["profile_picture"].as_str().unwrap().ends_with("w-512:f-webp"));
}

// -- Identity webhook --

#[tokio::test]
async fn webhook_requires_shared_secret() {
    let t = TestApp::new(&[]).await;
    let event = json!({
        "type": "user.created",
        "data": { "id": "user_9", "email_addresses": [{ "email_address": "nine@example.com" }] }
    });

    let rejected = t
        .send(
            Request::post("/api/webhooks/identity")
                .header(header::AUTHORIZATION, "Bearer wrong")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(event.to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(rejected["success"], false);

    let accepted = t
        .send(
            Request::post("/api/webhooks/identity")
                .header(header::AUTHORIZATION, format!("Bearer {WEBHOOK_SECRET}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(event.to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(accepted["success"], true);

    let data = t.get("user_9", "/api/user/data").await;
    assert_eq!(data["user"]["username"], "nine");
}
