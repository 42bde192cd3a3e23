use std::collections::HashMap;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use futures::future::join_all;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use secretshare::{config::Config, routes, state::AppState};

const FAILED: &str = "failed to get a message";

async fn app() -> Router {
    let state = AppState::new(&Config::local()).await.unwrap();
    routes::app(state).unwrap()
}

/// A browser-like client: keeps cookies and echoes the CSRF cookie in the
/// `x-csrf-token` header on state-changing requests.
struct Client {
    app: Router,
    cookies: HashMap<String, String>,
}

impl Client {
    fn anonymous(app: &Router) -> Self {
        Self {
            app: app.clone(),
            cookies: HashMap::new(),
        }
    }

    async fn logged_in(app: &Router, username: &str) -> Self {
        let mut client = Self::anonymous(app);
        let (status, _) = client
            .send(
                Method::POST,
                "/api/auth/login",
                Some(json!({ "username": username, "password": username })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(client.cookies.contains_key("session_id"));
        client
    }

    fn build(&self, method: Method, path: &str, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method.clone()).uri(path);

        if !self.cookies.is_empty() {
            let cookie = self
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header(header::COOKIE, cookie);
        }
        if method != Method::GET {
            if let Some(token) = self.cookies.get("csrf_token") {
                builder = builder.header("x-csrf-token", token);
            }
        }

        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(&mut self, method: Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = self.build(method, path, body);
        let response = self.app.clone().oneshot(request).await.unwrap();

        for set_cookie in response.headers().get_all(header::SET_COOKIE) {
            let set_cookie = set_cookie.to_str().unwrap();
            let pair = set_cookie.split(';').next().unwrap();
            let (name, value) = pair.split_once('=').unwrap();
            if value.is_empty() || set_cookie.contains("Max-Age=0") {
                self.cookies.remove(name);
            } else {
                self.cookies.insert(name.to_string(), value.to_string());
            }
        }

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

/// Creates a message as `joe` and returns `(id, pin)`.
async fn create(app: &Router, payload: &str) -> (String, u64) {
    let mut joe = Client::logged_in(app, "joe").await;
    let (status, body) = joe
        .send(Method::POST, "/api/messages", Some(json!({ "payload": payload })))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    (
        body["id"].as_str().unwrap().to_string(),
        body["pin"].as_u64().unwrap(),
    )
}

#[tokio::test]
async fn correct_pin_reveals_once_then_link_is_gone() {
    let app = app().await;
    let mut joe = Client::logged_in(&app, "joe").await;

    let (status, created) = joe
        .send(Method::POST, "/api/messages", Some(json!({ "payload": "foobar" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap();
    let pin = created["pin"].as_u64().unwrap();
    assert!(pin >= 100);
    assert!(created["link"].as_str().unwrap().ends_with(&format!("/api/messages/{id}")));

    let path = format!("/api/messages/{id}");
    let mut visitor = Client::anonymous(&app);
    let (status, _) = visitor.send(Method::GET, &path, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = visitor
        .send(Method::POST, &path, Some(json!({ "pin": pin.to_string() })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "foobar");

    let (status, _) = visitor.send(Method::GET, &path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = visitor
        .send(Method::POST, &path, Some(json!({ "pin": pin.to_string() })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], FAILED);
}

#[tokio::test]
async fn five_wrong_pins_destroy_the_message() {
    let app = app().await;
    let (id, _) = create(&app, "foobar").await;
    let path = format!("/api/messages/{id}");

    let mut visitor = Client::anonymous(&app);
    let (status, _) = visitor.send(Method::GET, &path, None).await;
    assert_eq!(status, StatusCode::OK);

    for _ in 0..5 {
        let (status, body) = visitor
            .send(Method::POST, &path, Some(json!({ "pin": "0000" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": FAILED }));
    }

    let (status, _) = visitor.send(Method::GET, &path, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn anonymous_visitor_reaches_pin_prompt_but_cannot_create() {
    let app = app().await;
    let (id, _) = create(&app, "foobar").await;

    let mut visitor = Client::anonymous(&app);
    let (status, body) = visitor
        .send(Method::GET, &format!("/api/messages/{id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert!(body.get("pin").is_none());
    assert!(visitor.cookies.contains_key("csrf_token"));
    assert!(!visitor.cookies.contains_key("session_id"));

    let (status, body) = visitor
        .send(Method::POST, "/api/messages", Some(json!({ "payload": "x" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["login"]
        .as_str()
        .unwrap()
        .contains("failedPath=/api/messages"));
}

#[tokio::test]
async fn unknown_and_malformed_ids_look_like_missing_messages() {
    let app = app().await;
    let mut visitor = Client::anonymous(&app);
    let (status, _) = visitor.send(Method::GET, "/api/auth/csrf", None).await;
    assert_eq!(status, StatusCode::OK);

    for path in [
        "/api/messages/not-a-uuid".to_string(),
        format!("/api/messages/{}", uuid::Uuid::new_v4()),
    ] {
        let (status, _) = visitor.send(Method::GET, &path, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = visitor
            .send(Method::POST, &path, Some(json!({ "pin": "123456" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], FAILED);
    }
}

#[tokio::test]
async fn redeem_without_csrf_fails_uniformly_and_costs_nothing() {
    let app = app().await;
    let (id, pin) = create(&app, "foobar").await;
    let path = format!("/api/messages/{id}");

    // No prompt visit, so no CSRF cookie.
    let mut visitor = Client::anonymous(&app);
    for _ in 0..6 {
        let (status, body) = visitor
            .send(Method::POST, &path, Some(json!({ "pin": "0000" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], FAILED);
    }

    visitor.send(Method::GET, &path, None).await;
    let (status, body) = visitor
        .send(Method::POST, &path, Some(json!({ "pin": pin.to_string() })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "foobar");
}

#[tokio::test]
async fn garbage_pins_and_bodies_fail_uniformly() {
    let app = app().await;
    let (id, pin) = create(&app, "foobar").await;
    let path = format!("/api/messages/{id}");

    let mut visitor = Client::anonymous(&app);
    visitor.send(Method::GET, &path, None).await;

    for body in [json!({ "pin": "abc" }), json!({ "pin": "" }), json!({ "nope": 1 })] {
        let (status, response) = visitor.send(Method::POST, &path, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["error"], FAILED);
    }

    // None of the above used up an attempt.
    for _ in 0..4 {
        visitor
            .send(Method::POST, &path, Some(json!({ "pin": "0000" })))
            .await;
    }
    let (status, body) = visitor
        .send(Method::POST, &path, Some(json!({ "pin": pin.to_string() })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "foobar");
}

#[tokio::test]
async fn empty_payload_is_rejected() {
    let app = app().await;
    let mut joe = Client::logged_in(&app, "joe").await;
    let (status, body) = joe
        .send(Method::POST, "/api/messages", Some(json!({ "payload": "" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "payload is empty");
}

#[tokio::test]
async fn creation_needs_csrf_header() {
    let app = app().await;
    let mut joe = Client::logged_in(&app, "joe").await;
    joe.cookies.remove("csrf_token");

    let (status, _) = joe
        .send(Method::POST, "/api/messages", Some(json!({ "payload": "foobar" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn listing_shows_own_messages_without_secrets() {
    let app = app().await;
    let (id, _) = create(&app, "foobar").await;

    let mut joe = Client::logged_in(&app, "joe").await;
    let (status, body) = joe.send(Method::GET, "/api/messages", None).await;
    assert_eq!(status, StatusCode::OK);

    let items = body.as_array().unwrap();
    // The seeded demo message plus the one created above.
    assert_eq!(items.len(), 2);
    assert!(items.iter().any(|m| m["id"] == id.as_str()));
    for item in items {
        assert_eq!(item["attempts_remaining"], 5);
        assert!(item.get("pin").is_none());
        assert!(item.get("ciphertext").is_none());
    }

    let mut alice = Client::logged_in(&app, "alice").await;
    let (_, body) = alice.send(Method::GET, "/api/messages", None).await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn stats_are_admin_only() {
    let app = app().await;

    let mut anonymous = Client::anonymous(&app);
    let (status, _) = anonymous.send(Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let mut joe = Client::logged_in(&app, "joe").await;
    let (status, _) = joe.send(Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut admin = Client::logged_in(&app, "admin").await;
    let (status, body) = admin.send(Method::GET, "/api/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["registered_accounts"], 3);
    assert_eq!(body["active_messages"], 1);
}

#[tokio::test]
async fn register_login_logout() {
    let app = app().await;
    let mut carol = Client::anonymous(&app);

    let (status, _) = carol
        .send(
            Method::POST,
            "/api/auth/register",
            Some(json!({ "username": "carol", "password": "password123", "password2": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, me) = carol.send(Method::GET, "/api/auth/me", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "carol");

    let (status, _) = carol.send(Method::POST, "/api/auth/logout", None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = carol.send(Method::GET, "/api/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = carol
        .send(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "username": "carol", "password": "password123", "failed_path": "/api/stats" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["redirect"], "/api/stats");
}

#[tokio::test]
async fn registration_rejects_taken_names_and_mismatched_passwords() {
    let app = app().await;
    let mut client = Client::anonymous(&app);

    let (status, body) = client
        .send(
            Method::POST,
            "/api/auth/register",
            Some(json!({ "username": "joe", "password": "password123", "password2": "password123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "username is not available");

    let (status, _) = client
        .send(
            Method::POST,
            "/api/auth/register",
            Some(json!({ "username": "dave", "password": "password123", "password2": "password124" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!client.cookies.contains_key("session_id"));
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = app().await;
    let mut client = Client::anonymous(&app);
    let (status, _) = client
        .send(
            Method::POST,
            "/api/auth/login",
            Some(json!({ "username": "joe", "password": "not-joe" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(!client.cookies.contains_key("session_id"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_correct_redeems_reveal_exactly_once() {
    let app = app().await;
    let (id, pin) = create(&app, "foobar").await;
    let path = format!("/api/messages/{id}");

    let mut visitor = Client::anonymous(&app);
    visitor.send(Method::GET, &path, None).await;

    let requests: Vec<_> = (0..12)
        .map(|_| visitor.build(Method::POST, &path, Some(json!({ "pin": pin.to_string() }))))
        .collect();
    let tasks = requests.into_iter().map(|request| {
        let app = app.clone();
        tokio::spawn(async move { app.oneshot(request).await.unwrap().status() })
    });
    let statuses: Vec<StatusCode> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::BAD_REQUEST).count(),
        11
    );
}
