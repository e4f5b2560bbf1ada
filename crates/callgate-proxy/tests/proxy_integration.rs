//! End-to-end proxy behavior against a mocked upstream.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use callgate_auth::{CredentialPair, TokenClaims, UpstreamBase};
use chrono::{TimeDelta, Utc};
use callgate_proxy::{
    InMemorySessionRegistry, ProxyConfig, ProxyServer, REFRESHED_ACCESS_TOKEN_HEADER,
    REFRESHED_REFRESH_TOKEN_HEADER, SESSION_EXPIRED_HEADER, SessionRecord, SessionRegistry,
};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_json, header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COOKIE: &str = "callgate_session";

fn jwt(sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&json!({
            "sub": sub,
            "name": "Ada",
            "email": "ada@example.com",
            "role": "BUSINESS_ADMIN",
            "exp": 2_000_000_000u64,
        }))
        .unwrap(),
    );
    format!("{}.{}.sig", header, payload)
}

struct Harness {
    mock: MockServer,
    registry: Arc<InMemorySessionRegistry>,
    router: Router,
}

impl Harness {
    async fn start() -> Self {
        Self::start_with(|c| c).await
    }

    async fn start_with(customize: impl FnOnce(ProxyConfig) -> ProxyConfig) -> Self {
        let mock = MockServer::start().await;
        let base = UpstreamBase::parse(&format!("{}/", mock.uri())).unwrap();
        let config = customize(ProxyConfig::new(base).with_request_logging(false));
        let registry = Arc::new(InMemorySessionRegistry::new());
        let router = ProxyServer::with_sessions(config, registry.clone())
            .unwrap()
            .router();
        Self {
            mock,
            registry,
            router,
        }
    }

    async fn session(&self, access: &str, refresh: &str) -> String {
        let claims = TokenClaims {
            sub: "u1".to_string(),
            name: None,
            email: None,
            role: None,
            exp: None,
        };
        self.registry
            .create(SessionRecord::new(
                CredentialPair::new(access, refresh),
                &claims,
                false,
            ))
            .await
    }

    async fn send(&self, request: Request<Body>) -> axum::response::Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

fn get_with_session(uri: &str, session_id: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, format!("{}={}", COOKIE, session_id))
        .body(Body::empty())
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn refresh_mock(status: u16, body: Value) -> Mock {
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
}

#[tokio::test]
async fn test_pass_through_filters_headers_without_refresh() {
    let h = Harness::start().await;
    let id = h.session("a1", "r1").await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header_eq("authorization", "Bearer a1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/json")
                .insert_header("etag", "\"v1\"")
                .insert_header("set-cookie", "upstream=secret")
                .insert_header("x-trace-id", "abc")
                .set_body_string(r#"{"items":[]}"#),
        )
        .expect(1)
        .mount(&h.mock)
        .await;
    refresh_mock(200, json!({"access_token": "unused"}))
        .expect(0)
        .mount(&h.mock)
        .await;

    let response = h.send(get_with_session("/api/bff/items", &id)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers.get("content-type").unwrap(), "application/json");
    assert_eq!(headers.get("etag").unwrap(), "\"v1\"");
    assert!(headers.get("set-cookie").is_none());
    assert!(headers.get("x-trace-id").is_none());
    assert!(headers.get(REFRESHED_ACCESS_TOKEN_HEADER).is_none());
    assert_eq!(body_text(response).await, r#"{"items":[]}"#);
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed_and_retried_once() {
    let h = Harness::start().await;
    let id = h.session("old", "r1").await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header_eq("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header_eq("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&h.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "new", "refresh_token": "r2"})),
        )
        .expect(1)
        .mount(&h.mock)
        .await;

    let response = h.send(get_with_session("/api/bff/items", &id)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get_all(REFRESHED_ACCESS_TOKEN_HEADER)
            .iter()
            .count(),
        1
    );
    assert_eq!(
        response.headers().get(REFRESHED_ACCESS_TOKEN_HEADER).unwrap(),
        "new"
    );
    assert!(response.headers().get(REFRESHED_REFRESH_TOKEN_HEADER).is_none());
    assert!(response.headers().get(SESSION_EXPIRED_HEADER).is_none());
    assert_eq!(body_text(response).await, "ok");

    let stored = h.registry.get(&id).await.unwrap();
    assert_eq!(stored.credentials.access_token, "new");
    assert_eq!(stored.credentials.refresh_token, "r2");
}

#[tokio::test]
async fn test_retry_that_still_fails_is_not_retried_again() {
    let h = Harness::start().await;
    let id = h.session("old", "r1").await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header_eq("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401).set_body_string("first"))
        .expect(1)
        .mount(&h.mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header_eq("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(401).set_body_string("second"))
        .expect(1)
        .mount(&h.mock)
        .await;
    refresh_mock(200, json!({"access_token": "new"}))
        .expect(1)
        .mount(&h.mock)
        .await;

    let response = h.send(get_with_session("/api/bff/items", &id)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(SESSION_EXPIRED_HEADER).is_none());
    assert_eq!(body_text(response).await, "second");
}

#[tokio::test]
async fn test_rejected_refresh_marks_session_dead() {
    let h = Harness::start().await;
    let id = h.session("old", "r1").await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header_eq("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(1)
        .mount(&h.mock)
        .await;
    refresh_mock(403, json!({"message": "revoked"}))
        .expect(1)
        .mount(&h.mock)
        .await;

    let response = h.send(get_with_session("/api/bff/items", &id)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get(SESSION_EXPIRED_HEADER).unwrap(), "true");
    let set_cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
    assert!(set_cookie.contains("Max-Age=0"));
    assert_eq!(body_text(response).await, "expired");
    assert!(h.registry.get(&id).await.is_none());
}

#[tokio::test]
async fn test_refresh_without_access_token_marks_session_dead() {
    let h = Harness::start().await;
    let id = h.session("old", "r1").await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.mock)
        .await;
    refresh_mock(200, json!({"refresh_token": "r2"}))
        .expect(1)
        .mount(&h.mock)
        .await;

    let response = h.send(get_with_session("/api/bff/items", &id)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers().get(SESSION_EXPIRED_HEADER).unwrap(), "true");
    assert!(response.headers().get(REFRESHED_ACCESS_TOKEN_HEADER).is_none());
}

#[tokio::test]
async fn test_stale_refresh_failure_keeps_rotated_session() {
    let h = Harness::start().await;
    let id = h.session("old", "r1").await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header_eq("authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(2)
        .mount(&h.mock)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header_eq("authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&h.mock)
        .await;
    // The backend rotates r1 once; reusing it afterwards is rejected.
    refresh_mock(200, json!({"access_token": "new", "refresh_token": "r2"}))
        .with_priority(1)
        .up_to_n_times(1)
        .expect(1)
        .mount(&h.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401).set_delay(Duration::from_millis(300)))
        .expect(1)
        .mount(&h.mock)
        .await;

    let (a, b) = tokio::join!(
        h.send(get_with_session("/api/bff/items", &id)),
        h.send(get_with_session("/api/bff/items", &id)),
    );
    let (ok, rejected) = if a.status() == StatusCode::OK {
        (a, b)
    } else {
        (b, a)
    };

    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(rejected.status(), StatusCode::UNAUTHORIZED);
    assert!(rejected.headers().get(SESSION_EXPIRED_HEADER).is_none());
    assert!(rejected.headers().get("set-cookie").is_none());

    let stored = h.registry.get(&id).await.unwrap();
    assert_eq!(stored.credentials.access_token, "new");
    assert_eq!(stored.credentials.refresh_token, "r2");
}

#[tokio::test]
async fn test_session_past_max_age_is_rejected() {
    let h = Harness::start().await;
    let claims = TokenClaims {
        sub: "u1".to_string(),
        name: None,
        email: None,
        role: None,
        exp: None,
    };
    let mut record = SessionRecord::new(CredentialPair::new("a1", "r1"), &claims, true);
    record.created_at = Utc::now() - TimeDelta::days(365);
    let id = h.registry.create(record).await;

    let response = h.send(get_with_session("/api/session", &id)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.registry.len().await, 0);
}

#[tokio::test]
async fn test_no_refresh_token_passes_401_through() {
    let h = Harness::start().await;
    let id = h.session("old", "").await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.mock)
        .await;
    refresh_mock(200, json!({"access_token": "new"}))
        .expect(0)
        .mount(&h.mock)
        .await;

    let response = h.send(get_with_session("/api/bff/items", &id)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(SESSION_EXPIRED_HEADER).is_none());
    assert!(h.registry.get(&id).await.is_some());
}

#[tokio::test]
async fn test_target_url_joins_segments_and_query() {
    let h = Harness::start().await;

    Mock::given(method("GET"))
        .and(path("/call-tracking/tracking-numbers"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.mock)
        .await;

    let response = h
        .send(
            Request::builder()
                .uri("/api/bff/call-tracking/tracking-numbers?page=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let received = h.mock.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].url.path(), "/call-tracking/tracking-numbers");
}

#[tokio::test]
async fn test_request_body_is_replayed_on_retry() {
    let h = Harness::start().await;
    let id = h.session("old", "r1").await;
    let payload = json!({"name": "Google Ads"});

    Mock::given(method("POST"))
        .and(path("/marketing-sources"))
        .and(header_eq("authorization", "Bearer old"))
        .and(body_json(payload.clone()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/marketing-sources"))
        .and(header_eq("authorization", "Bearer new"))
        .and(body_json(payload.clone()))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": 7})))
        .expect(1)
        .mount(&h.mock)
        .await;
    refresh_mock(200, json!({"access_token": "new"}))
        .expect(1)
        .mount(&h.mock)
        .await;

    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/bff/marketing-sources")
                .header(header::COOKIE, format!("{}={}", COOKIE, id))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let stored = h.registry.get(&id).await.unwrap();
    assert_eq!(stored.credentials.access_token, "new");
    assert_eq!(stored.credentials.refresh_token, "r1");
}

async fn slow_export() -> axum::response::Response {
    let chunks = futures::stream::unfold(0u8, |n| async move {
        if n == 5 {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        let chunk = axum::body::Bytes::from(format!("row{};", n));
        Some((Ok::<_, std::io::Error>(chunk), n + 1))
    });
    axum::response::Response::builder()
        .header("content-disposition", "attachment; filename=\"calls.csv\"")
        .body(Body::from_stream(chunks))
        .unwrap()
}

#[tokio::test]
async fn test_slow_download_outlasting_read_timeout_completes() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let upstream = Router::new().route("/exports/calls", axum::routing::get(slow_export));
    tokio::spawn(async move { axum::serve(listener, upstream).await });

    let base = UpstreamBase::parse(&format!("http://{}", addr)).unwrap();
    let mut config = ProxyConfig::new(base).with_request_logging(false);
    config.read_timeout = Duration::from_millis(250);
    let router = ProxyServer::new(config).unwrap().router();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/bff/exports/calls")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("content-disposition").is_some());
    assert_eq!(body_text(response).await, "row0;row1;row2;row3;row4;");
}

#[tokio::test]
async fn test_session_cookie_is_not_forwarded_upstream() {
    let h = Harness::start().await;
    let id = h.session("a1", "r1").await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&h.mock)
        .await;

    h.send(
        Request::builder()
            .uri("/api/bff/items")
            .header(header::COOKIE, format!("theme=dark; {}={}", COOKIE, id))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    let received = h.mock.received_requests().await.unwrap();
    let cookie = received[0].headers.get("cookie").unwrap().to_str().unwrap();
    assert_eq!(cookie, "theme=dark");
    assert_eq!(
        received[0].headers.get("authorization").unwrap(),
        "Bearer a1"
    );
}

#[tokio::test]
async fn test_unreachable_upstream_returns_502() {
    let config = ProxyConfig::new(UpstreamBase::parse("http://127.0.0.1:1").unwrap())
        .with_request_logging(false);
    let router = ProxyServer::new(config).unwrap().router();

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/bff/items")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["code"], "upstream_unavailable");
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let h = Harness::start_with(|c| c.with_max_body_bytes(8)).await;

    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/bff/items")
                .body(Body::from("x".repeat(64)))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(h.mock.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_login_creates_session_cookie() {
    let h = Harness::start().await;
    let access = jwt("user-1");

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({
            "email": "ada@example.com",
            "password": "pw",
            "rememberMe": true,
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": access, "refresh_token": "r1"})),
        )
        .expect(1)
        .mount(&h.mock)
        .await;

    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/session/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"email": "ada@example.com", "password": "pw", "rememberMe": "on"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get("set-cookie")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("callgate_session="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Max-Age="));

    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["user"]["id"], "user-1");
    assert_eq!(body["user"]["role"], "BUSINESS_ADMIN");
    assert_eq!(body["accessTokenExpires"], 2_000_000_000_000u64);
    assert!(body.get("accessToken").is_none());
    assert_eq!(h.registry.len().await, 1);

    let id = set_cookie
        .split(';')
        .next()
        .and_then(|kv| kv.split_once('='))
        .map(|(_, v)| v.to_string())
        .unwrap();
    let info = h.send(get_with_session("/api/session", &id)).await;
    assert_eq!(info.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_login_without_remember_me_is_browser_session() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": jwt("u"), "refresh_token": "r"})),
        )
        .mount(&h.mock)
        .await;

    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/session/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"email": "a@b.c", "password": "pw"}).to_string(),
                ))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
    assert!(!set_cookie.contains("Max-Age"));
}

#[tokio::test]
async fn test_login_rejected_upstream_is_401() {
    let h = Harness::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.mock)
        .await;

    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/session/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"email": "a@b.c", "password": "wrong"}).to_string(),
                ))
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.registry.len().await, 0);
}

#[tokio::test]
async fn test_logout_revokes_session() {
    let h = Harness::start().await;
    let id = h.session("a1", "r1").await;

    let response = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/api/session/logout")
                .header(header::COOKIE, format!("{}={}", COOKIE, id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(
        response
            .headers()
            .get("set-cookie")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("Max-Age=0")
    );
    assert!(h.registry.get(&id).await.is_none());

    let info = h.send(get_with_session("/api/session", &id)).await;
    assert_eq!(info.status(), StatusCode::UNAUTHORIZED);
}
