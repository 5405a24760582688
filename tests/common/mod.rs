#![allow(dead_code)]

//! In-process mArchive backend for integration tests.
//!
//! Sessions use two cookies like the real server: a short-lived
//! `access_token` checked on every protected route and a `refresh_token`
//! exchanged at `/api/auth/refresh`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use marchive_client::{ClientConfig, MarchiveClient, RetryPolicy};
use serde::Deserialize;
use serde_json::json;

const ACCESS: &str = "access_token";
const REFRESH: &str = "refresh_token";

struct Account {
    id: &'static str,
    username: &'static str,
    password: &'static str,
    role: &'static str,
}

const ACCOUNTS: &[Account] = &[
    Account {
        id: "1",
        username: "alice",
        password: "Secret123",
        role: "admin",
    },
    Account {
        id: "2",
        username: "reader",
        password: "Secret123",
        role: "user",
    },
];

#[derive(Default)]
struct Sessions {
    /// access token -> username
    access: HashMap<String, &'static str>,
    /// refresh token -> username
    refresh: HashMap<String, &'static str>,
    next: u64,
}

impl Sessions {
    fn issue(&mut self, username: &'static str) -> (String, String) {
        self.next += 1;
        let access = format!("acc-{}-{username}", self.next);
        let refresh = format!("ref-{}-{username}", self.next);
        self.access.insert(access.clone(), username);
        self.refresh.insert(refresh.clone(), username);
        (access, refresh)
    }
}

pub struct Backend {
    sessions: Mutex<Sessions>,
    refresh_delay: Mutex<Duration>,
    pub refresh_calls: AtomicUsize,
    pub me_calls: AtomicUsize,
}

impl Backend {
    /// Forget every access token, as if they all expired.
    pub fn expire_access_tokens(&self) {
        self.sessions.lock().unwrap().access.clear();
    }

    /// Forget every refresh token too.
    pub fn revoke_all_sessions(&self) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.access.clear();
        sessions.refresh.clear();
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn user_for(&self, jar: &CookieJar) -> Option<&'static Account> {
        let token = jar.get(ACCESS)?.value().to_string();
        let username = *self.sessions.lock().unwrap().access.get(&token)?;
        ACCOUNTS.iter().find(|a| a.username == username)
    }
}

pub struct TestServer {
    pub backend: Arc<Backend>,
    pub base_url: url::Url,
}

/// Route client logs to the test output; `RUST_LOG=marchive_client=debug`
/// shows every request and refresh.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl TestServer {
    pub async fn start() -> Self {
        init_tracing();
        let backend = Arc::new(Backend {
            sessions: Mutex::new(Sessions::default()),
            refresh_delay: Mutex::new(Duration::from_millis(50)),
            refresh_calls: AtomicUsize::new(0),
            me_calls: AtomicUsize::new(0),
        });

        let api = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .route("/auth/me", get(me))
            .route("/auth/logout", post(logout))
            .route("/books/search", post(search))
            .route("/books/downloads", get(downloads))
            .route("/admin/stats", get(stats))
            .with_state(backend.clone());
        let app = Router::new().nest("/api", api);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            backend,
            base_url: format!("http://{addr}").parse().unwrap(),
        }
    }

    pub fn client(&self) -> MarchiveClient {
        let config = ClientConfig::new(self.base_url.clone())
            .with_timeout(Duration::from_secs(5))
            .with_identity_retry(RetryPolicy::none());
        MarchiveClient::new(config).unwrap()
    }
}

// ── Handlers ───────────────────────────────────────────────────────

type Shared = State<Arc<Backend>>;

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn unauthorized() -> Response {
    error(StatusCode::UNAUTHORIZED, "invalid credentials")
}

fn session_cookies(jar: CookieJar, access: String, refresh: String) -> CookieJar {
    jar.add(Cookie::build((ACCESS, access)).path("/").http_only(true))
        .add(Cookie::build((REFRESH, refresh)).path("/").http_only(true))
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(State(backend): Shared, jar: CookieJar, Json(body): Json<LoginBody>) -> Response {
    let Some(account) = ACCOUNTS
        .iter()
        .find(|a| a.username == body.username && a.password == body.password)
    else {
        return unauthorized();
    };
    let (access, refresh) = backend.sessions.lock().unwrap().issue(account.username);
    (
        session_cookies(jar, access, refresh),
        Json(json!({ "message": "Login successful" })),
    )
        .into_response()
}

async fn refresh(State(backend): Shared, jar: CookieJar) -> Response {
    backend.refresh_calls.fetch_add(1, Ordering::SeqCst);
    let delay = *backend.refresh_delay.lock().unwrap();
    tokio::time::sleep(delay).await;

    let Some(token) = jar.get(REFRESH).map(|c| c.value().to_string()) else {
        return error(StatusCode::UNAUTHORIZED, "refresh token required");
    };
    let issued = {
        let mut sessions = backend.sessions.lock().unwrap();
        match sessions.refresh.remove(&token) {
            Some(username) => Some(sessions.issue(username)),
            None => None,
        }
    };
    match issued {
        Some((access, refresh)) => (
            session_cookies(jar, access, refresh),
            Json(json!({ "message": "Token refreshed" })),
        )
            .into_response(),
        None => error(StatusCode::UNAUTHORIZED, "invalid refresh token"),
    }
}

async fn me(State(backend): Shared, jar: CookieJar) -> Response {
    backend.me_calls.fetch_add(1, Ordering::SeqCst);
    match backend.user_for(&jar) {
        Some(account) => Json(json!({
            "id": account.id,
            "username": account.username,
            "role": account.role,
            "created_at": "1700000000",
            "request_credits": 3,
            "invite_tokens": 1,
        }))
        .into_response(),
        None => unauthorized(),
    }
}

async fn logout(State(backend): Shared, jar: CookieJar) -> Response {
    {
        let mut sessions = backend.sessions.lock().unwrap();
        if let Some(token) = jar.get(ACCESS) {
            sessions.access.remove(token.value());
        }
        if let Some(token) = jar.get(REFRESH) {
            sessions.refresh.remove(token.value());
        }
    }
    let jar = jar
        .remove(Cookie::build(ACCESS).path("/"))
        .remove(Cookie::build(REFRESH).path("/"));
    (jar, Json(json!({ "message": "Logged out" }))).into_response()
}

#[derive(Deserialize)]
struct SearchBody {
    query: String,
    limit: u32,
    offset: u32,
    #[serde(default)]
    search_type: String,
}

async fn search(State(backend): Shared, jar: CookieJar, Json(body): Json<SearchBody>) -> Response {
    if backend.user_for(&jar).is_none() {
        return unauthorized();
    }
    if body.query.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "query is required");
    }
    // The one catalogue entry is already downloaded.
    if body.search_type == "missing" {
        return Json(json!({
            "books": [],
            "total": 0,
            "query": body.query,
            "pagination": { "limit": body.limit, "offset": body.offset, "total": 0, "has_next": false }
        }))
        .into_response();
    }
    Json(json!({
        "books": [{
            "hash": "d41d8cd98f00b204e9800998ecf8427e",
            "title": format!("{} (first edition)", body.query),
            "authors": "Frank Herbert",
            "publisher": "Ace",
            "language": "en",
            "format": "epub",
            "size": "1.2 MB",
            "cover_url": "",
            "cover_data": ""
        }],
        "total": 1,
        "query": body.query,
        "pagination": { "limit": body.limit, "offset": body.offset, "total": 1, "has_next": false }
    }))
    .into_response()
}

async fn downloads(State(backend): Shared, jar: CookieJar) -> Response {
    if backend.user_for(&jar).is_none() {
        return unauthorized();
    }
    Json(json!({
        "jobs": [],
        "pagination": { "limit": 20, "offset": 0, "total": 0, "has_next": false }
    }))
    .into_response()
}

async fn stats(State(backend): Shared, jar: CookieJar) -> Response {
    match backend.user_for(&jar) {
        None => unauthorized(),
        Some(account) if account.role != "admin" => {
            error(StatusCode::FORBIDDEN, "admin access required")
        }
        Some(_) => Json(json!({
            "total_users": 2,
            "total_books": 1,
            "total_downloads": 0,
            "active_users_24h": 1,
            "recent_downloads": [],
            "top_books": []
        }))
        .into_response(),
    }
}
