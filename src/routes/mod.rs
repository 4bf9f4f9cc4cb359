//! Router assembly: JSON API, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod http;

/// Build the application router with:
/// - JSON API under `/api/v1/...`
/// - Static SPA from `static_dir` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>, static_dir: &str) -> Router {
    let static_service = ServeDir::new(static_dir)
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    Router::new()
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/me", get(http::http_me))
        .route("/api/v1/map", get(http::http_map))
        .route("/api/v1/locations", get(http::http_locations))
        .route("/api/v1/locations/:slug", get(http::http_location))
        .route("/api/v1/levels/:slug", get(http::http_get_level))
        .route("/api/v1/levels/:slug/theory", post(http::http_post_theory))
        .route("/api/v1/levels/:slug/trial", post(http::http_post_trial))
        .route("/api/v1/levels/:slug/boss", post(http::http_post_boss))
        .route("/api/v1/register", post(http::http_register))
        .route("/api/v1/login", post(http::http_login))
        .route("/api/v1/logout", post(http::http_logout))
        .route("/api/v1/toss-coin", post(http::http_toss_coin))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::catalog::Catalog;
    use crate::db::Db;
    use crate::seeds::seed_catalog;
    use crate::session::SESSION_COOKIE_NAME;

    struct Client {
        app: Router,
        state: Arc<AppState>,
        cookie: Option<String>,
    }

    impl Client {
        fn new() -> Self {
            let catalog = Catalog::from_config(&seed_catalog()).expect("catalog");
            let db = Db::open_in_memory().expect("db");
            let state = Arc::new(AppState::with_parts(catalog, db, false));
            Self { app: build_router(state.clone(), "./static"), state, cookie: None }
        }

        async fn send(&mut self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let mut req = Request::builder().method(method).uri(uri);
            if let Some(c) = &self.cookie {
                req = req.header(header::COOKIE, format!("{SESSION_COOKIE_NAME}={c}"));
            }
            let body = match body {
                Some(v) => {
                    req = req.header(header::CONTENT_TYPE, "application/json");
                    Body::from(v.to_string())
                }
                None => Body::empty(),
            };
            let res = self.app.clone().oneshot(req.body(body).expect("request")).await.expect("response");
            if let Some(set) = res.headers().get(header::SET_COOKIE).and_then(|v| v.to_str().ok()) {
                let pair = set.split(';').next().unwrap_or_default();
                if let Some((_, value)) = pair.split_once('=') {
                    self.cookie = (!value.is_empty()).then(|| value.to_string());
                }
            }
            let status = res.status();
            let bytes = to_bytes(res.into_body(), usize::MAX).await.expect("body");
            let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json") };
            (status, json)
        }

        async fn get(&mut self, uri: &str) -> (StatusCode, Value) {
            self.send("GET", uri, None).await
        }

        async fn post(&mut self, uri: &str, body: Value) -> (StatusCode, Value) {
            self.send("POST", uri, Some(body)).await
        }

        /// Id of the correct answer at `step`, `None` on reading steps.
        fn correct_theory_answer(&self, slug: &str, step: u32) -> Option<i64> {
            let level = self.state.catalog.level_by_slug(slug).expect("level");
            let question = self.state.catalog.questions_for(level)[step as usize].id;
            self.state.catalog.answers_for(question).iter().find(|a| a.is_correct).map(|a| a.id)
        }

        async fn pass_theory(&mut self) -> Value {
            let mut last = Value::Null;
            for step in 0..3 {
                let answer = self.correct_theory_answer("first-words", step);
                let (status, body) =
                    self.post("/api/v1/levels/first-words/theory", json!({ "step": step, "answerId": answer })).await;
                assert_eq!(status, StatusCode::OK);
                last = body;
            }
            last
        }
    }

    #[tokio::test]
    async fn health_is_ok() {
        let mut c = Client::new();
        let (status, body) = c.get("/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn unknown_level_is_404() {
        let mut c = Client::new();
        let (status, body) = c.get("/api/v1/levels/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn guest_walks_theory_then_unlocks_trial() {
        let mut c = Client::new();

        let (_, body) = c.get("/api/v1/levels/say-it-yourself").await;
        assert_eq!(body["status"], "access_denied");
        assert_eq!(body["redirect"], "/api/v1/locations/greeting-grove");

        let (_, body) = c.get("/api/v1/levels/first-words").await;
        assert_eq!(body["status"], "question");
        assert_eq!(body["step"], 0);

        let done = c.pass_theory().await;
        assert_eq!(done["status"], "completed");
        assert_eq!(done["reward"], json!({ "exp": 50, "coins": 0 }));
        assert_eq!(done["repeat"], false);

        let (_, me) = c.get("/api/v1/me").await;
        assert_eq!(me["guest"], true);
        assert_eq!(me["wallet"], json!({ "exp": 50, "coins": 0 }));
        assert_eq!(me["rank"]["level"], 2);
        assert_eq!(me["levels_passed"], 1);

        let (_, map) = c.get("/api/v1/locations/greeting-grove").await;
        let levels = map["levels"].as_array().expect("levels");
        assert_eq!(levels[0]["passed"], true);
        assert_eq!(levels[1]["accessible"], true);
        assert_eq!(levels[2]["accessible"], false);

        let (_, body) = c.get("/api/v1/levels/say-it-yourself").await;
        assert_eq!(body["status"], "question");
        assert!(body["question"]["answers"].as_array().expect("answers").is_empty());
    }

    #[tokio::test]
    async fn replaying_a_level_pays_half_exp() {
        let mut c = Client::new();
        c.pass_theory().await;
        let again = c.pass_theory().await;
        assert_eq!(again["repeat"], true);
        assert_eq!(again["reward"], json!({ "exp": 25, "coins": 0 }));
        assert_eq!(again["wallet"]["exp"], 75);
    }

    #[tokio::test]
    async fn broke_guest_cannot_toss_a_coin() {
        let mut c = Client::new();
        let (status, body) = c.post("/api/v1/toss-coin", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "insufficient_funds");
        assert_eq!(body["coins"], 0);
    }

    #[tokio::test]
    async fn register_merges_guest_progress_into_the_account() {
        let mut c = Client::new();
        c.pass_theory().await;

        let form = json!({
            "name": "Mira",
            "email": "mira@example.com",
            "password": "password123",
            "password_confirm": "password123",
        });
        let (status, body) = c.post("/api/v1/register", form.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["exp"], 50);
        assert_eq!(body["merged"]["levels_passed"], 1);

        let (_, me) = c.get("/api/v1/me").await;
        assert_eq!(me["guest"], false);
        assert_eq!(me["name"], "Mira");
        assert_eq!(me["levels_passed"], 1);

        // Progress now comes from the account: the trial stays open.
        let (_, body) = c.get("/api/v1/levels/say-it-yourself").await;
        assert_eq!(body["status"], "question");

        let (status, body) = c.post("/api/v1/register", form).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["fields"]["email"].is_array());
    }

    #[tokio::test]
    async fn logout_then_login_keeps_account_progress() {
        let mut c = Client::new();
        let user = c.state.db.create_user("Lev", "lev@example.com", "password123").expect("user");

        let (status, _) = c.post("/api/v1/login", json!({ "email": "lev@example.com", "password": "bad" })).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) =
            c.post("/api/v1/login", json!({ "email": "lev@example.com", "password": "password123" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["id"], user.id);

        c.pass_theory().await;
        let (_, body) = c.post("/api/v1/logout", json!({})).await;
        assert_eq!(body["ok"], true);

        let (_, me) = c.get("/api/v1/me").await;
        assert_eq!(me["guest"], true);
        assert_eq!(me["wallet"]["exp"], 0);

        c.post("/api/v1/login", json!({ "email": "lev@example.com", "password": "password123" })).await;
        let (_, me) = c.get("/api/v1/me").await;
        assert_eq!(me["wallet"]["exp"], 50);
    }

    #[tokio::test]
    async fn map_opens_on_the_first_location() {
        let mut c = Client::new();
        let (status, map) = c.get("/api/v1/map").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(map["slug"], "greeting-grove");
        let levels = map["levels"].as_array().expect("levels");
        assert_eq!(levels[0]["accessible"], true);
        assert_eq!(levels[1]["accessible"], false);
    }

    #[tokio::test]
    async fn browsing_without_progress_stores_nothing() {
        let mut c = Client::new();
        for _ in 0..50 {
            let (status, _) = c.get("/api/v1/me").await;
            assert_eq!(status, StatusCode::OK);
            assert!(c.cookie.is_none());
        }
        c.get("/api/v1/map").await;
        assert_eq!(c.state.sessions.len().await, 0);

        c.pass_theory().await;
        assert!(c.cookie.is_some());
        assert_eq!(c.state.sessions.len().await, 1);

        c.post("/api/v1/logout", json!({})).await;
        assert!(c.cookie.is_none());
        assert_eq!(c.state.sessions.len().await, 0);
    }

    #[tokio::test]
    async fn login_issues_a_new_session_id() {
        let mut c = Client::new();
        c.state.db.create_user("Ada", "ada@example.com", "password123").expect("user");
        c.pass_theory().await;
        let before = c.cookie.clone().expect("guest cookie");

        let (status, body) =
            c.post("/api/v1/login", json!({ "email": "ada@example.com", "password": "password123" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["merged"]["levels_passed"], 1);
        let after = c.cookie.clone().expect("account cookie");
        assert_ne!(before, after);
        assert!(c.state.sessions.load(&before).await.is_none());

        let (_, me) = c.get("/api/v1/me").await;
        assert_eq!(me["guest"], false);
    }

    #[tokio::test]
    async fn boss_requires_a_word() {
        let mut c = Client::new();
        let (status, body) = c.post("/api/v1/levels/the-silent-troll/boss", json!({ "word": "  " })).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["fields"]["word"].is_array());
    }
}
