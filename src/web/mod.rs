pub mod auth;
pub mod handlers;
pub mod pages;

use askama::Template;
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::error;

use crate::config::Config;
use crate::error::Error;
use crate::storage::Storage;

pub struct HtmlTemplate<T>(pub T);

impl<T> IntoResponse for HtmlTemplate<T>
where
    T: Template,
{
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

/// Library errors surfaced by a handler
#[derive(Debug)]
pub struct AppError(pub Error);

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Validation(_) | Error::Constraint(_) => StatusCode::BAD_REQUEST,
            _ => {
                error!("Request failed: {}", self.0);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.0.to_string()).into_response()
    }
}

// Shared state: one connection, handlers take turns
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Mutex<Storage>>,
    pub config: Arc<Config>,
    clock: fn() -> DateTime<Utc>,
}

impl AppState {
    pub fn new(storage: Storage, config: Config) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            config: Arc::new(config),
            clock: Utc::now,
        }
    }

    /// Replace the wall clock, used to pin "now" in tests
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // This will serve files from the "static" directory at the "/static" URL path
        .nest_service("/static", ServeDir::new("static"))
        .route("/", get(|| async { Redirect::permanent("/bowl-pool/") }))
        .route("/bowl-pool/", get(handlers::year_index))
        .route(
            "/bowl-pool/register",
            get(handlers::register_form).post(handlers::register_submit),
        )
        .route("/bowl-pool/:bowl_year/my-picks", get(handlers::my_picks))
        .route(
            "/bowl-pool/:bowl_year/my-picks/submit",
            post(handlers::submit_my_picks),
        )
        .route("/bowl-pool/:bowl_year/all-picks", get(handlers::all_picks))
        .route("/bowl-pool/:bowl_year/picks.json", get(handlers::picks_json))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_HEADER;
    use crate::storage::test_support::{kickoff, seed, Seeded};
    use axum::body::Body;
    use axum::http::{header, Request};
    use chrono::TimeZone;
    use tower::ServiceExt;

    fn before_kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 12, 1, 12, 0, 0).unwrap()
    }

    fn after_kickoff() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
    }

    fn app(clock: fn() -> DateTime<Utc>) -> (AppState, Seeded) {
        let storage = Storage::open_in_memory().unwrap();
        let seeded = seed(&storage);
        let state = AppState::new(storage, Config::default()).with_clock(clock);
        (state, seeded)
    }

    fn get_as(uri: &str, email: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(email) = email {
            builder = builder.header(DEFAULT_USER_HEADER, email);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, email: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(DEFAULT_USER_HEADER, email)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_year_index_lists_years() {
        let (state, _) = app(before_kickoff);
        let response = router(state)
            .oneshot(get_as("/bowl-pool/", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("/bowl-pool/2023/my-picks"));
    }

    #[tokio::test]
    async fn test_my_picks_requires_identity() {
        let (state, _) = app(before_kickoff);
        let response = router(state.clone())
            .oneshot(get_as("/bowl-pool/2023/my-picks", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router(state)
            .oneshot(get_as("/bowl-pool/2023/my-picks", Some("stranger@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/bowl-pool/register");
    }

    #[tokio::test]
    async fn test_register_then_view_picks() {
        let (state, _) = app(before_kickoff);
        let response = router(state.clone())
            .oneshot(post_form(
                "/bowl-pool/register",
                "Carol@Example.com",
                "first_name=Carol&last_name=Nguyen".to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let response = router(state)
            .oneshot(get_as("/bowl-pool/2023/my-picks", Some("carol@example.com")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Carol Nguyen"));
        assert!(html.contains("Rose Bowl: Oregon vs Texas (CFP Semifinal)"));
    }

    #[tokio::test]
    async fn test_submit_picks_saves_and_reports() {
        let (state, s) = app(before_kickoff);
        let body = format!(
            "{rose}-winner={oregon}&{rose}-margin=7&{orange}-winner=&{orange}-margin=",
            rose = s.rose,
            oregon = s.oregon,
            orange = s.orange
        );
        let response = router(state.clone())
            .oneshot(post_form("/bowl-pool/2023/my-picks/submit", "alice@example.com", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Saved 1 pick"));
        assert!(html.contains("not picked"));

        let storage = state.storage.lock().await;
        let pick = storage.get_pick(s.alice.id, s.rose).unwrap().unwrap();
        assert_eq!(pick.winner_and_margin(), "Oregon by 7");
    }

    #[tokio::test]
    async fn test_all_picks_hidden_until_reveal() {
        let (state, s) = app(before_kickoff);
        state
            .storage
            .lock()
            .await
            .upsert_pick(s.bob.id, s.rose, s.texas, 3)
            .unwrap();

        let response = router(state.clone())
            .oneshot(get_as("/bowl-pool/2023/all-picks", None))
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains("Picks are hidden until"));
        assert!(!html.contains("Texas by 3"));

        let response = router(state)
            .oneshot(get_as("/bowl-pool/2023/picks.json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_all_picks_after_reveal() {
        let (state, s) = app(after_kickoff);
        {
            let storage = state.storage.lock().await;
            storage.upsert_pick(s.bob.id, s.rose, s.texas, 3).unwrap();
            storage.upsert_pick(s.alice.id, s.rose, s.texas, 10).unwrap();
            storage.set_final_score(s.rose, Some(17), Some(20)).unwrap();
        }

        let response = router(state.clone())
            .oneshot(get_as("/bowl-pool/2023/all-picks", None))
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains("Texas by 3"));
        assert!(html.contains("Standings"));

        let response = router(state)
            .oneshot(get_as("/bowl-pool/2023/picks.json", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        let rose = json["matchups"]
            .as_array()
            .unwrap()
            .iter()
            .find(|m| m["id"] == s.rose)
            .unwrap();
        assert_eq!(rose["winners"], serde_json::json!(["bob@example.com"]));
    }

    #[test]
    fn test_reveal_defaults_to_first_kickoff() {
        let storage = Storage::open_in_memory().unwrap();
        seed(&storage);
        let matchups = storage.matchups_for_year(2023).unwrap();

        assert_eq!(
            handlers::reveal_time(None, &matchups),
            Some(kickoff(12, 30))
        );
        assert!(!handlers::picks_revealed(None, &matchups, kickoff(12, 29)));
        assert!(handlers::picks_revealed(None, &matchups, kickoff(12, 30)));
        assert!(handlers::picks_revealed(
            Some(kickoff(12, 1)),
            &matchups,
            kickoff(12, 2)
        ));
        assert!(handlers::picks_revealed(None, &[], kickoff(12, 1)));
    }
}
