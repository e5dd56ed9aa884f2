//! HTTP surface. Every route lives under `/api`; all but health, signup and
//! login require a bearer token.

pub mod auth;
pub mod entry;
pub mod timetable;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::database::accounts;
use crate::error::AppError;
use crate::state::AppState;

/// The account a request acts on behalf of.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: i64,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;

        let conn = state.db.lock().await;
        let id = accounts::user_for_token(&conn, token)?;
        Ok(AuthUser { id })
    }
}

/// `Json` body extractor whose rejections render as `AppError` bodies.
pub struct AppJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for AppJson<T>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let api = Router::new()
        .route("/health", get(auth::health))
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/entries", get(entry::list_entries).post(entry::create_entry))
        .route("/entries/search", get(entry::search_entries))
        .route("/entries/bulk", post(entry::bulk_create_entries))
        .route(
            "/entries/:id",
            get(entry::get_entry)
                .put(entry::update_entry)
                .delete(entry::delete_entry),
        )
        .route("/entries/:id/reminder", post(entry::set_reminder))
        .route("/entries/:id/generate", post(entry::generate_entries))
        .route(
            "/timetables",
            get(timetable::list_timetables)
                .post(timetable::create_timetable)
                .delete(timetable::delete_all_timetables),
        )
        .route(
            "/timetables/:id",
            axum::routing::put(timetable::rename_timetable).delete(timetable::delete_timetable),
        );

    Router::new().nest("/api", api).with_state(state).layer(cors)
}

#[cfg(test)]
pub(crate) mod test_client {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::database::test_support;
    use crate::models::Settings;
    use crate::state::AppState;

    pub fn app() -> Router {
        let state = AppState::new(test_support::memory(), Settings::default()).unwrap();
        super::build_router(state)
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Signs up `username` and returns its token.
    pub async fn token_for(app: &Router, username: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/signup",
            None,
            Some(serde_json::json!({ "username": username, "password": "hunter2" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    /// Creates a timetable and returns its id.
    pub async fn timetable_for(app: &Router, token: &str, name: &str) -> i64 {
        let (status, body) = send(
            app,
            "POST",
            "/api/timetables",
            Some(token),
            Some(serde_json::json!({ "name": name })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        body["id"].as_i64().unwrap()
    }
}
