use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use super::AppJson;
use crate::database::accounts;
use crate::error::{AppError, AppResult};
use crate::models::{Credentials, TokenResponse};
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthInfo {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthInfo> {
    Json(HealthInfo {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

fn required(credentials: Credentials) -> AppResult<(String, String)> {
    match (credentials.username, credentials.password) {
        (Some(u), Some(p)) if !u.trim().is_empty() && !p.is_empty() => Ok((u, p)),
        _ => Err(AppError::validation("username and password are required")),
    }
}

pub async fn signup(
    State(state): State<AppState>,
    AppJson(credentials): AppJson<Credentials>,
) -> AppResult<(StatusCode, Json<TokenResponse>)> {
    let (username, password) = required(credentials)?;
    let conn = state.db.lock().await;
    let user = accounts::create_user(&conn, &username, &password)?;
    let token = accounts::create_session(&conn, user.id, state.settings.auth.token_ttl_secs)?;
    log::info!("Created account '{}'", user.username);
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(credentials): AppJson<Credentials>,
) -> AppResult<Json<TokenResponse>> {
    let (username, password) = required(credentials)?;
    let conn = state.db.lock().await;
    let user = accounts::verify_credentials(&conn, &username, &password)?;
    let token = accounts::create_session(&conn, user.id, state.settings.auth.token_ttl_secs)?;
    Ok(Json(TokenResponse { token }))
}

#[cfg(test)]
mod tests {
    use super::super::test_client::{app, send, token_for};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn health_needs_no_token() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn login_after_signup_and_rejects_bad_password() {
        let app = app();
        token_for(&app, "grace").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": "grace", "password": "hunter2" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

        let (status, body) = send(
            &app,
            "POST",
            "/api/login",
            None,
            Some(json!({ "username": "grace", "password": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn duplicate_signup_conflicts() {
        let app = app();
        token_for(&app, "linus").await;
        let (status, _) = send(
            &app,
            "POST",
            "/api/signup",
            None,
            Some(json!({ "username": "linus", "password": "other" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let app = app();
        let (status, _) = send(&app, "GET", "/api/timetables", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/api/timetables", Some("forged"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
