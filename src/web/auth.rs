use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, error};

use super::AppState;
use crate::models::User;

/// Email of the caller as asserted by the fronting auth proxy
#[derive(Debug, Clone)]
pub struct AuthenticatedEmail(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedEmail {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let email = parts
            .headers
            .get(state.config.user_header.as_str())
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty());

        match email {
            Some(email) => Ok(AuthenticatedEmail(email)),
            None => {
                debug!("Request without {} header", state.config.user_header);
                Err((StatusCode::UNAUTHORIZED, "Sign in to continue").into_response())
            }
        }
    }
}

/// The registered user making the request; unregistered callers are sent to sign up
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthenticatedEmail(email) = AuthenticatedEmail::from_request_parts(parts, state).await?;

        let storage = state.storage.lock().await;
        match storage.get_user_by_email(&email) {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => Err(Redirect::to("/bowl-pool/register").into_response()),
            Err(e) => {
                error!("Failed to look up user {}: {}", email, e);
                Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}
