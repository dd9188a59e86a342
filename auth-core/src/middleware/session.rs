//! Session middleware and extractor for route handlers.
//!
//! Resolves the cookie session once per request (including the silent
//! refresh), stores the claims in request extensions, and applies any
//! cookie changes to the response.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::models::SessionClaims;
use crate::AuthState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Middleware to require an authenticated session.
///
/// Verification failure degrades to 401, never a 5xx: a bad cookie is an
/// unauthenticated request, not a server error. The returned jar carries
/// refreshed or removed cookies onto the response.
pub async fn require_session(
    State(state): State<AuthState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let (jar, claims) = state.sessions.get_session(jar);

    let claims = match claims {
        Some(claims) => claims,
        None => {
            // The jar still rides along so a destroyed bad cookie reaches
            // the client.
            return (
                StatusCode::UNAUTHORIZED,
                jar,
                Json(ErrorResponse {
                    error: "Authentication required".to_string(),
                }),
            )
                .into_response();
        }
    };

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    (jar, next.run(req).await).into_response()
}

/// Extractor to easily get session claims in handlers
pub struct CurrentUser(pub SessionClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<SessionClaims>().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Session claims missing from request extensions".to_string(),
            }),
        ))?;

        Ok(CurrentUser(claims.clone()))
    }
}
