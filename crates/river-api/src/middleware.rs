use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub username: String,
    pub exp: usize,
}

/// Resolved caller identity. `ANONYMOUS` carries user id 0, which matches
/// no user row and therefore no permissions.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub user_id: i64,
    pub username: String,
}

impl Viewer {
    pub const ANONYMOUS_ID: i64 = 0;

    pub fn anonymous() -> Self {
        Self {
            user_id: Self::ANONYMOUS_ID,
            username: String::new(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id == Self::ANONYMOUS_ID
    }
}

/// Attaches a [`Viewer`] to every request: the JWT subject when a valid
/// Bearer token is presented, the anonymous viewer otherwise.
pub async fn attach_viewer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let viewer = bearer_token(&req)
        .and_then(|token| {
            decode::<Claims>(
                token,
                &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
                &Validation::default(),
            )
            .ok()
        })
        .map(|data| Viewer {
            user_id: data.claims.sub,
            username: data.claims.username,
        })
        .unwrap_or_else(Viewer::anonymous);

    req.extensions_mut().insert(viewer);
    next.run(req).await
}

/// Rejects anonymous callers; used on every mutating route.
pub async fn require_auth(req: Request, next: Next) -> Result<Response, StatusCode> {
    match req.extensions().get::<Viewer>() {
        Some(viewer) if !viewer.is_anonymous() => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
