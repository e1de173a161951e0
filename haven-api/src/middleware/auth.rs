use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
    http::StatusCode,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerRole {
    Traveler,
    Owner,
}

impl CallerRole {
    pub fn parse(role: &str) -> Option<Self> {
        match role {
            "TRAVELER" => Some(CallerRole::Traveler),
            "OWNER" => Some(CallerRole::Owner),
            _ => None,
        }
    }
}

/// The verified caller, injected into request extensions.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: CallerRole,
}

impl Identity {
    /// Capability check for role-restricted operations.
    pub fn require(&self, role: CallerRole) -> Result<(), AppError> {
        if self.role != role {
            return Err(AppError::AuthorizationError(format!(
                "{:?} callers may not perform this operation",
                self.role
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Authentication Middleware
// ============================================================================

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // 1. Extract token from Authorization header
    let auth_header = req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    // 2. Decode and validate JWT
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    ).map_err(|_| StatusCode::UNAUTHORIZED)?;

    // 3. Only traveler and owner callers exist
    let role = CallerRole::parse(&token_data.claims.role).ok_or(StatusCode::FORBIDDEN)?;

    // 4. Inject identity
    req.extensions_mut().insert(Identity {
        user_id: token_data.claims.sub,
        role,
    });

    Ok(next.run(req).await)
}
