use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderName;
use uuid::Uuid;

use crate::domain::user::UserRole;
use crate::http::AppError;
use crate::AppState;

const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
const USER_ROLE_HEADER: HeaderName = HeaderName::from_static("x-user-role");
const ADMIN_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-admin-token");

/// Caller identity asserted by the gateway in front of the service.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Actor {
    pub fn require_privileged(&self) -> Result<(), AppError> {
        if self.role.is_privileged() {
            Ok(())
        } else {
            Err(AppError::forbidden("staff or admin role required"))
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role == UserRole::Admin {
            Ok(())
        } else {
            Err(AppError::forbidden("admin role required"))
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdminToken;

#[axum::async_trait]
impl FromRequestParts<AppState> for Actor {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("missing x-user-id header"))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|_| AppError::unauthorized("invalid x-user-id header"))?;

        let role = match parts.headers.get(USER_ROLE_HEADER) {
            Some(value) => value
                .to_str()
                .ok()
                .and_then(UserRole::from_db)
                .ok_or_else(|| AppError::unauthorized("invalid x-user-role header"))?,
            None => UserRole::Citizen,
        };

        Ok(Actor { user_id, role })
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .admin_token
            .as_ref()
            .ok_or_else(|| AppError::forbidden("admin token not configured"))?;

        let provided = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::forbidden("missing admin token"))?;

        if provided != expected {
            return Err(AppError::forbidden("invalid admin token"));
        }

        Ok(AdminToken)
    }
}
