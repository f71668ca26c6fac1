pub mod jwt;
pub mod password;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    enums::Role,
    error::{AppError, AppResult},
    policy::{self, Action, Decision, DocumentVisibility, TicketVisibility},
    state::AppState,
};

/// The request-scoped identity every protected handler receives. Policy
/// decisions are taken against this value, never against ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Rejects with 403 when the role may not perform `action`.
    pub fn authorize(&self, action: Action) -> AppResult<()> {
        match policy::authorize(self.role, action) {
            Decision::Allow => Ok(()),
            Decision::Deny => {
                tracing::warn!(
                    user_id = %self.user_id,
                    role = %self.role,
                    ?action,
                    "request denied by role"
                );
                Err(AppError::forbidden(action.denial_message()))
            }
        }
    }

    pub fn document_visibility(&self) -> DocumentVisibility {
        policy::document_visibility(self.role, self.user_id)
    }

    pub fn ticket_visibility(&self, requested_creator: Option<Uuid>) -> TicketVisibility {
        policy::ticket_visibility(self.role, self.user_id, requested_creator)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            name: claims.name,
            email: claims.email,
            role: claims.role,
        })
    }
}
