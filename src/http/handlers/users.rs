use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Uri};

use crate::errors::GatewayError;
use crate::http::AppState;
use crate::sessions::SessionState;
use crate::users::{UserProfile, UsersError};

const OWN_USER_SEGMENT: &str = "me";

/// `GET /v1/users/{id}`: a profile by numeric id, or the caller's own for
/// `me`. Either way the caller must be signed in.
pub async fn profile(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<UserProfile>, GatewayError> {
    let (_, session) = state
        .sessions
        .load_state::<SessionState>(&headers, &uri)
        .await?;

    if segment == OWN_USER_SEGMENT {
        return Ok(Json(session.user));
    }

    let id: i64 = segment.parse().map_err(|_| {
        GatewayError::BadRequest(format!(
            "User ID must be a number or {OWN_USER_SEGMENT}, got {segment}"
        ))
    })?;

    match state.users.get_by_id(id).await {
        Ok(record) => Ok(Json(record.profile())),
        Err(UsersError::UnknownId { id }) => {
            Err(GatewayError::NotFound(format!("no user with id {id}")))
        }
        Err(e) => Err(GatewayError::Internal(format!("account lookup: {e}"))),
    }
}
