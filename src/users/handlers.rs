use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{debug, error, instrument};

use super::{
    dto::RegistrationFields,
    repo::Projection,
    repo_types::User,
    services::{register_user, RegistrationIntake},
};
use crate::{
    auth::AuthUser,
    error::{ApiResponse, AppError},
    state::AppState,
    uploads::{
        staging::{CV_FIELD, PROFILE_IMAGE_FIELD},
        Stager,
    },
};

/// Two capped files plus the text fields.
const REGISTER_BODY_LIMIT: usize = 5 * 1024 * 1024;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/register",
            post(register).layer(DefaultBodyLimit::max(REGISTER_BODY_LIMIT)),
        )
        .route("/users/me", get(get_me))
}

/// POST /users/register (multipart)
#[instrument(skip(state, mp))]
pub async fn register(
    State(state): State<AppState>,
    mp: Multipart,
) -> Result<(StatusCode, HeaderMap, Json<ApiResponse<User>>), AppError> {
    let intake = read_intake(&state.stager, mp).await?;
    let registered = register_user(&state, intake).await?;

    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        auth_cookie("accessToken", &registered.access_token, state.tokens.access_ttl())?,
    );
    headers.append(
        SET_COOKIE,
        auth_cookie("refreshToken", &registered.refresh_token, state.tokens.refresh_ttl())?,
    );

    Ok((
        StatusCode::CREATED,
        headers,
        Json(ApiResponse::new(
            StatusCode::CREATED,
            registered.user,
            "User Registered successfully",
        )),
    ))
}

#[instrument(skip(state, claims), fields(user_id = %claims.sub))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<ApiResponse<User>>, AppError> {
    let user = state
        .users
        .find_by_id(claims.sub, Projection::Public)
        .await
        .map_err(|e| {
            error!(error = %e, "find_by_id failed");
            AppError::internal("Failed to load user")
        })?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;

    Ok(Json(ApiResponse::new(
        StatusCode::OK,
        user,
        "Current user fetched successfully",
    )))
}

/// Reads text fields and stages file fields. Files staged before a failure
/// are removed when the partial intake is dropped.
async fn read_intake(stager: &Stager, mut mp: Multipart) -> Result<RegistrationIntake, AppError> {
    let mut intake = RegistrationIntake::default();

    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| AppError::validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() {
            let staged = stager.stage(field).await?;
            if name == PROFILE_IMAGE_FIELD {
                intake.profile_image = Some(staged);
            } else if name == CV_FIELD {
                intake.cv = Some(staged);
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        if !intake.fields.set(&name, value) {
            debug!(field = %name, "ignoring unknown form field");
        }
    }

    Ok(intake)
}

fn auth_cookie(name: &str, token: &str, ttl: Duration) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "{name}={token}; Path=/; HttpOnly; Secure; SameSite=Strict; Max-Age={}",
        ttl.as_secs()
    ))
    .map_err(|e| {
        error!(error = %e, "invalid cookie value");
        AppError::internal("Failed to create user")
    })
}
