use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use tracing::{error, instrument};

use super::repo_types::Subject;
use crate::{
    error::{ApiResponse, AppError},
    state::AppState,
};

pub fn subject_routes() -> Router<AppState> {
    Router::new().route("/subjects", get(list_subjects))
}

#[instrument(skip(state))]
pub async fn list_subjects(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<Subject>>>, AppError> {
    let subjects = state.subjects.list_active().await.map_err(|e| {
        error!(error = %e, "list subjects failed");
        AppError::internal("Failed to load subjects")
    })?;
    Ok(Json(ApiResponse::new(
        StatusCode::OK,
        subjects,
        "Subjects fetched successfully",
    )))
}
