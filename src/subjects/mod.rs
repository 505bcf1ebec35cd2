pub mod handlers;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

pub use repo::{PgSubjectStore, SubjectStore};

pub fn router() -> Router<AppState> {
    handlers::subject_routes()
}
