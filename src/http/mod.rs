use axum::Router;

use crate::AppState;

mod auth;
mod error;
mod handlers;
mod routes;

pub use auth::{Actor, AdminToken};
pub use error::AppError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::health())
        .nest(
            "/v1",
            Router::new()
                .merge(routes::reports())
                .merge(routes::comments())
                .merge(routes::notifications())
                .merge(routes::gamification())
                .merge(routes::admin()),
        )
        .with_state(state)
}
