use axum::Router;

pub mod orders;
pub mod reports;
pub mod system;

/// Router for all endpoints that need a resolved caller.
pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/reports", reports::router())
}
