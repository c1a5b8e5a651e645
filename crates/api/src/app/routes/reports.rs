use std::sync::Arc;

use axum::{Json, Router, extract::Extension, http::StatusCode, response::IntoResponse, routing::get};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/disbursements", get(disbursements))
}

/// Amounts paid out per disbursement account, across all orders.
pub async fn disbursements(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.orders.totals_by_account(&caller.principal()) {
        Ok(totals) => (StatusCode::OK, Json(totals)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
