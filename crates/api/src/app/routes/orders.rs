use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use serde::de::DeserializeOwned;

use procura_infra::{NewOrder, command_dispatcher::DispatchError};
use procura_purchasing::{ItemId, OrderId, OrderView, QuoteId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/items/:item_id/select", post(select_winning_quote))
        .route("/:id/eligible-accounts", put(set_eligible_accounts))
        .route("/:id/approve", post(final_approve))
        .route("/:id/reject", post(reject))
        .route("/:id/payments", post(record_paid_amount))
        .route("/:id/mark-paid", post(mark_paid))
        .route("/:id/deliver", post(confirm_delivery))
        .route("/:id/quotes/:quote_id/invoice", put(attach_invoice))
}

fn parse_order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid order id"))
}

fn respond(status: StatusCode, result: Result<OrderView, DispatchError>) -> axum::response::Response {
    match result {
        Ok(view) => (status, Json(dto::OrderResponse::from(view))).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// Unpacks the path id and the JSON body, or returns the error response.
macro_rules! require {
    ($e:expr) => {
        match $e {
            Ok(v) => v,
            Err(resp) => return resp,
        }
    };
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, axum::response::Response> {
    payload
        .map(|Json(v)| v)
        .map_err(errors::body_rejection_to_response)
}

/// Bodies of the field-less transitions are optional, but a body that is
/// present must parse.
fn optional_body<T>(raw: &Bytes) -> Result<T, axum::response::Response>
where
    T: DeserializeOwned + Default,
{
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    body(Json::from_bytes(raw))
}

pub async fn create_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> axum::response::Response {
    let order = require!(body(payload));
    respond(
        StatusCode::CREATED,
        services.orders.create_order(&caller.principal(), order),
    )
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.orders.list_orders(&caller.principal()) {
        Ok(items) => (StatusCode::OK, Json(dto::OrderList { items })).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = require!(parse_order_id(&id));
    respond(
        StatusCode::OK,
        services.orders.get_order(&caller.principal(), order_id),
    )
}

pub async fn select_winning_quote(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path((id, item_id)): Path<(String, u32)>,
    payload: Result<Json<dto::SelectQuoteRequest>, JsonRejection>,
) -> axum::response::Response {
    let order_id = require!(parse_order_id(&id));
    let req = require!(body(payload));
    respond(
        StatusCode::OK,
        services.orders.select_winning_quote(
            &caller.principal(),
            order_id,
            ItemId(item_id),
            req.quote_id,
            req.expected_version,
        ),
    )
}

pub async fn set_eligible_accounts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::EligibleAccountsRequest>, JsonRejection>,
) -> axum::response::Response {
    let order_id = require!(parse_order_id(&id));
    let req = require!(body(payload));
    respond(
        StatusCode::OK,
        services.orders.set_eligible_accounts(
            &caller.principal(),
            order_id,
            req.accounts,
            req.expected_version,
        ),
    )
}

pub async fn final_approve(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::ApproveRequest>, JsonRejection>,
) -> axum::response::Response {
    let order_id = require!(parse_order_id(&id));
    let req = require!(body(payload));
    respond(
        StatusCode::OK,
        services.orders.final_approve(
            &caller.principal(),
            order_id,
            req.account,
            req.expected_version,
        ),
    )
}

pub async fn reject(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    raw: Bytes,
) -> axum::response::Response {
    let order_id = require!(parse_order_id(&id));
    let req: dto::RejectRequest = require!(optional_body(&raw));
    respond(
        StatusCode::OK,
        services
            .orders
            .reject(&caller.principal(), order_id, req.reason, req.expected_version),
    )
}

pub async fn record_paid_amount(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    payload: Result<Json<dto::RecordPaymentRequest>, JsonRejection>,
) -> axum::response::Response {
    let order_id = require!(parse_order_id(&id));
    let req = require!(body(payload));
    respond(
        StatusCode::OK,
        services.orders.record_paid_amount(
            &caller.principal(),
            order_id,
            req.quote_id,
            req.account,
            req.amount,
            req.expected_version,
        ),
    )
}

pub async fn mark_paid(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    raw: Bytes,
) -> axum::response::Response {
    let order_id = require!(parse_order_id(&id));
    let req: dto::VersionedRequest = require!(optional_body(&raw));
    respond(
        StatusCode::OK,
        services
            .orders
            .mark_paid(&caller.principal(), order_id, req.expected_version),
    )
}

pub async fn confirm_delivery(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path(id): Path<String>,
    raw: Bytes,
) -> axum::response::Response {
    let order_id = require!(parse_order_id(&id));
    let req: dto::VersionedRequest = require!(optional_body(&raw));
    respond(
        StatusCode::OK,
        services
            .orders
            .confirm_delivery(&caller.principal(), order_id, req.expected_version),
    )
}

pub async fn attach_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(caller): Extension<PrincipalContext>,
    Path((id, quote_id)): Path<(String, u32)>,
    payload: Result<Json<dto::AttachInvoiceRequest>, JsonRejection>,
) -> axum::response::Response {
    let order_id = require!(parse_order_id(&id));
    let req = require!(body(payload));
    respond(
        StatusCode::OK,
        services.orders.attach_invoice(
            &caller.principal(),
            order_id,
            QuoteId(quote_id),
            req.invoice_ref,
            req.expected_version,
        ),
    )
}
