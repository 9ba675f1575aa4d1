use axum::extract::State;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::models::{CreateOrder, Order};

#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub id: String,
}

/// POST /orders
///
/// Takes the full storefront form, validates it and stores the order in
/// `pending`. Payment is initiated separately once the customer picks a
/// provider.
pub async fn create_order(
    State(state): State<AppState>,
    Json(request): Json<CreateOrder>,
) -> Result<Json<CreateOrderResponse>> {
    let conn = state.db.get()?;
    let order = queries::create_order(&conn, &request)?;

    tracing::info!(
        "Order created: id={}, total_cents={}, documents={}",
        order.id,
        order.total_amount_cents,
        order.selected_documents.len()
    );

    Ok(Json(CreateOrderResponse { id: order.id }))
}

/// GET /orders/{id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>> {
    let conn = state.db.get()?;
    let order = queries::get_order(&conn, &id)?.or_not_found(msg::ORDER_NOT_FOUND)?;
    Ok(Json(order))
}
