use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, availability, borrow_item, cancel_reservation, catalog_item, get_loan, loan_fine,
    member_loans, member_reservations, outstanding_fines, pay_fine, register_member,
    remove_item, remove_member, renew_loan, reservation_queue, reserve_item, return_item,
    update_item,
};

/// Creates the API router
///
/// Members:
/// - POST /members, DELETE /members/:id
/// - GET /members/:id/loans, /members/:id/reservations, /members/:id/fines
///
/// Catalog:
/// - POST /items, PATCH /items/:id, DELETE /items/:id
/// - GET /items/:id/availability, /items/:id/queue
///
/// Loans:
/// - POST /loans, GET /loans/:id
/// - POST /loans/:id/return, /loans/:id/renew, /loans/:id/pay-fine
/// - GET /loans/:id/fine
///
/// Reservations:
/// - POST /reservations, POST /reservations/:id/cancel
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check endpoint
        .route("/health", get(health_check))
        .route("/members", post(register_member))
        .route("/members/:id", delete(remove_member))
        .route("/members/:id/loans", get(member_loans))
        .route("/members/:id/reservations", get(member_reservations))
        .route("/members/:id/fines", get(outstanding_fines))
        .route("/items", post(catalog_item))
        .route("/items/:id", delete(remove_item).patch(update_item))
        .route("/items/:id/availability", get(availability))
        .route("/items/:id/queue", get(reservation_queue))
        .route("/loans", post(borrow_item))
        .route("/loans/:id", get(get_loan))
        .route("/loans/:id/return", post(return_item))
        .route("/loans/:id/renew", post(renew_loan))
        .route("/loans/:id/pay-fine", post(pay_fine))
        .route("/loans/:id/fine", get(loan_fine))
        .route("/reservations", post(reserve_item))
        .route("/reservations/:id/cancel", post(cancel_reservation))
        // Add tracing middleware
        .layer(TraceLayer::new_for_http())
        // Add application state
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
