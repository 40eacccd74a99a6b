//! Route definitions for SupplyMate

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes. Everything under `/api/v1` except login needs a
/// bearer token of an active account.
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Protected routes - staff accounts
        .nest("/account", account_routes())
        .nest("/users", user_routes())
        // Protected routes - product catalog and scanning
        .nest("/products", product_routes())
        // Protected routes - stock inputs
        .nest("/inputs", input_routes())
        // Protected routes - ledger corrections
        .route("/ledger/:entry_id/reverse", post(handlers::reverse_entry))
        // Protected routes - partners
        .nest("/partners", partner_routes())
        // Protected routes - orders
        .nest("/orders", order_routes())
        // Protected routes - dashboard
        .nest("/dashboard", dashboard_routes())
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
        // Public routes
        .route("/account/login", post(handlers::login))
}

/// Account registration and editing
fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(handlers::register_user))
        .route("/:user_id", patch(handlers::update_user))
}

/// Staff account routes
fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_users))
        .route(
            "/:user_id",
            get(handlers::get_user).delete(handlers::delete_user),
        )
}

/// Product catalog routes
fn product_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_products).post(handlers::create_product),
        )
        .route("/code/:code", get(handlers::scan_product))
        .route(
            "/:product_id",
            get(handlers::get_product)
                .put(handlers::update_product)
                .delete(handlers::delete_product),
        )
        .route("/:product_id/history", get(handlers::product_history))
        .route("/:product_id/reconcile", get(handlers::reconcile_product))
}

/// Stock input routes
fn input_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_inputs).post(handlers::create_input))
        .route(
            "/:input_id",
            get(handlers::get_input)
                .put(handlers::update_input)
                .delete(handlers::delete_input),
        )
}

/// Partner routes
fn partner_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_partners).post(handlers::create_partner),
        )
        .route(
            "/:partner_id",
            get(handlers::get_partner).delete(handlers::delete_partner),
        )
}

/// Order routes
fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_orders).post(handlers::create_order))
        .route(
            "/:order_id",
            get(handlers::get_order).delete(handlers::delete_order),
        )
        .route("/:order_id/transition", post(handlers::transition_order))
}

/// Dashboard routes
fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/overview", get(handlers::get_overview))
        .route("/chart", get(handlers::get_chart))
}
