//! Application router configuration.

use axum::{
    Router,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};

use crate::{
    AppState,
    category::{
        create_category_endpoint, delete_category_endpoint, get_categories_endpoint,
        rename_category_endpoint,
    },
    endpoints,
    logging::logging_middleware,
    reset::reset_endpoint,
    transaction::{
        create_transaction_endpoint, delete_transaction_endpoint, get_transactions_endpoint,
        update_transaction_endpoint,
    },
};

/// Return a router with all the app's routes.
///
/// The router allows any origin, method and header so that the browser-based
/// client can call the API from a different origin.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(endpoints::ROOT, get(get_coffee))
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions_endpoint).post(create_transaction_endpoint),
        )
        .route(
            endpoints::TRANSACTION,
            put(update_transaction_endpoint).delete(delete_transaction_endpoint),
        )
        .route(
            endpoints::CATEGORIES,
            get(get_categories_endpoint).post(create_category_endpoint),
        )
        .route(
            endpoints::CATEGORY,
            put(rename_category_endpoint).delete(delete_category_endpoint),
        )
        .route(endpoints::RESET, post(reset_endpoint))
        .layer(middleware::from_fn(logging_middleware))
        .layer(cors)
        .with_state(state)
}

/// Attempt to get a cup of coffee from the server.
async fn get_coffee() -> Response {
    StatusCode::IM_A_TEAPOT.into_response()
}
