pub mod auth;
pub mod error;
pub mod extract;
pub mod geocode_worker;
pub mod response;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use fleetdesk_core::config::Config;
use fleetdesk_core::db::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let company = Router::new()
        .route("/me", get(routes::auth::company_me))
        .route("/logout", post(routes::auth::company_logout))
        .route("/refresh", post(routes::auth::company_refresh))
        // Delivery men
        .route(
            "/deliverymen",
            get(routes::delivery_men::list_delivery_men)
                .post(routes::delivery_men::create_delivery_man),
        )
        .route(
            "/deliverymen/{id}",
            delete(routes::delivery_men::unlink_delivery_man),
        )
        // Customers
        .route(
            "/customers",
            get(routes::customers::list_customers).post(routes::customers::create_customer),
        )
        .route(
            "/customers/{id}",
            get(routes::customers::get_customer)
                .put(routes::customers::update_customer)
                .delete(routes::customers::delete_customer),
        )
        .route(
            "/customers/{id}/addresses",
            get(routes::customers::list_addresses).post(routes::customers::add_address),
        )
        .route(
            "/customers/{id}/addresses/{address_id}",
            put(routes::customers::update_address).delete(routes::customers::delete_address),
        )
        // Company addresses
        .route(
            "/addresses",
            get(routes::addresses::list_addresses).post(routes::addresses::create_address),
        )
        .route("/addresses/type/{type}", get(routes::addresses::list_by_type))
        .route(
            "/addresses/{id}",
            get(routes::addresses::get_address)
                .put(routes::addresses::update_address)
                .delete(routes::addresses::delete_address),
        )
        // Items
        .route(
            "/items",
            get(routes::items::list_items).post(routes::items::create_item),
        )
        .route(
            "/items/{id}",
            get(routes::items::get_item)
                .put(routes::items::update_item)
                .delete(routes::items::delete_item),
        )
        // Deliveries
        .route(
            "/deliveries",
            get(routes::deliveries::list_deliveries).post(routes::deliveries::create_delivery),
        )
        .route(
            "/deliveries/{id}",
            get(routes::deliveries::get_delivery)
                .put(routes::deliveries::update_delivery)
                .delete(routes::deliveries::delete_delivery),
        )
        .route(
            "/deliveries/{id}/status-logs",
            get(routes::deliveries::status_logs),
        )
        // Notifications
        .route(
            "/notifications/device-token",
            post(routes::notifications::update_device_token),
        )
        .route("/notifications/test", post(routes::notifications::send_test))
        .route(
            "/notifications/company",
            post(routes::notifications::send_to_company),
        )
        .route(
            "/notifications/users",
            get(routes::notifications::list_users).post(routes::notifications::send_to_users),
        )
        // Dashboard
        .route("/dashboard", get(routes::dashboard::get_dashboard))
        .route("/activity", get(routes::dashboard::list_activity))
        .route("/options", get(routes::dashboard::get_options))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_company_user,
        ))
        .route("/login", post(routes::auth::company_login));

    let rider = Router::new()
        .route("/me", get(routes::auth::rider_me))
        .route("/logout", post(routes::auth::rider_logout))
        .route("/refresh", post(routes::auth::rider_refresh))
        .route("/deliveries", get(routes::rider::list_deliveries))
        .route(
            "/deliveries/{id}/status",
            put(routes::rider::update_status),
        )
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::require_delivery_man,
        ))
        .route("/login", post(routes::auth::rider_login));

    Router::new()
        .route("/api/up", get(routes::health))
        .nest("/api/company", company)
        .nest("/api/deliveryman", rider)
        .fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the API server on the host and port from `config`.
pub async fn serve(config: &Config, store: Arc<Store>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(config, store, listener).await
}

/// Start the API server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(
    config: &Config,
    store: Arc<Store>,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual = listener.local_addr()?;
    let app = build_router(AppState::from_config(config, store)?);

    tracing::info!("fleetdesk API listening on http://{actual}");

    axum::serve(listener, app).await?;
    Ok(())
}
