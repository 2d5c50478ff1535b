use crate::{controller::health_check_controller, params, AppState};
use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use log::*;
use service::config::Config;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::controller::{broadcast_controller, event_stream_controller, state_controller};

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// Global OpenAPI document for the JSON endpoints. To be a part
// of the rendered docs, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "Broadcast Panel API"
        ),
        paths(
            broadcast_controller::index,
            broadcast_controller::create,
            event_stream_controller::index,
            event_stream_controller::create,
            health_check_controller::health_check,
            state_controller::read,
            state_controller::update,
        ),
        components(
            schemas(
                health_check_controller::HealthStatus,
                params::state::UpdateParams,
            )
        ),
        tags(
            (name = "broadcast_panel", description = "Tournament broadcast dashboard API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.service_state.config);

    Router::new()
        .merge(broadcast_routes(app_state.clone()))
        .merge(event_stream_routes(app_state.clone()))
        .merge(health_routes(app_state.clone()))
        .merge(state_routes(app_state))
        .merge(RapiDoc::with_openapi("/api-docs/openapi.json", ApiDoc::openapi()).path("/rapidoc"))
        .layer(cors)
}

fn broadcast_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/api/broadcast",
            get(broadcast_controller::index).post(broadcast_controller::create),
        )
        .with_state(app_state)
}

fn event_stream_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/api/events",
            get(event_stream_controller::index).post(event_stream_controller::create),
        )
        .with_state(app_state)
}

fn health_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check_controller::health_check))
        .with_state(app_state)
}

fn state_routes(app_state: AppState) -> Router {
    Router::new()
        .route(
            "/api/state",
            get(state_controller::read).post(state_controller::update),
        )
        .with_state(app_state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {origin:?}: {e}");
                None
            }
        })
        .collect();

    cors.allow_origin(AllowOrigin::list(origins))
}
