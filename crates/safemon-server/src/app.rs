use crate::state::AppState;
use crate::{api, auth, logging};
use axum::middleware;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub fn build_http_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    api::public_routes()
        .merge(api::protected_routes().layer(middleware::from_fn_with_state(
            state.clone(),
            auth::bearer_auth_middleware,
        )))
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(logging::request_logging))
}
