pub mod auth;
pub mod destinations;
mod errors;
mod middleware;
mod proxy;
pub mod state;

use axum::{middleware as axum_middleware, Router};

use self::state::ProxyState;

/// Every path and method lands on [`proxy::proxy`]; the envelope, not the
/// URL, describes the request.
pub fn app(state: ProxyState) -> Router {
    Router::new()
        .fallback(proxy::proxy)
        .layer(axum_middleware::from_fn(middleware::metrics))
        .with_state(state)
}
