use axum::routing::get;
use axum::Router;
use scd_engine::Engine;
use scd_models::{Job, PaymentLineItem, Timelog};
use scd_store::VersionStore;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};
use crate::resource::Resource;

/// Build the axum router with all SCD endpoints.
pub fn build_router<S: VersionStore + 'static>(engine: Engine<S>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handler::health::<S>))
        .merge(resource_routes::<S, Job>())
        .merge(resource_routes::<S, Timelog>())
        .merge(resource_routes::<S, PaymentLineItem>())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(engine))
}

fn resource_routes<S: VersionStore + 'static, E: Resource>() -> Router<AppState<S>> {
    let base = format!("/api/v1/{}", E::PATH);
    Router::new()
        .route(
            &base,
            get(handler::list::<S, E>).post(handler::create::<S, E>),
        )
        .route(
            &format!("{base}/:id"),
            get(handler::latest::<S, E>)
                .patch(handler::update::<S, E>)
                .delete(handler::delete::<S, E>),
        )
        .route(&format!("{base}/:id/versions"), get(handler::versions::<S, E>))
        .route(
            &format!("{base}/:id/versions/:version"),
            get(handler::version::<S, E>),
        )
}
