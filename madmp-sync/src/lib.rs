//! madmp-sync library
//!
//! Synchronizes machine-actionable DMPs with repository records: the
//! reconciliation engine, the association store it writes to, the record
//! converters, the outbound notifier and the HTTP surface.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use madmp_common::MadmpConfig;

pub mod api;
pub mod convert;
pub mod error;
pub mod notify;
pub mod reconcile;
pub mod repository;
pub mod store;

pub use error::{ErrorKind, SyncError, SyncResult};
pub use reconcile::{ReconcileOutcome, Reconciler, SyncMode};
pub use store::{Store, UnitOfWork};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<MadmpConfig>,
    pub reconciler: Reconciler,
}

impl AppState {
    pub fn new(store: Store, config: Arc<MadmpConfig>, reconciler: Reconciler) -> Self {
        Self {
            store,
            config,
            reconciler,
        }
    }
}

/// Build application router
///
/// `/health` is public; everything else goes through the bearer token check.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::get;

    let protected = Router::new()
        .route("/dmps", get(api::list_dmps).post(api::reconcile_dmp))
        .route("/dmps/:dmp_id", get(api::get_dmp).delete(api::delete_dmp))
        .route("/datasets/zombies", get(api::list_zombies))
        .route("/datasets/orphans", get(api::list_orphans))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    let public = Router::new().merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
