//! flotilla-api — REST API for Flotilla.
//!
//! Provides axum route handlers for managing formations, layers, nodes,
//! builds, releases, config, and the derived container placement, plus
//! the five formation actions that drive orchestration.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET/POST | `/api/v1/formations` | List / create formations |
//! | GET/DELETE | `/api/v1/formations/:id` | Get / delete a formation |
//! | GET/POST | `/api/v1/formations/:id/layers` | List / create layers |
//! | GET/DELETE | `/api/v1/formations/:id/layers/:layer` | Get / destroy a layer |
//! | GET | `/api/v1/formations/:id/nodes` | List nodes |
//! | GET/POST | `/api/v1/formations/:id/builds` | List / create builds |
//! | GET | `/api/v1/formations/:id/releases` | List releases |
//! | GET/POST | `/api/v1/formations/:id/config` | Current config / set config |
//! | GET | `/api/v1/formations/:id/containers` | Derived containers |
//! | POST | `/api/v1/formations/:id/scale/layers` | Scale node counts |
//! | POST | `/api/v1/formations/:id/scale/containers` | Scale replica counts |
//! | POST | `/api/v1/formations/:id/balance` | Recompute placement |
//! | POST | `/api/v1/formations/:id/calculate` | Desired-vs-actual report |
//! | POST | `/api/v1/formations/:id/converge` | Reconcile infrastructure |
//!
//! A converge with per-node failures still returns 200 with the
//! per-node breakdown; only structural errors map to 4xx.

pub mod actions;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use flotilla_orchestrator::Orchestrator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Orchestrator,
}

/// Build the complete API router.
pub fn build_router(orchestrator: Orchestrator) -> Router {
    let state = ApiState { orchestrator };

    let api_routes = Router::new()
        .route("/formations", get(handlers::list_formations).post(handlers::create_formation))
        .route("/formations/{id}", get(handlers::get_formation).delete(handlers::delete_formation))
        .route("/formations/{id}/layers", get(handlers::list_layers).post(handlers::create_layer))
        .route("/formations/{id}/layers/{layer}", get(handlers::get_layer).delete(handlers::destroy_layer))
        .route("/formations/{id}/nodes", get(handlers::list_nodes))
        .route("/formations/{id}/builds", get(handlers::list_builds).post(handlers::create_build))
        .route("/formations/{id}/releases", get(handlers::list_releases))
        .route("/formations/{id}/config", get(handlers::get_config).post(handlers::set_config))
        .route("/formations/{id}/containers", get(handlers::list_containers))
        .route("/formations/{id}/scale/layers", post(actions::scale_layers))
        .route("/formations/{id}/scale/containers", post(actions::scale_containers))
        .route("/formations/{id}/balance", post(actions::balance))
        .route("/formations/{id}/calculate", post(actions::calculate))
        .route("/formations/{id}/converge", post(actions::converge))
        .with_state(state);

    Router::new().nest("/api/v1", api_routes)
}
