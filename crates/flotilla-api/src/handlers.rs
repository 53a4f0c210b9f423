//! REST API handlers for formation records.
//!
//! Each handler reads/writes via the orchestrator's `StateStore` and
//! returns JSON responses.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use flotilla_orchestrator::NewBuild;
use flotilla_state::{BootstrapState, Formation, Layer};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
pub(crate) struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub(crate) fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

// `use<>`: the response owns its message, so callers may pass
// temporaries like `&e.to_string()`.
pub(crate) fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse + use<> {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

/// Formation ids and layer names embed into composite store keys, so
/// the separator characters (`/`, `:`) must never appear in them.
fn valid_id(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Formations ─────────────────────────────────────────────────

/// Request body to create a formation.
#[derive(serde::Deserialize)]
pub struct CreateFormationRequest {
    pub id: String,
    pub owner: String,
    #[serde(default)]
    pub process_targets: BTreeMap<String, u32>,
}

/// GET /api/v1/formations
pub async fn list_formations(State(state): State<ApiState>) -> impl IntoResponse {
    match state.orchestrator.store().list_formations() {
        Ok(formations) => ApiResponse::ok(formations).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/formations
pub async fn create_formation(
    State(state): State<ApiState>,
    Json(req): Json<CreateFormationRequest>,
) -> impl IntoResponse {
    if !valid_id(&req.id) {
        return error_response(
            "formation id may only contain lowercase letters, digits, and '-'",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }

    let store = state.orchestrator.store();
    match store.get_formation(&req.id) {
        Ok(Some(_)) => {
            return error_response("formation already exists", StatusCode::CONFLICT)
                .into_response();
        }
        Ok(None) => {}
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    }

    let now = epoch_secs();
    let formation = Formation {
        id: req.id,
        owner: req.owner,
        process_targets: req.process_targets,
        created_at: now,
        updated_at: now,
    };
    match store.put_formation(&formation) {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(formation)).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/formations/:id
pub async fn get_formation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.store().get_formation(&id) {
        Ok(Some(formation)) => ApiResponse::ok(formation).into_response(),
        Ok(None) => error_response("formation not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/formations/:id
///
/// Refused while the formation still owns layers; destroy them first.
pub async fn delete_formation(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let store = state.orchestrator.store();
    match store.list_layers(&id) {
        Ok(layers) if !layers.is_empty() => {
            return error_response(
                &format!("formation has {} layer(s); destroy them first", layers.len()),
                StatusCode::CONFLICT,
            )
            .into_response();
        }
        Ok(_) => {}
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    }

    if let Err(e) = store.delete_placement(&id) {
        return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response();
    }
    match store.delete_formation(&id) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("formation not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Layers ─────────────────────────────────────────────────────

/// Request body to create a layer.
#[derive(serde::Deserialize)]
pub struct CreateLayerRequest {
    pub name: String,
    pub flavor: String,
    pub provider: String,
    #[serde(default)]
    pub credentials: serde_json::Value,
    #[serde(default)]
    pub params: serde_json::Value,
    pub ssh_username: String,
    pub ssh_private_key: String,
    #[serde(default)]
    pub init_script: String,
    #[serde(default)]
    pub target_count: u32,
}

/// GET /api/v1/formations/:id/layers
pub async fn list_layers(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.store().list_layers(&id) {
        Ok(layers) => ApiResponse::ok(layers).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/formations/:id/layers
pub async fn create_layer(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CreateLayerRequest>,
) -> impl IntoResponse {
    if !valid_id(&req.name) {
        return error_response(
            "layer name may only contain lowercase letters, digits, and '-'",
            StatusCode::BAD_REQUEST,
        )
        .into_response();
    }

    let store = state.orchestrator.store();
    match store.get_formation(&id) {
        Ok(Some(_)) => {}
        Ok(None) => {
            return error_response("formation not found", StatusCode::NOT_FOUND).into_response();
        }
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    }
    match store.get_layer(&id, &req.name) {
        Ok(Some(_)) => {
            return error_response("layer already exists", StatusCode::CONFLICT).into_response();
        }
        Ok(None) => {}
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    }

    let now = epoch_secs();
    let layer = Layer {
        formation_id: id,
        name: req.name,
        flavor: req.flavor,
        provider: req.provider,
        credentials: req.credentials,
        params: req.params,
        ssh_username: req.ssh_username,
        ssh_private_key: req.ssh_private_key,
        init_script: req.init_script,
        security_group: None,
        bootstrap: BootstrapState::Absent,
        target_count: req.target_count,
        next_seq: 1,
        created_at: now,
        updated_at: now,
    };
    match store.put_layer(&layer) {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(layer)).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/formations/:id/layers/:layer
pub async fn get_layer(
    State(state): State<ApiState>,
    Path((id, layer)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.orchestrator.store().get_layer(&id, &layer) {
        Ok(Some(layer)) => ApiResponse::ok(layer).into_response(),
        Ok(None) => error_response("layer not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/formations/:id/layers/:layer
///
/// Tears down the layer's shared infrastructure. 409 while any of its
/// nodes is not terminated.
pub async fn destroy_layer(
    State(state): State<ApiState>,
    Path((id, layer_name)): Path<(String, String)>,
) -> impl IntoResponse {
    let layer = match state.orchestrator.store().get_layer(&id, &layer_name) {
        Ok(Some(layer)) => layer,
        Ok(None) => {
            return error_response("layer not found", StatusCode::NOT_FOUND).into_response();
        }
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    match state.orchestrator.layer_manager().destroy(&layer).await {
        Ok(()) => ApiResponse::ok("destroyed").into_response(),
        Err(e @ flotilla_lifecycle::LifecycleError::LayerNotEmpty { .. }) => {
            error_response(&e.to_string(), StatusCode::CONFLICT).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Nodes ──────────────────────────────────────────────────────

/// GET /api/v1/formations/:id/nodes
pub async fn list_nodes(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.store().list_nodes(&id) {
        Ok(nodes) => ApiResponse::ok(nodes).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Builds & releases ──────────────────────────────────────────

/// Request body to record a build.
#[derive(serde::Deserialize)]
pub struct CreateBuildRequest {
    pub image: String,
    #[serde(default)]
    pub procfile: BTreeMap<String, String>,
    #[serde(default)]
    pub sha: String,
    pub owner: String,
}

/// GET /api/v1/formations/:id/builds
pub async fn list_builds(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.store().list_builds(&id) {
        Ok(builds) => ApiResponse::ok(builds).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/formations/:id/builds
///
/// Appends the build and cuts a new release pairing it with the
/// current config.
pub async fn create_build(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(req): Json<CreateBuildRequest>,
) -> impl IntoResponse {
    let new = NewBuild {
        image: req.image,
        procfile: req.procfile,
        sha: req.sha,
        owner: req.owner,
    };
    match state.orchestrator.create_build(&id, new) {
        Ok((build, release)) => (
            StatusCode::CREATED,
            ApiResponse::ok(serde_json::json!({ "build": build, "release": release })),
        )
            .into_response(),
        Err(e) => crate::actions::orchestrator_error(e).into_response(),
    }
}

/// GET /api/v1/formations/:id/releases
pub async fn list_releases(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.store().list_releases(&id) {
        Ok(releases) => ApiResponse::ok(releases).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Config ─────────────────────────────────────────────────────

/// GET /api/v1/formations/:id/config
///
/// The config snapshot of the current release.
pub async fn get_config(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.store().current_release(&id) {
        Ok(Some(release)) => ApiResponse::ok(release.config).into_response(),
        Ok(None) => ApiResponse::ok(BTreeMap::<String, String>::new()).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/formations/:id/config
///
/// Merges the submitted values (null deletes a key) and cuts a new
/// release.
pub async fn set_config(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(updates): Json<BTreeMap<String, Option<String>>>,
) -> impl IntoResponse {
    match state.orchestrator.set_config(&id, updates) {
        Ok(release) => (StatusCode::CREATED, ApiResponse::ok(release)).into_response(),
        Err(e) => crate::actions::orchestrator_error(e).into_response(),
    }
}

// ── Containers ─────────────────────────────────────────────────

/// GET /api/v1/formations/:id/containers
///
/// Containers are derived from the recorded placement; without a
/// balance pass the list is empty.
pub async fn list_containers(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.orchestrator.store().get_placement(&id) {
        Ok(Some(placement)) => ApiResponse::ok(placement.assignments).into_response(),
        Ok(None) => ApiResponse::ok(Vec::<flotilla_state::ContainerAssignment>::new())
            .into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}
