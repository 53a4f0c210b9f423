//! Domain types for the Flotilla state store.
//!
//! These types represent the persisted state of formations, layers, nodes,
//! builds, releases, and the recorded container placement. All types are
//! serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a formation.
pub type FormationId = String;

/// Unique identifier for a node within a formation.
pub type NodeId = String;

// ── Formation ─────────────────────────────────────────────────────

/// A named, user-owned deployment unit comprising layers, releases,
/// and running containers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Formation {
    pub id: FormationId,
    /// Owning account.
    pub owner: String,
    /// Desired container replicas per process type (e.g. `web: 4`).
    pub process_targets: BTreeMap<String, u32>,
    /// Unix timestamp (seconds) when this formation was created.
    pub created_at: u64,
    /// Unix timestamp (seconds) of the last update.
    pub updated_at: u64,
}

// ── Layer ─────────────────────────────────────────────────────────

/// Bootstrap state of a layer's shared infrastructure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapState {
    /// No shared infrastructure exists yet.
    Absent,
    /// A build_layer task is in flight.
    Bootstrapping,
    /// Shared infrastructure exists; nodes may be launched.
    Ready,
    /// A destroy_layer task is in flight.
    Destroying,
}

/// A homogeneous group of nodes within a formation sharing
/// infrastructure parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Layer {
    pub formation_id: FormationId,
    /// Layer name, unique within the formation.
    pub name: String,
    /// Instance size profile.
    pub flavor: String,
    /// Cloud provider key, used to look up credentials.
    pub provider: String,
    /// Opaque provider credentials blob (pass-through).
    pub credentials: serde_json::Value,
    /// Opaque provider launch parameters (pass-through).
    pub params: serde_json::Value,
    /// Username for the remote execution channel.
    pub ssh_username: String,
    /// Private key for the remote execution channel (opaque).
    pub ssh_private_key: String,
    /// Cloud-init script applied at node launch.
    pub init_script: String,
    /// Security-group handle, set once bootstrap succeeds.
    pub security_group: Option<String>,
    pub bootstrap: BootstrapState,
    /// Desired node count for this layer.
    pub target_count: u32,
    /// Next node sequence number (monotonic, never reused).
    pub next_seq: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Node ──────────────────────────────────────────────────────────

/// Lifecycle state of a node.
///
/// Transitions are driven by the lifecycle manager; the state machine
/// is authoritative over lifecycle decisions, with provider metadata
/// kept separately as an opaque last-observed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Requested,
    Building,
    Up,
    Converging,
    Running,
    Terminating,
    Terminated,
}

impl NodeState {
    /// True for the states with a provisioning operation in flight.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Building | Self::Converging | Self::Terminating)
    }

    /// True once the node has reached its terminal state.
    pub fn is_terminal(self) -> bool {
        self == Self::Terminated
    }
}

/// A single infrastructure instance belonging to a layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// Node id, `{layer}-{seq}` — unique within the formation.
    pub id: NodeId,
    pub formation_id: FormationId,
    pub layer: String,
    /// Creation sequence within the layer (newest = highest).
    pub seq: u32,
    pub state: NodeState,
    /// Provider-assigned identifier; absent until launch succeeds,
    /// immutable once set.
    pub provider_id: Option<String>,
    /// Fully-qualified domain name; absent until the node is reachable.
    pub fqdn: Option<String>,
    /// Last-observed provider status, opaque to lifecycle decisions.
    pub metadata: BTreeMap<String, String>,
    /// Launch attempts since the node last left `requested`.
    pub launch_attempts: u32,
    /// Converge attempts since the node last reached `up`.
    pub converge_attempts: u32,
    pub created_at: u64,
    pub updated_at: u64,
}

// ── Build ─────────────────────────────────────────────────────────

/// An immutable deployable artifact (image + process definitions).
/// Builds are append-only per formation, ordered by sequence number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Build {
    pub formation_id: FormationId,
    /// Append-only sequence, allocated by the store.
    pub seq: u32,
    /// Image reference.
    pub image: String,
    /// Process type → command, from the procfile.
    pub procfile: BTreeMap<String, String>,
    /// Content checksum of the artifact.
    pub sha: String,
    pub owner: String,
    pub created_at: u64,
}

// ── Release ───────────────────────────────────────────────────────

/// An immutable, versioned pairing of a build and a configuration
/// snapshot. Versions are strictly increasing and gapless per
/// formation, starting at 1. Rollback copies an older build+config
/// into a new release; history is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub formation_id: FormationId,
    pub version: u32,
    /// Build sequence this release deploys.
    pub build_seq: u32,
    /// Configuration snapshot at release time.
    pub config: BTreeMap<String, String>,
    pub created_at: u64,
}

// ── Placement ─────────────────────────────────────────────────────

/// One container replica assigned to a node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerAssignment {
    /// Process type from the release's procfile.
    pub process_type: String,
    /// Replica index within the process type, 1-based.
    pub num: u32,
    pub node_id: NodeId,
}

/// The formation's authoritative container placement, recorded by the
/// orchestrator after a balance pass. Containers are derived from this
/// plus the current release; they are not persisted independently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Placement {
    pub formation_id: FormationId,
    /// Release version the placement was computed against.
    pub release_version: u32,
    pub assignments: Vec<ContainerAssignment>,
    pub updated_at: u64,
}

// ── Table keys ────────────────────────────────────────────────────

impl Layer {
    /// Build the composite key for the layers table.
    pub fn table_key(&self) -> String {
        layer_key(&self.formation_id, &self.name)
    }
}

impl Node {
    /// Build the composite key for the nodes table.
    pub fn table_key(&self) -> String {
        node_key(&self.formation_id, &self.layer, self.seq)
    }
}

impl Build {
    /// Build the composite key for the builds table.
    pub fn table_key(&self) -> String {
        format!("{}:{:08}", self.formation_id, self.seq)
    }
}

impl Release {
    /// Build the composite key for the releases table.
    pub fn table_key(&self) -> String {
        format!("{}:{:08}", self.formation_id, self.version)
    }
}

/// Composite key for a layer record.
pub fn layer_key(formation_id: &str, layer: &str) -> String {
    format!("{formation_id}/{layer}")
}

/// Composite key for a node record. Zero-padded `seq` keeps iteration
/// order equal to creation order.
pub fn node_key(formation_id: &str, layer: &str, seq: u32) -> String {
    format!("{formation_id}/{layer}:{seq:08}")
}
