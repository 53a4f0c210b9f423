//! The formation orchestrator.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use flotilla_balance::balance;
use flotilla_lifecycle::{LayerManager, NodeDriver, RetryPolicy};
use flotilla_state::{
    Formation, Layer, Node, NodeId, NodeState, Placement, StateStore,
};
use flotilla_tasks::TaskExecutor;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Nodes created and selected for removal by a `scale_layers` call.
/// The provisioning work runs in the background; this is the immediate
/// answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScaleSummary {
    /// Ids of freshly created `requested` nodes, launching in the
    /// background.
    pub added: Vec<NodeId>,
    /// Ids of surplus nodes, terminating in the background.
    pub removed: Vec<NodeId>,
}

/// Desired vs. actual for one counted thing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CountPair {
    pub desired: u32,
    pub actual: u32,
}

/// Read-only desired-vs-actual topology snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TopologyReport {
    pub formation_id: String,
    /// Per layer: desired node count vs. nodes currently `running`.
    pub layers: BTreeMap<String, CountPair>,
    /// Per process type: desired replicas vs. replicas in the recorded
    /// placement.
    pub containers: BTreeMap<String, CountPair>,
}

/// Outcome of one node's work within a converge pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    /// The node reached `running` this pass.
    Running,
    /// The node was removed as layer surplus.
    Terminated,
    /// The node's retry budget ran out; its state is the last
    /// successful transition.
    Failed { error: String },
}

/// Per-node outcomes of one converge pass. Nodes already at their
/// target that needed no operation do not appear; a drift-free pass
/// reports nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConvergeReport {
    pub formation_id: String,
    pub nodes: BTreeMap<NodeId, NodeOutcome>,
}

impl ConvergeReport {
    /// True when the pass had no work to do.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of nodes whose work failed this pass.
    pub fn failures(&self) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|(_, o)| matches!(o, NodeOutcome::Failed { .. }))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Formation-level orchestration over the state store, the lifecycle
/// managers, and the task executor.
#[derive(Clone)]
pub struct Orchestrator {
    store: StateStore,
    nodes: NodeDriver,
    layers: LayerManager,
    /// Per-formation advisory locks serializing converge passes.
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    /// Nodes with an operation in flight in this process, including the
    /// background drivers spawned by `scale_layers`.
    in_flight: Arc<Mutex<HashSet<NodeId>>>,
}

impl Orchestrator {
    pub fn new(
        store: StateStore,
        executor: TaskExecutor,
        policy: RetryPolicy,
        task_timeout: Duration,
    ) -> Self {
        Self {
            nodes: NodeDriver::new(store.clone(), executor.clone(), policy, task_timeout),
            layers: LayerManager::new(store.clone(), executor, task_timeout),
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// The underlying state store, for read-side consumers.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The layer manager, for direct layer teardown.
    pub fn layer_manager(&self) -> &LayerManager {
        &self.layers
    }

    // ── Scale ──────────────────────────────────────────────────────

    /// Adjust per-layer node counts. Creates/selects the node records
    /// synchronously, spawns the launches and terminations onto the
    /// background, and returns the delta immediately. Takes the
    /// formation lock so seq allocation never races a converge pass.
    pub async fn scale_layers(
        &self,
        formation_id: &str,
        layer_targets: &BTreeMap<String, u32>,
    ) -> OrchestratorResult<ScaleSummary> {
        let lock = self.formation_lock(formation_id);
        let _guard = lock.lock().await;

        self.get_formation(formation_id)?;

        let mut summary = ScaleSummary {
            added: Vec::new(),
            removed: Vec::new(),
        };

        for (layer_name, &target) in layer_targets {
            let layer = self.get_layer(formation_id, layer_name)?;
            let delta = self.layers.scale(&layer, target)?;

            summary
                .added
                .extend(delta.to_launch.iter().map(|n| n.id.clone()));
            summary
                .removed
                .extend(delta.to_terminate.iter().map(|n| n.id.clone()));

            if !delta.to_launch.is_empty() {
                // Bootstrap must finish before the layer's first launch,
                // so the whole group rides one background task.
                let this = self.clone();
                let layer = layer.clone();
                tokio::spawn(async move {
                    this.launch_group(layer, delta.to_launch).await;
                });
            }

            for node in delta.to_terminate {
                let this = self.clone();
                let layer = layer.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.terminate_claimed(&node, &layer).await {
                        warn!(node = %node.id, error = %e, "background terminate failed");
                    }
                });
            }
        }

        info!(
            formation = %formation_id,
            added = summary.added.len(),
            removed = summary.removed.len(),
            "layer scale submitted"
        );
        Ok(summary)
    }

    /// Update desired replica counts and rebalance placement across the
    /// currently running nodes. Containers materialize through a later
    /// converge; this only moves the target.
    pub async fn scale_containers(
        &self,
        formation_id: &str,
        process_targets: BTreeMap<String, u32>,
    ) -> OrchestratorResult<Placement> {
        let lock = self.formation_lock(formation_id);
        let _guard = lock.lock().await;

        let mut formation = self.get_formation(formation_id)?;
        formation.process_targets = process_targets;
        formation.updated_at = epoch_secs();
        self.store.put_formation(&formation)?;

        self.rebalance(&formation)
    }

    /// Recompute placement with unchanged desired counts.
    pub async fn balance(&self, formation_id: &str) -> OrchestratorResult<Placement> {
        let lock = self.formation_lock(formation_id);
        let _guard = lock.lock().await;

        let formation = self.get_formation(formation_id)?;
        self.rebalance(&formation)
    }

    fn rebalance(&self, formation: &Formation) -> OrchestratorResult<Placement> {
        let running: Vec<NodeId> = self
            .store
            .list_nodes(&formation.id)?
            .into_iter()
            .filter(|n| n.state == NodeState::Running)
            .map(|n| n.id)
            .collect();

        let plan = balance(&running, &formation.process_targets)?;
        let release_version = self
            .store
            .current_release(&formation.id)?
            .map(|r| r.version)
            .unwrap_or(0);

        let placement = Placement {
            formation_id: formation.id.clone(),
            release_version,
            assignments: plan.assignments,
            updated_at: epoch_secs(),
        };
        self.store.put_placement(&placement)?;

        info!(
            formation = %formation.id,
            containers = placement.assignments.len(),
            nodes = running.len(),
            "placement recorded"
        );
        Ok(placement)
    }

    // ── Calculate ──────────────────────────────────────────────────

    /// Desired-vs-actual topology. Read-only; mutates nothing.
    pub fn calculate(&self, formation_id: &str) -> OrchestratorResult<TopologyReport> {
        let formation = self.get_formation(formation_id)?;
        let nodes = self.store.list_nodes(formation_id)?;

        let mut layers = BTreeMap::new();
        for layer in self.store.list_layers(formation_id)? {
            let actual = nodes
                .iter()
                .filter(|n| n.layer == layer.name && n.state == NodeState::Running)
                .count() as u32;
            layers.insert(
                layer.name.clone(),
                CountPair {
                    desired: layer.target_count,
                    actual,
                },
            );
        }

        let placement = self.store.get_placement(formation_id)?;
        let mut containers = BTreeMap::new();
        for (process_type, &desired) in &formation.process_targets {
            let actual = placement
                .as_ref()
                .map(|p| {
                    p.assignments
                        .iter()
                        .filter(|a| &a.process_type == process_type)
                        .count() as u32
                })
                .unwrap_or(0);
            containers.insert(process_type.clone(), CountPair { desired, actual });
        }

        Ok(TopologyReport {
            formation_id: formation_id.to_string(),
            layers,
            containers,
        })
    }

    // ── Converge ───────────────────────────────────────────────────

    /// Drive the formation's infrastructure toward its desired topology.
    ///
    /// Per layer: bootstrap if needed, fill or trim to the node target,
    /// then launch every `requested` node and converge every node that
    /// is not yet `running`. Nodes parked in a stale in-flight state by
    /// an interrupted run are picked back up: `terminating` nodes get
    /// their termination retried, `building` and `converging` nodes
    /// resume from their retry origin. Node work across all layers runs
    /// concurrently; nodes an operation of this process already holds
    /// are skipped. Passes on the same formation serialize through the
    /// formation lock.
    pub async fn converge(&self, formation_id: &str) -> OrchestratorResult<ConvergeReport> {
        let lock = self.formation_lock(formation_id);
        let _guard = lock.lock().await;

        self.get_formation(formation_id)?;
        let mut report = ConvergeReport {
            formation_id: formation_id.to_string(),
            nodes: BTreeMap::new(),
        };
        let mut waits = Vec::new();

        for layer in self.store.list_layers(formation_id)? {
            let layer = self.layers.ensure_bootstrapped(&layer).await?;

            // Fill any shortfall toward the layer target; trim surplus.
            let delta = self.layers.scale(&layer, layer.target_count)?;
            let surplus: HashSet<NodeId> =
                delta.to_terminate.iter().map(|n| n.id.clone()).collect();

            for node in delta.to_terminate {
                let this = self.clone();
                let layer = layer.clone();
                waits.push(tokio::spawn(async move {
                    let outcome = match this.terminate_claimed(&node, &layer).await {
                        Ok(()) => NodeOutcome::Terminated,
                        Err(e) => NodeOutcome::Failed {
                            error: e.to_string(),
                        },
                    };
                    (node.id, outcome)
                }));
            }

            for node in self.store.list_nodes_for_layer(formation_id, &layer.name)? {
                if node.state == NodeState::Running || surplus.contains(&node.id) {
                    continue;
                }
                let Ok(claim) = self.claim(&node) else {
                    debug!(node = %node.id, state = ?node.state, "skipping in-flight node");
                    continue;
                };
                let this = self.clone();
                let layer = layer.clone();
                waits.push(tokio::spawn(async move {
                    let outcome = if node.state == NodeState::Terminating {
                        // Interrupted or exhausted removal; retry it.
                        match this.nodes.terminate(&node, &layer).await {
                            Ok(()) => NodeOutcome::Terminated,
                            Err(e) => NodeOutcome::Failed {
                                error: e.to_string(),
                            },
                        }
                    } else {
                        drive_node(this.nodes.clone(), node.clone(), layer).await
                    };
                    drop(claim);
                    (node.id, outcome)
                }));
            }
        }

        for joined in join_all(waits).await {
            match joined {
                Ok((id, outcome)) => {
                    report.nodes.insert(id, outcome);
                }
                Err(e) => warn!(error = %e, "converge worker aborted"),
            }
        }

        info!(
            formation = %formation_id,
            touched = report.nodes.len(),
            failed = report.failures().len(),
            "converge pass complete"
        );
        Ok(report)
    }

    // ── Internal ───────────────────────────────────────────────────

    /// Bootstrap a layer and launch a batch of its nodes, converging
    /// each one after its launch. Used by the background scale path.
    async fn launch_group(&self, layer: Layer, batch: Vec<Node>) {
        let layer = match self.layers.ensure_bootstrapped(&layer).await {
            Ok(layer) => layer,
            Err(e) => {
                warn!(layer = %layer.name, error = %e, "background bootstrap failed");
                return;
            }
        };

        let mut waits = Vec::new();
        for node in batch {
            let Ok(claim) = self.claim(&node) else {
                continue;
            };
            let driver = self.nodes.clone();
            let layer = layer.clone();
            waits.push(tokio::spawn(async move {
                let outcome = drive_node(driver, node.clone(), layer).await;
                drop(claim);
                if let NodeOutcome::Failed { error } = outcome {
                    warn!(node = %node.id, error, "background launch failed");
                }
            }));
        }
        join_all(waits).await;
    }

    async fn terminate_claimed(&self, node: &Node, layer: &Layer) -> OrchestratorResult<()> {
        let _claim = self.claim(node)?;
        self.nodes.terminate(node, layer).await?;
        Ok(())
    }

    /// Reserve a node for one operation. Fails when this process already
    /// carries an in-flight operation for it. A persisted in-flight
    /// state alone does not block the claim: with no live operation
    /// behind it the state is stale, and converge recovers it.
    fn claim(&self, node: &Node) -> OrchestratorResult<NodeClaim> {
        let mut set = lock_poison_free(&self.in_flight);
        if !set.insert(node.id.clone()) {
            return Err(OrchestratorError::InFlightConflict {
                node: node.id.clone(),
                state: node.state,
            });
        }
        Ok(NodeClaim {
            set: self.in_flight.clone(),
            node: node.id.clone(),
        })
    }

    fn formation_lock(&self, formation_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = lock_poison_free(&self.locks);
        locks
            .entry(formation_id.to_string())
            .or_default()
            .clone()
    }

    fn get_formation(&self, id: &str) -> OrchestratorResult<Formation> {
        self.store
            .get_formation(id)?
            .ok_or_else(|| OrchestratorError::NotFound {
                kind: "formation",
                id: id.to_string(),
            })
    }

    fn get_layer(&self, formation_id: &str, name: &str) -> OrchestratorResult<Layer> {
        self.store
            .get_layer(formation_id, name)?
            .ok_or_else(|| OrchestratorError::NotFound {
                kind: "layer",
                id: format!("{formation_id}/{name}"),
            })
    }
}

/// Launch (if still `requested`) and then converge one node. Nodes left
/// in `building` or `converging` by an interrupted run are first mapped
/// back to their retry origin.
async fn drive_node(driver: NodeDriver, node: Node, layer: Layer) -> NodeOutcome {
    let node = match driver.recover(&node) {
        Ok(node) => node,
        Err(e) => {
            return NodeOutcome::Failed {
                error: e.to_string(),
            };
        }
    };
    let node = if node.state == NodeState::Requested {
        match driver.launch(&node, &layer).await {
            Ok(node) => node,
            Err(e) => {
                return NodeOutcome::Failed {
                    error: e.to_string(),
                };
            }
        }
    } else {
        node
    };

    match driver.converge(&node, &layer).await {
        Ok(_) => NodeOutcome::Running,
        Err(e) => NodeOutcome::Failed {
            error: e.to_string(),
        },
    }
}

/// RAII reservation in the in-flight set.
#[derive(Debug)]
struct NodeClaim {
    set: Arc<Mutex<HashSet<NodeId>>>,
    node: NodeId,
}

impl Drop for NodeClaim {
    fn drop(&mut self) {
        lock_poison_free(&self.set).remove(&self.node);
    }
}

fn lock_poison_free<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
