//! LayerManager — layer bootstrap, scale deltas, and teardown.
//!
//! A layer owns shared infrastructure (a security group and the launch
//! parameters every node inherits). It must be bootstrapped before its
//! first node launches and may only be destroyed once every node is
//! terminated.

use std::time::Duration;

use tracing::{info, warn};

use flotilla_state::{BootstrapState, Layer, Node, NodeState, StateStore, layer_key};
use flotilla_tasks::{BuildLayerRequest, DestroyLayerRequest, Task, TaskExecutor};

use crate::error::{LifecycleError, LifecycleResult};
use crate::node::epoch_secs;

/// The node changes a target count implies: records to launch and
/// records to terminate. Exactly one of the two vectors is non-empty
/// (or both empty when already at target).
#[derive(Debug, Default)]
pub struct ScaleDelta {
    /// Freshly created `requested` records, already persisted.
    pub to_launch: Vec<Node>,
    /// Surplus nodes, newest first. Still in their previous states;
    /// the caller drives their termination.
    pub to_terminate: Vec<Node>,
}

/// Manages layer records and the shared infrastructure behind them.
#[derive(Clone)]
pub struct LayerManager {
    store: StateStore,
    executor: TaskExecutor,
    task_timeout: Duration,
}

impl LayerManager {
    pub fn new(store: StateStore, executor: TaskExecutor, task_timeout: Duration) -> Self {
        Self {
            store,
            executor,
            task_timeout,
        }
    }

    /// Bootstrap the layer's shared infrastructure if it has not been
    /// built yet. A no-op for a layer already `ready`; a failure
    /// returns the layer to `absent` without an automatic retry.
    pub async fn ensure_bootstrapped(&self, layer: &Layer) -> LifecycleResult<Layer> {
        match layer.bootstrap {
            BootstrapState::Ready => return Ok(layer.clone()),
            BootstrapState::Absent => {}
            // A stale in-flight marker from an interrupted run; rebuild.
            BootstrapState::Bootstrapping | BootstrapState::Destroying => {
                warn!(
                    layer = %layer_key(&layer.formation_id, &layer.name),
                    state = ?layer.bootstrap,
                    "re-bootstrapping layer left in-flight"
                );
            }
        }

        let mut layer = layer.clone();
        let key = layer_key(&layer.formation_id, &layer.name);

        layer.bootstrap = BootstrapState::Bootstrapping;
        layer.updated_at = epoch_secs();
        self.store.put_layer(&layer)?;

        let handle = self.executor.submit(Task::BuildLayer(BuildLayerRequest {
            layer_id: key.clone(),
            credentials: layer.credentials.clone(),
            params: layer.params.clone(),
        }));

        match self.executor.wait(handle, self.task_timeout).await {
            Ok(_) => {
                layer.bootstrap = BootstrapState::Ready;
                if layer.security_group.is_none() {
                    layer.security_group =
                        Some(format!("sg-{}-{}", layer.formation_id, layer.name));
                }
                layer.updated_at = epoch_secs();
                self.store.put_layer(&layer)?;
                info!(layer = %key, security_group = ?layer.security_group, "layer bootstrapped");
                Ok(layer)
            }
            Err(e) => {
                layer.bootstrap = BootstrapState::Absent;
                layer.updated_at = epoch_secs();
                self.store.put_layer(&layer)?;
                Err(LifecycleError::BootstrapFailed {
                    layer: key,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Compute and persist the changes needed to reach `target` nodes.
    ///
    /// Shortfall creates `requested` records with sequence numbers from
    /// the layer's counter, which never reuses a value. Surplus selects
    /// the newest nodes first and leaves their termination to the
    /// caller. Nodes already terminating do not count as live.
    pub fn scale(&self, layer: &Layer, target: u32) -> LifecycleResult<ScaleDelta> {
        let mut layer = layer.clone();
        let mut live: Vec<Node> = self
            .store
            .list_nodes_for_layer(&layer.formation_id, &layer.name)?
            .into_iter()
            .filter(|n| !matches!(n.state, NodeState::Terminating | NodeState::Terminated))
            .collect();

        let mut delta = ScaleDelta::default();
        let current = live.len() as u32;
        let now = epoch_secs();

        if current < target {
            for _ in current..target {
                let seq = layer.next_seq;
                layer.next_seq += 1;
                let node = Node {
                    id: format!("{}-{seq}", layer.name),
                    formation_id: layer.formation_id.clone(),
                    layer: layer.name.clone(),
                    seq,
                    state: NodeState::Requested,
                    provider_id: None,
                    fqdn: None,
                    metadata: Default::default(),
                    launch_attempts: 0,
                    converge_attempts: 0,
                    created_at: now,
                    updated_at: now,
                };
                self.store.put_node(&node)?;
                delta.to_launch.push(node);
            }
        } else if current > target {
            // Newest first, so long-lived nodes survive scale-down.
            live.sort_by(|a, b| b.seq.cmp(&a.seq));
            delta.to_terminate = live.into_iter().take((current - target) as usize).collect();
        }

        layer.target_count = target;
        layer.updated_at = now;
        self.store.put_layer(&layer)?;

        info!(
            layer = %layer_key(&layer.formation_id, &layer.name),
            target,
            launch = delta.to_launch.len(),
            terminate = delta.to_terminate.len(),
            "layer scale delta computed"
        );
        Ok(delta)
    }

    /// Tear down the layer's shared infrastructure and delete its
    /// record. Refused while any node record survives.
    pub async fn destroy(&self, layer: &Layer) -> LifecycleResult<()> {
        let key = layer_key(&layer.formation_id, &layer.name);
        let live = self
            .store
            .list_nodes_for_layer(&layer.formation_id, &layer.name)?
            .len() as u32;
        if live > 0 {
            return Err(LifecycleError::LayerNotEmpty { layer: key, live });
        }

        // Nothing was ever built; dropping the record is enough.
        if layer.bootstrap == BootstrapState::Absent {
            self.store.delete_layer(&layer.formation_id, &layer.name)?;
            return Ok(());
        }

        let mut layer = layer.clone();
        layer.bootstrap = BootstrapState::Destroying;
        layer.updated_at = epoch_secs();
        self.store.put_layer(&layer)?;

        let handle = self
            .executor
            .submit(Task::DestroyLayer(DestroyLayerRequest {
                layer_id: key.clone(),
                credentials: layer.credentials.clone(),
                params: layer.params.clone(),
            }));

        match self.executor.wait(handle, self.task_timeout).await {
            Ok(_) => {
                self.store.delete_layer(&layer.formation_id, &layer.name)?;
                info!(layer = %key, "layer destroyed");
                Ok(())
            }
            Err(e) => {
                layer.bootstrap = BootstrapState::Ready;
                layer.updated_at = epoch_secs();
                self.store.put_layer(&layer)?;
                Err(LifecycleError::DestroyFailed {
                    layer: key,
                    reason: e.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use flotilla_tasks::MockProvisioner;

    fn manager(mock: Arc<MockProvisioner>) -> (LayerManager, StateStore) {
        let store = StateStore::open_in_memory().unwrap();
        let manager = LayerManager::new(
            store.clone(),
            TaskExecutor::new(mock),
            Duration::from_secs(5),
        );
        (manager, store)
    }

    fn absent_layer(formation: &str, name: &str) -> Layer {
        Layer {
            formation_id: formation.to_string(),
            name: name.to_string(),
            flavor: "m1.medium".to_string(),
            provider: "ec2".to_string(),
            credentials: serde_json::json!({}),
            params: serde_json::json!({}),
            ssh_username: "ubuntu".to_string(),
            ssh_private_key: "KEY".to_string(),
            init_script: String::new(),
            security_group: None,
            bootstrap: BootstrapState::Absent,
            target_count: 0,
            next_seq: 1,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    #[tokio::test]
    async fn bootstrap_builds_once_and_assigns_security_group() {
        let mock = Arc::new(MockProvisioner::new());
        let (manager, store) = manager(mock.clone());
        let layer = absent_layer("myapp", "runtime");
        store.put_layer(&layer).unwrap();

        let ready = manager.ensure_bootstrapped(&layer).await.unwrap();
        assert_eq!(ready.bootstrap, BootstrapState::Ready);
        assert_eq!(ready.security_group.as_deref(), Some("sg-myapp-runtime"));

        // Second call is a no-op.
        manager.ensure_bootstrapped(&ready).await.unwrap();
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn scale_up_creates_requested_records() {
        let (manager, store) = manager(Arc::new(MockProvisioner::new()));
        let layer = absent_layer("myapp", "runtime");
        store.put_layer(&layer).unwrap();

        let delta = manager.scale(&layer, 3).unwrap();

        assert_eq!(delta.to_launch.len(), 3);
        assert!(delta.to_terminate.is_empty());
        let ids: Vec<_> = delta.to_launch.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["runtime-1", "runtime-2", "runtime-3"]);
        assert!(delta.to_launch.iter().all(|n| n.state == NodeState::Requested));

        let persisted = store.get_layer("myapp", "runtime").unwrap().unwrap();
        assert_eq!(persisted.target_count, 3);
        assert_eq!(persisted.next_seq, 4);
    }

    #[tokio::test]
    async fn scale_down_selects_newest_first() {
        let (manager, store) = manager(Arc::new(MockProvisioner::new()));
        let layer = absent_layer("myapp", "runtime");
        store.put_layer(&layer).unwrap();

        let up = manager.scale(&layer, 3).unwrap();
        assert_eq!(up.to_launch.len(), 3);

        let layer = store.get_layer("myapp", "runtime").unwrap().unwrap();
        let down = manager.scale(&layer, 1).unwrap();

        assert!(down.to_launch.is_empty());
        let ids: Vec<_> = down.to_terminate.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["runtime-3", "runtime-2"]);
    }

    #[tokio::test]
    async fn sequence_numbers_are_never_reused() {
        let (manager, store) = manager(Arc::new(MockProvisioner::new()));
        let layer = absent_layer("myapp", "runtime");
        store.put_layer(&layer).unwrap();

        manager.scale(&layer, 2).unwrap();
        // Drop both records (as termination would) and scale back up.
        store.delete_node("myapp", "runtime", 1).unwrap();
        store.delete_node("myapp", "runtime", 2).unwrap();

        let layer = store.get_layer("myapp", "runtime").unwrap().unwrap();
        let delta = manager.scale(&layer, 2).unwrap();
        let ids: Vec<_> = delta.to_launch.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["runtime-3", "runtime-4"]);
    }

    #[tokio::test]
    async fn scale_at_target_is_a_no_op() {
        let (manager, store) = manager(Arc::new(MockProvisioner::new()));
        let layer = absent_layer("myapp", "runtime");
        store.put_layer(&layer).unwrap();

        manager.scale(&layer, 2).unwrap();
        let layer = store.get_layer("myapp", "runtime").unwrap().unwrap();
        let delta = manager.scale(&layer, 2).unwrap();

        assert!(delta.to_launch.is_empty());
        assert!(delta.to_terminate.is_empty());
    }

    #[tokio::test]
    async fn destroy_refused_while_nodes_exist() {
        let (manager, store) = manager(Arc::new(MockProvisioner::new()));
        let layer = absent_layer("myapp", "runtime");
        store.put_layer(&layer).unwrap();
        manager.scale(&layer, 2).unwrap();

        let layer = store.get_layer("myapp", "runtime").unwrap().unwrap();
        let err = manager.destroy(&layer).await.unwrap_err();
        assert!(matches!(err, LifecycleError::LayerNotEmpty { live: 2, .. }));
    }

    #[tokio::test]
    async fn destroy_tears_down_bootstrapped_layer() {
        let mock = Arc::new(MockProvisioner::new());
        let (manager, store) = manager(mock.clone());
        let layer = absent_layer("myapp", "runtime");
        store.put_layer(&layer).unwrap();

        let ready = manager.ensure_bootstrapped(&layer).await.unwrap();
        manager.destroy(&ready).await.unwrap();

        assert!(store.get_layer("myapp", "runtime").unwrap().is_none());
        assert_eq!(
            mock.calls(),
            vec!["build_layer myapp/runtime", "destroy_layer myapp/runtime"]
        );
    }

    #[tokio::test]
    async fn destroy_of_absent_layer_skips_provider() {
        let mock = Arc::new(MockProvisioner::new());
        let (manager, store) = manager(mock.clone());
        let layer = absent_layer("myapp", "runtime");
        store.put_layer(&layer).unwrap();

        manager.destroy(&layer).await.unwrap();

        assert!(store.get_layer("myapp", "runtime").unwrap().is_none());
        assert_eq!(mock.call_count(), 0);
    }
}
