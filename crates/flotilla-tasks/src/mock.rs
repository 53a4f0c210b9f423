//! MockProvisioner — deterministic in-process provisioner.
//!
//! Assigns `i-`-style provider identifiers and a mock fqdn, records
//! every call, and supports per-node failure injection. Used by tests
//! and by the daemon's standalone mode.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::provisioner::*;

/// In-process provisioner with deterministic results.
pub struct MockProvisioner {
    instance_counter: AtomicU64,
    fail_launch: Mutex<HashSet<String>>,
    fail_converge: Mutex<HashSet<String>>,
    fail_terminate: Mutex<HashSet<String>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self {
            instance_counter: AtomicU64::new(1),
            fail_launch: Mutex::new(HashSet::new()),
            fail_converge: Mutex::new(HashSet::new()),
            fail_terminate: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Delay every operation (for timeout and concurrency tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every launch for `node_id` fail.
    pub fn fail_launch(&self, node_id: &str) {
        self.fail_launch.lock().unwrap().insert(node_id.to_string());
    }

    /// Make every convergence for `node_id` exit non-zero.
    pub fn fail_converge(&self, node_id: &str) {
        self.fail_converge.lock().unwrap().insert(node_id.to_string());
    }

    /// Make every terminate for `node_id` fail.
    pub fn fail_terminate(&self, node_id: &str) {
        self.fail_terminate.lock().unwrap().insert(node_id.to_string());
    }

    /// Clear a launch failure injection (node recovers).
    pub fn heal_launch(&self, node_id: &str) {
        self.fail_launch.lock().unwrap().remove(node_id);
    }

    /// Clear a terminate failure injection.
    pub fn heal_terminate(&self, node_id: &str) {
        self.fail_terminate.lock().unwrap().remove(node_id);
    }

    /// Every operation performed so far, as `"{op} {id}"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of operations performed so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, op: &str, id: &str) {
        self.calls.lock().unwrap().push(format!("{op} {id}"));
    }

    async fn pause(delay: Option<Duration>) {
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
    }
}

impl Default for MockProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Provisioner for MockProvisioner {
    fn build_layer(&self, req: BuildLayerRequest) -> BoxFuture<Result<(), ProvisionError>> {
        self.record("build_layer", &req.layer_id);
        let delay = self.delay;
        Box::pin(async move {
            Self::pause(delay).await;
            Ok(())
        })
    }

    fn destroy_layer(&self, req: DestroyLayerRequest) -> BoxFuture<Result<(), ProvisionError>> {
        self.record("destroy_layer", &req.layer_id);
        let delay = self.delay;
        Box::pin(async move {
            Self::pause(delay).await;
            Ok(())
        })
    }

    fn launch_node(
        &self,
        req: LaunchNodeRequest,
    ) -> BoxFuture<Result<LaunchedNode, ProvisionError>> {
        self.record("launch_node", &req.node_id);
        let fail = self.fail_launch.lock().unwrap().contains(&req.node_id);
        let n = self.instance_counter.fetch_add(1, Ordering::Relaxed);
        let delay = self.delay;
        Box::pin(async move {
            Self::pause(delay).await;
            if fail {
                return Err(ProvisionError(format!(
                    "provider rejected launch of {}",
                    req.node_id
                )));
            }
            Ok(LaunchedNode {
                provider_id: format!("i-{n:07}"),
                metadata: BTreeMap::from([("state".to_string(), "running".to_string())]),
                fqdn: format!("{}.flotilla.local", req.node_id),
            })
        })
    }

    fn terminate_node(&self, req: TerminateNodeRequest) -> BoxFuture<Result<(), ProvisionError>> {
        self.record("terminate_node", &req.node_id);
        let fail = self.fail_terminate.lock().unwrap().contains(&req.node_id);
        let delay = self.delay;
        Box::pin(async move {
            Self::pause(delay).await;
            if fail {
                return Err(ProvisionError(format!(
                    "provider refused to terminate {}",
                    req.provider_id
                )));
            }
            Ok(())
        })
    }

    fn converge_node(
        &self,
        req: ConvergeNodeRequest,
    ) -> BoxFuture<Result<ConvergeOutput, ProvisionError>> {
        self.record("converge_node", &req.node_id);
        let fail = self.fail_converge.lock().unwrap().contains(&req.node_id);
        let delay = self.delay;
        Box::pin(async move {
            Self::pause(delay).await;
            if fail {
                return Ok(ConvergeOutput {
                    output: "chef-client failed".to_string(),
                    exit_code: 1,
                });
            }
            Ok(ConvergeOutput {
                output: String::new(),
                exit_code: 0,
            })
        })
    }
}
