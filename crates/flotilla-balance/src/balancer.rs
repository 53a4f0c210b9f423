//! Least-loaded round-robin placement.
//!
//! Replicas are assigned one at a time to the node with the fewest
//! containers in this placement pass, ties broken by node id order.
//! Per process type no two nodes ever differ by more than one replica.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use flotilla_state::{ContainerAssignment, NodeId};

/// Placement errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BalanceError {
    /// Positive demand with zero running nodes.
    #[error("no running nodes to place {demand} container(s) on")]
    NoCapacity { demand: u32 },
}

/// Output of a balance pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementPlan {
    /// One entry per replica, ordered by (process type, replica index).
    pub assignments: Vec<ContainerAssignment>,
    /// Containers per node across all process types.
    pub per_node: BTreeMap<NodeId, u32>,
}

impl PlacementPlan {
    /// Containers of one process type on one node.
    pub fn count_on(&self, process_type: &str, node_id: &str) -> u32 {
        self.assignments
            .iter()
            .filter(|a| a.process_type == process_type && a.node_id == node_id)
            .count() as u32
    }
}

/// Distribute the desired replicas across the running nodes.
///
/// `process_counts` maps process type → desired replica count. Fails
/// with [`BalanceError::NoCapacity`] when there is demand but no node
/// to place it on; zero demand over zero nodes is an empty plan.
pub fn balance(
    nodes_running: &[NodeId],
    process_counts: &BTreeMap<String, u32>,
) -> Result<PlacementPlan, BalanceError> {
    let demand: u32 = process_counts.values().sum();

    if nodes_running.is_empty() {
        if demand > 0 {
            return Err(BalanceError::NoCapacity { demand });
        }
        return Ok(PlacementPlan {
            assignments: Vec::new(),
            per_node: BTreeMap::new(),
        });
    }

    // Sorted node list gives deterministic tie-breaking; the min-scan
    // below prefers the earlier (lexicographically smaller) id on ties.
    let mut nodes: Vec<NodeId> = nodes_running.to_vec();
    nodes.sort();
    nodes.dedup();

    let mut loads: Vec<u32> = vec![0; nodes.len()];
    let mut assignments = Vec::with_capacity(demand as usize);

    // BTreeMap iteration keeps process types in stable order.
    for (process_type, &count) in process_counts {
        for num in 1..=count {
            let mut target = 0;
            for (i, load) in loads.iter().enumerate() {
                if *load < loads[target] {
                    target = i;
                }
            }
            loads[target] += 1;
            assignments.push(ContainerAssignment {
                process_type: process_type.clone(),
                num,
                node_id: nodes[target].clone(),
            });
        }
    }

    debug!(
        nodes = nodes.len(),
        containers = assignments.len(),
        "placement computed"
    );

    let per_node: BTreeMap<NodeId, u32> = nodes.into_iter().zip(loads).collect();

    Ok(PlacementPlan {
        assignments,
        per_node,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(ids: &[&str]) -> Vec<NodeId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn counts(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn even_split_across_three_nodes() {
        let plan = balance(&nodes(&["n1", "n2", "n3"]), &counts(&[("web", 6)])).unwrap();

        for node in ["n1", "n2", "n3"] {
            assert_eq!(plan.count_on("web", node), 2);
        }
        assert_eq!(plan.assignments.len(), 6);
    }

    #[test]
    fn uneven_split_differs_by_at_most_one() {
        let plan = balance(&nodes(&["n1", "n2", "n3", "n4"]), &counts(&[("web", 6)])).unwrap();

        let mut per_node: Vec<u32> = ["n1", "n2", "n3", "n4"]
            .iter()
            .map(|n| plan.count_on("web", n))
            .collect();
        per_node.sort_unstable();
        assert_eq!(per_node, vec![1, 1, 2, 2]);
    }

    #[test]
    fn no_capacity_with_demand_and_zero_nodes() {
        let err = balance(&[], &counts(&[("web", 1)])).unwrap_err();
        assert_eq!(err, BalanceError::NoCapacity { demand: 1 });
    }

    #[test]
    fn zero_demand_over_zero_nodes_is_empty() {
        let plan = balance(&[], &counts(&[])).unwrap();
        assert!(plan.assignments.is_empty());
    }

    #[test]
    fn zero_count_process_type_places_nothing() {
        let plan = balance(&nodes(&["n1"]), &counts(&[("web", 0)])).unwrap();
        assert!(plan.assignments.is_empty());
    }

    #[test]
    fn deterministic_for_same_inputs() {
        let n = nodes(&["n2", "n1", "n3"]);
        let c = counts(&[("web", 5), ("worker", 2)]);

        let a = balance(&n, &c).unwrap();
        let b = balance(&n, &c).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn node_order_does_not_matter() {
        let c = counts(&[("web", 5)]);

        let a = balance(&nodes(&["n1", "n2", "n3"]), &c).unwrap();
        let b = balance(&nodes(&["n3", "n1", "n2"]), &c).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn multiple_process_types_share_load() {
        let plan = balance(
            &nodes(&["n1", "n2"]),
            &counts(&[("web", 2), ("worker", 2)]),
        )
        .unwrap();

        // Four containers over two nodes: two each.
        assert_eq!(plan.per_node["n1"], 2);
        assert_eq!(plan.per_node["n2"], 2);
        // And each type is itself spread.
        assert_eq!(plan.count_on("web", "n1"), 1);
        assert_eq!(plan.count_on("worker", "n2"), 1);
    }

    #[test]
    fn replica_indices_are_one_based_and_dense() {
        let plan = balance(&nodes(&["n1", "n2"]), &counts(&[("web", 3)])).unwrap();

        let mut nums: Vec<u32> = plan
            .assignments
            .iter()
            .filter(|a| a.process_type == "web")
            .map(|a| a.num)
            .collect();
        nums.sort_unstable();
        assert_eq!(nums, vec![1, 2, 3]);
    }

    #[test]
    fn single_node_takes_everything() {
        let plan = balance(&nodes(&["solo"]), &counts(&[("web", 4), ("worker", 1)])).unwrap();
        assert_eq!(plan.per_node["solo"], 5);
    }
}
