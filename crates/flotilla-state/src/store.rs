//! StateStore — redb-backed state persistence for Flotilla.
//!
//! Provides typed CRUD operations over formations, layers, nodes, builds,
//! releases, and placements. All values are JSON-serialized into redb's
//! `&[u8]` value columns. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(FORMATIONS).map_err(map_err!(Table))?;
        txn.open_table(LAYERS).map_err(map_err!(Table))?;
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.open_table(BUILDS).map_err(map_err!(Table))?;
        txn.open_table(RELEASES).map_err(map_err!(Table))?;
        txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Formations ─────────────────────────────────────────────────

    /// Insert or update a formation.
    pub fn put_formation(&self, formation: &Formation) -> StateResult<()> {
        let value = serde_json::to_vec(formation).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(FORMATIONS).map_err(map_err!(Table))?;
            table
                .insert(formation.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(formation = %formation.id, "formation stored");
        Ok(())
    }

    /// Get a formation by id.
    pub fn get_formation(&self, id: &str) -> StateResult<Option<Formation>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(FORMATIONS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let formation: Formation =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(formation))
            }
            None => Ok(None),
        }
    }

    /// List all formations.
    pub fn list_formations(&self) -> StateResult<Vec<Formation>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(FORMATIONS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let formation: Formation =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(formation);
        }
        Ok(results)
    }

    /// Delete a formation by id. Returns true if it existed.
    pub fn delete_formation(&self, id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(FORMATIONS).map_err(map_err!(Table))?;
            existed = table.remove(id).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(formation = %id, existed, "formation deleted");
        Ok(existed)
    }

    // ── Layers ─────────────────────────────────────────────────────

    /// Insert or update a layer.
    pub fn put_layer(&self, layer: &Layer) -> StateResult<()> {
        let key = layer.table_key();
        let value = serde_json::to_vec(layer).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(LAYERS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a layer by formation id and layer name.
    pub fn get_layer(&self, formation_id: &str, name: &str) -> StateResult<Option<Layer>> {
        let key = layer_key(formation_id, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LAYERS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let layer: Layer =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(layer))
            }
            None => Ok(None),
        }
    }

    /// List all layers of a formation.
    pub fn list_layers(&self, formation_id: &str) -> StateResult<Vec<Layer>> {
        let prefix = format!("{formation_id}/");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LAYERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let layer: Layer =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(layer);
            }
        }
        Ok(results)
    }

    /// Delete a layer. Returns true if it existed.
    pub fn delete_layer(&self, formation_id: &str, name: &str) -> StateResult<bool> {
        let key = layer_key(formation_id, name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(LAYERS).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Nodes ──────────────────────────────────────────────────────

    /// Insert or update a node.
    pub fn put_node(&self, node: &Node) -> StateResult<()> {
        let key = node.table_key();
        let value = serde_json::to_vec(node).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a node by formation, layer, and sequence number.
    pub fn get_node(&self, formation_id: &str, layer: &str, seq: u32) -> StateResult<Option<Node>> {
        let key = node_key(formation_id, layer, seq);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let node: Node =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// List all nodes in a layer, in creation order (oldest first).
    pub fn list_nodes_for_layer(&self, formation_id: &str, layer: &str) -> StateResult<Vec<Node>> {
        self.scan_nodes(&format!("{formation_id}/{layer}:"))
    }

    /// List all nodes of a formation, in creation order per layer.
    pub fn list_nodes(&self, formation_id: &str) -> StateResult<Vec<Node>> {
        self.scan_nodes(&format!("{formation_id}/"))
    }

    fn scan_nodes(&self, prefix: &str) -> StateResult<Vec<Node>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(prefix) {
                let node: Node =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(node);
            }
        }
        Ok(results)
    }

    /// Delete a node record. Returns true if it existed.
    pub fn delete_node(&self, formation_id: &str, layer: &str, seq: u32) -> StateResult<bool> {
        let key = node_key(formation_id, layer, seq);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(formation = %formation_id, layer = %layer, seq, existed, "node deleted");
        Ok(existed)
    }

    // ── Builds ─────────────────────────────────────────────────────

    /// Append a build, allocating the next sequence number for its
    /// formation. Returns the stored build. Builds are append-only.
    pub fn append_build(&self, build: Build) -> StateResult<Build> {
        let prefix = format!("{}:", build.formation_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(BUILDS).map_err(map_err!(Table))?;
            let next = next_in_prefix(&table, &prefix)?;
            stored = Build { seq: next, ..build };
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(stored.table_key().as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(formation = %stored.formation_id, seq = stored.seq, "build appended");
        Ok(stored)
    }

    /// Get a build by formation id and sequence number.
    pub fn get_build(&self, formation_id: &str, seq: u32) -> StateResult<Option<Build>> {
        let key = format!("{formation_id}:{seq:08}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BUILDS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let build: Build =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(build))
            }
            None => Ok(None),
        }
    }

    /// List all builds for a formation, in creation order.
    pub fn list_builds(&self, formation_id: &str) -> StateResult<Vec<Build>> {
        let prefix = format!("{formation_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(BUILDS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let build: Build =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(build);
            }
        }
        Ok(results)
    }

    // ── Releases ───────────────────────────────────────────────────

    /// Append a release, allocating the next version for its formation.
    /// Versions start at 1 and are strictly increasing with no gaps
    /// because allocation and insert share one write transaction.
    pub fn append_release(&self, release: Release) -> StateResult<Release> {
        let prefix = format!("{}:", release.formation_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let stored;
        {
            let mut table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
            let next = next_in_prefix(&table, &prefix)?;
            stored = Release {
                version: next,
                ..release
            };
            let value = serde_json::to_vec(&stored).map_err(map_err!(Serialize))?;
            table
                .insert(stored.table_key().as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(formation = %stored.formation_id, version = stored.version, "release appended");
        Ok(stored)
    }

    /// Get a release by formation id and version.
    pub fn get_release(&self, formation_id: &str, version: u32) -> StateResult<Option<Release>> {
        let key = format!("{formation_id}:{version:08}");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let release: Release =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(release))
            }
            None => Ok(None),
        }
    }

    /// List all releases for a formation, oldest first.
    pub fn list_releases(&self, formation_id: &str) -> StateResult<Vec<Release>> {
        let prefix = format!("{formation_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RELEASES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let release: Release =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(release);
            }
        }
        Ok(results)
    }

    /// Get the current (highest-version) release for a formation.
    pub fn current_release(&self, formation_id: &str) -> StateResult<Option<Release>> {
        Ok(self.list_releases(formation_id)?.pop())
    }

    // ── Placements ─────────────────────────────────────────────────

    /// Record the formation's authoritative container placement.
    pub fn put_placement(&self, placement: &Placement) -> StateResult<()> {
        let value = serde_json::to_vec(placement).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
            table
                .insert(placement.formation_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get the recorded placement for a formation.
    pub fn get_placement(&self, formation_id: &str) -> StateResult<Option<Placement>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
        match table.get(formation_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let placement: Placement =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(placement))
            }
            None => Ok(None),
        }
    }

    /// Delete the recorded placement. Returns true if one existed.
    pub fn delete_placement(&self, formation_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(PLACEMENTS).map_err(map_err!(Table))?;
            existed = table
                .remove(formation_id)
                .map_err(map_err!(Write))?
                .is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

/// Next sequence number within a key prefix: highest existing + 1,
/// starting at 1. Keys must end in a zero-padded number so key order
/// matches numeric order.
fn next_in_prefix<T: ReadableTable<&'static str, &'static [u8]>>(
    table: &T,
    prefix: &str,
) -> StateResult<u32> {
    let mut max = 0u32;
    for entry in table.iter().map_err(map_err!(Read))? {
        let (key, _) = entry.map_err(map_err!(Read))?;
        let key = key.value();
        if let Some(rest) = key.strip_prefix(prefix) {
            if let Ok(n) = rest.parse::<u32>() {
                max = max.max(n);
            }
        }
    }
    Ok(max + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn test_formation(id: &str) -> Formation {
        Formation {
            id: id.to_string(),
            owner: "alice".to_string(),
            process_targets: BTreeMap::new(),
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_layer(formation: &str, name: &str) -> Layer {
        Layer {
            formation_id: formation.to_string(),
            name: name.to_string(),
            flavor: "m1.medium".to_string(),
            provider: "ec2".to_string(),
            credentials: serde_json::json!({}),
            params: serde_json::json!({"region": "us-west-2"}),
            ssh_username: "ubuntu".to_string(),
            ssh_private_key: "KEY".to_string(),
            init_script: "#!/bin/sh\n".to_string(),
            security_group: None,
            bootstrap: BootstrapState::Absent,
            target_count: 0,
            next_seq: 1,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_node(formation: &str, layer: &str, seq: u32) -> Node {
        Node {
            id: format!("{layer}-{seq}"),
            formation_id: formation.to_string(),
            layer: layer.to_string(),
            seq,
            state: NodeState::Requested,
            provider_id: None,
            fqdn: None,
            metadata: BTreeMap::new(),
            launch_attempts: 0,
            converge_attempts: 0,
            created_at: 1000 + u64::from(seq),
            updated_at: 1000 + u64::from(seq),
        }
    }

    fn test_build(formation: &str) -> Build {
        Build {
            formation_id: formation.to_string(),
            seq: 0,
            image: "registry.local/myapp:v1".to_string(),
            procfile: BTreeMap::from([("web".to_string(), "./run".to_string())]),
            sha: "abc123".to_string(),
            owner: "alice".to_string(),
            created_at: 1000,
        }
    }

    // ── Formation CRUD ─────────────────────────────────────────────

    #[test]
    fn formation_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let formation = test_formation("myapp");

        store.put_formation(&formation).unwrap();
        let retrieved = store.get_formation("myapp").unwrap();

        assert_eq!(retrieved, Some(formation));
    }

    #[test]
    fn formation_get_nonexistent_returns_none() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.get_formation("nope").unwrap().is_none());
    }

    #[test]
    fn formation_list_and_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_formation(&test_formation("a")).unwrap();
        store.put_formation(&test_formation("b")).unwrap();

        assert_eq!(store.list_formations().unwrap().len(), 2);
        assert!(store.delete_formation("a").unwrap());
        assert!(!store.delete_formation("a").unwrap());
        assert_eq!(store.list_formations().unwrap().len(), 1);
    }

    // ── Layer CRUD ─────────────────────────────────────────────────

    #[test]
    fn layer_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let layer = test_layer("myapp", "runtime");

        store.put_layer(&layer).unwrap();
        let retrieved = store.get_layer("myapp", "runtime").unwrap();

        assert_eq!(retrieved, Some(layer));
    }

    #[test]
    fn layer_list_scoped_to_formation() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_layer(&test_layer("app1", "runtime")).unwrap();
        store.put_layer(&test_layer("app1", "proxy")).unwrap();
        store.put_layer(&test_layer("app2", "runtime")).unwrap();

        assert_eq!(store.list_layers("app1").unwrap().len(), 2);
        assert_eq!(store.list_layers("app2").unwrap().len(), 1);
    }

    #[test]
    fn layer_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_layer(&test_layer("myapp", "runtime")).unwrap();

        assert!(store.delete_layer("myapp", "runtime").unwrap());
        assert!(store.get_layer("myapp", "runtime").unwrap().is_none());
    }

    // ── Node CRUD ──────────────────────────────────────────────────

    #[test]
    fn node_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let node = test_node("myapp", "runtime", 1);

        store.put_node(&node).unwrap();
        let retrieved = store.get_node("myapp", "runtime", 1).unwrap();

        assert_eq!(retrieved, Some(node));
    }

    #[test]
    fn nodes_listed_in_creation_order() {
        let store = StateStore::open_in_memory().unwrap();
        // Insert out of order; zero-padded keys restore creation order.
        for seq in [3, 1, 2] {
            store.put_node(&test_node("myapp", "runtime", seq)).unwrap();
        }

        let nodes = store.list_nodes_for_layer("myapp", "runtime").unwrap();
        let seqs: Vec<u32> = nodes.iter().map(|n| n.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[test]
    fn node_list_scoped_to_layer() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("myapp", "runtime", 1)).unwrap();
        store.put_node(&test_node("myapp", "proxy", 1)).unwrap();

        assert_eq!(store.list_nodes_for_layer("myapp", "runtime").unwrap().len(), 1);
        assert_eq!(store.list_nodes("myapp").unwrap().len(), 2);
    }

    #[test]
    fn node_delete() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_node(&test_node("myapp", "runtime", 1)).unwrap();

        assert!(store.delete_node("myapp", "runtime", 1).unwrap());
        assert!(store.get_node("myapp", "runtime", 1).unwrap().is_none());
    }

    // ── Builds ─────────────────────────────────────────────────────

    #[test]
    fn builds_get_sequential_numbers() {
        let store = StateStore::open_in_memory().unwrap();

        let b1 = store.append_build(test_build("myapp")).unwrap();
        let b2 = store.append_build(test_build("myapp")).unwrap();

        assert_eq!(b1.seq, 1);
        assert_eq!(b2.seq, 2);
        assert_eq!(store.list_builds("myapp").unwrap().len(), 2);
    }

    #[test]
    fn build_sequences_are_per_formation() {
        let store = StateStore::open_in_memory().unwrap();

        let a = store.append_build(test_build("app1")).unwrap();
        let b = store.append_build(test_build("app2")).unwrap();

        assert_eq!(a.seq, 1);
        assert_eq!(b.seq, 1);
    }

    // ── Releases ───────────────────────────────────────────────────

    #[test]
    fn release_versions_start_at_one_and_are_gapless() {
        let store = StateStore::open_in_memory().unwrap();

        for _ in 0..5 {
            store
                .append_release(Release {
                    formation_id: "myapp".to_string(),
                    version: 0,
                    build_seq: 1,
                    config: BTreeMap::new(),
                    created_at: 1000,
                })
                .unwrap();
        }

        let versions: Vec<u32> = store
            .list_releases("myapp")
            .unwrap()
            .iter()
            .map(|r| r.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn current_release_is_highest_version() {
        let store = StateStore::open_in_memory().unwrap();

        for build_seq in [1, 2, 3] {
            store
                .append_release(Release {
                    formation_id: "myapp".to_string(),
                    version: 0,
                    build_seq,
                    config: BTreeMap::new(),
                    created_at: 1000,
                })
                .unwrap();
        }

        let current = store.current_release("myapp").unwrap().unwrap();
        assert_eq!(current.version, 3);
        assert_eq!(current.build_seq, 3);
    }

    #[test]
    fn current_release_none_when_empty() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(store.current_release("myapp").unwrap().is_none());
    }

    // ── Placements ─────────────────────────────────────────────────

    #[test]
    fn placement_put_get_delete() {
        let store = StateStore::open_in_memory().unwrap();
        let placement = Placement {
            formation_id: "myapp".to_string(),
            release_version: 1,
            assignments: vec![ContainerAssignment {
                process_type: "web".to_string(),
                num: 1,
                node_id: "runtime-1".to_string(),
            }],
            updated_at: 1000,
        };

        store.put_placement(&placement).unwrap();
        assert_eq!(store.get_placement("myapp").unwrap(), Some(placement));
        assert!(store.delete_placement("myapp").unwrap());
        assert!(store.get_placement("myapp").unwrap().is_none());
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store.put_formation(&test_formation("myapp")).unwrap();
            store.append_build(test_build("myapp")).unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_formation("myapp").unwrap().is_some());
        // Sequence allocation continues where it left off.
        let next = store.append_build(test_build("myapp")).unwrap();
        assert_eq!(next.seq, 2);
    }

    // ── Edge cases ─────────────────────────────────────────────────

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_formations().unwrap().is_empty());
        assert!(store.list_layers("any").unwrap().is_empty());
        assert!(store.list_nodes("any").unwrap().is_empty());
        assert!(store.list_builds("any").unwrap().is_empty());
        assert!(store.list_releases("any").unwrap().is_empty());
        assert!(!store.delete_formation("nope").unwrap());
        assert!(!store.delete_node("nope", "x", 1).unwrap());
        assert!(!store.delete_placement("nope").unwrap());
    }
}
