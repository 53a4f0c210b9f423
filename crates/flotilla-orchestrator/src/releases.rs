//! Release bookkeeping: builds, config writes, rollback.
//!
//! Every mutation cuts a new immutable release; history is append-only
//! and versions stay gapless because the store allocates them inside
//! the insert transaction.

use std::collections::BTreeMap;

use tracing::info;

use flotilla_state::{Build, Release};

use crate::engine::{Orchestrator, epoch_secs};
use crate::error::{OrchestratorError, OrchestratorResult};

/// Input for a new build.
#[derive(Debug, Clone)]
pub struct NewBuild {
    pub image: String,
    /// Process type → command.
    pub procfile: BTreeMap<String, String>,
    pub sha: String,
    pub owner: String,
}

impl Orchestrator {
    /// Append a build and cut a release pairing it with the current
    /// config (empty for a formation's first release).
    pub fn create_build(
        &self,
        formation_id: &str,
        new: NewBuild,
    ) -> OrchestratorResult<(Build, Release)> {
        self.require_formation(formation_id)?;

        let build = self.store().append_build(Build {
            formation_id: formation_id.to_string(),
            seq: 0, // allocated by the store
            image: new.image,
            procfile: new.procfile,
            sha: new.sha,
            owner: new.owner,
            created_at: epoch_secs(),
        })?;

        let config = self
            .store()
            .current_release(formation_id)?
            .map(|r| r.config)
            .unwrap_or_default();

        let release = self.store().append_release(Release {
            formation_id: formation_id.to_string(),
            version: 0, // allocated by the store
            build_seq: build.seq,
            config,
            created_at: epoch_secs(),
        })?;

        info!(
            formation = %formation_id,
            build = build.seq,
            version = release.version,
            "build released"
        );
        Ok((build, release))
    }

    /// Merge config updates (`None` deletes a key) and cut a release
    /// against the current build. Requires at least one prior release.
    pub fn set_config(
        &self,
        formation_id: &str,
        updates: BTreeMap<String, Option<String>>,
    ) -> OrchestratorResult<Release> {
        self.require_formation(formation_id)?;

        let current = self.store().current_release(formation_id)?.ok_or_else(|| {
            OrchestratorError::NotFound {
                kind: "release",
                id: format!("{formation_id} (no build yet)"),
            }
        })?;

        let mut config = current.config;
        for (key, value) in updates {
            match value {
                Some(value) => {
                    config.insert(key, value);
                }
                None => {
                    config.remove(&key);
                }
            }
        }

        let release = self.store().append_release(Release {
            formation_id: formation_id.to_string(),
            version: 0,
            build_seq: current.build_seq,
            config,
            created_at: epoch_secs(),
        })?;

        info!(formation = %formation_id, version = release.version, "config released");
        Ok(release)
    }

    /// Copy an older release's build and config into a new release.
    /// History is never mutated; the rollback is itself a new version.
    pub fn rollback(&self, formation_id: &str, version: u32) -> OrchestratorResult<Release> {
        self.require_formation(formation_id)?;

        let source = self
            .store()
            .get_release(formation_id, version)?
            .ok_or_else(|| OrchestratorError::NotFound {
                kind: "release",
                id: format!("{formation_id} v{version}"),
            })?;

        let release = self.store().append_release(Release {
            formation_id: formation_id.to_string(),
            version: 0,
            build_seq: source.build_seq,
            config: source.config,
            created_at: epoch_secs(),
        })?;

        info!(
            formation = %formation_id,
            from = version,
            version = release.version,
            "rolled back"
        );
        Ok(release)
    }

    fn require_formation(&self, id: &str) -> OrchestratorResult<()> {
        self.store()
            .get_formation(id)?
            .map(|_| ())
            .ok_or_else(|| OrchestratorError::NotFound {
                kind: "formation",
                id: id.to_string(),
            })
    }
}
