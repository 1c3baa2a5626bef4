//! Durable snapshot/restore of grove state (C14).
//!
//! Grounded on `dashflow::checkpoint::FileCheckpointer`: a directory-
//! addressed store, atomic temp-file-then-rename writes, and
//! corrupt-file-is-skipped-not-fatal semantics for `list_checkpoints()`.
//! Two departures from the teacher, both required by spec.md §6: the
//! on-disk format here is JSON (the wire format this crate emits is
//! itself textual, so checkpoints stay consistent with it and with
//! spec.md's explicit JSON schema), and a grove has exactly one
//! thread-of-control, so the teacher's cross-process file lock and
//! CRC32 integrity envelope are not carried over (see DESIGN.md).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::Value;
use crate::tree::TreeEngine;

/// Per-node state captured by a checkpoint: `(agent_id, role,
/// facts:{topic:[value,version]}, local_version, correlation_state)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub agent_id: String,
    pub role: String,
    pub facts: IndexMap<String, (Value, i64)>,
    pub local_version: i64,
    pub correlation_state: HashMap<String, String>,
}

/// The full JSON document of §6: `checkpoint_id`, `task`, `timestamp`,
/// `agents_run`, `current_level`, `total_levels`, `node_snapshots`,
/// `messages` (minified SAG strings).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub checkpoint_id: String,
    pub task: String,
    pub timestamp: f64,
    pub agents_run: usize,
    pub current_level: usize,
    pub total_levels: usize,
    pub node_snapshots: IndexMap<String, NodeSnapshot>,
    pub messages: Vec<String>,
}

/// A filesystem directory addressed by checkpoint id.
pub struct CheckpointManager {
    directory: PathBuf,
}

impl CheckpointManager {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        CheckpointManager {
            directory: directory.into(),
        }
    }

    fn path_for(&self, checkpoint_id: &str) -> PathBuf {
        self.directory.join(format!("{checkpoint_id}.json"))
    }

    /// Snapshots every node's facts, local version, and correlation state,
    /// plus the current level/task/minified message log, and writes it as
    /// one JSON document.
    #[allow(clippy::too_many_arguments)]
    pub async fn save(
        &self,
        tree: &TreeEngine,
        task: &str,
        messages: &[String],
        agents_run: usize,
        current_level: usize,
        total_levels: usize,
        timestamp: i64,
    ) -> Result<CheckpointMeta, StoreError> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let mut node_snapshots = IndexMap::new();
        for agent_id in tree.get_all_node_ids() {
            let node = tree
                .get_node(&agent_id)
                .expect("id came from tree.get_all_node_ids()");
            node_snapshots.insert(
                agent_id.clone(),
                NodeSnapshot {
                    agent_id: agent_id.clone(),
                    role: node.role.clone(),
                    facts: node.knowledge.get_all_facts().clone(),
                    local_version: node.knowledge.get_local_version(),
                    correlation_state: node.correlation.get_state(),
                },
            );
        }

        let meta = CheckpointMeta {
            checkpoint_id: generate_checkpoint_id(),
            task: task.to_string(),
            timestamp: timestamp as f64,
            agents_run,
            current_level,
            total_levels,
            node_snapshots,
            messages: messages.to_vec(),
        };

        let data = serde_json::to_vec_pretty(&meta)?;
        atomic_write(&self.path_for(&meta.checkpoint_id), &data).await?;
        debug!(checkpoint_id = %meta.checkpoint_id, "checkpoint saved");
        Ok(meta)
    }

    /// `CHECKPOINT_NOT_FOUND` when the id has no file.
    pub async fn load(&self, checkpoint_id: &str) -> Result<CheckpointMeta, StoreError> {
        let path = self.path_for(checkpoint_id);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|_| StoreError::CheckpointNotFound(checkpoint_id.to_string()))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Walks node snapshots and, for each node still present in `tree`,
    /// restores `KnowledgeEngine`/`CorrelationEngine` state. Snapshots of
    /// nodes no longer present in the live tree are skipped silently
    /// (spec.md §9 leaves whether this should be an error unresolved; we
    /// keep the skip but log it so it stays observable).
    pub fn restore(&self, meta: &CheckpointMeta, tree: &mut TreeEngine) {
        for (agent_id, snapshot) in &meta.node_snapshots {
            let Some(node) = tree.get_node_mut(agent_id) else {
                debug!(agent_id = %agent_id, "restore: snapshot references a node no longer in the tree, skipping");
                continue;
            };
            node.knowledge
                .load_state(snapshot.facts.clone(), snapshot.local_version);
            node.correlation.load_state(&snapshot.correlation_state);
        }
    }

    /// Scans the directory and returns checkpoints sorted by timestamp.
    /// A corrupt JSON file is skipped (with a `warn!`), not fatal.
    pub async fn list_checkpoints(&self) -> Result<Vec<CheckpointMeta>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut checkpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read(&path).await {
                Ok(data) => match serde_json::from_slice::<CheckpointMeta>(&data) {
                    Ok(meta) => checkpoints.push(meta),
                    Err(e) => warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping corrupt checkpoint file"
                    ),
                },
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "skipping unreadable checkpoint file"
                ),
            }
        }

        checkpoints.sort_by(|a, b| {
            a.timestamp
                .partial_cmp(&b.timestamp)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(checkpoints)
    }

    /// Idempotent: deleting a missing id is not an error.
    pub async fn delete(&self, checkpoint_id: &str) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(checkpoint_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }
}

fn generate_checkpoint_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..12)
        .map(|_| std::char::from_digit(rng.gen_range(0..16u8) as u32, 16).unwrap())
        .collect();
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("cp-{millis:x}-{suffix}")
}

/// Write to a temp file, fsync, then atomically rename into place, so a
/// partial write is never visible to `load`/`list_checkpoints`.
async fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let temp_path = path.with_extension("json.tmp");
    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    fn sample_tree() -> TreeEngine {
        let mut tree = TreeEngine::new();
        tree.add_root("root", "coordinator").unwrap();
        tree.add_child("root", "w1", "worker").unwrap();
        tree
    }

    #[tokio::test]
    async fn save_then_load_round_trips_facts_and_version() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        let mut tree = sample_tree();
        tree.get_node_mut("w1")
            .unwrap()
            .knowledge
            .assert_fact("worker.status", Value::String("done".into()));

        let meta = mgr
            .save(&tree, "task", &[], 1, 0, 2, 1_700_000_000)
            .await
            .unwrap();
        let loaded = mgr.load(&meta.checkpoint_id).await.unwrap();

        let snap = &loaded.node_snapshots["w1"];
        assert_eq!(snap.local_version, 1);
        assert_eq!(
            snap.facts.get("worker.status").unwrap().0,
            Value::String("done".into())
        );
    }

    #[tokio::test]
    async fn load_missing_checkpoint_errors() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        let err = mgr.load("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::CheckpointNotFound(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn restore_applies_snapshot_and_skips_unknown_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        let mut tree = sample_tree();
        tree.get_node_mut("w1")
            .unwrap()
            .knowledge
            .assert_fact("a", Value::Int(1));
        let meta = mgr.save(&tree, "task", &[], 1, 0, 2, 0).await.unwrap();

        tree.get_node_mut("w1")
            .unwrap()
            .knowledge
            .assert_fact("a", Value::Int(2));
        assert_eq!(tree.get_node("w1").unwrap().knowledge.get_local_version(), 2);

        mgr.restore(&meta, &mut tree);
        assert_eq!(tree.get_node("w1").unwrap().knowledge.get_local_version(), 1);
        assert_eq!(
            tree.get_node("w1").unwrap().knowledge.get_fact("a").unwrap().0,
            Value::Int(1)
        );
    }

    #[tokio::test]
    async fn list_checkpoints_sorts_by_timestamp_and_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        let tree = sample_tree();
        mgr.save(&tree, "first", &[], 0, 0, 1, 100).await.unwrap();
        mgr.save(&tree, "second", &[], 0, 0, 1, 200).await.unwrap();
        tokio::fs::write(dir.path().join("garbage.json"), b"not json")
            .await
            .unwrap();

        let list = mgr.list_checkpoints().await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].task, "first");
        assert_eq!(list[1].task, "second");
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(dir.path());
        mgr.delete("never-existed").await.unwrap();

        let tree = sample_tree();
        let meta = mgr.save(&tree, "task", &[], 0, 0, 1, 0).await.unwrap();
        mgr.delete(&meta.checkpoint_id).await.unwrap();
        mgr.delete(&meta.checkpoint_id).await.unwrap();
        assert!(mgr.load(&meta.checkpoint_id).await.is_err());
    }
}
