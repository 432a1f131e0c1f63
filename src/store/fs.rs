// src/store/fs.rs

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::dag::{Dag, DagId};
use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};

use super::{DagCheckpoint, DagStateStore};

const CHECKPOINT_EXT: &str = "json";

/// Stores each DAG as `<dir>/<sanitized dag id>.json`.
///
/// Writes go to `<file>.tmp` first and are renamed over the previous
/// checkpoint, so a crash mid-write leaves the old snapshot intact.
#[derive(Debug)]
pub struct FsDagStateStore<F: FileSystem = RealFileSystem> {
    dir: PathBuf,
    fs: F,
}

impl FsDagStateStore<RealFileSystem> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_fs(dir, RealFileSystem)
    }
}

impl<F: FileSystem> FsDagStateStore<F> {
    pub fn with_fs(dir: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            dir: dir.into(),
            fs,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn checkpoint_path(&self, dag_id: &DagId) -> PathBuf {
        self.dir
            .join(format!("{}.{}", sanitize(dag_id.as_str()), CHECKPOINT_EXT))
    }

    fn read_checkpoint(&self, path: &Path) -> Result<Dag> {
        let contents = self.fs.read_to_string(path)?;
        let checkpoint: DagCheckpoint = serde_json::from_str(&contents)?;
        checkpoint.into_dag()
    }

    fn checkpoint_files(&self) -> Result<Vec<PathBuf>> {
        if !self.fs.exists(&self.dir) {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = self
            .fs
            .read_dir(&self.dir)?
            .into_iter()
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(CHECKPOINT_EXT))
            .collect();
        files.sort();
        Ok(files)
    }
}

impl<F: FileSystem> DagStateStore for FsDagStateStore<F> {
    fn write_checkpoint(&mut self, dag: &Dag) -> Result<()> {
        let path = self.checkpoint_path(dag.id());
        let tmp = path.with_extension(format!("{CHECKPOINT_EXT}.tmp"));
        let body = serde_json::to_vec_pretty(&DagCheckpoint::from_dag(dag))?;

        self.fs.create_dir_all(&self.dir)?;
        self.fs.write(&tmp, &body)?;
        self.fs.rename(&tmp, &path)?;

        debug!(dag_id = %dag.id(), path = ?path, "wrote checkpoint (file)");
        Ok(())
    }

    fn clean_up(&mut self, dag_id: &DagId) -> Result<()> {
        let path = self.checkpoint_path(dag_id);
        if self.fs.exists(&path) {
            self.fs.remove_file(&path)?;
            info!(dag_id = %dag_id, "deleted checkpoint (file)");
        }
        Ok(())
    }

    fn get_dags(&self) -> Result<Vec<Dag>> {
        let mut dags = Vec::new();
        for path in self.checkpoint_files()? {
            match self.read_checkpoint(&path) {
                Ok(dag) => dags.push(dag),
                Err(err) => warn!(
                    path = ?path,
                    error = %err,
                    "skipping unreadable checkpoint"
                ),
            }
        }
        Ok(dags)
    }

    fn get_dag(&self, dag_id: &DagId) -> Result<Option<Dag>> {
        let path = self.checkpoint_path(dag_id);
        if !self.fs.exists(&path) {
            return Ok(None);
        }
        self.read_checkpoint(&path).map(Some)
    }

    fn get_dag_ids(&self) -> Result<Vec<DagId>> {
        Ok(self.get_dags()?.into_iter().map(|d| d.id().clone()).collect())
    }
}

/// Map a DAG id onto a portable file stem.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::JobExecutionPlan;
    use crate::fs::mock::MockFileSystem;
    use crate::types::ExecutionStatus;

    fn dag() -> Dag {
        let plan = |job: &str| JobExecutionPlan::new("etl", "ingest", 5, "etl", job);
        Dag::from_plans(vec![plan("extract"), plan("load").after("extract")]).unwrap()
    }

    #[test]
    fn sanitize_replaces_path_separators() {
        assert_eq!(sanitize("a/b c_1"), "a_b_c_1");
    }

    #[test]
    fn checkpoint_round_trips_through_mock_fs() {
        let fs = MockFileSystem::new();
        let mut store = FsDagStateStore::with_fs("state", fs.clone());

        let mut dag = dag();
        let node = dag.node_mut("extract").unwrap();
        node.mark_orchestrated(1_000);
        node.reset_attempts();
        node.mark_running();
        store.write_checkpoint(&dag).unwrap();

        assert_eq!(fs.file_paths(), vec![PathBuf::from("state/etl_ingest_5.json")]);

        let loaded = store.get_dag(dag.id()).unwrap().unwrap();
        let extract = loaded.node("extract").unwrap();
        assert_eq!(extract.current_attempts(), 1);
        assert_eq!(extract.orchestrated_at(), Some(1_000));
        assert_eq!(extract.status(), ExecutionStatus::Running);
        assert!(extract.seen_running());
        assert_eq!(loaded, dag);

        store.clean_up(dag.id()).unwrap();
        assert!(store.get_dags().unwrap().is_empty());
        // Second delete is a no-op.
        store.clean_up(dag.id()).unwrap();
    }

    #[test]
    fn write_failure_surfaces_as_error() {
        let fs = MockFileSystem::new();
        let mut store = FsDagStateStore::with_fs("state", fs.clone());
        fs.fail_writes(true);
        assert!(store.write_checkpoint(&dag()).is_err());
        assert!(fs.file_paths().is_empty());
    }

    #[test]
    fn corrupt_checkpoints_are_skipped() {
        let fs = MockFileSystem::new();
        let mut store = FsDagStateStore::with_fs("state", fs.clone());
        store.write_checkpoint(&dag()).unwrap();
        fs.add_file("state/garbage.json", "{ not json");
        fs.add_file("state/notes.txt", "ignored");

        let ids = store.get_dag_ids().unwrap();
        assert_eq!(ids, vec![DagId::from("etl_ingest_5")]);
    }
}
