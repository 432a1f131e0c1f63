// src/fs/mock.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, bail, Result};

use super::FileSystem;

#[derive(Debug, Default)]
struct Tree {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
}

impl Tree {
    fn add_parents(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(ancestor.to_path_buf());
        }
    }
}

/// In-memory filesystem for state-store tests.
///
/// Clones share the same tree, so a test can keep one handle while the store
/// owns another. `fail_writes(true)` makes every mutating call error out,
/// which is how persistence failures are simulated.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    tree: Arc<Mutex<Tree>>,
    fail_writes: Arc<AtomicBool>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed a file, bypassing `fail_writes`.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        let mut tree = self.tree();
        tree.add_parents(path);
        tree.files.insert(path.to_path_buf(), content.into());
    }

    /// Paths of all files currently stored, sorted.
    pub fn file_paths(&self) -> Vec<PathBuf> {
        self.tree().files.keys().cloned().collect()
    }

    fn tree(&self) -> MutexGuard<'_, Tree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(&self, path: &Path) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("injected write failure for {:?}", path);
        }
        Ok(())
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let tree = self.tree();
        let bytes = tree
            .files
            .get(path)
            .ok_or_else(|| anyhow!("no such file: {:?}", path))?;
        String::from_utf8(bytes.clone()).map_err(|e| anyhow!("{:?} is not UTF-8: {e}", path))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.check_writable(path)?;
        self.add_file(path, contents);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.check_writable(to)?;
        let mut tree = self.tree();
        let Some(bytes) = tree.files.remove(from) else {
            bail!("no such file: {:?}", from);
        };
        tree.add_parents(to);
        tree.files.insert(to.to_path_buf(), bytes);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.check_writable(path)?;
        match self.tree().files.remove(path) {
            Some(_) => Ok(()),
            None => Err(anyhow!("no such file: {:?}", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        let tree = self.tree();
        tree.files.contains_key(path) || tree.dirs.contains(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.check_writable(path)?;
        let mut tree = self.tree();
        tree.add_parents(path);
        tree.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let tree = self.tree();
        if !tree.dirs.contains(path) {
            bail!("no such directory: {:?}", path);
        }
        let in_dir = |p: &&PathBuf| p.parent() == Some(path);
        Ok(tree
            .dirs
            .iter()
            .filter(in_dir)
            .chain(tree.files.keys().filter(in_dir))
            .cloned()
            .collect())
    }
}
