//! Checkpoint file layout and atomic persistence.
//!
//! The best predictor and action-value function live side by side in one
//! directory as `best_guesser.<ext>` and `best_dqn.<ext>`. Every write goes to
//! a `~`-suffixed sibling first and is renamed into place, so a failed write
//! leaves the previous checkpoint intact.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AcquisitionError, Result};
use crate::predictor::Predictor;
use crate::qfunction::QFunction;

/// Names checkpoint files inside a save directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    dir: PathBuf,
}

impl CheckpointPaths {
    /// Points at `dir`; nothing is created until [`Self::ensure_dir`].
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The save directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the save directory if needed.
    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|source| AcquisitionError::CheckpointWrite {
            path: self.dir.clone(),
            source,
        })
    }

    /// `best_guesser.<ext>`
    pub fn guesser<P: Predictor>(&self) -> PathBuf {
        self.dir.join(format!("best_guesser.{}", P::CHECKPOINT_EXTENSION))
    }

    /// `best_dqn.<ext>`
    pub fn dqn<Q: QFunction>(&self) -> PathBuf {
        self.dir.join(format!("best_dqn.{}", Q::CHECKPOINT_EXTENSION))
    }

    /// `{episode}_guesser_{accuracy:.3}.<ext>`
    pub fn tagged_guesser<P: Predictor>(&self, episode: usize, accuracy: f64) -> PathBuf {
        self.dir.join(format!(
            "{episode}_guesser_{accuracy:.3}.{}",
            P::CHECKPOINT_EXTENSION
        ))
    }

    /// `{episode}_dqn_{accuracy:.3}.<ext>`
    pub fn tagged_dqn<Q: QFunction>(&self, episode: usize, accuracy: f64) -> PathBuf {
        self.dir.join(format!(
            "{episode}_dqn_{accuracy:.3}.{}",
            Q::CHECKPOINT_EXTENSION
        ))
    }
}

/// Runs `write` against a temporary sibling of `path`, then renames it into
/// place. The temporary file is removed if either step fails.
pub fn save_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = stage(path, write)?;
    commit(&tmp, path)
}

/// Like [`save_atomic`] for two files that must stay consistent: both are
/// staged before either is renamed, and nothing is renamed unless both
/// writes succeed.
pub fn save_pair_atomic<F, G>(
    first: &Path,
    write_first: F,
    second: &Path,
    write_second: G,
) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
    G: FnOnce(&Path) -> Result<()>,
{
    let first_tmp = stage(first, write_first)?;
    let second_tmp = match stage(second, write_second) {
        Ok(tmp) => tmp,
        Err(err) => {
            let _ = fs::remove_file(&first_tmp);
            return Err(err);
        }
    };
    if let Err(err) = commit(&first_tmp, first) {
        let _ = fs::remove_file(&second_tmp);
        return Err(err);
    }
    commit(&second_tmp, second)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push("~");
    PathBuf::from(tmp)
}

fn stage<F>(path: &Path, write: F) -> Result<PathBuf>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp = temp_path(path);
    if let Err(err) = write(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(tmp)
}

fn commit(tmp: &Path, path: &Path) -> Result<()> {
    fs::rename(tmp, path).map_err(|source| {
        let _ = fs::remove_file(tmp);
        AcquisitionError::CheckpointWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

/// Runs `load` if `path` exists.
///
/// A missing file is a cold start, not an error: it is logged and reported as
/// `Ok(false)`.
pub fn load_if_present<F>(path: &Path, load: F) -> Result<bool>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if !path.exists() {
        tracing::info!(path = %path.display(), "no checkpoint found, keeping current parameters");
        return Ok(false);
    }
    load(path)?;
    tracing::debug!(path = %path.display(), "checkpoint loaded");
    Ok(true)
}
