//! Scenario persistence.
//!
//! Scenarios live under a single root directory as `<name>.json` documents,
//! with reference images in a shared `images/` subdirectory named
//! `{scenario}_action_{order}.png`. Documents embed image paths relative to
//! the root so the whole directory can be relocated.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::scenario::model::Scenario;

/// Errors surfaced by the scenario store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("scenario `{0}` not found")]
    NotFound(String),
    #[error("scenario `{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid scenario document: {0}")]
    Document(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Directory-backed scenario repository.
pub struct ScenarioStore {
    root: PathBuf,
}

impl ScenarioStore {
    /// Opens a store rooted at `root`, creating the directory layout if
    /// needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("images"))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    /// Store-relative path for an action's reference image.
    pub fn image_rel_path(scenario: &str, order: u32) -> PathBuf {
        PathBuf::from("images").join(format!("{}_action_{}.png", scenario, order))
    }

    /// Absolute path for a stored relative reference path.
    pub fn resolve_image(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }

    /// Persists the scenario as a whole document.
    pub fn save(&self, scenario: &Scenario) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(scenario)?;
        fs::write(self.document_path(&scenario.name), json)?;
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Scenario, StoreError> {
        let path = self.document_path(name);
        if !path.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn list(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes the scenario document and every reference image it owns.
    pub fn delete(&self, name: &str) -> Result<(), StoreError> {
        match self.load(name) {
            Ok(scenario) => {
                for action in &scenario.actions {
                    self.remove_image(&action.reference_image)?;
                }
            }
            // A corrupt document can still be deleted; its images are
            // unknowable at that point.
            Err(StoreError::Document(_)) => {}
            Err(e) => return Err(e),
        }
        fs::remove_file(self.document_path(name))?;
        Ok(())
    }

    /// Removes a single action's reference image, if present.
    pub fn remove_image(&self, rel: &Path) -> Result<(), StoreError> {
        let img = self.resolve_image(rel);
        if img.exists() {
            fs::remove_file(img)?;
        }
        Ok(())
    }

    /// Renames a scenario, rewriting the document name, every embedded
    /// reference path, and the image files themselves.
    ///
    /// All-or-nothing: the full transformation is computed and serialized
    /// before any filesystem mutation, and partial image renames are rolled
    /// back on failure.
    pub fn rename(&self, old: &str, new: &str) -> Result<(), StoreError> {
        if old == new {
            return Ok(());
        }
        if self.document_path(new).exists() {
            return Err(StoreError::AlreadyExists(new.to_string()));
        }

        let mut scenario = self.load(old)?;
        scenario.name = new.to_string();

        let prefix = format!("{}_action_", old);
        let mut moves: Vec<(PathBuf, PathBuf)> = Vec::new();
        for action in &mut scenario.actions {
            let file_name = action
                .reference_image
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            if let Some(rest) = file_name.strip_prefix(&prefix) {
                let new_rel = PathBuf::from("images").join(format!("{}_action_{}", new, rest));
                moves.push((
                    self.resolve_image(&action.reference_image),
                    self.resolve_image(&new_rel),
                ));
                action.reference_image = new_rel;
            }
        }
        let json = serde_json::to_string_pretty(&scenario)?;

        let mut done: Vec<&(PathBuf, PathBuf)> = Vec::new();
        for mv in &moves {
            if let Err(e) = fs::rename(&mv.0, &mv.1) {
                Self::undo_moves(&done);
                return Err(e.into());
            }
            done.push(mv);
        }

        if let Err(e) = fs::write(self.document_path(new), &json) {
            let _ = fs::remove_file(self.document_path(new));
            Self::undo_moves(&done);
            return Err(e.into());
        }
        if let Err(e) = fs::remove_file(self.document_path(old)) {
            let _ = fs::remove_file(self.document_path(new));
            Self::undo_moves(&done);
            return Err(e.into());
        }
        Ok(())
    }

    fn undo_moves(done: &[&(PathBuf, PathBuf)]) {
        for (from, to) in done.iter().rev() {
            let _ = fs::rename(to, from);
        }
    }

    /// Removes the action at sorted position `index` from the named
    /// scenario, deletes its reference image, renumbers the remaining
    /// actions to 1..N-1, and persists the scenario.
    pub fn delete_action(&self, name: &str, index: usize) -> Result<(), StoreError> {
        let mut scenario = self.load(name)?;
        if let Some(removed) = scenario.remove(index) {
            self.remove_image(&removed.reference_image)?;
            self.save(&scenario)?;
        }
        Ok(())
    }

    /// Swaps the action at sorted position `index` with its predecessor
    /// and persists. No-op at the top of the sequence.
    pub fn move_action_up(&self, name: &str, index: usize) -> Result<(), StoreError> {
        let mut scenario = self.load(name)?;
        if scenario.move_up(index) {
            self.save(&scenario)?;
        }
        Ok(())
    }

    /// Swaps the action at sorted position `index` with its successor and
    /// persists. No-op at the bottom of the sequence.
    pub fn move_action_down(&self, name: &str, index: usize) -> Result<(), StoreError> {
        let mut scenario = self.load(name)?;
        if scenario.move_down(index) {
            self.save(&scenario)?;
        }
        Ok(())
    }
}
