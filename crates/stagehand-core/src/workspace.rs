//! Workspace discovery and `.gitignore` maintenance.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::{ConfigStore, paths};

/// The project directory stagehand operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
    git_root: Option<PathBuf>,
    config_path: PathBuf,
}

impl Workspace {
    /// Use `root` as-is, recording the enclosing git work tree if any.
    pub fn at(root: PathBuf) -> Self {
        let git_root = git_workdir(&root);
        let config_path = paths::config_path(&root);
        Self {
            root,
            git_root,
            config_path,
        }
    }

    /// Walk up from `start` to the enclosing git work tree; fall back to
    /// `start` itself outside a repository.
    pub fn discover(start: &Path) -> Self {
        match git_workdir(start) {
            Some(workdir) => Self {
                config_path: paths::config_path(&workdir),
                root: workdir.clone(),
                git_root: Some(workdir),
            },
            None => Self::at(start.to_path_buf()),
        }
    }

    /// Read and write the config at `path` instead of `<root>/stagehand.toml`.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = path;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_root(&self) -> Option<&Path> {
        self.git_root.as_deref()
    }

    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::from_path(self.config_path.clone())
    }

    /// Project name derived from the workspace directory.
    pub fn default_project_name(&self) -> String {
        let raw = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        slugify(&raw)
    }
}

fn git_workdir(start: &Path) -> Option<PathBuf> {
    let repo = git2::Repository::discover(start).ok()?;
    repo.workdir().map(|p| p.to_path_buf())
}

/// Lowercase, `[a-z0-9-]` only, no leading/trailing dashes.
pub fn slugify(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

pub fn is_valid_slug(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name.ends_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

pub fn gitignore_has_entry(root: &Path, entry: &str) -> anyhow::Result<bool> {
    let path = root.join(".gitignore");
    if !path.exists() {
        return Ok(false);
    }
    let existing = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let bare = entry.trim_end_matches('/');
    Ok(existing
        .lines()
        .map(str::trim)
        .any(|line| line == entry || line == bare || line == format!("/{}", entry)))
}

pub fn ensure_gitignore_entry(root: &Path, entry: &str) -> anyhow::Result<()> {
    if entry.contains('\n') || entry.contains('\r') {
        anyhow::bail!("gitignore entry contains newline");
    }
    if gitignore_has_entry(root, entry)? {
        return Ok(());
    }

    let path = root.join(".gitignore");
    let mut next = if path.exists() {
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?
    } else {
        String::new()
    };

    if !next.is_empty() && !next.ends_with('\n') {
        next.push('\n');
    }
    next.push_str(entry);
    next.push('\n');

    fs::write(&path, next).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
