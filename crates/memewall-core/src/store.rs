// ABOUTME: Artifact store backed by a single flat directory of images.
// ABOUTME: Resolves, lists and publishes artifacts; the directory listing is the catalog.

use crate::error::{Result, WallError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Extensions an artifact may carry (compared case-insensitively).
pub const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

const PARTIAL_SUFFIX: &str = ".partial";

/// A validated image file in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Base name without extension.
    pub name: String,
    /// Extension without the dot, as written on disk.
    pub extension: String,
    /// Absolute path inside the store.
    pub path: PathBuf,
}

impl Artifact {
    /// Build an artifact descriptor for `file_name` inside `root`.
    /// Returns None if the name has no extension.
    pub fn from_file_name(root: &Path, file_name: &str) -> Option<Self> {
        let (name, extension) = split_file_name(file_name);
        let extension = extension?;
        Some(Self {
            name: name.to_string(),
            extension: extension.to_string(),
            path: root.join(file_name),
        })
    }

    /// `<name>.<extension>`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.name, self.extension)
    }
}

/// Split at the last dot. A leading dot alone does not count as an extension.
pub fn split_file_name(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < file_name.len() => {
            (&file_name[..idx], Some(&file_name[idx + 1..]))
        }
        _ => (file_name, None),
    }
}

pub fn is_allowed_extension(extension: &str) -> bool {
    ALLOWED_EXTENSIONS
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(extension))
}

/// The flat directory serving as the catalog of displayable artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating the directory if it does not exist yet.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let root = dir.canonicalize()?;
        if !root.is_dir() {
            return Err(WallError::Config(format!(
                "image folder {} is not a directory",
                root.display()
            )));
        }
        debug!(root = %root.display(), "Opened artifact store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for an existing artifact.
    pub fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        let path = self
            .candidate_path(file_name)
            .ok_or_else(|| WallError::ArtifactNotFound(file_name.to_string()))?;
        if path.is_file() {
            Ok(path)
        } else {
            Err(WallError::ArtifactNotFound(file_name.to_string()))
        }
    }

    /// Whether anything (file or otherwise) already occupies this name.
    pub fn contains(&self, file_name: &str) -> bool {
        self.candidate_path(file_name)
            .map(|p| p.symlink_metadata().is_ok())
            .unwrap_or(false)
    }

    /// Path a new artifact would be written to. Fails for names that escape the flat layout.
    pub fn target_path(&self, file_name: &str) -> Result<PathBuf> {
        self.candidate_path(file_name)
            .ok_or_else(|| WallError::InvalidName(file_name.to_string()))
    }

    /// Every artifact in the store, sorted by file name.
    /// Subdirectories, dotfiles and files without an extension are ignored.
    pub async fn list(&self) -> Result<Vec<Artifact>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut artifacts = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if file_name.starts_with('.') {
                continue;
            }
            if let Some(artifact) = Artifact::from_file_name(&self.root, &file_name) {
                artifacts.push(artifact);
            }
        }

        artifacts.sort_by_key(|a| a.file_name());
        Ok(artifacts)
    }

    /// Fresh hidden path for an in-flight write. Never visible through `list`.
    pub fn partial_path(&self) -> PathBuf {
        self.root
            .join(format!(".{}{}", Uuid::new_v4(), PARTIAL_SUFFIX))
    }

    /// Make a fully written partial file visible under `file_name`.
    ///
    /// Uses a hard link so an existing artifact is never replaced, even when two
    /// ingests race for the same name. The partial file is removed in every case.
    pub async fn publish(&self, partial: &Path, file_name: &str) -> Result<Artifact> {
        let target = self.target_path(file_name)?;
        let artifact = Artifact::from_file_name(&self.root, file_name)
            .ok_or_else(|| WallError::InvalidFileType(file_name.to_string()))?;

        match tokio::fs::hard_link(partial, &target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                discard(partial).await;
                return Err(WallError::ArtifactAlreadyExists(file_name.to_string()));
            }
            Err(e) => {
                // Filesystems without hard links: fall back to a checked rename.
                warn!(error = %e, "Hard link failed, falling back to rename");
                if self.contains(file_name) {
                    discard(partial).await;
                    return Err(WallError::ArtifactAlreadyExists(file_name.to_string()));
                }
                if let Err(e) = tokio::fs::rename(partial, &target).await {
                    discard(partial).await;
                    return Err(e.into());
                }
                return Ok(artifact);
            }
        }

        discard(partial).await;
        Ok(artifact)
    }

    fn candidate_path(&self, file_name: &str) -> Option<PathBuf> {
        let valid = !file_name.is_empty()
            && !file_name.starts_with('.')
            && !file_name.contains(['/', '\\', '\0'])
            && !file_name.ends_with(PARTIAL_SUFFIX);
        valid.then(|| self.root.join(file_name))
    }
}

/// Remove a partial file, ignoring "already gone".
pub(crate) async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
    }
}
