//
// Copyright 2023 The SLSA Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sandboxed filesystem boundary.
//!
//! All file access is resolved against an allow-list of directories; paths
//! that escape via `..` or absolute redirection are rejected. Output files
//! are write-once: creation fails if the target already exists, and nothing
//! is written before validation has succeeded.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::errors::{Result, TokenError};

#[derive(Clone, Debug)]
pub struct Workspace {
    root: PathBuf,
    allowed_dirs: Vec<PathBuf>,
    /// Files readable even though they live outside the allowed
    /// directories. Never writable.
    readable_files: Vec<PathBuf>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Workspace {
        let root = normalize(&root.into());
        Workspace {
            allowed_dirs: vec![root.clone()],
            readable_files: vec![],
            root,
        }
    }

    /// Builds the workspace the way the Actions runtime lays it out:
    /// `GITHUB_WORKSPACE`, `/tmp` and `RUNNER_TEMP` are read/write, the
    /// event payload file is read-only.
    pub fn from_env() -> Workspace {
        let mut workspace = Workspace::new(std::env::var("GITHUB_WORKSPACE").unwrap_or_default());
        workspace.allow_dir("/tmp");
        if let Ok(runner_temp) = std::env::var("RUNNER_TEMP") {
            workspace.allow_dir(runner_temp);
        }
        if let Ok(event_path) = std::env::var("GITHUB_EVENT_PATH") {
            workspace.allow_read_file(event_path);
        }
        workspace
    }

    pub fn allow_dir(&mut self, dir: impl Into<PathBuf>) {
        self.allowed_dirs.push(normalize(&dir.into()));
    }

    pub fn allow_read_file(&mut self, file: impl Into<PathBuf>) {
        self.readable_files.push(normalize(&file.into()));
    }

    /// Resolves `path` for reading, rejecting escapes with [`TokenError::UnsafePath`].
    pub fn resolve_read(&self, path: &Path) -> Result<PathBuf> {
        self.resolve(path, false)
    }

    /// Resolves `path` for writing. Read-only files are rejected even
    /// though they resolve for reads.
    pub fn resolve_write(&self, path: &Path) -> Result<PathBuf> {
        self.resolve(path, true)
    }

    fn resolve(&self, path: &Path, write: bool) -> Result<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let resolved = normalize(&absolute);
        let unsafe_path = || TokenError::UnsafePath {
            path: resolved.display().to_string(),
        };

        if self.readable_files.iter().any(|f| *f == resolved) {
            if write {
                return Err(unsafe_path());
            }
            return Ok(resolved);
        }

        if self.allowed_dirs.iter().any(|d| resolved.starts_with(d)) {
            Ok(resolved)
        } else {
            Err(unsafe_path())
        }
    }

    pub fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let safe = self.resolve_read(path)?;
        Ok(std::fs::read(safe)?)
    }

    /// Hex-formatted SHA-256 of the contents of an untrusted file path.
    pub fn sha256(&self, path: &Path) -> Result<String> {
        let contents = self.read(path)?;
        Ok(hex::encode(Sha256::digest(contents)))
    }

    /// Write-once file creation: fails if the target already exists. The
    /// file is created owner read/write only.
    pub fn write_new(&self, path: &Path, data: &[u8]) -> Result<()> {
        let safe = self.resolve_write(path)?;

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&safe)?;
        file.write_all(data)?;
        debug!(path = %safe.display(), "wrote output file");
        Ok(())
    }
}

/// Lexical normalization: resolves `.` and `..` without touching the
/// filesystem, so escapes are caught before any I/O happens.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_resolve_inside_the_root() -> anyhow::Result<()> {
        let workspace = Workspace::new("/workspace");
        assert_eq!(
            workspace.resolve_write(Path::new("predicate.json"))?,
            PathBuf::from("/workspace/predicate.json")
        );
        assert_eq!(
            workspace.resolve_write(Path::new("./out/../predicate.json"))?,
            PathBuf::from("/workspace/predicate.json")
        );
        Ok(())
    }

    #[test]
    fn escapes_are_rejected() {
        let workspace = Workspace::new("/workspace");
        for path in ["../outside.json", "/etc/passwd", "a/../../outside.json"] {
            let err = workspace
                .resolve_write(Path::new(path))
                .expect_err("expected an error");
            assert!(
                matches!(err, TokenError::UnsafePath { .. }),
                "unexpected error for {path}: {err:?}"
            );
        }
    }

    #[test]
    fn read_only_files_cannot_be_written() -> anyhow::Result<()> {
        let mut workspace = Workspace::new("/workspace");
        workspace.allow_read_file("/github/event.json");

        assert_eq!(
            workspace.resolve_read(Path::new("/github/event.json"))?,
            PathBuf::from("/github/event.json")
        );
        let err = workspace
            .resolve_write(Path::new("/github/event.json"))
            .expect_err("expected an error");
        assert!(matches!(err, TokenError::UnsafePath { .. }));
        Ok(())
    }

    #[test]
    fn write_new_refuses_to_overwrite() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let workspace = Workspace::new(dir.path());

        workspace.write_new(Path::new("predicate.json"), b"{}")?;
        let err = workspace
            .write_new(Path::new("predicate.json"), b"{}")
            .expect_err("expected an error");
        assert!(matches!(err, TokenError::IOError(_)));

        let written = workspace.read(Path::new("predicate.json"))?;
        assert_eq!(written, b"{}");
        Ok(())
    }

    #[test]
    fn sha256_digests_file_contents() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let workspace = Workspace::new(dir.path());
        workspace.write_new(Path::new("data"), b"hello")?;

        assert_eq!(
            workspace.sha256(Path::new("data"))?,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        Ok(())
    }
}
