//! Source acquisition
//!
//! A mirror holds one entry per package version under
//! `<mirror>/<name>/<name>-<version>`: either an unpacked directory or an
//! archive with one of [`ARCHIVE_SUFFIXES`]. Archives are verified against
//! the recipe checksum before extraction.

use async_trait::async_trait;
use sprig_errors::{BuildError, Error};
use sprig_hash::Hash;
use sprig_index::PackageIndex;
use sprig_platform::{HostProcess, PlatformCommand, ProcessOperations};
use sprig_spec::ConcreteNode;
use sprig_types::Version;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;

/// Archive formats `tar` can unpack, probed in this order
pub const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar.xz", ".tar.bz2", ".tar"];

/// Produces a source tree for a node
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Populate `dest` with the node's sources and return the tree root
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::FetchFailed`] when no source is available or
    /// it fails verification.
    async fn obtain_source(&self, node: &ConcreteNode, dest: &Path) -> Result<PathBuf, Error>;
}

/// Serves sources from a local mirror directory
#[derive(Debug, Clone)]
pub struct MirrorSourceProvider<P = HostProcess> {
    mirror: PathBuf,
    checksums: BTreeMap<(String, Version), Hash>,
    process: P,
}

impl MirrorSourceProvider<HostProcess> {
    #[must_use]
    pub fn new(mirror: impl Into<PathBuf>) -> Self {
        Self::with_process(mirror, HostProcess::new())
    }
}

impl<P: ProcessOperations> MirrorSourceProvider<P> {
    #[must_use]
    pub fn with_process(mirror: impl Into<PathBuf>, process: P) -> Self {
        Self {
            mirror: mirror.into(),
            checksums: BTreeMap::new(),
            process,
        }
    }

    /// Take declared checksums from every recipe in `index`
    #[must_use]
    pub fn with_checksums_from(mut self, index: &PackageIndex) -> Self {
        for desc in index.descriptors() {
            for decl in &desc.versions {
                if let Some(checksum) = &decl.checksum {
                    self.checksums
                        .insert((desc.name.clone(), decl.version.clone()), checksum.clone());
                }
            }
        }
        self
    }

    #[must_use]
    pub fn mirror(&self) -> &Path {
        &self.mirror
    }

    fn entry_stem(&self, node: &ConcreteNode) -> PathBuf {
        self.mirror
            .join(&node.name)
            .join(format!("{}-{}", node.name, node.version))
    }

    async fn verify(&self, node: &ConcreteNode, archive: &Path) -> Result<(), Error> {
        let key = (node.name.clone(), node.version.clone());
        let Some(expected) = self.checksums.get(&key) else {
            tracing::debug!(package = %node.name, "no checksum declared; skipping verification");
            return Ok(());
        };
        let actual = Hash::hash_file(archive).await?;
        if &actual != expected {
            return Err(fetch_failed(
                node,
                format!(
                    "checksum mismatch for {}: expected {expected}, got {actual}",
                    archive.display()
                ),
            ));
        }
        Ok(())
    }

    async fn extract(&self, node: &ConcreteNode, archive: &Path, dest: &Path) -> Result<(), Error> {
        let mut cmd = PlatformCommand::new("tar");
        cmd.arg("-xf")
            .arg(archive.display().to_string())
            .arg("-C")
            .arg(dest.display().to_string())
            .arg("--strip-components=1");
        let output = self.process.execute_command(&cmd).await?;
        if !output.status.success() {
            return Err(fetch_failed(
                node,
                format!(
                    "extracting {} failed: {}",
                    archive.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<P: ProcessOperations> SourceProvider for MirrorSourceProvider<P> {
    async fn obtain_source(&self, node: &ConcreteNode, dest: &Path) -> Result<PathBuf, Error> {
        let stem = self.entry_stem(node);
        fs::create_dir_all(dest)
            .await
            .map_err(|e| Error::io_with_path(&e, dest))?;

        if fs::metadata(&stem).await.is_ok_and(|m| m.is_dir()) {
            tracing::debug!(package = %node.name, source = %stem.display(), "copying source tree");
            copy_directory_recursive(&stem, dest).await?;
            return Ok(dest.to_path_buf());
        }

        for suffix in ARCHIVE_SUFFIXES {
            let mut name = stem.clone().into_os_string();
            name.push(suffix);
            let archive = PathBuf::from(name);
            if fs::metadata(&archive).await.is_ok_and(|m| m.is_file()) {
                tracing::debug!(package = %node.name, archive = %archive.display(), "unpacking source");
                self.verify(node, &archive).await?;
                self.extract(node, &archive, dest).await?;
                return Ok(dest.to_path_buf());
            }
        }

        Err(fetch_failed(
            node,
            format!("no source for {}@{} under {}", node.name, node.version, self.mirror.display()),
        ))
    }
}

fn fetch_failed(node: &ConcreteNode, message: String) -> Error {
    BuildError::FetchFailed {
        package: node.name.clone(),
        message,
    }
    .into()
}

/// Recursively copy directory contents
pub fn copy_directory_recursive<'a>(
    src: &'a Path,
    dst: &'a Path,
) -> Pin<Box<dyn Future<Output = Result<(), Error>> + Send + 'a>> {
    Box::pin(async move {
        fs::create_dir_all(dst)
            .await
            .map_err(|e| Error::io_with_path(&e, dst))?;

        let mut entries = fs::read_dir(src)
            .await
            .map_err(|e| Error::io_with_path(&e, src))?;
        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            let dst_path = dst.join(entry.file_name());

            if entry.file_type().await?.is_dir() {
                copy_directory_recursive(&entry_path, &dst_path).await?;
            } else {
                fs::copy(&entry_path, &dst_path)
                    .await
                    .map_err(|e| Error::io_with_path(&e, &entry_path))?;
            }
        }

        Ok(())
    })
}
