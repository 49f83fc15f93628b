// aegis-push/src/package/staging.rs

use crate::package::error::PushPackageError;
use crate::package::icons::{IconSet, is_safe_member_name};
use crate::package::website::WebsiteDescriptor;
use crate::package::{MANIFEST_JSON, SIGNATURE, WEBSITE_JSON};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Temporary working directory for one package build. Removed on drop.
#[derive(Debug)]
pub struct StagedPackage {
    dir: TempDir,
    descriptor_bytes: Vec<u8>,
}

impl StagedPackage {
    /// Writes the descriptor and copies every icon into a fresh directory
    /// under `work_dir` (or the system temp dir).
    pub fn stage(
        descriptor: &WebsiteDescriptor,
        icons: &IconSet,
        work_dir: Option<&Path>,
    ) -> Result<Self, PushPackageError> {
        let descriptor_bytes = descriptor.to_canonical_bytes()?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("pushPackage");
        let dir = match work_dir {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(PushPackageError::StagingDirectory)?;
        debug!(dir = %dir.path().display(), "Created staging directory.");

        let descriptor_path = dir.path().join(WEBSITE_JSON);
        std::fs::write(&descriptor_path, &descriptor_bytes).map_err(|source| {
            PushPackageError::DescriptorWrite {
                path: descriptor_path.clone(),
                source,
            }
        })?;

        for icon in icons.iter() {
            let rejected = if !is_safe_member_name(&icon.name) {
                Some("icon name must be a normalized relative path inside the package")
            } else if [WEBSITE_JSON, MANIFEST_JSON, SIGNATURE].contains(&icon.name.as_str()) {
                Some("icon name is reserved for a package file")
            } else {
                None
            };
            if let Some(reason) = rejected {
                return Err(PushPackageError::IconCopy {
                    file: icon.name.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, reason),
                });
            }
            let target = dir.path().join(&icon.name);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|source| {
                    PushPackageError::IconSetDirectory {
                        path: parent.to_path_buf(),
                        source,
                    }
                })?;
            }
            std::fs::write(&target, &icon.bytes).map_err(|source| PushPackageError::IconCopy {
                file: icon.name.clone(),
                source,
            })?;
        }
        debug!(icons = icons.len(), "Staged website descriptor and icons.");

        Ok(Self {
            dir,
            descriptor_bytes,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path of a package member inside the staging directory.
    pub fn member_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn descriptor_bytes(&self) -> &[u8] {
        &self.descriptor_bytes
    }
}
