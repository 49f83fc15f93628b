// aegis-push/src/package/archive.rs

use crate::package::error::PushPackageError;
use crate::package::icons::IconSet;
use crate::package::staging::StagedPackage;
use crate::package::{MANIFEST_JSON, SIGNATURE, WEBSITE_JSON};
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// A finished push package on disk.
///
/// Owns its file: dropping the archive deletes it, [`PushPackageArchive::keep`]
/// hands the path over instead.
#[derive(Debug)]
pub struct PushPackageArchive {
    path: TempPath,
}

impl PushPackageArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }

    /// Detaches the file from this value; the caller must delete it.
    pub fn keep(self) -> std::io::Result<std::path::PathBuf> {
        self.path.keep().map_err(|e| e.error)
    }
}

/// Writes descriptor, icons, manifest, then signature into a fresh zip.
pub fn assemble(
    staged: &StagedPackage,
    manifest_bytes: &[u8],
    signature_der: &[u8],
    icons: &IconSet,
    work_dir: Option<&Path>,
) -> Result<PushPackageArchive, PushPackageError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("pushPackage").suffix(".zip");
    let file = match work_dir {
        Some(root) => builder.tempfile_in(root),
        None => builder.tempfile(),
    }
    .map_err(PushPackageError::ArchiveCreate)?;
    let (file, path) = file.into_parts();

    // Fixed timestamps keep identical inputs byte-identical.
    let fixed_time = DateTime::from_date_and_time(1980, 1, 1, 0, 0, 0).map_err(|e| {
        PushPackageError::ArchiveCreate(std::io::Error::other(e.to_string()))
    })?;
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(fixed_time)
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(file);
    let mut add = |member: &str, bytes: &[u8]| -> Result<(), PushPackageError> {
        let add_error = |source: zip::result::ZipError| PushPackageError::ArchiveAdd {
            member: member.to_string(),
            source,
        };
        zip.start_file(member, options).map_err(add_error)?;
        zip.write_all(bytes)
            .map_err(|e| add_error(zip::result::ZipError::Io(e)))
    };

    add(WEBSITE_JSON, staged.descriptor_bytes())?;
    for icon in icons.iter() {
        let bytes = std::fs::read(staged.member_path(&icon.name)).map_err(|e| {
            PushPackageError::ArchiveAdd {
                member: icon.name.clone(),
                source: zip::result::ZipError::Io(e),
            }
        })?;
        add(&icon.name, &bytes)?;
    }
    add(MANIFEST_JSON, manifest_bytes)?;
    add(SIGNATURE, signature_der)?;

    zip.finish().map_err(PushPackageError::ArchiveClose)?;
    debug!(archive = %path.display(), members = icons.len() + 3, "Assembled push package.");

    Ok(PushPackageArchive { path })
}
