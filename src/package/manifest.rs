// aegis-push/src/package/manifest.rs

use crate::package::error::PushPackageError;
use crate::package::staging::StagedPackage;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// `manifest.json`: relative file name to hex SHA-1 of its bytes.
///
/// Backed by a `BTreeMap` so the serialized form is identical across runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Hashes every file physically present in the staging directory.
    pub fn compute(staged: &StagedPackage) -> Result<Self, PushPackageError> {
        Self::compute_dir(staged.path())
    }

    fn compute_dir(root: &Path) -> Result<Self, PushPackageError> {
        let mut entries = BTreeMap::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry.map_err(|e| PushPackageError::DigestComputation {
                file: e
                    .path()
                    .map(|p| relative_name(root, p))
                    .unwrap_or_default(),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = relative_name(root, entry.path());
            let bytes = std::fs::read(entry.path()).map_err(|source| {
                PushPackageError::DigestComputation {
                    file: name.clone(),
                    source,
                }
            })?;
            entries.insert(name, sha1_hex(&bytes));
        }
        Ok(Self { entries })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The exact bytes that get signed and bundled.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, PushPackageError> {
        serde_json::to_vec(self).map_err(PushPackageError::ManifestEncoding)
    }
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

/// Package member names always use `/`, whatever the host separator.
fn relative_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::icons::IconSet;
    use crate::package::website::WebsiteDescriptor;
    use crate::package::website::tests::example_config;

    #[test]
    fn sha1_matches_known_vector() {
        assert_eq!(sha1_hex(b"abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn manifest_covers_every_staged_file() {
        let icons = IconSet::new([
            ("icon.iconset/icon_16x16.png".to_string(), b"sixteen".to_vec()),
            ("icon.iconset/icon_32x32.png".to_string(), b"thirty-two".to_vec()),
        ]);
        let descriptor = WebsiteDescriptor::build(&example_config(), "abc123");
        let staged = StagedPackage::stage(&descriptor, &icons, None).unwrap();

        let manifest = Manifest::compute(&staged).unwrap();

        assert_eq!(
            manifest.names().collect::<Vec<_>>(),
            vec![
                "icon.iconset/icon_16x16.png",
                "icon.iconset/icon_32x32.png",
                "website.json"
            ]
        );
        assert_eq!(manifest.get("icon.iconset/icon_16x16.png"), Some(sha1_hex(b"sixteen").as_str()));
        assert_eq!(
            manifest.get("website.json"),
            Some(sha1_hex(staged.descriptor_bytes()).as_str())
        );
    }

    #[test]
    fn vanished_staging_directory_is_a_digest_error() {
        let descriptor = WebsiteDescriptor::build(&example_config(), "abc123");
        let staged = StagedPackage::stage(&descriptor, &IconSet::default(), None).unwrap();
        std::fs::remove_dir_all(staged.path()).unwrap();

        let err = Manifest::compute(&staged).unwrap_err();
        assert!(matches!(err, PushPackageError::DigestComputation { .. }), "{err}");
    }

    #[test]
    fn json_form_is_a_flat_object() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();

        let manifest = Manifest::compute_dir(dir.path()).unwrap();
        let json = String::from_utf8(manifest.to_json_bytes().unwrap()).unwrap();

        assert_eq!(
            json,
            format!(r#"{{"a.txt":"{}","b.txt":"{}"}}"#, sha1_hex(b"a"), sha1_hex(b"b"))
        );
    }
}
