#![allow(dead_code)]

use aegis_push::package::{IconSet, ManifestSigner, PushPackageService, WebsitePushConfiguration};
use std::io::{Cursor, Read};
use std::path::PathBuf;
use tempfile::TempDir;

pub const ICON_16: &[u8] = b"\x89PNG\r\n\x1a\n sixteen";
pub const ICON_32: &[u8] = b"\x89PNG\r\n\x1a\n thirty-two";

/// Scratch space holding a certificate bundle and an empty work directory.
pub struct Fixture {
    pub dir: TempDir,
    pub bundle_path: PathBuf,
    pub work_dir: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bundle_path = dir.path().join("push.pem");
        std::fs::write(&bundle_path, certificate_bundle()).unwrap();
        let work_dir = dir.path().join("work");
        std::fs::create_dir(&work_dir).unwrap();
        Self {
            dir,
            bundle_path,
            work_dir,
        }
    }

    pub fn service(&self) -> PushPackageService {
        PushPackageService::new(config(), icons(), ManifestSigner::new(&self.bundle_path, None))
            .with_work_dir(&self.work_dir)
    }

    pub fn work_dir_entries(&self) -> usize {
        std::fs::read_dir(&self.work_dir).unwrap().count()
    }
}

pub fn certificate_bundle() -> String {
    let key = rcgen::KeyPair::generate().unwrap();
    let params = rcgen::CertificateParams::new(vec!["web.com.example.test".into()]).unwrap();
    let certificate = params.self_signed(&key).unwrap();
    format!("{}{}", certificate.pem(), key.serialize_pem())
}

pub fn config() -> WebsitePushConfiguration {
    WebsitePushConfiguration {
        website_name: "Example".into(),
        organization_name: "Example Inc.".into(),
        website_push_id: "web.com.example.test".into(),
        allowed_domains: vec!["https://example.com".into()],
        url_format_string: "https://example.com/%@".into(),
        count_of_expected_arguments: 1,
        web_service_url: "https://example.com/push".into(),
    }
}

pub fn icons() -> IconSet {
    IconSet::new([
        ("icon.iconset/icon_16x16.png".to_string(), ICON_16.to_vec()),
        ("icon.iconset/icon_32x32.png".to_string(), ICON_32.to_vec()),
    ])
}

pub fn members(archive: &[u8]) -> Vec<String> {
    let zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    zip.file_names().map(str::to_string).collect()
}

pub fn member(archive: &[u8], name: &str) -> Vec<u8> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut bytes = Vec::new();
    zip.by_name(name).unwrap().read_to_end(&mut bytes).unwrap();
    bytes
}

pub fn member_json(archive: &[u8], name: &str) -> serde_json::Value {
    serde_json::from_slice(&member(archive, name)).unwrap()
}
