mod common;

use aegis_push::package::crypto::verify_detached_signature;
use aegis_push::package::manifest::sha1_hex;
use aegis_push::package::{
    ErrorKind, IconSet, ManifestSigner, PipelineState, PushPackageError, PushPackageService,
    SigningIdentity,
};
use common::*;
use std::collections::BTreeSet;

#[test]
fn scenario_archive_contains_signed_descriptor_and_icons() {
    let fixture = Fixture::new();
    let archive = fixture.service().create_push_package("abc123").unwrap();
    let bytes = archive.read().unwrap();

    let names: BTreeSet<String> = members(&bytes).into_iter().collect();
    let expected: BTreeSet<String> = [
        "website.json",
        "icon.iconset/icon_16x16.png",
        "icon.iconset/icon_32x32.png",
        "manifest.json",
        "signature",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    assert_eq!(names, expected);

    let website = member_json(&bytes, "website.json");
    assert_eq!(website["authenticationToken"], "abc123");
    assert_eq!(website["websitePushID"], "web.com.example.test");
    assert_eq!(member(&bytes, "icon.iconset/icon_16x16.png"), ICON_16);
    assert_eq!(member(&bytes, "icon.iconset/icon_32x32.png"), ICON_32);

    let manifest = member_json(&bytes, "manifest.json");
    let manifest = manifest.as_object().unwrap();
    assert_eq!(manifest.len(), 3);
    for name in ["website.json", "icon.iconset/icon_16x16.png", "icon.iconset/icon_32x32.png"] {
        assert_eq!(manifest[name], sha1_hex(&member(&bytes, name)), "{name}");
    }

    let signature = member(&bytes, "signature");
    assert!(!signature.is_empty());
    let identity = SigningIdentity::load(&fixture.bundle_path, None).unwrap();
    verify_detached_signature(&signature, &member(&bytes, "manifest.json"), identity.certificate())
        .unwrap();
}

#[test]
fn every_archive_file_has_a_manifest_entry() {
    let fixture = Fixture::new();
    let bytes = fixture.service().create_push_package("abc123").unwrap().read().unwrap();

    let manifest = member_json(&bytes, "manifest.json");
    for name in members(&bytes) {
        if name == "manifest.json" || name == "signature" {
            continue;
        }
        assert_eq!(manifest[&name], sha1_hex(&member(&bytes, &name)), "{name}");
    }
}

#[test]
fn icons_that_would_escape_the_manifest_are_rejected() {
    let fixture = Fixture::new();
    for name in ["icon.iconset//icon_16x16.png", "signature", "manifest.json"] {
        let service = PushPackageService::new(
            config(),
            IconSet::new([(name.to_string(), ICON_16.to_vec())]),
            ManifestSigner::new(&fixture.bundle_path, None),
        )
        .with_work_dir(&fixture.work_dir);

        let err = service.create_push_package("abc123").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::IconCopy, "{name}: {err}");
        assert_eq!(fixture.work_dir_entries(), 0);
    }
}

#[test]
fn archive_is_owned_by_the_caller() {
    let fixture = Fixture::new();
    let archive = fixture.service().create_push_package("abc123").unwrap();

    // Only the archive remains; the staging directory is gone.
    assert_eq!(fixture.work_dir_entries(), 1);
    let path = archive.path().to_path_buf();
    drop(archive);
    assert!(!path.exists());
    assert_eq!(fixture.work_dir_entries(), 0);
}

#[test]
fn different_users_differ_only_in_token() {
    let fixture = Fixture::new();
    let service = fixture.service();
    let first = service.create_push_package("alice").unwrap().read().unwrap();
    let second = service.create_push_package("bob").unwrap().read().unwrap();

    let mut first_site = member_json(&first, "website.json");
    let mut second_site = member_json(&second, "website.json");
    assert_eq!(first_site["authenticationToken"], "alice");
    assert_eq!(second_site["authenticationToken"], "bob");
    first_site.as_object_mut().unwrap().remove("authenticationToken");
    second_site.as_object_mut().unwrap().remove("authenticationToken");
    assert_eq!(first_site, second_site);

    let first_manifest = member_json(&first, "manifest.json");
    let second_manifest = member_json(&second, "manifest.json");
    for icon in ["icon.iconset/icon_16x16.png", "icon.iconset/icon_32x32.png"] {
        assert_eq!(first_manifest[icon], second_manifest[icon]);
    }
    assert_ne!(first_manifest["website.json"], second_manifest["website.json"]);
}

#[test]
fn truncated_certificate_fails_without_leaking() {
    let fixture = Fixture::new();
    let bundle = std::fs::read(&fixture.bundle_path).unwrap();
    std::fs::write(&fixture.bundle_path, &bundle[..bundle.len() / 4]).unwrap();

    let err = fixture.service().create_push_package("abc123").unwrap_err();

    assert!(matches!(err, PushPackageError::CertificateParse { .. }), "{err}");
    assert_eq!(err.kind().failed_from(), PipelineState::Hashed);
    assert_eq!(fixture.work_dir_entries(), 0);
}

#[test]
fn certificate_truncated_near_the_end_fails_at_parse() {
    let fixture = Fixture::new();
    let bundle = std::fs::read(&fixture.bundle_path).unwrap();
    std::fs::write(&fixture.bundle_path, &bundle[..bundle.len() - 20]).unwrap();

    let err = fixture.service().create_push_package("abc123").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CertificateParse, "{err}");
    assert_eq!(fixture.work_dir_entries(), 0);
}

#[test]
fn missing_certificate_is_a_load_error() {
    let fixture = Fixture::new();
    std::fs::remove_file(&fixture.bundle_path).unwrap();

    let err = fixture.service().create_push_package("abc123").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CertificateLoad);
    assert!(err.to_string().contains("push.pem"));
    assert_eq!(fixture.work_dir_entries(), 0);
}

#[test]
fn concurrent_builds_do_not_interfere() {
    let fixture = Fixture::new();
    let service = fixture.service();

    let archives: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ["u1", "u2", "u3", "u4"]
            .into_iter()
            .map(|user| {
                let service = &service;
                scope.spawn(move || service.create_push_package(user).unwrap().read().unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (bytes, user) in archives.iter().zip(["u1", "u2", "u3", "u4"]) {
        assert_eq!(member_json(bytes, "website.json")["authenticationToken"], user);
    }
    assert_eq!(fixture.work_dir_entries(), 0);
}
