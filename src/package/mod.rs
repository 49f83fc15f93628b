// aegis-push/src/package/mod.rs

//! Push package assembly: descriptor, staging, manifest, signature, zip.

pub mod archive;
pub mod crypto;
pub mod error;
pub mod icons;
pub mod manifest;
pub mod service;
pub mod staging;
pub mod token;
pub mod website;

pub use archive::PushPackageArchive;
pub use crypto::{DetachedSignature, ManifestSigner, SigningIdentity};
pub use error::{ErrorKind, PipelineState, PushPackageError};
pub use icons::IconSet;
pub use manifest::Manifest;
pub use service::PushPackageService;
pub use website::{WebsiteDescriptor, WebsitePushConfiguration};

/// Fixed member names Safari looks up inside the package.
pub const WEBSITE_JSON: &str = "website.json";
pub const MANIFEST_JSON: &str = "manifest.json";
pub const SIGNATURE: &str = "signature";
