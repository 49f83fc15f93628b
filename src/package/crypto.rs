// aegis-push/src/package/crypto.rs

use crate::package::error::PushPackageError;
use crate::package::manifest::Manifest;
use crate::package::staging::StagedPackage;
use crate::package::{MANIFEST_JSON, SIGNATURE};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use cms::builder::{SignedDataBuilder, SignerInfoBuilder};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::signed_data::{EncapsulatedContentInfo, SignerIdentifier};
use const_oid::db::{rfc5911::ID_DATA, rfc5912::ID_SHA_256, rfc5912::RSA_ENCRYPTION};
use der::{Decode, Encode};
use pkcs8::{DecodePrivateKey, EncryptedPrivateKeyInfo, PrivateKeyInfo};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use sha2::{Digest, Sha256};
use signature::{Keypair, Signer};
use spki::{
    AlgorithmIdentifierOwned, DynSignatureAlgorithmIdentifier, EncodePublicKey,
    SignatureBitStringEncoding, SubjectPublicKeyInfoOwned,
};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};
use x509_cert::Certificate;

/// Marker that introduces the base64 signature part of the S/MIME envelope.
pub const SIGNATURE_DISPOSITION: &str = "Content-Disposition: attachment; filename=\"smime.p7s\"";

enum PrivateKey {
    Rsa(rsa::pkcs1v15::SigningKey<Sha256>),
    P256(p256::ecdsa::SigningKey),
}

impl PrivateKey {
    fn public_key(&self) -> Result<SubjectPublicKeyInfoOwned, String> {
        let document = match self {
            Self::Rsa(key) => key.verifying_key().to_public_key_der(),
            Self::P256(key) => key.verifying_key().to_public_key_der(),
        };
        let document = document.map_err(|e| e.to_string())?;
        SubjectPublicKeyInfoOwned::from_der(document.as_bytes()).map_err(|e| e.to_string())
    }
}

/// Certificate plus the private key it certifies, parsed from one PEM bundle.
pub struct SigningIdentity {
    certificate: Certificate,
    key: PrivateKey,
}

impl fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("subject", &self.certificate.tbs_certificate.subject.to_string())
            .finish_non_exhaustive()
    }
}

impl SigningIdentity {
    pub fn load(path: &Path, passphrase: Option<&str>) -> Result<Self, PushPackageError> {
        let bytes = std::fs::read(path).map_err(|source| PushPackageError::CertificateLoad {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_pem(path, &bytes, passphrase)
    }

    /// `origin` only labels errors.
    pub fn from_pem(
        origin: &Path,
        bytes: &[u8],
        passphrase: Option<&str>,
    ) -> Result<Self, PushPackageError> {
        let parse_error = |reason: String| PushPackageError::CertificateParse {
            path: origin.to_path_buf(),
            reason,
        };
        let key_error = |reason: String| PushPackageError::PrivateKeyExtraction {
            path: origin.to_path_buf(),
            reason,
        };

        let blocks = pem::parse_many(bytes).map_err(|e| parse_error(e.to_string()))?;
        // parse_many skips a block whose END line is missing.
        let opened = String::from_utf8_lossy(bytes).matches("-----BEGIN ").count();
        if opened != blocks.len() {
            return Err(parse_error(format!(
                "{} of {opened} PEM blocks are terminated",
                blocks.len()
            )));
        }
        let certificate_block = blocks
            .iter()
            .find(|block| block.tag() == "CERTIFICATE")
            .ok_or_else(|| parse_error("no CERTIFICATE block found".into()))?;
        let certificate = Certificate::from_der(certificate_block.contents())
            .map_err(|e| parse_error(e.to_string()))?;

        let key_block = blocks
            .iter()
            .find(|block| block.tag().ends_with("PRIVATE KEY"))
            .ok_or_else(|| key_error("no PRIVATE KEY block found".into()))?;
        let key = decode_private_key(key_block, passphrase).map_err(key_error)?;

        let key_public = key.public_key().map_err(key_error)?;
        let certificate_public = &certificate.tbs_certificate.subject_public_key_info;
        if key_public.subject_public_key != certificate_public.subject_public_key {
            return Err(key_error("private key does not match the certificate".into()));
        }

        Ok(Self { certificate, key })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// DER `ContentInfo` wrapping a detached CMS `SignedData` over `content`.
    pub fn sign_detached(&self, content: &[u8]) -> Result<Vec<u8>, PushPackageError> {
        let signed = match &self.key {
            PrivateKey::Rsa(key) => {
                build_signed_data::<_, rsa::pkcs1v15::Signature>(key, &self.certificate, content)
            }
            PrivateKey::P256(key) => {
                build_signed_data::<_, p256::ecdsa::DerSignature>(key, &self.certificate, content)
            }
        };
        signed.map_err(PushPackageError::Signing)
    }
}

fn decode_private_key(block: &pem::Pem, passphrase: Option<&str>) -> Result<PrivateKey, String> {
    match block.tag() {
        "PRIVATE KEY" => decode_pkcs8(block.contents()),
        "ENCRYPTED PRIVATE KEY" => {
            let passphrase =
                passphrase.ok_or("key is encrypted but no passphrase is configured")?;
            let info = EncryptedPrivateKeyInfo::try_from(block.contents())
                .map_err(|e| e.to_string())?;
            let document = info.decrypt(passphrase).map_err(|e| e.to_string())?;
            decode_pkcs8(document.as_bytes())
        }
        "RSA PRIVATE KEY" => RsaPrivateKey::from_pkcs1_der(block.contents())
            .map(|key| PrivateKey::Rsa(rsa::pkcs1v15::SigningKey::new(key)))
            .map_err(|e| e.to_string()),
        "EC PRIVATE KEY" => p256::SecretKey::from_sec1_der(block.contents())
            .map(|secret| PrivateKey::P256(p256::ecdsa::SigningKey::from(secret)))
            .map_err(|e| e.to_string()),
        other => Err(format!("unsupported key block `{other}`")),
    }
}

fn decode_pkcs8(der: &[u8]) -> Result<PrivateKey, String> {
    let info = PrivateKeyInfo::try_from(der).map_err(|e| e.to_string())?;
    if info.algorithm.oid == RSA_ENCRYPTION {
        RsaPrivateKey::from_pkcs8_der(der)
            .map(|key| PrivateKey::Rsa(rsa::pkcs1v15::SigningKey::new(key)))
            .map_err(|e| e.to_string())
    } else {
        p256::ecdsa::SigningKey::from_pkcs8_der(der)
            .map(PrivateKey::P256)
            .map_err(|e| format!("only RSA and P-256 keys are supported: {e}"))
    }
}

fn build_signed_data<S, Sig>(
    signer: &S,
    certificate: &Certificate,
    content: &[u8],
) -> Result<Vec<u8>, String>
where
    S: Keypair + DynSignatureAlgorithmIdentifier + Signer<Sig>,
    S::VerifyingKey: EncodePublicKey,
    Sig: SignatureBitStringEncoding,
{
    let digest = Sha256::digest(content);
    let encapsulated = EncapsulatedContentInfo {
        econtent_type: ID_DATA,
        econtent: None,
    };
    let digest_algorithm = AlgorithmIdentifierOwned {
        oid: ID_SHA_256,
        parameters: None,
    };
    let signer_id = SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
        issuer: certificate.tbs_certificate.issuer.clone(),
        serial_number: certificate.tbs_certificate.serial_number.clone(),
    });

    let signer_info = SignerInfoBuilder::new(
        signer,
        signer_id,
        digest_algorithm.clone(),
        &encapsulated,
        Some(digest.as_slice()),
    )
    .map_err(|e| format!("{e:?}"))?;

    let mut builder = SignedDataBuilder::new(&encapsulated);
    let content_info = builder
        .add_digest_algorithm(digest_algorithm)
        .map_err(|e| format!("{e:?}"))?
        .add_certificate(CertificateChoices::Certificate(certificate.clone()))
        .map_err(|e| format!("{e:?}"))?
        .add_signer_info::<S, Sig>(signer_info)
        .map_err(|e| format!("{e:?}"))?
        .build()
        .map_err(|e| format!("{e:?}"))?;

    content_info.to_der().map_err(|e| e.to_string())
}

/// Wraps a DER signature in the `multipart/signed` S/MIME text form.
pub fn smime_envelope(content: &[u8], signature_der: &[u8]) -> String {
    let boundary = format!("----{}", hex::encode_upper(&Sha256::digest(signature_der)[..16]));
    let encoded = BASE64.encode(signature_der);
    let mut body = String::with_capacity(encoded.len() + encoded.len() / 64 + 1);
    for line in encoded.as_bytes().chunks(64) {
        body.push_str(&String::from_utf8_lossy(line));
        body.push('\n');
    }

    format!(
        "MIME-Version: 1.0\n\
         Content-Type: multipart/signed; protocol=\"application/x-pkcs7-signature\"; micalg=\"sha-256\"; boundary=\"{boundary}\"\n\
         \n\
         This is an S/MIME signed message\n\
         \n\
         --{boundary}\n\
         {content}\n\
         --{boundary}\n\
         Content-Type: application/x-pkcs7-signature; name=\"smime.p7s\"\n\
         Content-Transfer-Encoding: base64\n\
         {SIGNATURE_DISPOSITION}\n\
         \n\
         {body}\n\
         --{boundary}--\n",
        content = String::from_utf8_lossy(content),
    )
}

/// Validates the envelope structure and returns its base64 signature body.
pub fn envelope_signature_body(envelope: &str) -> Result<&str, PushPackageError> {
    let unexpected = |reason: &str| PushPackageError::UnexpectedSignatureContent(reason.into());

    let boundary = envelope
        .lines()
        .find_map(|line| line.strip_prefix("Content-Type: multipart/signed"))
        .and_then(|params| {
            params
                .split(';')
                .find_map(|param| param.trim().strip_prefix("boundary="))
        })
        .map(|boundary| boundary.trim().trim_matches('"'))
        .filter(|boundary| !boundary.is_empty())
        .ok_or_else(|| unexpected("missing multipart/signed boundary"))?;
    let delimiter = format!("--{boundary}");
    if !envelope.contains(&format!("{delimiter}--")) {
        return Err(unexpected("missing closing boundary"));
    }

    let marker = envelope
        .find(SIGNATURE_DISPOSITION)
        .ok_or_else(|| unexpected("missing smime.p7s attachment"))?;
    let after_marker = &envelope[marker + SIGNATURE_DISPOSITION.len()..];
    let after_headers = after_marker
        .find('\n')
        .map(|line_end| &after_marker[line_end + 1..])
        .ok_or_else(|| unexpected("truncated signature part"))?;
    let end = after_headers
        .find(&delimiter)
        .ok_or_else(|| unexpected("signature part is not terminated by a boundary"))?;

    let body = after_headers[..end].trim();
    if body.is_empty() {
        return Err(unexpected("empty signature body"));
    }
    Ok(body)
}

/// Strips line wrapping and decodes the base64 body to raw DER.
pub fn decode_signature_body(body: &str) -> Result<Vec<u8>, PushPackageError> {
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64
        .decode(compact)
        .map_err(PushPackageError::BinaryDecoding)
}

/// Result of [`ManifestSigner::sign`]: the signed bytes and the DER signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedSignature {
    pub manifest_bytes: Vec<u8>,
    pub der: Vec<u8>,
}

/// Signs `manifest.json` with the certificate bundle at `certificate_path`.
///
/// The bundle is re-read on every call; nothing is shared between builds.
#[derive(Debug, Clone)]
pub struct ManifestSigner {
    certificate_path: PathBuf,
    passphrase: Option<String>,
}

impl ManifestSigner {
    pub fn new(certificate_path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            certificate_path: certificate_path.into(),
            passphrase,
        }
    }

    #[instrument(skip_all, fields(certificate = %self.certificate_path.display()))]
    pub fn sign(
        &self,
        manifest: &Manifest,
        staged: &StagedPackage,
    ) -> Result<DetachedSignature, PushPackageError> {
        let manifest_bytes = manifest.to_json_bytes()?;
        let manifest_path = staged.member_path(MANIFEST_JSON);
        std::fs::write(&manifest_path, &manifest_bytes).map_err(|source| {
            PushPackageError::ManifestWrite {
                path: manifest_path.clone(),
                source,
            }
        })?;

        let identity = SigningIdentity::load(&self.certificate_path, self.passphrase.as_deref())?;
        debug!(identity = ?identity, "Loaded signing identity.");
        let signed = identity.sign_detached(&manifest_bytes)?;

        // The envelope file lives only as long as this call.
        let pem_file = tempfile::Builder::new()
            .prefix("signature")
            .suffix(".pem")
            .tempfile_in(staged.path())
            .map_err(|source| PushPackageError::SignatureEnvelope {
                path: staged.path().to_path_buf(),
                source,
            })?;
        std::fs::write(pem_file.path(), smime_envelope(&manifest_bytes, &signed)).map_err(
            |source| PushPackageError::SignatureEnvelope {
                path: pem_file.path().to_path_buf(),
                source,
            },
        )?;

        let envelope = std::fs::read_to_string(pem_file.path()).map_err(|source| {
            PushPackageError::SignatureRead {
                path: pem_file.path().to_path_buf(),
                source,
            }
        })?;
        let der = decode_signature_body(envelope_signature_body(&envelope)?)?;

        let signature_path = staged.member_path(SIGNATURE);
        std::fs::write(&signature_path, &der).map_err(|source| {
            PushPackageError::SignatureWrite {
                path: signature_path.clone(),
                source,
            }
        })?;
        debug!(bytes = der.len(), "Wrote DER signature.");

        Ok(DetachedSignature {
            manifest_bytes,
            der,
        })
    }
}

#[cfg(feature = "verifier")]
pub use verify::{VerificationError, verify_detached_signature};

#[cfg(feature = "verifier")]
mod verify {
    use super::*;
    use cms::content_info::ContentInfo;
    use cms::signed_data::SignedData;
    use const_oid::db::rfc5911::{ID_MESSAGE_DIGEST, ID_SIGNED_DATA};
    use const_oid::db::rfc5912::ID_EC_PUBLIC_KEY;
    use der::asn1::OctetString;
    use signature::Verifier;
    use spki::DecodePublicKey;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum VerificationError {
        #[error("Malformed signature: {0}")]
        Malformed(String),
        #[error("Signed digest does not match the content")]
        DigestMismatch,
        #[error("Signature does not verify against the certificate")]
        BadSignature,
        #[error("Unsupported public key algorithm {0}")]
        UnsupportedKey(String),
    }

    fn malformed(err: impl fmt::Display) -> VerificationError {
        VerificationError::Malformed(err.to_string())
    }

    /// Checks a DER detached signature against `content` and `certificate`.
    pub fn verify_detached_signature(
        signature_der: &[u8],
        content: &[u8],
        certificate: &Certificate,
    ) -> Result<(), VerificationError> {
        let content_info = ContentInfo::from_der(signature_der).map_err(malformed)?;
        if content_info.content_type != ID_SIGNED_DATA {
            return Err(malformed("not a SignedData structure"));
        }
        let signed_data: SignedData = content_info.content.decode_as().map_err(malformed)?;
        let signer = signed_data
            .signer_infos
            .0
            .iter()
            .next()
            .ok_or_else(|| malformed("no signer info"))?;
        let attributes = signer
            .signed_attrs
            .as_ref()
            .ok_or_else(|| malformed("no signed attributes"))?;

        let message_digest = attributes
            .iter()
            .find(|attribute| attribute.oid == ID_MESSAGE_DIGEST)
            .and_then(|attribute| attribute.values.iter().next())
            .ok_or_else(|| malformed("no message digest attribute"))?
            .decode_as::<OctetString>()
            .map_err(malformed)?;
        if message_digest.as_bytes() != Sha256::digest(content).as_slice() {
            return Err(VerificationError::DigestMismatch);
        }

        let signed_bytes = attributes.to_der().map_err(malformed)?;
        let public_key = &certificate.tbs_certificate.subject_public_key_info;
        let public_key_der = public_key.to_der().map_err(malformed)?;
        let signature_bytes = signer.signature.as_bytes();

        if public_key.algorithm.oid == RSA_ENCRYPTION {
            let key = rsa::RsaPublicKey::from_public_key_der(&public_key_der).map_err(malformed)?;
            let signature =
                rsa::pkcs1v15::Signature::try_from(signature_bytes).map_err(malformed)?;
            rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key)
                .verify(&signed_bytes, &signature)
                .map_err(|_| VerificationError::BadSignature)
        } else if public_key.algorithm.oid == ID_EC_PUBLIC_KEY {
            let key = p256::ecdsa::VerifyingKey::from_public_key_der(&public_key_der)
                .map_err(malformed)?;
            let signature =
                p256::ecdsa::Signature::from_der(signature_bytes).map_err(malformed)?;
            key.verify(&signed_bytes, &signature)
                .map_err(|_| VerificationError::BadSignature)
        } else {
            Err(VerificationError::UnsupportedKey(
                public_key.algorithm.oid.to_string(),
            ))
        }
    }
}
