// aegis-push/src/package/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// One variant per pipeline step. Every failure is terminal for the request.
#[derive(Error, Debug)]
pub enum PushPackageError {
    #[error("Can not create temporary package directory")]
    StagingDirectory(#[source] std::io::Error),

    #[error("Can not encode website descriptor to JSON")]
    DescriptorEncoding(#[source] serde_json::Error),

    #[error("Can not save website descriptor to {}", path.display())]
    DescriptorWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can not create icon set directory {}", path.display())]
    IconSetDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can not copy icon {file} into the package")]
    IconCopy {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Can not calculate SHA-1 of {file}")]
    DigestComputation {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Can not encode manifest to JSON")]
    ManifestEncoding(#[source] serde_json::Error),

    #[error("Can not save manifest to {}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can not read certificate bundle {}", path.display())]
    CertificateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can not parse certificate from {}: {reason}", path.display())]
    CertificateParse { path: PathBuf, reason: String },

    #[error("Can not extract private key from {}: {reason}", path.display())]
    PrivateKeyExtraction { path: PathBuf, reason: String },

    #[error("Can not sign manifest: {0}")]
    Signing(String),

    #[error("Can not sign manifest: can not write S/MIME envelope to {}", path.display())]
    SignatureEnvelope {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can not read PEM signature from {}", path.display())]
    SignatureRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected content of PEM signature: {0}")]
    UnexpectedSignatureContent(String),

    #[error("Can not decode DER signature from base64")]
    BinaryDecoding(#[source] base64::DecodeError),

    #[error("Can not save DER signature to {}", path.display())]
    SignatureWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can not create zip archive")]
    ArchiveCreate(#[source] std::io::Error),

    #[error("Can not add {member} to zip archive")]
    ArchiveAdd {
        member: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Can not close zip archive")]
    ArchiveClose(#[source] zip::result::ZipError),
}

/// Flat, copyable view of [`PushPackageError`] for logging and matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StagingDirectory,
    DescriptorEncoding,
    DescriptorWrite,
    IconSetDirectory,
    IconCopy,
    DigestComputation,
    ManifestEncoding,
    ManifestWrite,
    CertificateLoad,
    CertificateParse,
    PrivateKeyExtraction,
    Signing,
    SignatureRead,
    UnexpectedSignatureContent,
    BinaryDecoding,
    SignatureWrite,
    ArchiveCreate,
    ArchiveAdd,
    ArchiveClose,
}

/// Linear progression of one push package build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    Staged,
    Hashed,
    Signed,
    Assembled,
    Done,
    Failed(ErrorKind),
}

impl PushPackageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StagingDirectory(_) => ErrorKind::StagingDirectory,
            Self::DescriptorEncoding(_) => ErrorKind::DescriptorEncoding,
            Self::DescriptorWrite { .. } => ErrorKind::DescriptorWrite,
            Self::IconSetDirectory { .. } => ErrorKind::IconSetDirectory,
            Self::IconCopy { .. } => ErrorKind::IconCopy,
            Self::DigestComputation { .. } => ErrorKind::DigestComputation,
            Self::ManifestEncoding(_) => ErrorKind::ManifestEncoding,
            Self::ManifestWrite { .. } => ErrorKind::ManifestWrite,
            Self::CertificateLoad { .. } => ErrorKind::CertificateLoad,
            Self::CertificateParse { .. } => ErrorKind::CertificateParse,
            Self::PrivateKeyExtraction { .. } => ErrorKind::PrivateKeyExtraction,
            Self::Signing(_) | Self::SignatureEnvelope { .. } => ErrorKind::Signing,
            Self::SignatureRead { .. } => ErrorKind::SignatureRead,
            Self::UnexpectedSignatureContent(_) => ErrorKind::UnexpectedSignatureContent,
            Self::BinaryDecoding(_) => ErrorKind::BinaryDecoding,
            Self::SignatureWrite { .. } => ErrorKind::SignatureWrite,
            Self::ArchiveCreate(_) => ErrorKind::ArchiveCreate,
            Self::ArchiveAdd { .. } => ErrorKind::ArchiveAdd,
            Self::ArchiveClose(_) => ErrorKind::ArchiveClose,
        }
    }
}

impl ErrorKind {
    /// The state the pipeline had reached when this failure stopped it.
    pub fn failed_from(self) -> PipelineState {
        match self {
            Self::StagingDirectory
            | Self::DescriptorEncoding
            | Self::DescriptorWrite
            | Self::IconSetDirectory
            | Self::IconCopy => PipelineState::NotStarted,
            Self::DigestComputation => PipelineState::Staged,
            Self::ManifestEncoding
            | Self::ManifestWrite
            | Self::CertificateLoad
            | Self::CertificateParse
            | Self::PrivateKeyExtraction
            | Self::Signing
            | Self::SignatureRead
            | Self::UnexpectedSignatureContent
            | Self::BinaryDecoding
            | Self::SignatureWrite => PipelineState::Hashed,
            Self::ArchiveCreate | Self::ArchiveAdd | Self::ArchiveClose => PipelineState::Signed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_the_step_that_failed() {
        assert_eq!(ErrorKind::IconCopy.failed_from(), PipelineState::NotStarted);
        assert_eq!(ErrorKind::DigestComputation.failed_from(), PipelineState::Staged);
        assert_eq!(ErrorKind::CertificateParse.failed_from(), PipelineState::Hashed);
        assert_eq!(ErrorKind::ArchiveClose.failed_from(), PipelineState::Signed);
    }

    #[test]
    fn errors_name_the_offending_file() {
        let err = PushPackageError::IconCopy {
            file: "icon.iconset/icon_16x16.png".into(),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(err.kind(), ErrorKind::IconCopy);
        assert!(err.to_string().contains("icon.iconset/icon_16x16.png"));
    }

    #[test]
    fn envelope_write_failure_is_a_signing_error() {
        let err = PushPackageError::SignatureEnvelope {
            path: PathBuf::from("/tmp/pushPackageX/signature.pem"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(err.kind(), ErrorKind::Signing);
        assert!(err.to_string().contains("signature.pem"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
