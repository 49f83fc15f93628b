// aegis-push/src/package/service.rs

use crate::package::archive::{self, PushPackageArchive};
use crate::package::crypto::ManifestSigner;
use crate::package::error::{PipelineState, PushPackageError};
use crate::package::icons::IconSet;
use crate::package::manifest::Manifest;
use crate::package::staging::StagedPackage;
use crate::package::token;
use crate::package::website::{WebsiteDescriptor, WebsitePushConfiguration};
use std::path::PathBuf;
use tracing::{debug, error, info, instrument};

/// Builds a fresh, signed push package per request.
///
/// Holds only read-only inputs, so one instance can serve concurrent builds;
/// every build gets its own staging directory and archive file.
#[derive(Debug, Clone)]
pub struct PushPackageService {
    config: WebsitePushConfiguration,
    icons: IconSet,
    signer: ManifestSigner,
    work_dir: Option<PathBuf>,
}

impl PushPackageService {
    pub fn new(config: WebsitePushConfiguration, icons: IconSet, signer: ManifestSigner) -> Self {
        Self {
            config,
            icons,
            signer,
            work_dir: None,
        }
    }

    /// Root for staging directories and archives instead of the system temp dir.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn website_push_id(&self) -> &str {
        &self.config.website_push_id
    }

    pub fn count_of_expected_arguments(&self) -> usize {
        self.config.count_of_expected_arguments
    }

    pub fn configuration(&self) -> &WebsitePushConfiguration {
        &self.config
    }

    /// See [`token::parse_user_id`].
    pub fn parse_user_id(&self, authorization: &str) -> String {
        token::parse_user_id(authorization)
    }

    /// Runs the whole pipeline once. `user_id` is embedded verbatim as the
    /// descriptor's authentication token.
    #[instrument(skip_all, fields(push_id = %self.config.website_push_id))]
    pub fn create_push_package(&self, user_id: &str) -> Result<PushPackageArchive, PushPackageError> {
        let mut state = PipelineState::NotStarted;
        match self.run(user_id, &mut state) {
            Ok(archive) => {
                advance(&mut state, PipelineState::Done);
                info!(archive = %archive.path().display(), "Push package created.");
                Ok(archive)
            }
            Err(err) => {
                let kind = err.kind();
                error!(error = %err, ?kind, from = ?state, "Push package pipeline failed.");
                advance(&mut state, PipelineState::Failed(kind));
                Err(err)
            }
        }
    }

    fn run(
        &self,
        user_id: &str,
        state: &mut PipelineState,
    ) -> Result<PushPackageArchive, PushPackageError> {
        let work_dir = self.work_dir.as_deref();

        let descriptor = WebsiteDescriptor::build(&self.config, user_id);
        let staged = StagedPackage::stage(&descriptor, &self.icons, work_dir)?;
        advance(state, PipelineState::Staged);

        let manifest = Manifest::compute(&staged)?;
        advance(state, PipelineState::Hashed);

        let signature = self.signer.sign(&manifest, &staged)?;
        advance(state, PipelineState::Signed);

        let archive = archive::assemble(
            &staged,
            &signature.manifest_bytes,
            &signature.der,
            &self.icons,
            work_dir,
        )?;
        advance(state, PipelineState::Assembled);

        Ok(archive)
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    debug!(from = ?*state, to = ?next, "Pipeline transition.");
    *state = next;
}
