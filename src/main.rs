// aegis-push/src/main.rs

use aegis_push::config::Config;
use aegis_push::dispatch::Dispatcher;
use aegis_push::dispatch::registry::MemoryRegistry;
use aegis_push::package::{IconSet, ManifestSigner, PushPackageService, SigningIdentity};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[tokio::main]
#[instrument]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Attempting to load .env file...");
    match dotenvy::dotenv() {
        Ok(_) => info!(".env file loaded successfully."),
        Err(_) => warn!(".env file not found. Service will rely on system environment variables."),
    };

    let config = Config::from_env().context("Invalid push package configuration")?;
    let icons = IconSet::load(&config.iconset_dir)
        .with_context(|| format!("Can not load icons from {}", config.iconset_dir.display()))?;
    info!(icons = icons.len(), push_id = %config.website.website_push_id, "Configuration loaded.");

    // Packages reload the bundle per request; this only surfaces provisioning
    // problems at startup.
    if let Err(err) = SigningIdentity::load(
        &config.certificate_path,
        config.certificate_passphrase.as_deref(),
    ) {
        warn!(error = %err, "Signing certificate is not usable yet.");
    }

    let signer = ManifestSigner::new(&config.certificate_path, config.certificate_passphrase.clone());
    let mut service = PushPackageService::new(config.website.clone(), icons, signer);
    if let Some(work_dir) = &config.work_dir {
        service = service.with_work_dir(work_dir);
    }

    let registry = Arc::new(MemoryRegistry::default());
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(service), registry));
    let app = aegis_push::server::router(dispatcher);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!(port = config.port, "Push package service listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
