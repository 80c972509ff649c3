use std::sync::Arc;

use fleetsync::cloudflare::CloudflareClient;
use fleetsync::kandji::KandjiClient;
use fleetsync::{CollectionClient, RateGovernor, SyncEngine};
use tokio_util::sync::CancellationToken;

use crate::config::ValidatedConfig;
use crate::progress::LoggingReporter;

pub(crate) type Engine = SyncEngine<KandjiClient, CloudflareClient>;

/// Build both API clients sharing one rate governor.
pub(crate) fn build_clients(
    config: &ValidatedConfig,
) -> Result<(KandjiClient, CloudflareClient), Box<dyn std::error::Error>> {
    let governor = RateGovernor::new(config.directory_budget, config.collection_budget)?;

    let kandji = KandjiClient::new(
        &config.kandji_api_url,
        &config.kandji_api_token,
        governor.clone(),
    )?;
    let cloudflare = CloudflareClient::new(
        &config.cloudflare_account_id,
        &config.cloudflare_api_token,
        governor,
    )?;

    Ok((kandji, cloudflare))
}

/// Build the engine with progress rendered through tracing.
pub(crate) fn build_engine(config: &ValidatedConfig) -> Result<Engine, Box<dyn std::error::Error>> {
    let (kandji, cloudflare) = build_clients(config)?;
    let reporter = Arc::new(LoggingReporter::new());

    let engine = SyncEngine::new(kandji, cloudflare, config.options.clone())?;
    Ok(engine.with_progress(reporter.as_callback()))
}

/// Check the target list (fatal) and every source list (warning only).
pub(crate) async fn validate_lists(
    engine: &Engine,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let options = engine.options();
    let cloudflare = engine.collections();

    cloudflare
        .validate_exists(&options.target_collection, cancel)
        .await
        .map_err(|e| format!("target list {}: {e}", options.target_collection))?;

    for id in &options.auxiliary_collections {
        if let Err(e) = cloudflare.validate_exists(id, cancel).await {
            tracing::warn!(list_id = %id, error = %e, "Source list is not accessible");
        }
    }

    Ok(())
}
