use console::style;
use fleetsync::CycleSummary;
use tokio_util::sync::CancellationToken;

use super::shared::{build_engine, validate_lists};
use crate::config::ValidatedConfig;

/// Run passes on the configured interval until shutdown.
pub(crate) async fn handle_run(
    config: ValidatedConfig,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(&config)?;
    validate_lists(&engine, &cancel).await?;

    tracing::info!(
        interval = %humantime_serde::re::humantime::format_duration(config.sync_interval),
        target = %config.options.target_collection,
        sources = config.options.auxiliary_collections.len(),
        on_missing = %config.options.missing_policy,
        "Starting sync service"
    );

    engine.run_forever(config.sync_interval, &cancel).await?;

    tracing::info!("Sync service stopped");
    Ok(())
}

/// Run a single pass and print its summary.
pub(crate) async fn handle_once(
    config: ValidatedConfig,
    cancel: CancellationToken,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = build_engine(&config)?;
    validate_lists(&engine, &cancel).await?;

    let summary = engine.run_once(&cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    if summary.errors > 0 {
        return Err(format!("pass completed with {} error(s)", summary.errors).into());
    }
    Ok(())
}

fn print_summary(summary: &CycleSummary) {
    println!("{}", style("Reconciliation summary").bold());
    println!("  Devices:   {} ({} eligible)", summary.source_total, summary.eligible);
    println!(
        "  Added:     {}/{}",
        style(summary.additions_applied).green(),
        summary.additions_proposed
    );
    println!(
        "  Removed:   {}/{}",
        style(summary.removals_applied).yellow(),
        summary.removals_proposed
    );
    if summary.missing_alerted > 0 {
        println!(
            "  Missing:   {}",
            style(summary.missing_alerted).yellow()
        );
    }
    if summary.errors > 0 {
        println!("  Errors:    {}", style(summary.errors).red());
    }
}
