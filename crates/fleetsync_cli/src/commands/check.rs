use console::style;
use fleetsync::{CollectionClient, DirectoryClient};
use tokio_util::sync::CancellationToken;

use super::shared::build_clients;
use crate::config::ValidatedConfig;

/// Validate configuration and API access without changing anything.
pub(crate) async fn handle_check(
    config: ValidatedConfig,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{} Configuration is valid", style("✓").green());

    let (kandji, cloudflare) = build_clients(&config)?;
    let mut failures = 0usize;

    match kandji.list_devices(&cancel).await {
        Ok(devices) => println!(
            "{} Kandji reachable ({} devices)",
            style("✓").green(),
            devices.len()
        ),
        Err(e) => {
            failures += 1;
            println!("{} Kandji: {e}", style("✗").red());
        }
    }

    let target = &config.options.target_collection;
    let lists = std::iter::once((target, "target"))
        .chain(config.options.auxiliary_collections.iter().map(|id| (id, "source")));

    for (id, role) in lists {
        match cloudflare.collection_metadata(id, &cancel).await {
            Ok(metadata) => {
                println!(
                    "{} {role} list {id}: {} ({})",
                    style("✓").green(),
                    metadata.name,
                    metadata.kind
                );
                if !metadata.kind.is_serial() {
                    println!(
                        "  {} list type is not SERIAL; serial sync may not work as expected",
                        style("!").yellow()
                    );
                }
            }
            Err(e) => {
                // Unreadable source lists are skipped at run time.
                if role == "target" {
                    failures += 1;
                }
                println!("{} {role} list {id}: {e}", style("✗").red());
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} check(s) failed").into());
    }
    Ok(())
}
