use ebird_sync::{BirdReportConfig, BirdReportSync, CredentialStore, EBirdClient, SpeciesLibrary};
use std::path::Path;

/// Handle the sync-birdreport command
pub async fn handle_sync_birdreport(
    client: &EBirdClient,
    store: &CredentialStore,
    checklist: &str,
    point_id: &str,
    library: &Path,
    points: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let credentials = store.birdreport_credentials()?;
    let library = SpeciesLibrary::load_or_empty(library);

    let outcome = BirdReportSync::new(client, &library, credentials, BirdReportConfig::default())
        .sync(checklist, point_id, points)
        .await?;

    println!(
        "✅ {checklist} -> BirdReport activity {} ({} taxa, {}h)",
        outcome.activity_id, outcome.taxa, outcome.effective_hours
    );
    Ok(())
}
