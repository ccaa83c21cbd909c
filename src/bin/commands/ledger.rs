use ebird_sync::ledger::sync_ledger;
use ebird_sync::{ChecklistLedger, EBirdClient};
use std::path::PathBuf;

/// Handle the ledger command
pub async fn handle_ledger(
    client: &EBirdClient,
    csv: PathBuf,
    notes: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let ledger = ChecklistLedger::new(csv, notes);
    let added = sync_ledger(client, &ledger).await?;

    if added == 0 {
        println!("✅ Ledger is up to date");
    } else {
        println!(
            "✅ Added {added} new checklists to {} and {}",
            ledger.csv_path().display(),
            ledger.notes_path().display()
        );
    }
    Ok(())
}
