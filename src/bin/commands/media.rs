use ebird_sync::{EBirdClient, MediaUploader, SpeciesLibrary};
use std::path::Path;

/// Handle the upload-media command
pub async fn handle_upload_media(
    client: &EBirdClient,
    checklist: &str,
    folder: &Path,
    library: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    if !folder.is_dir() {
        return Err(format!("Photo folder not found: {}", folder.display()).into());
    }

    let library = SpeciesLibrary::load_or_empty(library);
    let summary = MediaUploader::new(client, &library)
        .upload_folder(checklist, folder)
        .await?;

    println!(
        "📷 {checklist}: {} uploaded, {} failed, {} skipped",
        summary.uploaded, summary.failed, summary.skipped
    );
    if summary.failed > 0 {
        println!("⚠️  Some photos failed, see the log above");
    }
    Ok(())
}
