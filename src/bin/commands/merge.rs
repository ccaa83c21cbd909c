use super::utils::new_http_client;
use ebird_sync::merge::{fetch_avibase, merge_reference_tables, write_merged_csv};
use ebird_sync::{HttpSession, SpeciesLibrary};
use std::path::Path;

/// Handle the merge-species command
pub async fn handle_merge_species(
    library: &Path,
    url: &str,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = SpeciesLibrary::load(library)?;
    let session = HttpSession::new(new_http_client());
    let scraped = fetch_avibase(&session, url).await?;
    println!("🌐 Avibase lists {} species", scraped.len());

    let merged = merge_reference_tables(base.records(), &scraped);
    write_merged_csv(output, &merged)?;

    let renamed = merged
        .iter()
        .filter(|r| !r.alternate_chinese.is_empty())
        .count();
    println!(
        "✅ Wrote {} species to {} ({renamed} with an alternate Chinese name)",
        merged.len(),
        output.display()
    );
    Ok(())
}
