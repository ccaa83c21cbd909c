pub mod birdreport;
pub mod ledger;
pub mod media;
pub mod merge;
pub mod utils;

use clap::Subcommand;
use ebird_sync::merge::DEFAULT_AVIBASE_URL;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Add new eBird checklists to the local ledger
    ///
    /// Scrapes "My checklists", appends the checklists the ledger does not know
    /// yet, and adds a heading for each of them to the top of the notes file.
    ///
    /// Usage examples:
    /// # Update the default ledger
    /// ebird-sync ledger
    ///
    /// # Use another ledger and notes file
    /// ebird-sync ledger --csv records.csv --notes notes.md
    Ledger {
        /// Ledger CSV
        #[arg(long, default_value = "resource/观鸟记录表.csv")]
        csv: PathBuf,

        /// Markdown notes file
        #[arg(long, default_value = "resource/birding_notes.md")]
        notes: PathBuf,
    },

    /// Upload a folder of photos to a checklist
    ///
    /// Files must be named `<species>_Y<anything>.jpg`. Each photo is attached
    /// to the observation of that species on the checklist.
    ///
    /// Usage examples:
    /// ebird-sync upload-media S301899422 "D:\birds\20260218 虞山国家森林公园"
    UploadMedia {
        /// Checklist id, e.g. S301899422
        checklist: String,

        /// Folder containing the photos
        folder: PathBuf,

        /// Species reference table (xlsx or csv)
        #[arg(long, default_value = "final_merged_birds.csv")]
        library: PathBuf,
    },

    /// Copy a checklist to BirdReport
    ///
    /// Usage examples:
    /// ebird-sync sync-birdreport S302929842 200828
    SyncBirdreport {
        /// Checklist id, e.g. S302929842
        checklist: String,

        /// BirdReport point id from the points table
        point_id: String,

        /// Species reference table (xlsx or csv)
        #[arg(long, default_value = "resource/bird_species_library.xlsx")]
        library: PathBuf,

        /// BirdReport points table
        #[arg(long, default_value = "chinese_points.csv")]
        points: PathBuf,
    },

    /// Merge an Avibase regional checklist into the species table
    ///
    /// Usage examples:
    /// ebird-sync merge-species --library bird_species_library.xlsx --output final_merged_birds.csv
    MergeSpecies {
        /// Existing species reference table (xlsx or csv)
        #[arg(long, default_value = "bird_species_library.xlsx")]
        library: PathBuf,

        /// Avibase checklist page
        #[arg(long, default_value = DEFAULT_AVIBASE_URL)]
        url: String,

        /// Merged CSV to write
        #[arg(long, default_value = "final_merged_birds.csv")]
        output: PathBuf,
    },
}

/// Execute the appropriate command handler based on the parsed command
pub async fn execute_command(
    command: Commands,
    config: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Ledger { csv, notes } => {
            let client = utils::load_client(config)?;
            ledger::handle_ledger(&client, csv, notes).await
        }
        Commands::UploadMedia {
            checklist,
            folder,
            library,
        } => {
            let client = utils::load_client(config)?;
            media::handle_upload_media(&client, &checklist, &folder, &library).await
        }
        Commands::SyncBirdreport {
            checklist,
            point_id,
            library,
            points,
        } => {
            let store = utils::open_store(config)?;
            let client = utils::client_from_store(store.clone())?;
            birdreport::handle_sync_birdreport(
                &client, &store, &checklist, &point_id, &library, &points,
            )
            .await
        }
        Commands::MergeSpecies {
            library,
            url,
            output,
        } => merge::handle_merge_species(&library, &url, &output).await,
    }
}
