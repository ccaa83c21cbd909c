use ebird_sync::{CredentialStore, EBirdClient, EBirdConfig};
use http_client::HttpClient;
use std::path::PathBuf;

pub fn new_http_client() -> Box<dyn HttpClient> {
    Box::new(http_client::native::NativeClient::new())
}

/// Open the credential file given on the command line, or the default one.
pub fn open_store(config: Option<PathBuf>) -> Result<CredentialStore, Box<dyn std::error::Error>> {
    let path = config.unwrap_or_else(CredentialStore::default_path);
    log::debug!("Using credential file {}", path.display());
    Ok(CredentialStore::open(path)?)
}

pub fn client_from_store(
    store: CredentialStore,
) -> Result<EBirdClient, Box<dyn std::error::Error>> {
    Ok(EBirdClient::from_store(
        new_http_client(),
        store,
        EBirdConfig::default(),
    )?)
}

/// eBird client over the credential file, with refreshed cookies written back to it.
pub fn load_client(config: Option<PathBuf>) -> Result<EBirdClient, Box<dyn std::error::Error>> {
    client_from_store(open_store(config)?)
}
