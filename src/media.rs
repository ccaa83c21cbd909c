//! Bulk photo upload to an eBird checklist.
//!
//! Photos are matched to observations by file name: `<species>_Y<anything>.jpg`,
//! where `<species>` is a Chinese name from the species library.

use crate::client::EBirdClient;
use crate::multipart::MultipartForm;
use crate::request::RequestSpec;
use crate::retry::RetryPolicy;
use crate::species::SpeciesLibrary;
use crate::types::{Observation, UploadPolicy};
use crate::{Result, SyncError};
use md5::{Digest, Md5};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

static PHOTO_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+?)_Y.*?\.(jpg|jpeg|JPG|JPEG)$").expect("valid regex"));

const CONTENT_TYPE: &str = "image/jpeg";
const STORAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Species name encoded in a photo file name, if it follows the naming scheme.
pub fn photo_species(file_name: &str) -> Option<&str> {
    PHOTO_NAME
        .captures(file_name)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Photos in `folder` that follow the naming scheme, sorted by file name.
pub fn scan_photo_folder(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut photos = Vec::new();
    for entry in fs::read_dir(folder)? {
        let path = entry?.path();
        let matches = path.is_file()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(photo_species)
                .is_some();
        if matches {
            photos.push(path);
        }
    }
    photos.sort();
    Ok(photos)
}

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: usize,
    pub failed: usize,
    /// Photos whose species is not on the checklist
    pub skipped: usize,
}

/// Uploads photos through the eBird media pipeline:
/// policy request, object-storage upload, asset association.
pub struct MediaUploader<'a> {
    client: &'a EBirdClient,
    library: &'a SpeciesLibrary,
    storage_retry: RetryPolicy,
}

impl<'a> MediaUploader<'a> {
    pub fn new(client: &'a EBirdClient, library: &'a SpeciesLibrary) -> Self {
        Self {
            client,
            library,
            storage_retry: RetryPolicy::fixed(3, Duration::from_secs(2)),
        }
    }

    pub fn with_storage_retry(mut self, retry: RetryPolicy) -> Self {
        self.storage_retry = retry;
        self
    }

    /// Upload every matching photo in `folder` to `checklist_id`.
    ///
    /// Fails up front when the checklist has no observations or no CSRF token.
    /// After that each photo stands alone: failures are logged and counted.
    pub async fn upload_folder(&self, checklist_id: &str, folder: &Path) -> Result<UploadSummary> {
        let detail = self.client.fetch_checklist_detail(checklist_id).await?;
        let Some(csrf_token) = detail.csrf_token.as_deref() else {
            return Err(SyncError::Parse(format!(
                "No media CSRF token on checklist {checklist_id}"
            )));
        };
        if detail.observations.is_empty() {
            return Err(SyncError::Parse(format!(
                "No observations found on checklist {checklist_id}"
            )));
        }

        let mut summary = UploadSummary::default();
        for path in scan_photo_folder(folder)? {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default();
            let Some(species) = photo_species(file_name) else {
                continue;
            };

            let display_name = self.library.ebird_display_name(species);
            let Some(observation) = detail.find(&display_name) else {
                log::warn!("{file_name}: {display_name} is not on checklist {checklist_id}, skipped");
                summary.skipped += 1;
                continue;
            };

            log::info!("Uploading {file_name}");
            match self
                .upload_photo(checklist_id, &path, observation, csrf_token)
                .await
            {
                Ok(()) => {
                    log::info!("Uploaded {file_name} to {display_name}");
                    summary.uploaded += 1;
                }
                Err(e) => {
                    log::warn!("Failed to upload {file_name}: {e}");
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "Media upload finished: {} uploaded, {} failed, {} skipped",
            summary.uploaded,
            summary.failed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Upload one photo and attach it to `observation`.
    pub async fn upload_photo(
        &self,
        checklist_id: &str,
        path: &Path,
        observation: &Observation,
        csrf_token: &str,
    ) -> Result<()> {
        let data = fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let policy = self
            .request_policy(checklist_id, &file_name, &md5_hex(&data))
            .await?;
        self.upload_to_storage(&policy, &file_name, data).await?;
        self.associate(checklist_id, observation, &policy, csrf_token)
            .await
    }

    pub async fn request_policy(
        &self,
        checklist_id: &str,
        file_name: &str,
        md5sum: &str,
    ) -> Result<UploadPolicy> {
        let url = format!(
            "{}/media-upload/checklist/{}/policy",
            self.client.config().base_url,
            checklist_id
        );
        let request = RequestSpec::get(url)
            .query("fileName", file_name)
            .query("md5sum", md5sum)
            .query("contentType", CONTENT_TYPE);

        self.client
            .send_protected(request)
            .await?
            .error_for_status()?
            .json()
    }

    /// POST the policy fields and the file to object storage, without eBird cookies.
    pub async fn upload_to_storage(
        &self,
        policy: &UploadPolicy,
        file_name: &str,
        data: Vec<u8>,
    ) -> Result<()> {
        let form = policy
            .form_fields()
            .into_iter()
            .fold(MultipartForm::new(), |form, (name, value)| form.text(name, value))
            .file("file", file_name, CONTENT_TYPE, data);

        let request = RequestSpec::post(&policy.upload_url)
            .multipart(form)
            .without_cookies()
            .timeout(STORAGE_TIMEOUT)
            .retry(self.storage_retry.clone());

        let response = self.client.session().send(request).await?;
        match response.status {
            200 | 204 => Ok(()),
            status => Err(SyncError::Status {
                status,
                url: response.url,
            }),
        }
    }

    /// Attach an uploaded asset to an observation.
    pub async fn associate(
        &self,
        checklist_id: &str,
        observation: &Observation,
        policy: &UploadPolicy,
        csrf_token: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/media-assets/add/{}",
            self.client.config().base_url,
            checklist_id
        );
        let payload = json!([{
            "obsId": observation.obs_id,
            "speciesCode": observation.species_code,
            "assets": [{ "assetId": policy.asset_id, "mediaType": "P" }],
        }]);

        let response = self
            .client
            .send_protected(
                RequestSpec::post(url)
                    .json(payload)
                    .header("x-csrf-token", csrf_token)
                    .retry(RetryPolicy::none()),
            )
            .await?;

        if response.status == 200 {
            Ok(())
        } else {
            Err(SyncError::Status {
                status: response.status,
                url: response.url,
            })
        }
    }
}
