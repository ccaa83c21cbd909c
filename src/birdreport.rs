//! Sync an eBird checklist into a BirdReport (中国观鸟记录中心) report.
//!
//! The report is built in four API calls: create the report, upload the
//! species spreadsheet, push the parsed taxa, and set the effective hours.

use crate::client::EBirdClient;
use crate::config::{BirdReportConfig, BirdReportCredentials};
use crate::convert::{convert_export, ConvertedChecklist};
use crate::multipart::MultipartForm;
use crate::request::{PageResponse, RequestSpec};
use crate::retry::RetryPolicy;
use crate::species::SpeciesLibrary;
use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// A row of the points table (`chinese_points.csv`) as sent to `saveReport`.
///
/// Every column is passed through as a string except `isopen`, which the API
/// wants as an integer; `member_id` is added.
#[derive(Debug, Clone, PartialEq)]
pub struct PointInfo(Map<String, Value>);

impl PointInfo {
    pub fn point_id(&self) -> Value {
        self.0.get("point_id").cloned().unwrap_or(Value::Null)
    }

    pub fn as_json(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Look up `point_id` in the points CSV.
pub fn find_point(points_csv: &Path, point_id: &str, member_id: i64) -> Result<PointInfo> {
    if !points_csv.exists() {
        return Err(SyncError::Config(format!(
            "Points file not found: {}",
            points_csv.display()
        )));
    }

    let mut reader = csv::Reader::from_path(points_csv)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    for record in reader.records() {
        let record = record?;
        let mut point: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), Value::String(v.to_string())))
            .collect();

        if point.get("point_id").and_then(Value::as_str) != Some(point_id) {
            continue;
        }

        if let Some(isopen) = point.get("isopen").and_then(Value::as_str) {
            let isopen = isopen.trim().parse::<i64>().map_err(|e| {
                SyncError::Parse(format!("Point {point_id} has a non-numeric isopen: {e}"))
            })?;
            point.insert("isopen".to_string(), json!(isopen));
        }
        point.insert("member_id".to_string(), json!(member_id));
        return Ok(PointInfo(point));
    }

    Err(SyncError::Config(format!(
        "Point {point_id} not found in {}",
        points_csv.display()
    )))
}

/// Taxon row returned by the spreadsheet upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedTaxon {
    pub taxon_id: Value,
    pub taxon_count: Value,
    pub uuid: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    pub activity_id: Value,
    pub taxa: usize,
    pub effective_hours: String,
}

/// Deletes the temporary spreadsheet however the sync ends.
struct TempSpreadsheet {
    path: PathBuf,
}

impl TempSpreadsheet {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempSpreadsheet {
    fn drop(&mut self) {
        if self.path.exists() {
            match fs::remove_file(&self.path) {
                Ok(()) => log::debug!("Removed {}", self.path.display()),
                Err(e) => log::warn!("Failed to remove {}: {e}", self.path.display()),
            }
        }
    }
}

/// `activity_id` values come back as numbers or strings; requests want the text.
fn id_text(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a BirdReport JSON envelope, failing on `success: false`.
fn api_body(response: PageResponse, endpoint: &str) -> Result<Value> {
    let response = response.error_for_status()?;
    let body: Value = response.json()?;
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(SyncError::Api(format!("{endpoint} rejected the request: {body}")));
    }
    Ok(body)
}

pub struct BirdReportSync<'a> {
    client: &'a EBirdClient,
    library: &'a SpeciesLibrary,
    credentials: BirdReportCredentials,
    config: BirdReportConfig,
    work_dir: PathBuf,
}

impl<'a> BirdReportSync<'a> {
    pub fn new(
        client: &'a EBirdClient,
        library: &'a SpeciesLibrary,
        credentials: BirdReportCredentials,
        config: BirdReportConfig,
    ) -> Self {
        Self {
            client,
            library,
            credentials,
            config,
            work_dir: std::env::temp_dir(),
        }
    }

    /// Directory for the temporary spreadsheet.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    /// Copy checklist `checklist_id` to BirdReport at point `point_id`.
    ///
    /// The point is resolved before anything is sent, so an unknown point
    /// leaves both sites untouched.
    pub async fn sync(
        &self,
        checklist_id: &str,
        point_id: &str,
        points_csv: &Path,
    ) -> Result<SyncOutcome> {
        let point = find_point(points_csv, point_id, self.credentials.member_id)?;

        let export = self.client.download_checklist_csv(checklist_id).await?;
        let converted = convert_export(&export, self.library)?;

        let spreadsheet = TempSpreadsheet::new(self.work_dir.join(format!("sync_{checklist_id}.xlsx")));
        converted.write_spreadsheet(spreadsheet.path())?;

        let activity_id = self.create_report(&point, &converted, checklist_id).await?;
        let taxa = self.upload_spreadsheet(&activity_id, spreadsheet.path()).await?;
        self.push_taxa(&point, &activity_id, &taxa).await?;
        self.update_options(&activity_id, &converted.effective_hours())
            .await?;

        log::info!(
            "Synced {checklist_id} to BirdReport activity {}",
            id_text(&activity_id)
        );
        Ok(SyncOutcome {
            activity_id,
            taxa: taxa.len(),
            effective_hours: converted.effective_hours(),
        })
    }

    fn request(&self, path: &str) -> RequestSpec {
        RequestSpec::post(self.config.endpoint(path))
            .header("X-Auth-Token", &self.credentials.token)
            .header("Referer", &self.config.referer)
    }

    /// A call that creates server-side records; sent exactly once.
    fn single_shot(&self, path: &str) -> RequestSpec {
        self.request(path).retry(RetryPolicy::none())
    }

    /// Create the report; returns its activity id.
    pub async fn create_report(
        &self,
        point: &PointInfo,
        converted: &ConvertedChecklist,
        checklist_id: &str,
    ) -> Result<Value> {
        log::info!("Creating BirdReport report...");
        let payload = json!({
            "point": point.as_json(),
            "activity": {
                "id": "",
                "start_time": converted.start_time(),
                "end_time": converted.end_time(),
                "state": "2",
                "note": format!("Imported from eBird {checklist_id}"),
                "keywords": "",
                "domain_type": 0,
                "member_id": self.credentials.member_id,
            },
            "units_activity": [],
        });

        let endpoint = "/member/system/activity/saveReport";
        let response = self
            .client
            .session()
            .send(self.single_shot(endpoint).json(payload))
            .await?;
        let body = api_body(response, endpoint)?;

        body.pointer("/data/activity_id")
            .filter(|id| !id.is_null())
            .cloned()
            .ok_or_else(|| SyncError::Api(format!("saveReport returned no activity id: {body}")))
    }

    /// Upload the species spreadsheet; BirdReport answers with the taxa it recognised.
    pub async fn upload_spreadsheet(
        &self,
        activity_id: &Value,
        spreadsheet: &Path,
    ) -> Result<Vec<UploadedTaxon>> {
        let file_name = spreadsheet
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("species.xlsx");
        let form = MultipartForm::new()
            .file("file", file_name, XLSX_CONTENT_TYPE, fs::read(spreadsheet)?)
            .text("activity_id", id_text(activity_id));

        let endpoint = "/member/system/upload/excel";
        let response = self
            .client
            .session()
            .send(self.single_shot(endpoint).multipart(form))
            .await?;
        let body = api_body(response, endpoint)?;

        let data = body.get("data").cloned().unwrap_or(Value::Array(Vec::new()));
        let taxa: Vec<UploadedTaxon> = serde_json::from_value(data)?;
        log::info!("BirdReport recognised {} taxa", taxa.len());
        Ok(taxa)
    }

    pub async fn push_taxa(
        &self,
        point: &PointInfo,
        activity_id: &Value,
        taxa: &[UploadedTaxon],
    ) -> Result<()> {
        let records: Vec<Value> = taxa
            .iter()
            .map(|taxon| {
                json!({
                    "activity_id": activity_id,
                    "taxon_id": taxon.taxon_id,
                    "taxon_count": taxon.taxon_count,
                    "member_id": self.credentials.member_id,
                    "uuid": taxon.uuid,
                })
            })
            .collect();
        let payload = json!({
            "point": { "point_id": point.point_id() },
            "activity": { "id": id_text(activity_id) },
            "records": records,
        });

        let endpoint = "/member/system/upload/pushTaxon";
        let response = self
            .client
            .session()
            .send(self.single_shot(endpoint).json(payload))
            .await?;
        api_body(response, endpoint).map(|_| ())
    }

    pub async fn update_options(&self, activity_id: &Value, effective_hours: &str) -> Result<()> {
        let payload = json!({
            "effective_hours": effective_hours,
            "reportId": id_text(activity_id),
            "eye_all_birds": "1",
            "real_quantity": "1",
        });

        let endpoint = "/member/system/activity/updateOptions";
        let response = self
            .client
            .session()
            .send(self.request(endpoint).json(payload))
            .await?;
        api_body(response, endpoint).map(|_| ())
    }
}
