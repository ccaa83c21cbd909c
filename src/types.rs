//! Records scraped from eBird and Avibase and exchanged with BirdReport.

use serde::{Deserialize, Serialize};

/// One row of the "My checklists" page.
///
/// # Examples
///
/// ```rust
/// use ebird_sync::ChecklistSummary;
///
/// let checklist = ChecklistSummary {
///     id: "S302929842".to_string(),
///     date_time: "22 Feb 2026 3:44 PM".to_string(),
///     location: "虞山国家森林公园".to_string(),
///     countries: vec!["Jiangsu".to_string(), "China".to_string()],
///     state: "Jiangsu".to_string(),
///     county: "Suzhou".to_string(),
/// };
/// assert!(checklist.is_china());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistSummary {
    /// Submission id, e.g. `S302929842`
    pub id: String,
    /// Date and time exactly as rendered, e.g. `22 二月 2026 3:44 下午`
    pub date_time: String,
    pub location: String,
    /// Every state/country label shown for the row
    pub countries: Vec<String>,
    /// First state/country label (the province)
    pub state: String,
    pub county: String,
}

impl ChecklistSummary {
    pub fn is_china(&self) -> bool {
        self.countries.iter().any(|c| c == "China" || c == "中国")
    }
}

/// One species row on a checklist detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Species name as displayed in the page locale
    pub name: String,
    /// Observation id, e.g. `OBS4069246435`
    pub obs_id: String,
    /// eBird species code, e.g. `lighth1`
    pub species_code: String,
}

/// Data needed to attach media to a checklist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecklistDetail {
    /// CSRF token from the featured-media component
    pub csrf_token: Option<String>,
    pub observations: Vec<Observation>,
}

impl ChecklistDetail {
    /// Observation for a displayed species name. Later rows win on duplicates.
    pub fn find(&self, name: &str) -> Option<&Observation> {
        self.observations.iter().rev().find(|o| o.name == name)
    }
}

/// Response of the media-upload policy endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadPolicy {
    #[serde(rename = "uploadUrl")]
    pub upload_url: String,
    /// Form fields to post alongside the file
    pub policy: serde_json::Map<String, serde_json::Value>,
    /// Echoed back verbatim when associating the asset
    #[serde(rename = "assetId")]
    pub asset_id: serde_json::Value,
}

impl UploadPolicy {
    /// Policy fields as strings. The file part must follow them.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        self.policy
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

/// One species row of the Avibase regional checklist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvibaseSpecies {
    pub chinese: String,
    pub latin: String,
    pub english: String,
    pub order: String,
    pub family: String,
}

/// One row of the species reference table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeciesRecord {
    pub chinese: String,
    /// Alternate Chinese name recorded when two sources disagree
    pub alternate_chinese: String,
    pub latin: String,
    pub english: String,
    pub order: String,
    pub family: String,
    /// Name eBird displays when it differs from `chinese`
    pub ebird: String,
    /// Name BirdReport expects when it differs from `chinese`
    pub birdreport: String,
}
