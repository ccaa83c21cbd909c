//! Species reference table and name resolution between eBird and BirdReport.
//!
//! The table is a spreadsheet (or the merged CSV) with at least the columns
//! `中文名` and `拉丁名`. The optional columns `备选中文名`, `英文名`, `目`, `科`,
//! `ebird` and `birdreport` hold the alternate names and per-platform aliases.

use crate::types::SpeciesRecord;
use crate::{Result, SyncError};
use calamine::{open_workbook_auto, Reader};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;

static BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(([^)]+)\)").expect("valid regex"));

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// Contents of every parenthesised group in `label`, in order.
fn bracket_groups(label: &str) -> Vec<&str> {
    BRACKETS
        .captures_iter(label)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

/// Extract the Latin name from an eBird species label.
///
/// Takes the last parenthesised group and keeps the text before the first `/`.
///
/// ```rust
/// use ebird_sync::species::extract_latin_name;
///
/// assert_eq!(
///     extract_latin_name("织女银鸥/蒙古银鸥 (西伯利亚银鸥) (Larus vegae/mongolicus)").as_deref(),
///     Some("Larus vegae")
/// );
/// assert_eq!(extract_latin_name("麻雀"), None);
/// ```
pub fn extract_latin_name(label: &str) -> Option<String> {
    let last = bracket_groups(label).pop()?;
    let latin = last.split('/').next().unwrap_or_default().trim();
    Some(latin.to_string())
}

/// Label text before the first `(`.
fn plain_name(label: &str) -> String {
    label.split('(').next().unwrap_or_default().trim().to_string()
}

/// In-memory species reference table.
///
/// Lookups by Chinese name are case-insensitive. When a key repeats, the
/// first row wins.
#[derive(Debug, Clone, Default)]
pub struct SpeciesLibrary {
    records: Vec<SpeciesRecord>,
    by_chinese: HashMap<String, usize>,
    by_latin: HashMap<String, usize>,
    by_ebird: HashMap<String, usize>,
}

impl SpeciesLibrary {
    pub fn new(records: Vec<SpeciesRecord>) -> Self {
        let mut library = Self::default();
        for (index, record) in records.iter().enumerate() {
            let chinese = record.chinese.trim();
            if !chinese.is_empty() {
                library
                    .by_chinese
                    .entry(chinese.to_lowercase())
                    .or_insert(index);
            }
            library
                .by_latin
                .entry(record.latin.trim().to_string())
                .or_insert(index);
            let ebird = record.ebird.trim();
            if !ebird.is_empty() {
                library.by_ebird.entry(ebird.to_string()).or_insert(index);
            }
        }
        library.records = records;
        library
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the table from a spreadsheet or CSV file, picked by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let rows = if SPREADSHEET_EXTENSIONS.contains(&extension.as_str()) {
            read_spreadsheet_rows(path)?
        } else {
            read_csv_rows(path)?
        };

        let records = records_from_rows(rows)?;
        log::info!(
            "Loaded {} species from {}",
            records.len(),
            path.display()
        );
        Ok(Self::new(records))
    }

    /// Like [`load`](Self::load), but a missing or unreadable file only logs a
    /// warning and yields an empty library: names then pass through unchanged.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!("Species library {} does not exist", path.display());
            return Self::empty();
        }
        Self::load(path).unwrap_or_else(|e| {
            log::warn!("Failed to load species library {}: {e}", path.display());
            Self::empty()
        })
    }

    pub fn records(&self) -> &[SpeciesRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn by_latin(&self, latin: &str) -> Option<&SpeciesRecord> {
        self.by_latin.get(latin.trim()).map(|&i| &self.records[i])
    }

    pub fn by_chinese(&self, chinese: &str) -> Option<&SpeciesRecord> {
        self.by_chinese
            .get(&chinese.trim().to_lowercase())
            .map(|&i| &self.records[i])
    }

    fn by_ebird_alias(&self, alias: &str) -> Option<&SpeciesRecord> {
        self.by_ebird.get(alias.trim()).map(|&i| &self.records[i])
    }

    /// Name BirdReport expects for an eBird export label such as
    /// `白头鹎 (Pycnonotus sinensis)`.
    ///
    /// Resolution order: Latin name from the last bracket (its BirdReport alias
    /// if set, else its Chinese name), then the first bracket against the eBird
    /// alias column, then the label text before `(`.
    pub fn birdreport_name(&self, label: &str) -> String {
        let groups = bracket_groups(label);
        let Some(last) = groups.last() else {
            return plain_name(label);
        };

        let latin = last.split('/').next().unwrap_or_default().trim();
        if let Some(record) = self.by_latin(latin) {
            let name = if record.birdreport.is_empty() {
                &record.chinese
            } else {
                &record.birdreport
            };
            return name.trim().to_string();
        }

        if let Some(record) = self.by_ebird_alias(groups[0]) {
            return record.chinese.trim().to_string();
        }

        log::debug!("No library entry for {label}, using the label as is");
        plain_name(label)
    }

    /// Name eBird displays for a Chinese species name.
    ///
    /// The eBird alias if one is set, otherwise the library's Chinese name.
    /// Unknown names are returned unchanged.
    pub fn ebird_display_name(&self, name: &str) -> String {
        match self.by_chinese(name) {
            Some(record) if !record.ebird.trim().is_empty() => record.ebird.trim().to_string(),
            Some(record) => record.chinese.trim().to_string(),
            None => name.to_string(),
        }
    }
}

fn read_spreadsheet_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SyncError::Spreadsheet(format!("{} has no worksheets", path.display())))??;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect())
}

fn read_csv_rows(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Map a header row plus data rows onto records. Rows without a Latin name are skipped.
fn records_from_rows(rows: Vec<Vec<String>>) -> Result<Vec<SpeciesRecord>> {
    let mut rows = rows.into_iter();
    let header: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let column = |name: &str| header.iter().position(|h| h == name);
    let (Some(chinese), Some(latin)) = (column("中文名"), column("拉丁名")) else {
        return Err(SyncError::Spreadsheet(
            "Species library needs 中文名 and 拉丁名 columns".to_string(),
        ));
    };
    let alternate = column("备选中文名");
    let english = column("英文名");
    let order = column("目");
    let family = column("科");
    let ebird = column("ebird");
    let birdreport = column("birdreport");

    let cell = |row: &[String], index: Option<usize>| -> String {
        index
            .and_then(|i| row.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    Ok(rows
        .filter_map(|row| {
            let latin = cell(&row, Some(latin));
            if latin.is_empty() {
                return None;
            }
            Some(SpeciesRecord {
                chinese: cell(&row, Some(chinese)),
                alternate_chinese: cell(&row, alternate),
                latin,
                english: cell(&row, english),
                order: cell(&row, order),
                family: cell(&row, family),
                ebird: cell(&row, ebird),
                birdreport: cell(&row, birdreport),
            })
        })
        .collect())
}
