//! Local checklist ledger: a CSV of every checklist plus a Markdown notes file.

use crate::client::EBirdClient;
use crate::types::ChecklistSummary;
use crate::Result;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

const NO: &str = "否";
const NOT_APPLICABLE: &str = "NA";

/// Chinese month names as rendered by eBird's zh locale, longest first so
/// that `十二月` is not read as `二月`.
const CHINESE_MONTHS: &[(&str, &str)] = &[
    ("十二月", "Dec"),
    ("十一月", "Nov"),
    ("十月", "Oct"),
    ("九月", "Sep"),
    ("八月", "Aug"),
    ("七月", "Jul"),
    ("六月", "Jun"),
    ("五月", "May"),
    ("四月", "Apr"),
    ("三月", "Mar"),
    ("二月", "Feb"),
    ("一月", "Jan"),
];

/// Columns this crate fills in, in the order a new ledger gets them.
const LEDGER_COLUMNS: [&str; 10] = [
    "编号",
    "checklist ID",
    "日期/时间",
    "地点",
    "国家",
    "州/省",
    "郡/县",
    "照片处理是否完成",
    "笔记是否更新完成",
    "同步记录是否完成",
];

const DATETIME_FORMATS: &[&str] = &[
    "%d %b %Y %I:%M %p",
    "%b %d, %Y %I:%M %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// One row of the ledger CSV.
///
/// Columns added to the file by hand are kept in `extra`, keyed by header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    #[serde(rename = "编号")]
    pub number: u32,
    #[serde(rename = "checklist ID")]
    pub checklist_id: String,
    #[serde(rename = "日期/时间")]
    pub date_time: String,
    #[serde(rename = "地点")]
    pub location: String,
    #[serde(rename = "国家", default)]
    pub countries: String,
    #[serde(rename = "州/省", default)]
    pub state: String,
    #[serde(rename = "郡/县", default)]
    pub county: String,
    #[serde(rename = "照片处理是否完成", default)]
    pub photos_done: String,
    #[serde(rename = "笔记是否更新完成", default)]
    pub notes_done: String,
    #[serde(rename = "同步记录是否完成", default)]
    pub sync_done: String,
    #[serde(skip)]
    pub extra: BTreeMap<String, String>,
}

impl LedgerRow {
    fn new(number: u32, checklist: &ChecklistSummary) -> Self {
        let sync_done = if checklist.is_china() { NO } else { NOT_APPLICABLE };
        Self {
            number,
            checklist_id: checklist.id.clone(),
            date_time: checklist.date_time.clone(),
            location: checklist.location.clone(),
            countries: checklist.countries.join(", "),
            state: checklist.state.clone(),
            county: checklist.county.clone(),
            photos_done: NO.to_string(),
            notes_done: NO.to_string(),
            sync_done: sync_done.to_string(),
            extra: BTreeMap::new(),
        }
    }

    /// Cell under `column`; unknown columns this row lacks are blank.
    fn value(&self, column: &str) -> String {
        match column {
            "编号" => self.number.to_string(),
            "checklist ID" => self.checklist_id.clone(),
            "日期/时间" => self.date_time.clone(),
            "地点" => self.location.clone(),
            "国家" => self.countries.clone(),
            "州/省" => self.state.clone(),
            "郡/县" => self.county.clone(),
            "照片处理是否完成" => self.photos_done.clone(),
            "笔记是否更新完成" => self.notes_done.clone(),
            "同步记录是否完成" => self.sync_done.clone(),
            other => self.extra.get(other).cloned().unwrap_or_default(),
        }
    }

    /// Heading added to the notes file for this checklist.
    pub fn notes_heading(&self) -> String {
        format!(
            "## {}_{}_{}",
            self.checklist_id, self.date_time, self.location
        )
    }
}

/// Parse the date/time text of a checklist row.
///
/// Understands eBird's English and Chinese renderings (`22 二月 2026 3:44 下午`)
/// and the normalised `2026-02-22 15:44:00` form. A row without a time counts
/// as midnight.
pub fn parse_checklist_datetime(text: &str) -> Option<NaiveDateTime> {
    let mut normalized = text.trim().to_string();
    for (chinese, english) in CHINESE_MONTHS {
        normalized = normalized.replace(chinese, english);
    }
    let normalized = normalized.replace("上午", "AM").replace("下午", "PM");
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&normalized, format).ok())
        .or_else(|| {
            ["%d %b %Y", "%b %d, %Y", "%Y-%m-%d"]
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(&normalized, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

/// Newest first; rows with unparseable dates go last in their original order.
fn sort_newest_first(rows: &mut [LedgerRow]) {
    rows.sort_by_cached_key(|row| std::cmp::Reverse(parse_checklist_datetime(&row.date_time)));
}

/// The ledger CSV and the notes file it is kept in step with.
#[derive(Debug, Clone)]
pub struct ChecklistLedger {
    csv_path: PathBuf,
    notes_path: PathBuf,
}

impl ChecklistLedger {
    pub fn new(csv_path: impl Into<PathBuf>, notes_path: impl Into<PathBuf>) -> Self {
        Self {
            csv_path: csv_path.into(),
            notes_path: notes_path.into(),
        }
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    pub fn notes_path(&self) -> &Path {
        &self.notes_path
    }

    /// Rows currently in the CSV; a missing file is an empty ledger.
    pub fn load_rows(&self) -> Result<Vec<LedgerRow>> {
        Ok(self.read()?.1)
    }

    /// Header and rows of the CSV. The header is the file's own, with any
    /// missing ledger columns appended.
    fn read(&self) -> Result<(Vec<String>, Vec<LedgerRow>)> {
        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();

        if self.csv_path.exists() {
            let mut reader = csv::Reader::from_path(&self.csv_path)?;
            let headers = reader.headers()?.clone();
            columns.extend(headers.iter().map(str::to_string));

            for record in reader.records() {
                let record = record?;
                let mut row: LedgerRow = record.deserialize(Some(&headers))?;
                row.extra = headers
                    .iter()
                    .zip(record.iter())
                    .filter(|(header, _)| !LEDGER_COLUMNS.contains(header))
                    .map(|(header, value)| (header.to_string(), value.to_string()))
                    .collect();
                rows.push(row);
            }
        }

        for column in LEDGER_COLUMNS {
            if !columns.iter().any(|c| c == column) {
                columns.push(column.to_string());
            }
        }
        Ok((columns, rows))
    }

    /// Rows for the checklists not yet in `existing`, numbered after it.
    pub fn merge(existing: &[LedgerRow], scraped: &[ChecklistSummary]) -> Vec<LedgerRow> {
        let mut known: HashSet<&str> = existing.iter().map(|r| r.checklist_id.as_str()).collect();
        let mut added = Vec::new();

        for checklist in scraped {
            if !known.insert(checklist.id.as_str()) {
                continue;
            }
            let number = (existing.len() + added.len() + 1) as u32;
            added.push(LedgerRow::new(number, checklist));
        }
        added
    }

    /// Merge scraped checklists into the CSV and the notes file.
    ///
    /// Returns the number of new checklists. Nothing is written when there are none.
    pub fn apply(&self, scraped: &[ChecklistSummary]) -> Result<usize> {
        let (columns, existing) = self.read()?;
        let added = Self::merge(&existing, scraped);
        if added.is_empty() {
            log::info!("Ledger is already up to date");
            return Ok(0);
        }

        let mut rows: Vec<LedgerRow> = added.iter().cloned().chain(existing).collect();
        sort_newest_first(&mut rows);
        self.write_rows(&columns, &rows)?;
        self.prepend_notes(&added)?;

        log::info!(
            "Added {} new checklists to {} and {}",
            added.len(),
            self.csv_path.display(),
            self.notes_path.display()
        );
        Ok(added.len())
    }

    fn write_rows(&self, columns: &[String], rows: &[LedgerRow]) -> Result<()> {
        if let Some(parent) = self.csv_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(&self.csv_path)?;
        writer.write_record(columns)?;
        for row in rows {
            writer.write_record(columns.iter().map(|column| row.value(column)))?;
        }
        writer.flush()?;
        Ok(())
    }

    fn prepend_notes(&self, added: &[LedgerRow]) -> Result<()> {
        let old = if self.notes_path.exists() {
            fs::read_to_string(&self.notes_path)?
        } else {
            String::new()
        };

        let mut content: String = added
            .iter()
            .map(|row| format!("{}\n\n\n\n\n\n", row.notes_heading()))
            .collect();
        content.push_str(&old);
        fs::write(&self.notes_path, content)?;
        Ok(())
    }
}

/// Scrape the checklist history and merge it into `ledger`.
pub async fn sync_ledger(client: &EBirdClient, ledger: &ChecklistLedger) -> Result<usize> {
    let scraped = client.fetch_checklist_history().await?;
    if scraped.is_empty() {
        log::warn!("No checklists found on the history page");
        return Ok(0);
    }
    log::info!("Found {} checklists on eBird", scraped.len());
    ledger.apply(&scraped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checklist(id: &str, date_time: &str, country: &str) -> ChecklistSummary {
        ChecklistSummary {
            id: id.to_string(),
            date_time: date_time.to_string(),
            location: format!("loc-{id}"),
            countries: vec!["Somewhere".to_string(), country.to_string()],
            state: "Somewhere".to_string(),
            county: String::new(),
        }
    }

    #[test]
    fn test_parse_checklist_datetime() {
        let expected = NaiveDateTime::parse_from_str("2026-12-22 15:44", "%Y-%m-%d %H:%M").unwrap();
        assert_eq!(parse_checklist_datetime("22 十二月 2026 3:44 下午"), Some(expected));
        assert_eq!(parse_checklist_datetime("22 Dec 2026 3:44 PM"), Some(expected));
        assert_eq!(parse_checklist_datetime("2026-12-22 15:44:00"), Some(expected));

        let midnight = NaiveDateTime::parse_from_str("2026-02-03 00:00", "%Y-%m-%d %H:%M").unwrap();
        assert_eq!(parse_checklist_datetime("3 二月 2026 "), Some(midnight));
        assert_eq!(parse_checklist_datetime("sometime"), None);
    }

    #[test]
    fn test_merge_numbers_new_rows_after_existing() {
        let existing = vec![LedgerRow::new(1, &checklist("S1", "1 Jan 2026 7:00 AM", "China"))];
        let scraped = vec![
            checklist("S3", "3 Jan 2026 7:00 AM", "Malaysia"),
            checklist("S1", "1 Jan 2026 7:00 AM", "China"),
            checklist("S2", "2 Jan 2026 7:00 AM", "China"),
        ];

        let added = ChecklistLedger::merge(&existing, &scraped);
        assert_eq!(added.len(), 2);
        assert_eq!((added[0].number, added[0].checklist_id.as_str()), (2, "S3"));
        assert_eq!((added[1].number, added[1].checklist_id.as_str()), (3, "S2"));
        assert_eq!(added[0].sync_done, "NA");
        assert_eq!(added[1].sync_done, "否");
        assert_eq!(added[1].photos_done, "否");
    }

    #[test]
    fn test_apply_writes_sorted_csv_and_prepends_notes() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChecklistLedger::new(dir.path().join("ledger.csv"), dir.path().join("notes.md"));
        fs::write(ledger.notes_path(), "## older notes\n").unwrap();

        let first = ledger
            .apply(&[checklist("S1", "1 一月 2026 7:00 上午", "China")])
            .unwrap();
        assert_eq!(first, 1);

        let second = ledger
            .apply(&[
                checklist("S3", "3 一月 2026 5:00 下午", "China"),
                checklist("S1", "1 一月 2026 7:00 上午", "China"),
                checklist("S2", "garbled", "China"),
            ])
            .unwrap();
        assert_eq!(second, 2);

        let rows = ledger.load_rows().unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.checklist_id.as_str()).collect();
        assert_eq!(ids, vec!["S3", "S1", "S2"]);
        assert_eq!(rows[0].number, 2);
        assert_eq!(rows[2].number, 3);

        let notes = fs::read_to_string(ledger.notes_path()).unwrap();
        assert!(notes.starts_with("## S3_3 一月 2026 5:00 下午_loc-S3\n\n\n\n\n\n## S2_garbled_loc-S2\n\n\n\n\n\n## S1_"));
        assert!(notes.ends_with("## older notes\n"));
    }

    #[test]
    fn test_apply_keeps_hand_added_columns() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChecklistLedger::new(dir.path().join("ledger.csv"), dir.path().join("notes.md"));
        fs::write(
            ledger.csv_path(),
            "编号,checklist ID,日期/时间,地点,国家,州/省,郡/县,照片处理是否完成,笔记是否更新完成,同步记录是否完成,备注\n\
             1,S1,1 Jan 2026 7:00 AM,loc-S1,\"Somewhere, China\",Somewhere,,是,否,否,my own note\n",
        )
        .unwrap();

        assert_eq!(ledger.apply(&[checklist("S2", "2 Jan 2026 7:00 AM", "China")]).unwrap(), 1);

        let text = fs::read_to_string(ledger.csv_path()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("编号,checklist ID,日期/时间,地点,国家,州/省,郡/县,照片处理是否完成,笔记是否更新完成,同步记录是否完成,备注")
        );
        assert_eq!(
            lines.next(),
            Some("2,S2,2 Jan 2026 7:00 AM,loc-S2,\"Somewhere, China\",Somewhere,,否,否,否,")
        );
        assert_eq!(
            lines.next(),
            Some("1,S1,1 Jan 2026 7:00 AM,loc-S1,\"Somewhere, China\",Somewhere,,是,否,否,my own note")
        );

        let rows = ledger.load_rows().unwrap();
        assert_eq!(rows[1].photos_done, "是");
        assert_eq!(rows[1].extra.get("备注").map(String::as_str), Some("my own note"));
        assert!(rows[0].extra.get("备注").map_or(true, |v| v.is_empty()));
    }

    #[test]
    fn test_old_ledger_gains_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChecklistLedger::new(dir.path().join("ledger.csv"), dir.path().join("notes.md"));
        fs::write(
            ledger.csv_path(),
            "编号,checklist ID,日期/时间,地点\n1,S1,1 Jan 2026 7:00 AM,loc-S1\n",
        )
        .unwrap();

        ledger
            .apply(&[checklist("S2", "2 Jan 2026 7:00 AM", "Malaysia")])
            .unwrap();

        let text = fs::read_to_string(ledger.csv_path()).unwrap();
        assert!(text.starts_with(&format!("{}\n", LEDGER_COLUMNS.join(","))));
        let rows = ledger.load_rows().unwrap();
        assert_eq!(rows[1].checklist_id, "S1");
        assert_eq!(rows[1].sync_done, "");
        assert_eq!(rows[0].sync_done, "NA");
    }

    #[test]
    fn test_apply_without_new_rows_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ChecklistLedger::new(dir.path().join("ledger.csv"), dir.path().join("notes.md"));

        assert_eq!(ledger.apply(&[]).unwrap(), 0);
        assert!(!ledger.csv_path().exists());
        assert!(!ledger.notes_path().exists());
    }
}
