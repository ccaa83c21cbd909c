//! eBird checklist export to BirdReport import spreadsheet.

use crate::species::SpeciesLibrary;
use crate::{Result, SyncError};
use chrono::{Duration, NaiveDateTime, Timelike};
use regex::Regex;
use rust_xlsxwriter::Workbook;
use std::path::Path;

pub const SHEET_NAME: &str = "鸟种导入";
const EXPORT_TIME_FORMAT: &str = "%b %d, %Y %I:%M %p";
const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Round up to the next quarter hour, dropping seconds.
///
/// Times already on :00, :15, :30 or :45 keep their minute.
///
/// ```rust
/// use chrono::NaiveDateTime;
/// use ebird_sync::convert::round_up_to_quarter;
///
/// let t = NaiveDateTime::parse_from_str("2026-02-18 10:07:00", "%Y-%m-%d %H:%M:%S").unwrap();
/// assert_eq!(round_up_to_quarter(t).to_string(), "2026-02-18 10:15:00");
/// ```
pub fn round_up_to_quarter(dt: NaiveDateTime) -> NaiveDateTime {
    let minute = dt.minute();
    let hour_start = dt
        - Duration::minutes(i64::from(minute))
        - Duration::seconds(i64::from(dt.second()))
        - Duration::nanoseconds(i64::from(dt.nanosecond()));
    hour_start + Duration::minutes(i64::from(minute.div_ceil(15) * 15))
}

/// Minutes in an eBird duration such as `1 hour(s), 25 minute(s)`.
pub fn parse_duration_minutes(text: &str) -> i64 {
    let amount = |unit: &str| -> i64 {
        Regex::new(&format!(r"(\d+)\s*{unit}"))
            .ok()
            .and_then(|re| re.captures(text))
            .and_then(|c| c[1].parse::<i64>().ok())
            .unwrap_or(0)
    };
    amount("hour") * 60 + amount("minute")
}

/// One row of the import spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeciesCount {
    pub name: String,
    pub count: u32,
}

/// A checklist export ready for BirdReport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedChecklist {
    /// Start time rounded up to the quarter hour
    pub start: NaiveDateTime,
    /// End time (start + duration) rounded up to the quarter hour
    pub end: NaiveDateTime,
    pub rows: Vec<SpeciesCount>,
}

impl ConvertedChecklist {
    /// Hours between the rounded start and end, two decimals.
    pub fn effective_hours(&self) -> String {
        let seconds = (self.end - self.start).num_seconds();
        format!("{:.2}", seconds as f64 / 3600.0)
    }

    pub fn start_time(&self) -> String {
        self.start.format(REPORT_TIME_FORMAT).to_string()
    }

    pub fn end_time(&self) -> String {
        self.end.format(REPORT_TIME_FORMAT).to_string()
    }

    /// Write the two-column import sheet (`中文名`, `数量`).
    pub fn write_spreadsheet(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        sheet.write_string(0, 0, "中文名")?;
        sheet.write_string(0, 1, "数量")?;

        for (i, row) in self.rows.iter().enumerate() {
            let line = (i + 1) as u32;
            sheet.write_string(line, 0, &row.name)?;
            sheet.write_number(line, 1, f64::from(row.count))?;
        }

        workbook.save(path.as_ref())?;
        log::debug!(
            "Wrote {} species rows to {}",
            self.rows.len(),
            path.as_ref().display()
        );
        Ok(())
    }
}

fn parse_count(raw: &str) -> u32 {
    let raw = raw.trim();
    if !raw.is_empty() && raw.chars().all(|c| c.is_ascii_digit()) {
        raw.parse().unwrap_or(1)
    } else {
        1
    }
}

/// Convert the CSV text of an eBird checklist download.
///
/// Date, start time and duration come from the first row; every row yields
/// a species with its name resolved through `library`. A count that is not
/// a number (eBird's `X`) becomes 1.
pub fn convert_export(csv_text: &str, library: &SpeciesLibrary) -> Result<ConvertedChecklist> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(csv_text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| SyncError::Parse(format!("Checklist export has no '{name}' column")))
    };
    let species_col = column("Species")?;
    let count_col = column("Count")?;
    let date_col = column("Observation Date")?;
    let time_col = column("Start Time")?;
    let duration_col = column("Duration")?;

    let mut records = Vec::new();
    for record in reader.records() {
        records.push(record?);
    }
    let first = records
        .first()
        .ok_or_else(|| SyncError::Parse("Checklist export has no rows".to_string()))?;
    let field = |i: usize| first.get(i).unwrap_or_default().trim();

    let stamp = format!("{} {}", field(date_col), field(time_col)).replace("  ", " ");
    let start = NaiveDateTime::parse_from_str(&stamp, EXPORT_TIME_FORMAT)
        .map_err(|e| SyncError::Parse(format!("Bad start time '{stamp}': {e}")))?;
    let end = start + Duration::minutes(parse_duration_minutes(field(duration_col)));

    let rows = records
        .iter()
        .map(|record| {
            let label = record.get(species_col).unwrap_or_default();
            let name = library.birdreport_name(label);
            log::debug!("{label} -> {name}");
            SpeciesCount {
                name,
                count: parse_count(record.get(count_col).unwrap_or_default()),
            }
        })
        .collect();

    let converted = ConvertedChecklist {
        start: round_up_to_quarter(start),
        end: round_up_to_quarter(end),
        rows,
    };
    log::info!(
        "Rounded time {} -> {} ({}h)",
        converted.start.format("%H:%M"),
        converted.end.format("%H:%M"),
        converted.effective_hours()
    );
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpeciesRecord;
    use calamine::{open_workbook_auto, Reader};

    fn at(text: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    const EXPORT: &str = "Submission ID,Common Name,Species,Count,Observation Date,Start Time,Duration\n\
S301238171,Light-vented Bulbul,白头鹎 (Pycnonotus sinensis),12,\"Feb 18, 2026\",07:05 AM,\"1 hour(s), 25 minute(s)\"\n\
S301238171,Vega Gull,织女银鸥/蒙古银鸥 (西伯利亚银鸥) (Larus vegae/mongolicus),X,\"Feb 18, 2026\",07:05 AM,\"1 hour(s), 25 minute(s)\"\n\
S301238171,bunting sp.,鹀属 (Emberiza sp.),3,\"Feb 18, 2026\",07:05 AM,\"1 hour(s), 25 minute(s)\"\n";

    #[test]
    fn test_round_up_to_quarter() {
        assert_eq!(round_up_to_quarter(at("2026-02-18 10:07:00")), at("2026-02-18 10:15:00"));
        assert_eq!(round_up_to_quarter(at("2026-02-18 10:50:00")), at("2026-02-18 11:00:00"));
        assert_eq!(round_up_to_quarter(at("2026-02-18 10:16:00")), at("2026-02-18 10:30:00"));
        assert_eq!(round_up_to_quarter(at("2026-02-18 23:59:00")), at("2026-02-19 00:00:00"));
    }

    #[test]
    fn test_quarter_boundaries_unchanged() {
        for minute in ["00", "15", "30", "45"] {
            let t = at(&format!("2026-02-18 10:{minute}:00"));
            assert_eq!(round_up_to_quarter(t), t);
        }
        assert_eq!(round_up_to_quarter(at("2026-02-18 10:15:42")), at("2026-02-18 10:15:00"));
    }

    #[test]
    fn test_parse_duration_minutes() {
        assert_eq!(parse_duration_minutes("1 hour(s), 25 minute(s)"), 85);
        assert_eq!(parse_duration_minutes("2 hour(s)"), 120);
        assert_eq!(parse_duration_minutes("40 minute(s)"), 40);
        assert_eq!(parse_duration_minutes(""), 0);
    }

    #[test]
    fn test_convert_export() {
        let library = SpeciesLibrary::new(vec![SpeciesRecord {
            chinese: "西伯利亚银鸥".to_string(),
            latin: "Larus vegae".to_string(),
            ..Default::default()
        }]);

        let converted = convert_export(EXPORT, &library).unwrap();
        assert_eq!(converted.start_time(), "2026-02-18 07:15:00");
        assert_eq!(converted.end_time(), "2026-02-18 08:30:00");
        assert_eq!(converted.effective_hours(), "1.25");
        assert_eq!(
            converted.rows,
            vec![
                SpeciesCount { name: "白头鹎".to_string(), count: 12 },
                SpeciesCount { name: "西伯利亚银鸥".to_string(), count: 1 },
                SpeciesCount { name: "鹀属".to_string(), count: 3 },
            ]
        );
    }

    #[test]
    fn test_convert_export_without_rows_fails() {
        let header_only = "Species,Count,Observation Date,Start Time,Duration\n";
        assert!(matches!(
            convert_export(header_only, &SpeciesLibrary::empty()),
            Err(SyncError::Parse(_))
        ));
    }

    #[test]
    fn test_write_spreadsheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync_S1.xlsx");
        let converted = convert_export(EXPORT, &SpeciesLibrary::empty()).unwrap();
        converted.write_spreadsheet(&path).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        let range = workbook.worksheet_range(SHEET_NAME).unwrap();
        let rows: Vec<Vec<String>> = range
            .rows()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();

        assert_eq!(rows[0], vec!["中文名", "数量"]);
        assert_eq!(rows[1], vec!["白头鹎", "12"]);
        assert_eq!(rows.len(), 4);
    }
}
